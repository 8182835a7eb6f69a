use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use net::SessionId;

use crate::player::PlayerId;

/// Lifecycle notifications published by the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    Created {
        player: PlayerId,
        name: String,
    },
    Connected {
        player: PlayerId,
        session: SessionId,
    },
    Disconnected {
        player: PlayerId,
    },
    /// "Last login wins": a newer session displaced this one.
    ForcedDisconnect {
        player: PlayerId,
        old_session: SessionId,
        new_session: SessionId,
    },
    Saved {
        player: PlayerId,
        save_count: u64,
    },
    Destroyed {
        player: PlayerId,
    },
}

/// Failure notification for the error-callback channel.
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub player: Option<PlayerId>,
    pub operation: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

pub type EventCallback = Arc<dyn Fn(&PlayerEvent) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&ErrorEvent) + Send + Sync>;

enum Pending {
    Event(PlayerEvent),
    Error(ErrorEvent),
}

/// Events queue up while a directory operation runs and are dispatched only
/// after it releases every lock, so a subscriber never runs nested inside a
/// held lock. The queue is bounded; on overflow the oldest entry is dropped.
const PENDING_CAP: usize = 1024;

#[derive(Default)]
pub struct EventHub {
    pending: Mutex<VecDeque<Pending>>,
    subscribers: Mutex<BTreeMap<SubscriptionId, EventCallback>>,
    error_subscribers: Mutex<BTreeMap<SubscriptionId, ErrorCallback>>,
    next_id: AtomicU64,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, callback: EventCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .lock()
            .expect("subscribers poisoned")
            .insert(id, callback);
        id
    }

    pub fn subscribe_errors(&self, callback: ErrorCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.error_subscribers
            .lock()
            .expect("subscribers poisoned")
            .insert(id, callback);
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers
            .lock()
            .expect("subscribers poisoned")
            .remove(&id)
            .is_some()
            || self
                .error_subscribers
                .lock()
                .expect("subscribers poisoned")
                .remove(&id)
                .is_some()
    }

    pub fn emit(&self, event: PlayerEvent) {
        self.push(Pending::Event(event));
    }

    pub fn emit_error(&self, error: ErrorEvent) {
        self.push(Pending::Error(error));
    }

    fn push(&self, pending: Pending) {
        let mut queue = self.pending.lock().expect("event queue poisoned");
        if queue.len() >= PENDING_CAP {
            queue.pop_front();
            tracing::warn!("player event queue overflow, oldest entry dropped");
        }
        queue.push_back(pending);
    }

    /// Drain pending entries and invoke subscribers. Callbacks are cloned
    /// out first so none runs under a hub lock.
    pub fn dispatch(&self) {
        let drained: Vec<Pending> = {
            let mut queue = self.pending.lock().expect("event queue poisoned");
            queue.drain(..).collect()
        };
        if drained.is_empty() {
            return;
        }

        let callbacks: Vec<EventCallback> = self
            .subscribers
            .lock()
            .expect("subscribers poisoned")
            .values()
            .cloned()
            .collect();
        let error_callbacks: Vec<ErrorCallback> = self
            .error_subscribers
            .lock()
            .expect("subscribers poisoned")
            .values()
            .cloned()
            .collect();

        for pending in &drained {
            match pending {
                Pending::Event(event) => {
                    for callback in &callbacks {
                        callback(event);
                    }
                }
                Pending::Error(error) => {
                    for callback in &error_callbacks {
                        callback(error);
                    }
                }
            }
        }
    }
}
