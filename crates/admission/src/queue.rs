use std::collections::{BTreeMap, VecDeque};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::stats::StatsCell;

/// Strict admission priority. Lower discriminant drains first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Never shed by load or quota, only by the hard size ceiling.
    Critical = 0,
    High = 1,
    Normal = 2,
    Low = 3,
    Background = 4,
}

impl Priority {
    pub const COUNT: usize = 5;

    fn bucket(self) -> usize {
        self as usize
    }
}

/// Producer-assigned work classification used for per-category quotas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CategoryId(pub u16);

/// A unit of admitted work. The queue owns the item between enqueue and
/// dequeue; the producer relinquishes it on a successful enqueue.
#[derive(Debug)]
pub struct QueueItem<T> {
    pub payload: T,
    pub category: CategoryId,
    pub priority: Priority,
    pub enqueued_at: Instant,
    pub retries: u32,
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Hard ceiling on total queued items. Applies to every priority.
    pub max_size: usize,
    /// Load factor (len / max_size) above which non-Critical work is shed.
    pub backpressure_threshold: f64,
    /// Per-category item quotas. Categories without an entry are unbounded
    /// (up to the ceiling). Critical items ignore quotas.
    pub category_quotas: BTreeMap<CategoryId, usize>,
    /// Items that waited longer than this are dropped at dequeue and counted
    /// as timed out. None disables the check.
    pub max_wait: Option<Duration>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: 4096,
            backpressure_threshold: 0.8,
            category_quotas: BTreeMap::new(),
            max_wait: None,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AdmissionError {
    #[error("queue at hard ceiling ({0} items)")]
    QueueFull(usize),

    #[error("load {load:.2} at or above back-pressure threshold {threshold:.2}")]
    Backpressure { load: f64, threshold: f64 },

    #[error("category {0:?} quota exhausted")]
    QuotaExhausted(CategoryId),

    #[error("queue shutting down")]
    ShuttingDown,
}

struct Buckets<T> {
    queues: [VecDeque<QueueItem<T>>; Priority::COUNT],
    len: usize,
    category_counts: BTreeMap<CategoryId, usize>,
    shutdown: bool,
}

impl<T> Buckets<T> {
    fn new() -> Self {
        Self {
            queues: Default::default(),
            len: 0,
            category_counts: BTreeMap::new(),
            shutdown: false,
        }
    }

    fn push(&mut self, item: QueueItem<T>) {
        *self.category_counts.entry(item.category).or_insert(0) += 1;
        self.len += 1;
        self.queues[item.priority.bucket()].push_back(item);
    }

    /// Pop from the highest-priority non-empty bucket. Strict priority: a
    /// saturated Critical bucket starves Background indefinitely.
    fn pop(&mut self) -> Option<QueueItem<T>> {
        for queue in self.queues.iter_mut() {
            if let Some(item) = queue.pop_front() {
                self.len -= 1;
                if let Some(count) = self.category_counts.get_mut(&item.category) {
                    *count -= 1;
                    if *count == 0 {
                        self.category_counts.remove(&item.category);
                    }
                }
                return Some(item);
            }
        }
        None
    }
}

/// Multi-priority admission queue with category quotas and back-pressure.
///
/// One consumer loop drains it; any number of producers enqueue. Shared as
/// `Arc<AdmissionQueue<T>>`.
pub struct AdmissionQueue<T> {
    config: QueueConfig,
    buckets: Mutex<Buckets<T>>,
    available: Condvar,
    stats: StatsCell,
}

impl<T> AdmissionQueue<T> {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(Buckets::new()),
            available: Condvar::new(),
            stats: StatsCell::new(),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Admit an item. Critical items bypass load and quota checks and are
    /// only refused by the hard ceiling; everything else is shed once load
    /// reaches the threshold or its category quota fills.
    pub fn enqueue(
        &self,
        payload: T,
        category: CategoryId,
        priority: Priority,
    ) -> Result<(), AdmissionError> {
        let mut buckets = self.buckets.lock().expect("admission queue poisoned");
        if buckets.shutdown {
            return Err(AdmissionError::ShuttingDown);
        }

        if buckets.len >= self.config.max_size {
            self.stats.note_rejected();
            return Err(AdmissionError::QueueFull(self.config.max_size));
        }

        if priority != Priority::Critical {
            let load = buckets.len as f64 / self.config.max_size as f64;
            if load >= self.config.backpressure_threshold {
                self.stats.note_rejected();
                return Err(AdmissionError::Backpressure {
                    load,
                    threshold: self.config.backpressure_threshold,
                });
            }
            if let Some(&quota) = self.config.category_quotas.get(&category) {
                let used = buckets.category_counts.get(&category).copied().unwrap_or(0);
                if used >= quota {
                    self.stats.note_rejected();
                    return Err(AdmissionError::QuotaExhausted(category));
                }
            }
        }

        buckets.push(QueueItem {
            payload,
            category,
            priority,
            enqueued_at: Instant::now(),
            retries: 0,
        });
        self.stats.note_enqueued();
        drop(buckets);
        self.available.notify_one();
        Ok(())
    }

    /// Re-admit an item the consumer could not process. Bypasses shedding
    /// (the item was already admitted once) but respects the hard ceiling.
    pub fn requeue(&self, mut item: QueueItem<T>) -> Result<(), AdmissionError> {
        let mut buckets = self.buckets.lock().expect("admission queue poisoned");
        if buckets.shutdown {
            return Err(AdmissionError::ShuttingDown);
        }
        if buckets.len >= self.config.max_size {
            self.stats.note_rejected();
            return Err(AdmissionError::QueueFull(self.config.max_size));
        }
        item.retries += 1;
        buckets.push(item);
        self.stats.note_retried();
        drop(buckets);
        self.available.notify_one();
        Ok(())
    }

    /// Block until an item is available or shutdown is requested. Returns
    /// None only when shutting down with all buckets drained. Items older
    /// than the configured max wait are discarded here and counted as
    /// timed out.
    pub fn dequeue(&self) -> Option<QueueItem<T>> {
        let mut buckets = self.buckets.lock().expect("admission queue poisoned");
        loop {
            match buckets.pop() {
                Some(item) => {
                    if let Some(max_wait) = self.config.max_wait {
                        if item.enqueued_at.elapsed() > max_wait {
                            self.stats.note_timed_out();
                            tracing::warn!(
                                category = item.category.0,
                                priority = ?item.priority,
                                "dropping item that exceeded max queue wait"
                            );
                            continue;
                        }
                    }
                    return Some(item);
                }
                None if buckets.shutdown => return None,
                None => {
                    buckets = self
                        .available
                        .wait(buckets)
                        .expect("admission queue poisoned");
                }
            }
        }
    }

    /// Non-blocking dequeue for tests and drain loops.
    pub fn try_dequeue(&self) -> Option<QueueItem<T>> {
        self.buckets.lock().expect("admission queue poisoned").pop()
    }

    /// Current load factor in [0, 1].
    pub fn load(&self) -> f64 {
        let buckets = self.buckets.lock().expect("admission queue poisoned");
        buckets.len as f64 / self.config.max_size as f64
    }

    pub fn len(&self) -> usize {
        self.buckets.lock().expect("admission queue poisoned").len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Request shutdown and wake the consumer. Already-queued items remain
    /// dequeueable; new enqueues are refused.
    pub fn shutdown(&self) {
        let mut buckets = self.buckets.lock().expect("admission queue poisoned");
        buckets.shutdown = true;
        drop(buckets);
        self.available.notify_all();
    }

    /// Record the outcome of one processed item.
    pub fn record_processed(&self, wait: Duration, processing: Duration, ok: bool) {
        self.stats.note_processed(wait, processing, ok);
    }

    pub fn stats(&self) -> crate::stats::QueueStats {
        self.stats.snapshot()
    }
}
