use admission::{CategoryId, Priority};
use tokio::sync::mpsc;

/// Transport-assigned session identifier. `SessionId(0)` is reserved as the
/// "offline" sentinel; the intake loop allocates from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SessionId(pub u64);

pub const OFFLINE_SESSION: SessionId = SessionId(0);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inbound event produced by the transport layer and admitted through the
/// admission queue.
#[derive(Debug, PartialEq, Eq)]
pub enum SessionEvent {
    Connected { session_id: SessionId },
    Input { session_id: SessionId, line: String },
    Disconnected { session_id: SessionId },
}

impl SessionEvent {
    pub fn session_id(&self) -> SessionId {
        match *self {
            SessionEvent::Connected { session_id }
            | SessionEvent::Input { session_id, .. }
            | SessionEvent::Disconnected { session_id } => session_id,
        }
    }

    /// Admission classification: disconnects are Critical (losing one leaks
    /// a player record until the inactivity sweep), connections shed before
    /// gameplay input does.
    pub fn admission_class(&self) -> (CategoryId, Priority) {
        match self {
            SessionEvent::Connected { .. } => (CATEGORY_LOGIN, Priority::High),
            SessionEvent::Input { .. } => (CATEGORY_GAMEPLAY, Priority::Normal),
            SessionEvent::Disconnected { .. } => (CATEGORY_CONTROL, Priority::Critical),
        }
    }
}

pub const CATEGORY_CONTROL: CategoryId = CategoryId(0);
pub const CATEGORY_LOGIN: CategoryId = CategoryId(1);
pub const CATEGORY_GAMEPLAY: CategoryId = CategoryId(2);

/// Outbound text for one session; `disconnect` tells the router to close the
/// session after delivery.
#[derive(Debug, Clone)]
pub struct SessionOutput {
    pub session_id: SessionId,
    pub text: String,
    pub disconnect: bool,
}

impl SessionOutput {
    pub fn new(session_id: SessionId, text: impl Into<String>) -> Self {
        Self {
            session_id,
            text: text.into(),
            disconnect: false,
        }
    }

    pub fn closing(session_id: SessionId, text: impl Into<String>) -> Self {
        Self {
            session_id,
            text: text.into(),
            disconnect: true,
        }
    }
}

/// Per-session write command (router → session writer task).
#[derive(Debug)]
pub enum SessionWrite {
    Text(String),
    Close,
}

pub type SessionWriteTx = mpsc::UnboundedSender<SessionWrite>;
pub type SessionWriteRx = mpsc::UnboundedReceiver<SessionWrite>;

pub type OutputTx = mpsc::UnboundedSender<SessionOutput>;
pub type OutputRx = mpsc::UnboundedReceiver<SessionOutput>;

/// Registration message for the output router.
#[derive(Debug)]
pub struct RegisterSession {
    pub session_id: SessionId,
    pub write_tx: SessionWriteTx,
}

pub type RegisterTx = mpsc::UnboundedSender<RegisterSession>;
pub type RegisterRx = mpsc::UnboundedReceiver<RegisterSession>;

pub type UnregisterTx = mpsc::UnboundedSender<SessionId>;
pub type UnregisterRx = mpsc::UnboundedReceiver<SessionId>;
