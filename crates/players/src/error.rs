use net::SessionId;
use persistence::StoreError;
use world::WorldError;

use crate::player::PlayerId;

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("player {0} not found")]
    NotFound(PlayerId),

    #[error("no character named '{0}'")]
    UnknownCharacter(String),

    #[error("player name '{0}' already in use")]
    NameTaken(String),

    #[error("player capacity {0} exhausted")]
    CapacityExceeded(usize),

    #[error("session {session} already bound to player {player}")]
    SessionBound {
        session: SessionId,
        player: PlayerId,
    },

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),

    #[error("world error: {0}")]
    World(#[from] WorldError),
}

impl DirectoryError {
    /// Conflict-class errors are surfaced to the initiating request and are
    /// always recoverable.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            DirectoryError::NameTaken(_)
                | DirectoryError::CapacityExceeded(_)
                | DirectoryError::SessionBound { .. }
        )
    }
}
