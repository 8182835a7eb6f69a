use std::io;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no saved character named '{0}'")]
    NotFound(String),

    #[error("character name '{0}' not usable as a store key")]
    InvalidName(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
