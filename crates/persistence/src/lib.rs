pub mod error;
pub mod store;

pub use error::StoreError;
pub use store::{CharacterSnapshot, FileStore, MemoryStore, PlayerStore, StorageMaintenance};
