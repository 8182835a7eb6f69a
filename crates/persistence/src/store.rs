use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Persisted character state. The `data` payload is an opaque blob owned by
/// gameplay code; this crate only guarantees byte-exact round trips. Map and
/// position ride alongside it so a loaded character can be placed without
/// decoding the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterSnapshot {
    pub name: String,
    pub map: u16,
    pub x: i32,
    pub y: i32,
    pub data: Vec<u8>,
}

/// Persistence collaborator for character snapshots.
pub trait PlayerStore: Send + Sync {
    fn load(&self, name: &str) -> Result<CharacterSnapshot, StoreError>;
    fn save(&self, name: &str, snapshot: &CharacterSnapshot) -> Result<(), StoreError>;
}

/// Storage-optimization collaborator invoked from full maintenance passes.
pub trait StorageMaintenance: Send + Sync {
    /// Returns the number of artifacts cleaned up.
    fn optimize(&self) -> Result<usize, StoreError>;
}

/// One bincode blob per character under `<base>/players/`.
pub struct FileStore {
    players_dir: PathBuf,
}

impl FileStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            players_dir: base.into().join("players"),
        }
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, StoreError> {
        if name.is_empty()
            || name
                .chars()
                .any(|c| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
        {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(self.players_dir.join(format!("{}.bin", name)))
    }
}

impl PlayerStore for FileStore {
    fn load(&self, name: &str) -> Result<CharacterSnapshot, StoreError> {
        let path = self.path_for(name)?;
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let snapshot: CharacterSnapshot = bincode::deserialize(&bytes)?;
        tracing::debug!(name, bytes = bytes.len(), "character loaded");
        Ok(snapshot)
    }

    fn save(&self, name: &str, snapshot: &CharacterSnapshot) -> Result<(), StoreError> {
        let path = self.path_for(name)?;
        std::fs::create_dir_all(&self.players_dir)?;

        let bytes = bincode::serialize(snapshot)?;

        // Write to temp file first, then rename for atomicity
        let tmp_path = path.with_extension("bin.tmp");
        std::fs::write(&tmp_path, &bytes)?;
        std::fs::rename(&tmp_path, &path)?;

        tracing::debug!(name, bytes = bytes.len(), path = %path.display(), "character saved");
        Ok(())
    }
}

impl StorageMaintenance for FileStore {
    /// Prune temp files left behind by interrupted saves.
    fn optimize(&self) -> Result<usize, StoreError> {
        let mut removed = 0;
        let entries = match std::fs::read_dir(&self.players_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "tmp") {
                std::fs::remove_file(&path)?;
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!(removed, "pruned stale save temp files");
        }
        Ok(removed)
    }
}

/// In-memory store for tests and tooling.
#[derive(Default)]
pub struct MemoryStore {
    snapshots: Mutex<BTreeMap<String, CharacterSnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.snapshots.lock().expect("memory store poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StorageMaintenance for MemoryStore {
    fn optimize(&self) -> Result<usize, StoreError> {
        Ok(0)
    }
}

impl PlayerStore for MemoryStore {
    fn load(&self, name: &str) -> Result<CharacterSnapshot, StoreError> {
        self.snapshots
            .lock()
            .expect("memory store poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    fn save(&self, name: &str, snapshot: &CharacterSnapshot) -> Result<(), StoreError> {
        self.snapshots
            .lock()
            .expect("memory store poisoned")
            .insert(name.to_string(), snapshot.clone());
        Ok(())
    }
}
