//! Durable storage for the volume filter
//!
//! One string under a fixed key, stored verbatim. Callers treat every
//! failure here as best-effort (see `Store`).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Result, SyncError};

/// Key (and file name) the filter is stored under
pub const FILTER_KEY: &str = "volumesFilter";

/// Durable client-side storage for the filter value
pub trait FilterStorage: Send + Sync {
    /// Read the persisted value; `Ok(None)` when nothing was stored
    fn load(&self) -> Result<Option<String>>;

    /// Write the value, replacing any previous one
    fn save(&self, value: &str) -> Result<()>;
}

/// Stores the filter in `<dir>/volumesFilter`
#[derive(Debug, Clone)]
pub struct FileFilterStorage {
    path: PathBuf,
}

impl FileFilterStorage {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(FILTER_KEY),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FilterStorage for FileFilterStorage {
    fn load(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::Storage {
                reason: format!("Failed to read {}: {}", self.path.display(), e),
            }),
        }
    }

    fn save(&self, value: &str) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| SyncError::Storage {
                reason: format!("Failed to create {}: {}", dir.display(), e),
            })?;
        }
        fs::write(&self.path, value).map_err(|e| SyncError::Storage {
            reason: format!("Failed to write {}: {}", self.path.display(), e),
        })
    }
}

/// In-memory storage. Clones share the slot, so a clone handed to a
/// second `Store` sees what the first one saved.
#[derive(Debug, Clone, Default)]
pub struct MemoryFilterStorage {
    slot: Arc<Mutex<Option<String>>>,
}

impl MemoryFilterStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(value: impl Into<String>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(value.into()))),
        }
    }

    pub fn value(&self) -> Option<String> {
        self.slot.lock().clone()
    }
}

impl FilterStorage for MemoryFilterStorage {
    fn load(&self) -> Result<Option<String>> {
        Ok(self.slot.lock().clone())
    }

    fn save(&self, value: &str) -> Result<()> {
        *self.slot.lock() = Some(value.to_string());
        Ok(())
    }
}
