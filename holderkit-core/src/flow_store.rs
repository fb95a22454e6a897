//! Durable key/value storage for the resumable part of a flow.
//!
//! A flow keeps only what it needs to start over after the process died (for
//! issuance, the offer URI). Everything else is rebuilt from engine events.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::HolderKitError;

/// Key/value store scoped to flows.
pub trait FlowStateStore: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, HolderKitError>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn put(&self, key: &str, value: &str) -> Result<(), HolderKitError>;

    /// Removes `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn remove(&self, key: &str) -> Result<(), HolderKitError>;
}

fn poisoned(what: &str) -> HolderKitError {
    HolderKitError::Storage {
        error: format!("{what} lock poisoned"),
    }
}

/// Store that forgets everything when dropped.
#[derive(Debug, Default)]
pub struct MemoryFlowStateStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryFlowStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> Result<MutexGuard<'_, HashMap<String, String>>, HolderKitError> {
        self.values.lock().map_err(|_| poisoned("flow state"))
    }
}

impl FlowStateStore for MemoryFlowStateStore {
    fn get(&self, key: &str) -> Result<Option<String>, HolderKitError> {
        Ok(self.values()?.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), HolderKitError> {
        self.values()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), HolderKitError> {
        self.values()?.remove(key);
        Ok(())
    }
}

/// Store persisted as a JSON object in one file.
///
/// Writes go to a sibling temporary file which then replaces the original, so
/// a crash leaves either the old or the new content.
#[derive(Debug)]
pub struct FileFlowStateStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileFlowStateStore {
    /// Creates a store backed by `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            guard: Mutex::new(()),
        }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<BTreeMap<String, String>, HolderKitError> {
        match fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| HolderKitError::Storage {
                error: format!("corrupt flow state at {}: {e}", self.path.display()),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, values: &BTreeMap<String, String>) -> Result<(), HolderKitError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        let bytes = serde_json::to_vec(values).map_err(|e| HolderKitError::Storage {
            error: e.to_string(),
        })?;
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn update(
        &self,
        change: impl FnOnce(&mut BTreeMap<String, String>),
    ) -> Result<(), HolderKitError> {
        let _guard = self.guard.lock().map_err(|_| poisoned("flow state file"))?;
        let mut values = self.read()?;
        change(&mut values);
        self.write(&values)
    }
}

impl FlowStateStore for FileFlowStateStore {
    fn get(&self, key: &str) -> Result<Option<String>, HolderKitError> {
        let _guard = self.guard.lock().map_err(|_| poisoned("flow state file"))?;
        Ok(self.read()?.remove(key))
    }

    fn put(&self, key: &str, value: &str) -> Result<(), HolderKitError> {
        self.update(|values| {
            values.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), HolderKitError> {
        self.update(|values| {
            values.remove(key);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file() -> PathBuf {
        std::env::temp_dir()
            .join(format!("holderkit-flow-{}", uuid::Uuid::new_v4()))
            .join("flow_state.json")
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryFlowStateStore::new();
        assert_eq!(store.get("k").unwrap(), None);
        store.put("k", "v1").unwrap();
        store.put("k", "v2").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v2"));
        store.remove("k").unwrap();
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let path = temp_file();
        {
            let store = FileFlowStateStore::new(&path);
            assert_eq!(store.get("offer").unwrap(), None);
            store.put("offer", "openid-credential-offer://x").unwrap();
            store.put("other", "1").unwrap();
        }

        let reopened = FileFlowStateStore::new(&path);
        assert_eq!(
            reopened.get("offer").unwrap().as_deref(),
            Some("openid-credential-offer://x")
        );
        reopened.remove("offer").unwrap();
        assert_eq!(reopened.get("offer").unwrap(), None);
        assert_eq!(reopened.get("other").unwrap().as_deref(), Some("1"));

        if let Some(dir) = path.parent() {
            let _ = fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let path = temp_file();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"not json").unwrap();

        let store = FileFlowStateStore::new(&path);
        assert!(matches!(
            store.get("offer").unwrap_err(),
            HolderKitError::Storage { .. }
        ));
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
