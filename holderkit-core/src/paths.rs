//! Engine storage path helpers.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::HolderConfig;
use crate::error::HolderKitError;

const HOLDERKIT_DIRNAME: &str = "holderkit";
const FLOW_STATE_FILENAME: &str = "flow_state.json";
const ENGINE_CACHE_DIRNAME: &str = "engine";

/// Locations handed to the engine at construction.
///
/// Engine storage lives under `<storage>/holderkit` and the engine cache
/// under `<cache>/holderkit/engine`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnginePaths {
    storage_dir: PathBuf,
    cache_dir: PathBuf,
}

impl EnginePaths {
    /// Builds paths rooted at `storage_root` and `cache_root`.
    #[must_use]
    pub fn new(storage_root: impl AsRef<Path>, cache_root: impl AsRef<Path>) -> Self {
        Self {
            storage_dir: storage_root.as_ref().join(HOLDERKIT_DIRNAME),
            cache_dir: cache_root
                .as_ref()
                .join(HOLDERKIT_DIRNAME)
                .join(ENGINE_CACHE_DIRNAME),
        }
    }

    /// Builds paths from the configured roots.
    #[must_use]
    pub fn from_config(config: &HolderConfig) -> Self {
        Self::new(&config.storage_dir, &config.cache_dir)
    }

    /// Returns the persistent storage directory.
    #[must_use]
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Returns the engine cache directory.
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the path to the persisted flow state.
    #[must_use]
    pub fn flow_state_path(&self) -> PathBuf {
        self.storage_dir.join(FLOW_STATE_FILENAME)
    }

    /// Creates the storage and cache directories.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created.
    pub fn create_dirs(&self) -> Result<(), HolderKitError> {
        fs::create_dir_all(&self.storage_dir)?;
        fs::create_dir_all(&self.cache_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::EnginePaths;
    use std::path::PathBuf;

    #[test]
    fn test_engine_paths() {
        let storage = PathBuf::from("/data/no_backup");
        let cache = PathBuf::from("/data/cache");
        let paths = EnginePaths::new(&storage, &cache);

        assert_eq!(paths.storage_dir(), storage.join("holderkit"));
        assert_eq!(
            paths.flow_state_path(),
            storage.join("holderkit").join("flow_state.json")
        );
        assert_eq!(paths.cache_dir(), cache.join("holderkit").join("engine"));
    }

    #[test]
    fn test_create_dirs() {
        let root = std::env::temp_dir().join(format!("holderkit-paths-{}", uuid::Uuid::new_v4()));
        let paths = EnginePaths::new(root.join("storage"), root.join("cache"));

        paths.create_dirs().expect("create dirs");
        assert!(paths.storage_dir().is_dir());
        assert!(paths.cache_dir().is_dir());

        // creating twice is fine
        paths.create_dirs().expect("create dirs again");
        let _ = std::fs::remove_dir_all(root);
    }
}
