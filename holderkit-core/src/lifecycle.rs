//! Ownership and initialization of the single engine instance.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::Mutex;

use crate::config::HolderConfig;
use crate::engine::{EngineFactory, EngineHandle};
use crate::error::HolderKitError;
use crate::paths::EnginePaths;

/// Where the engine is in its lifecycle.
#[derive(Debug, Clone)]
pub enum InitializationState {
    /// No engine exists.
    NotInitialized,
    /// An initialization is running.
    Initializing,
    /// The engine is ready.
    Initialized(EngineHandle),
    /// The last initialization failed. Stays until [`EngineLifecycle::reset`].
    Failed(HolderKitError),
}

impl InitializationState {
    /// Whether the engine is ready.
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        matches!(self, Self::Initialized(_))
    }
}

/// Owns the engine instance and serializes its initialization.
///
/// `initialize` is single flight: concurrent callers wait behind one mutex and
/// all observe the same handle or the same failure. A failure is sticky; call
/// [`EngineLifecycle::reset`] before trying again.
pub struct EngineLifecycle {
    factory: Arc<dyn EngineFactory>,
    gate: Mutex<()>,
    state: RwLock<InitializationState>,
}

impl fmt::Debug for EngineLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineLifecycle")
            .field("state", &self.current_state())
            .finish_non_exhaustive()
    }
}

impl EngineLifecycle {
    /// Creates a lifecycle that builds engines with `factory`.
    #[must_use]
    pub fn new(factory: Arc<dyn EngineFactory>) -> Self {
        Self {
            factory,
            gate: Mutex::new(()),
            state: RwLock::new(InitializationState::NotInitialized),
        }
    }

    /// Initializes the engine, or returns the existing one.
    ///
    /// The configuration is validated before anything else; an invalid
    /// configuration fails without constructing an engine.
    ///
    /// # Errors
    ///
    /// - [`HolderKitError::Configuration`] for an invalid configuration.
    /// - [`HolderKitError::Storage`] if the storage directories cannot be created.
    /// - [`HolderKitError::Engine`] if construction failed.
    ///
    /// A failure is recorded and returned again by later calls until `reset`.
    pub async fn initialize(&self, config: &HolderConfig) -> Result<EngineHandle, HolderKitError> {
        let _gate = self.gate.lock().await;

        match self.current_state() {
            InitializationState::Initialized(handle) => return Ok(handle),
            InitializationState::Failed(error) => {
                tracing::warn!(%error, "engine initialization failed earlier, reset required");
                return Err(error);
            }
            InitializationState::NotInitialized | InitializationState::Initializing => {}
        }

        self.set_state(InitializationState::Initializing);
        match self.construct(config).await {
            Ok(handle) => {
                tracing::info!("engine initialized");
                self.set_state(InitializationState::Initialized(handle.clone()));
                Ok(handle)
            }
            Err(error) => {
                tracing::error!(%error, "engine initialization failed");
                self.set_state(InitializationState::Failed(error.clone()));
                Err(error)
            }
        }
    }

    async fn construct(&self, config: &HolderConfig) -> Result<EngineHandle, HolderKitError> {
        config.validate()?;

        let paths = EnginePaths::from_config(config);
        let factory = Arc::clone(&self.factory);
        let config = config.clone();
        // engine construction does disk and keystore work
        let engine = tokio::task::spawn_blocking(move || {
            paths.create_dirs()?;
            factory
                .create(&config, &paths)
                .map_err(|e| HolderKitError::engine("engine construction", e))
        })
        .await??;

        Ok(EngineHandle::new(engine))
    }

    /// Returns a snapshot of the lifecycle state.
    #[must_use]
    pub fn current_state(&self) -> InitializationState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the engine if it is initialized.
    ///
    /// # Errors
    ///
    /// Returns [`HolderKitError::NotInitialized`] otherwise.
    pub fn handle(&self) -> Result<EngineHandle, HolderKitError> {
        match self.current_state() {
            InitializationState::Initialized(handle) => Ok(handle),
            InitializationState::NotInitialized
            | InitializationState::Initializing
            | InitializationState::Failed(_) => Err(HolderKitError::NotInitialized),
        }
    }

    /// Whether the engine is ready.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.current_state().is_initialized()
    }

    /// Drops the engine (or the recorded failure) so `initialize` can run again.
    ///
    /// Waits for a running initialization to finish first. An initialized
    /// engine is shut down before it is dropped.
    ///
    /// # Errors
    ///
    /// [`HolderKitError::Engine`] if the engine failed to shut down. The
    /// lifecycle is reset regardless.
    pub async fn reset(&self) -> Result<(), HolderKitError> {
        let _gate = self.gate.lock().await;
        let previous = self.current_state();
        self.set_state(InitializationState::NotInitialized);
        tracing::info!("engine lifecycle reset");

        if let InitializationState::Initialized(engine) = previous {
            tokio::task::spawn_blocking(move || engine.shutdown())
                .await?
                .map_err(|e| {
                    tracing::warn!(error = %e, "engine shutdown failed");
                    HolderKitError::engine("engine shutdown", e)
                })?;
        }
        Ok(())
    }

    fn set_state(&self, state: InitializationState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory::{EngineCall, MemoryEngine, MemoryEngineFactory};
    use crate::engine::EngineError;

    fn config() -> HolderConfig {
        let root = std::env::temp_dir().join(format!("holderkit-lifecycle-{}", uuid::Uuid::new_v4()));
        HolderConfig::new(
            "lic-123",
            "https://org.example",
            root.join("no_backup"),
            root.join("cache"),
        )
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let factory = Arc::new(MemoryEngineFactory::new(Arc::new(MemoryEngine::new())));
        let lifecycle = EngineLifecycle::new(factory.clone());
        let config = config();

        let first = lifecycle.initialize(&config).await.expect("initialize");
        let second = lifecycle.initialize(&config).await.expect("initialize again");

        assert!(first.ptr_eq(&second));
        assert_eq!(factory.constructions(), 1);
        assert!(lifecycle.is_initialized());
        assert!(lifecycle.handle().expect("handle").ptr_eq(&first));
    }

    #[tokio::test]
    async fn test_invalid_config_never_constructs() {
        let factory = Arc::new(MemoryEngineFactory::new(Arc::new(MemoryEngine::new())));
        let lifecycle = EngineLifecycle::new(factory.clone());
        let mut config = config();
        config.license_key = String::new();

        let err = lifecycle.initialize(&config).await.unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(factory.constructions(), 0);
        assert!(matches!(
            lifecycle.current_state(),
            InitializationState::Failed(HolderKitError::Configuration { .. })
        ));
    }

    #[tokio::test]
    async fn test_failure_is_sticky_until_reset() {
        let factory = Arc::new(
            MemoryEngineFactory::new(Arc::new(MemoryEngine::new()))
                .failing(EngineError::failure("keystore unavailable")),
        );
        let lifecycle = EngineLifecycle::new(factory.clone());
        let config = config();

        let first = lifecycle.initialize(&config).await.unwrap_err();
        let second = lifecycle.initialize(&config).await.unwrap_err();
        assert_eq!(first, second);
        assert_eq!(factory.constructions(), 1);
        assert_eq!(lifecycle.handle().unwrap_err(), HolderKitError::NotInitialized);

        lifecycle.reset().await.unwrap();
        assert!(matches!(
            lifecycle.current_state(),
            InitializationState::NotInitialized
        ));
        let _ = lifecycle.initialize(&config).await;
        assert_eq!(factory.constructions(), 2);
    }

    #[tokio::test]
    async fn test_reset_shuts_engine_down() {
        let engine = Arc::new(MemoryEngine::new());
        let factory = Arc::new(MemoryEngineFactory::new(Arc::clone(&engine)));
        let lifecycle = EngineLifecycle::new(factory);
        let config = config();

        lifecycle.initialize(&config).await.expect("initialize");
        lifecycle.reset().await.expect("reset");
        assert_eq!(engine.calls(), vec![EngineCall::Shutdown]);
        assert!(!lifecycle.is_initialized());

        // nothing to shut down without an engine
        lifecycle.reset().await.expect("reset again");
        assert_eq!(engine.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_failure_still_resets() {
        let engine = Arc::new(MemoryEngine::new());
        engine.fail_next_shutdown(EngineError::failure("transport busy"));
        let factory = Arc::new(MemoryEngineFactory::new(Arc::clone(&engine)));
        let lifecycle = EngineLifecycle::new(factory.clone());
        let config = config();

        lifecycle.initialize(&config).await.expect("initialize");
        let err = lifecycle.reset().await.unwrap_err();
        assert!(matches!(err, HolderKitError::Engine { ref context, .. } if context == "engine shutdown"));
        assert!(matches!(
            lifecycle.current_state(),
            InitializationState::NotInitialized
        ));

        lifecycle.initialize(&config).await.expect("initialize after reset");
        assert_eq!(factory.constructions(), 2);
    }

    #[tokio::test]
    async fn test_storage_dirs_created_and_passed_to_factory() {
        let factory = Arc::new(MemoryEngineFactory::new(Arc::new(MemoryEngine::new())));
        let lifecycle = EngineLifecycle::new(factory.clone());
        let config = config();

        lifecycle.initialize(&config).await.expect("initialize");

        let paths = factory.last_paths().expect("paths handed to factory");
        assert_eq!(paths, EnginePaths::from_config(&config));
        assert!(paths.storage_dir().is_dir());
        assert!(paths.cache_dir().is_dir());
    }
}
