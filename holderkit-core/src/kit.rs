//! The top-level context a host application keeps for its lifetime.

use std::sync::Arc;

use crate::config::HolderConfig;
use crate::documents::DocumentCatalog;
use crate::engine::{EngineFactory, EngineHandle};
use crate::error::HolderKitError;
use crate::flow_store::{FileFlowStateStore, FlowStateStore};
use crate::issuance::{DefaultIssuancePolicy, IssuanceCoordinator, IssuanceFlow, IssuancePolicy};
use crate::lifecycle::{EngineLifecycle, InitializationState};
use crate::paths::EnginePaths;
use crate::presentation::{BrowserSession, ProximitySession, RemoteSession};
use crate::trigger::ExternalTrigger;

/// Owns the engine lifecycle and the issuance coordinator, and hands out
/// sessions bound to the initialized engine.
///
/// ```rust
/// use std::sync::Arc;
/// use holderkit_core::engine::memory::{MemoryEngine, MemoryEngineFactory};
/// use holderkit_core::presentation::ProximityState;
/// use holderkit_core::{HolderConfig, HolderKit};
///
/// # tokio_test::block_on(async {
/// let root = std::env::temp_dir().join(format!("holderkit-doc-{}", std::process::id()));
/// let factory = MemoryEngineFactory::new(Arc::new(MemoryEngine::new()));
/// let config = HolderConfig::new("license", "https://org.example", root.join("data"), root.join("cache"));
/// let kit = HolderKit::new(config, Arc::new(factory));
/// kit.initialize().await.unwrap();
///
/// let session = kit.proximity_session().unwrap();
/// session.start(()).await.unwrap();
/// assert_eq!(session.state(), ProximityState::Initializing);
/// # let _ = std::fs::remove_dir_all(root);
/// # })
/// ```
#[derive(Debug)]
pub struct HolderKit {
    config: HolderConfig,
    lifecycle: Arc<EngineLifecycle>,
    coordinator: Arc<IssuanceCoordinator>,
}

impl HolderKit {
    /// Creates the context. The engine is not built until [`HolderKit::initialize`].
    #[must_use]
    pub fn new(config: HolderConfig, factory: Arc<dyn EngineFactory>) -> Self {
        let lifecycle = Arc::new(EngineLifecycle::new(factory));
        Self {
            config,
            coordinator: Arc::new(IssuanceCoordinator::new(Arc::clone(&lifecycle))),
            lifecycle,
        }
    }

    /// The configuration the engine is built from.
    #[must_use]
    pub const fn config(&self) -> &HolderConfig {
        &self.config
    }

    /// Initializes the engine, or returns the existing one.
    ///
    /// # Errors
    ///
    /// See [`EngineLifecycle::initialize`].
    pub async fn initialize(&self) -> Result<EngineHandle, HolderKitError> {
        self.lifecycle.initialize(&self.config).await
    }

    /// Where the engine is in its lifecycle.
    #[must_use]
    pub fn state(&self) -> InitializationState {
        self.lifecycle.current_state()
    }

    /// Forgets the engine or a recorded failure so `initialize` can run again.
    ///
    /// A live issuance session is abandoned with the engine.
    ///
    /// # Errors
    ///
    /// See [`EngineLifecycle::reset`].
    pub async fn reset(&self) -> Result<(), HolderKitError> {
        self.coordinator.abandon();
        self.lifecycle.reset().await
    }

    /// The shared issuance coordinator.
    #[must_use]
    pub fn coordinator(&self) -> Arc<IssuanceCoordinator> {
        Arc::clone(&self.coordinator)
    }

    /// An issuance flow persisting to `flow_state.json` under the storage
    /// directory, with the default issuance policy for this configuration's
    /// key creation settings.
    #[must_use]
    pub fn issuance_flow(&self) -> IssuanceFlow {
        let paths = EnginePaths::from_config(&self.config);
        self.issuance_flow_with(
            Arc::new(FileFlowStateStore::new(paths.flow_state_path())),
            Arc::new(DefaultIssuancePolicy::from_config(&self.config)),
        )
    }

    /// An issuance flow with a custom store and policy.
    #[must_use]
    pub fn issuance_flow_with(
        &self,
        store: Arc<dyn FlowStateStore>,
        policy: Arc<dyn IssuancePolicy>,
    ) -> IssuanceFlow {
        IssuanceFlow::new(self.coordinator(), store, policy)
    }

    /// A new proximity session.
    ///
    /// # Errors
    ///
    /// [`HolderKitError::NotInitialized`] before the engine is initialized.
    pub fn proximity_session(&self) -> Result<ProximitySession, HolderKitError> {
        Ok(ProximitySession::new(self.lifecycle.handle()?))
    }

    /// A new remote session.
    ///
    /// # Errors
    ///
    /// [`HolderKitError::NotInitialized`] before the engine is initialized.
    pub fn remote_session(&self) -> Result<RemoteSession, HolderKitError> {
        Ok(RemoteSession::new(self.lifecycle.handle()?))
    }

    /// A new browser-mediated session.
    ///
    /// # Errors
    ///
    /// - [`HolderKitError::Configuration`] if browser-mediated requests are
    ///   disabled by `browser_mediated_enabled`.
    /// - [`HolderKitError::NotInitialized`] before the engine is initialized.
    pub fn browser_session(&self) -> Result<BrowserSession, HolderKitError> {
        if !self.config.browser_mediated_enabled {
            return Err(HolderKitError::configuration(
                "browser_mediated_enabled",
                "Browser-mediated requests are disabled",
            ));
        }
        Ok(BrowserSession::new(self.lifecycle.handle()?))
    }

    /// Classifies a platform intent against this configuration.
    ///
    /// See [`ExternalTrigger::from_action`].
    #[must_use]
    pub fn trigger_for_action(&self, action: &str, payload: Vec<u8>) -> Option<ExternalTrigger> {
        ExternalTrigger::from_action(&self.config, action, payload)
    }

    /// The document catalog.
    ///
    /// # Errors
    ///
    /// [`HolderKitError::NotInitialized`] before the engine is initialized.
    pub fn documents(&self) -> Result<DocumentCatalog, HolderKitError> {
        Ok(DocumentCatalog::new(self.lifecycle.handle()?))
    }
}
