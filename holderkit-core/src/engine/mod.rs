//! The seam to the external credential engine.
//!
//! The engine owns credential formats, proof generation, transport security
//! and document storage. Everything in this crate talks to it through the
//! traits below, implemented by the host platform (or by [`memory`] in tests).

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::config::HolderConfig;
use crate::paths::EnginePaths;

mod error;
pub use error::*;

mod events;
pub use events::*;

mod types;
pub use types::*;

pub mod memory;

/// Callback handed to [`IssuanceManager::resolve_document_offer`]. Called once.
pub type OfferCallback = Box<dyn FnOnce(Result<CredentialOffer, EngineError>) + Send>;

/// Constructs the engine. Called at most once per successful initialization.
pub trait EngineFactory: Send + Sync {
    /// Builds an engine for `config`, storing its data under `paths`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be constructed.
    fn create(
        &self,
        config: &HolderConfig,
        paths: &EnginePaths,
    ) -> Result<Arc<dyn CredentialEngine>, EngineError>;
}

/// The initialized credential engine.
pub trait CredentialEngine: Send + Sync {
    /// Creates a manager for offer resolution and issuance.
    ///
    /// # Errors
    ///
    /// Returns an error if issuance is not available.
    fn create_issuance_manager(&self) -> Result<Arc<dyn IssuanceManager>, EngineError>;

    /// Starts proximity engagement.
    ///
    /// # Errors
    ///
    /// Returns an error if the radio transport cannot be started.
    fn start_proximity(&self) -> Result<(), EngineError>;

    /// Starts a remote presentation for `request_uri`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be processed.
    fn start_remote(&self, request_uri: &str) -> Result<(), EngineError>;

    /// Starts a browser-mediated presentation.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be processed.
    fn start_browser_mediated(&self, request: &BrowserRequest) -> Result<(), EngineError>;

    /// Stops proximity engagement and releases the transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport reports a failure while stopping.
    fn stop_proximity(&self) -> Result<(), EngineError>;

    /// Stops the remote presentation.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport reports a failure while stopping.
    fn stop_remote(&self) -> Result<(), EngineError>;

    /// Stops the browser-mediated presentation.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport reports a failure while stopping.
    fn stop_browser_mediated(&self) -> Result<(), EngineError>;

    /// Registers a transfer listener.
    fn add_transfer_listener(&self, listener: Arc<dyn TransferListener>);

    /// Removes one listener, compared by identity.
    fn remove_transfer_listener(&self, listener: &Arc<dyn TransferListener>);

    /// Removes every registered listener.
    fn remove_all_transfer_listeners(&self);

    /// Sends a generated response over the active transfer.
    ///
    /// # Errors
    ///
    /// Returns an error if the response cannot be delivered.
    fn send_response(&self, response: EngineResponse) -> Result<(), EngineError>;

    /// All stored documents.
    fn documents(&self) -> Vec<HolderDocument>;

    /// Looks up one stored document.
    fn get_document_by_id(&self, document_id: &str) -> Option<HolderDocument>;

    /// Deletes one stored document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be deleted.
    fn delete_document_by_id(&self, document_id: &str) -> Result<(), EngineError>;

    /// Releases transports and listeners before the engine is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if a resource could not be released.
    fn shutdown(&self) -> Result<(), EngineError> {
        self.remove_all_transfer_listeners();
        Ok(())
    }
}

/// Offer resolution and issuance.
pub trait IssuanceManager: Send + Sync {
    /// Resolves `offer_uri` and calls `callback` once with the result.
    fn resolve_document_offer(&self, offer_uri: &str, callback: OfferCallback);

    /// Issues the documents of `offer`, reporting progress to `listener`.
    ///
    /// # Arguments
    ///
    /// * `offer` - A credential offer returned by `resolve_document_offer`.
    /// * `tx_code` - The transaction code, when the offer requires one.
    /// * `listener` - Receives every issuance event, ending with a terminal one.
    ///
    /// Failures are reported through `listener`, not returned.
    fn issue_document_by_offer(
        &self,
        offer: CredentialOffer,
        tx_code: Option<String>,
        listener: Arc<dyn IssueEventListener>,
    );

    /// Continues an issuance suspended for external authorization.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoSession`] when nothing waits for authorization.
    fn resume_with_authorization(&self, redirect_uri: &str) -> Result<(), EngineError>;
}

/// Receives transfer events. Called on the engine's own thread.
pub trait TransferListener: Send + Sync {
    /// Handles one event.
    fn on_transfer_event(&self, event: TransferEvent);
}

/// Receives issuance events. Called on the engine's own thread.
pub trait IssueEventListener: Send + Sync {
    /// Handles one event.
    fn on_issue_event(&self, event: EngineIssueEvent);
}

/// A verifier request after the engine parsed and authenticated it.
pub trait ProcessedRequest: Send + Sync + fmt::Debug {
    /// The documents the verifier asks for, matched to holder document ids.
    fn requested_documents(&self) -> Vec<RequestedDocument>;

    /// Common name of the verifier's certificate, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the reader authentication data cannot be read.
    fn reader_common_name(&self) -> Result<Option<String>, EngineError>;

    /// Produces the response for a disclosure decision.
    ///
    /// # Errors
    ///
    /// Returns an error if the response cannot be generated, for example when
    /// a disclosed document is no longer stored. The error may carry a result
    /// payload for the caller.
    fn generate_response(
        &self,
        disclosed: &DisclosedDocuments,
    ) -> Result<EngineResponse, EngineError>;
}

/// Shared handle to the initialized engine.
///
/// Cloning is cheap. Two handles are the same engine when [`EngineHandle::ptr_eq`]
/// holds.
#[derive(Clone)]
pub struct EngineHandle(Arc<dyn CredentialEngine>);

impl EngineHandle {
    /// Wraps an engine instance.
    #[must_use]
    pub fn new(engine: Arc<dyn CredentialEngine>) -> Self {
        Self(engine)
    }

    /// Whether both handles refer to the same engine instance.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for EngineHandle {
    type Target = dyn CredentialEngine;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EngineHandle")
            .field(&Arc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}
