use std::fmt;
use std::sync::Arc;

use super::{
    CreateDocumentSettings, EngineError, KeyUnlockMap, OfferedDocument, ProcessedRequest,
    ResultPayload,
};

/// Continuation the engine blocks on until the holder supplies create settings.
pub type SettingsResume = Box<dyn FnOnce(CreateDocumentSettings) + Send>;

/// Continuation the engine blocks on until the holder supplies key unlock data.
pub type UnlockResume = Box<dyn FnOnce(KeyUnlockMap) + Send>;

/// Notifications emitted by a presentation transfer.
#[derive(Debug, Clone)]
pub enum TransferEvent {
    /// Device engagement is ready to be shown as a QR code.
    QrEngagementReady {
        /// The engagement content to render.
        content: String,
    },
    /// A verifier is connecting.
    Connecting,
    /// A verifier connected.
    Connected,
    /// A request arrived. Carries the processed request or the processing failure.
    RequestReceived(Result<Arc<dyn ProcessedRequest>, EngineError>),
    /// The response reached the verifier.
    ResponseSent,
    /// The verifier asked the holder to continue at `uri`.
    Redirect {
        /// Redirect target.
        uri: String,
    },
    /// The transport disconnected.
    Disconnected,
    /// The transfer failed.
    Error(EngineError),
    /// A browser-mediated response is ready to hand back to the caller.
    IntentToSend(ResultPayload),
}

/// Notifications emitted while issuing documents from an offer.
pub enum EngineIssueEvent {
    /// Issuance started for `total` documents.
    Started {
        /// Number of documents the engine will try to issue.
        total: usize,
    },
    /// The engine needs create settings before it can create keys.
    DocumentRequiresCreateSettings {
        /// The document being created.
        document: OfferedDocument,
        /// Must be invoked exactly once.
        resume: SettingsResume,
    },
    /// The engine needs user authentication for some document keys.
    DocumentRequiresUserAuth {
        /// The document being issued.
        document_id: String,
        /// Key aliases that require unlocking.
        keys: Vec<String>,
        /// Must be invoked exactly once.
        resume: UnlockResume,
    },
    /// A document was issued and stored.
    DocumentIssued {
        /// Id of the stored document.
        document_id: String,
    },
    /// Issuing one document failed. Issuance continues with the others.
    DocumentFailed {
        /// Id of the failed document.
        document_id: String,
        /// The failure.
        cause: EngineError,
    },
    /// The issuer deferred a document.
    DocumentDeferred {
        /// Id of the deferred document.
        document_id: String,
    },
    /// Issuance finished.
    Finished,
    /// Issuance failed as a whole.
    Failure(EngineError),
}

impl fmt::Debug for EngineIssueEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started { total } => f.debug_struct("Started").field("total", total).finish(),
            Self::DocumentRequiresCreateSettings { document, .. } => f
                .debug_struct("DocumentRequiresCreateSettings")
                .field("document", document)
                .finish_non_exhaustive(),
            Self::DocumentRequiresUserAuth {
                document_id, keys, ..
            } => f
                .debug_struct("DocumentRequiresUserAuth")
                .field("document_id", document_id)
                .field("keys", keys)
                .finish_non_exhaustive(),
            Self::DocumentIssued { document_id } => f
                .debug_struct("DocumentIssued")
                .field("document_id", document_id)
                .finish(),
            Self::DocumentFailed { document_id, cause } => f
                .debug_struct("DocumentFailed")
                .field("document_id", document_id)
                .field("cause", cause)
                .finish(),
            Self::DocumentDeferred { document_id } => f
                .debug_struct("DocumentDeferred")
                .field("document_id", document_id)
                .finish(),
            Self::Finished => f.write_str("Finished"),
            Self::Failure(cause) => f.debug_tuple("Failure").field(cause).finish(),
        }
    }
}
