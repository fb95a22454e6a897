//! Presentation sessions over proximity, remote and browser-mediated channels.
//!
//! All channels share one state machine core, [`PresentationSession`]:
//! listener registration, request matching, approve/deny and teardown. A
//! [`Channel`] supplies its own state enum, how to start and stop the engine
//! transport, and how transport events move its state.

use std::collections::BTreeMap;

use crate::engine::{
    CredentialEngine, EngineError, HolderDocument, RequestedDocument, ResultPayload,
};

mod browser;
pub use browser::{BrowserMediated, BrowserOutcome, BrowserSession, BrowserState};

mod proximity;
pub use proximity::{Proximity, ProximitySession, ProximityState};

mod remote;
pub use remote::{Remote, RemoteSession, RemoteState};

mod session;
pub use session::PresentationSession;

/// A requested document matched to the holder document that answers it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedDocument {
    /// What the verifier asked for.
    pub requested: RequestedDocument,
    /// The stored document.
    pub document: HolderDocument,
}

/// A verifier request as shown to the holder.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PresentationRequest {
    /// Verifier common name, when it could be read.
    pub verifier_name: Option<String>,
    /// Matched documents keyed by holder document id. Requested documents
    /// the holder does not have are not listed.
    pub documents: BTreeMap<String, MatchedDocument>,
}

impl PresentationRequest {
    /// Ids of the matched documents, the usual argument to `approve`.
    #[must_use]
    pub fn document_ids(&self) -> Vec<String> {
        self.documents.keys().cloned().collect()
    }
}

/// Why a session ended in its error state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFailure {
    /// Message for the holder.
    pub message: String,
    /// Result payload to hand back to a browser-mediated caller.
    pub result_payload: Option<ResultPayload>,
}

impl SessionFailure {
    /// A failure without payload.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            result_payload: None,
        }
    }

    fn from_engine(error: &EngineError) -> Self {
        let message = error.to_string();
        Self {
            message: if message.is_empty() {
                "Transfer failed".to_string()
            } else {
                message
            },
            result_payload: error.result_payload().cloned(),
        }
    }
}

/// Transport events that channels interpret themselves.
///
/// Request arrival and transfer errors are handled by the session core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Device engagement ready.
    QrEngagementReady {
        /// Engagement content.
        content: String,
    },
    /// Verifier connecting.
    Connecting,
    /// Verifier connected.
    Connected,
    /// Response delivered.
    ResponseSent,
    /// Verifier redirect.
    Redirect {
        /// Redirect target.
        uri: String,
    },
    /// Transport disconnected.
    Disconnected,
    /// Browser-mediated result ready.
    IntentToSend(ResultPayload),
}

/// What a channel event does to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition<S> {
    /// Move to the state.
    Enter(S),
    /// Release the transport and the listener, then show the state.
    Close(S),
    /// Release the transport and the listener and go back to idle.
    Release,
    /// Nothing to do on this channel.
    Ignore,
}

/// Channel-specific part of a presentation session.
pub trait Channel: Send + Sync + 'static {
    /// What `start` needs from the caller.
    type Input: Send + 'static;
    /// The channel's state enum.
    type State: Clone + std::fmt::Debug + Send + Sync + 'static;

    /// Channel name for logs.
    const NAME: &'static str;

    /// The state a session starts from and returns to.
    fn idle() -> Self::State;

    /// Whether `state` is the idle state.
    fn is_idle(state: &Self::State) -> bool;

    /// The state entered by `start`.
    fn starting() -> Self::State;

    /// The state showing a pending request.
    fn request_received(request: PresentationRequest) -> Self::State;

    /// The state while the response is generated and sent.
    fn sending_response() -> Self::State;

    /// The error state.
    fn failed(failure: SessionFailure) -> Self::State;

    /// The state after the holder denied. Defaults to idle.
    fn denied() -> Self::State {
        Self::idle()
    }

    /// Starts the engine transport.
    ///
    /// # Errors
    ///
    /// Returns the engine failure.
    fn start(engine: &dyn CredentialEngine, input: Self::Input) -> Result<(), EngineError>;

    /// Stops the engine transport.
    ///
    /// # Errors
    ///
    /// Returns the engine failure.
    fn stop(engine: &dyn CredentialEngine) -> Result<(), EngineError>;

    /// Maps a transport event to a transition.
    fn on_event(event: ChannelEvent) -> Transition<Self::State>;
}
