use super::{Channel, ChannelEvent, PresentationRequest, PresentationSession, SessionFailure, Transition};
use crate::engine::{CredentialEngine, EngineError};

/// State of a remote (`OpenID4VP`) presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteState {
    /// Nothing running.
    Idle,
    /// The engine is fetching and checking the request.
    ProcessingRequest,
    /// The request waits for the holder.
    RequestReceived(PresentationRequest),
    /// The response is being generated and sent.
    SendingResponse,
    /// The response was delivered.
    ResponseSent,
    /// The verifier asked to continue at `uri`.
    Redirect {
        /// Redirect target.
        uri: String,
    },
    /// The session failed.
    Error {
        /// Message for the holder.
        message: String,
    },
}

/// Remote channel: the request arrives as a URI.
#[derive(Debug, Clone, Copy)]
pub struct Remote;

/// A remote presentation session. `start` takes the request URI.
pub type RemoteSession = PresentationSession<Remote>;

impl Channel for Remote {
    type Input = String;
    type State = RemoteState;

    const NAME: &'static str = "remote";

    fn idle() -> RemoteState {
        RemoteState::Idle
    }

    fn is_idle(state: &RemoteState) -> bool {
        matches!(state, RemoteState::Idle)
    }

    fn starting() -> RemoteState {
        RemoteState::ProcessingRequest
    }

    fn request_received(request: PresentationRequest) -> RemoteState {
        RemoteState::RequestReceived(request)
    }

    fn sending_response() -> RemoteState {
        RemoteState::SendingResponse
    }

    fn failed(failure: SessionFailure) -> RemoteState {
        RemoteState::Error {
            message: failure.message,
        }
    }

    fn start(engine: &dyn CredentialEngine, request_uri: String) -> Result<(), EngineError> {
        engine.start_remote(&request_uri)
    }

    fn stop(engine: &dyn CredentialEngine) -> Result<(), EngineError> {
        engine.stop_remote()
    }

    fn on_event(event: ChannelEvent) -> Transition<RemoteState> {
        match event {
            ChannelEvent::ResponseSent => Transition::Enter(RemoteState::ResponseSent),
            ChannelEvent::Redirect { uri } => Transition::Enter(RemoteState::Redirect { uri }),
            ChannelEvent::Disconnected => Transition::Release,
            ChannelEvent::QrEngagementReady { .. }
            | ChannelEvent::Connecting
            | ChannelEvent::Connected
            | ChannelEvent::IntentToSend(_) => Transition::Ignore,
        }
    }
}
