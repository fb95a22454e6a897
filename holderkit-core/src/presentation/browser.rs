use super::{Channel, ChannelEvent, PresentationRequest, PresentationSession, SessionFailure, Transition};
use crate::engine::{BrowserRequest, CredentialEngine, EngineError, ResultPayload};

const CANCELLED: &str = "User cancelled the request";

/// State of a browser-mediated presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserState {
    /// Nothing running.
    Idle,
    /// The engine is checking the request.
    ProcessingRequest,
    /// The request waits for the holder.
    RequestReceived(PresentationRequest),
    /// The response is being generated.
    SendingResponse,
    /// The result is ready to be returned to the browser.
    ResponseReady(ResultPayload),
    /// The session failed or was cancelled.
    Error {
        /// Message for the holder.
        message: String,
        /// Payload to return to the browser, if the engine produced one.
        result_payload: Option<ResultPayload>,
    },
}

/// What the invoking browser receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserOutcome {
    /// No result yet.
    Pending,
    /// Return this payload as a success.
    Completed(ResultPayload),
    /// Return this payload as an error.
    Failed(ResultPayload),
    /// Return a cancellation.
    Cancelled,
}

impl BrowserState {
    /// The result to hand back to the browser for this state.
    #[must_use]
    pub fn outcome(&self) -> BrowserOutcome {
        match self {
            Self::ResponseReady(payload) => BrowserOutcome::Completed(payload.clone()),
            Self::Error {
                result_payload: Some(payload),
                ..
            } => BrowserOutcome::Failed(payload.clone()),
            Self::Error {
                result_payload: None,
                ..
            } => BrowserOutcome::Cancelled,
            Self::Idle
            | Self::ProcessingRequest
            | Self::RequestReceived(_)
            | Self::SendingResponse => BrowserOutcome::Pending,
        }
    }
}

/// Browser-mediated channel: the request comes from a platform intent.
#[derive(Debug, Clone, Copy)]
pub struct BrowserMediated;

/// A browser-mediated presentation session. `start` takes the intent request.
pub type BrowserSession = PresentationSession<BrowserMediated>;

impl Channel for BrowserMediated {
    type Input = BrowserRequest;
    type State = BrowserState;

    const NAME: &'static str = "browser";

    fn idle() -> BrowserState {
        BrowserState::Idle
    }

    fn is_idle(state: &BrowserState) -> bool {
        matches!(state, BrowserState::Idle)
    }

    fn starting() -> BrowserState {
        BrowserState::ProcessingRequest
    }

    fn request_received(request: PresentationRequest) -> BrowserState {
        BrowserState::RequestReceived(request)
    }

    fn sending_response() -> BrowserState {
        BrowserState::SendingResponse
    }

    fn failed(failure: SessionFailure) -> BrowserState {
        BrowserState::Error {
            message: failure.message,
            result_payload: failure.result_payload,
        }
    }

    fn denied() -> BrowserState {
        BrowserState::Error {
            message: CANCELLED.to_string(),
            result_payload: None,
        }
    }

    fn start(engine: &dyn CredentialEngine, request: BrowserRequest) -> Result<(), EngineError> {
        engine.start_browser_mediated(&request)
    }

    fn stop(engine: &dyn CredentialEngine) -> Result<(), EngineError> {
        engine.stop_browser_mediated()
    }

    fn on_event(event: ChannelEvent) -> Transition<BrowserState> {
        match event {
            ChannelEvent::IntentToSend(payload) => {
                Transition::Enter(BrowserState::ResponseReady(payload))
            }
            ChannelEvent::QrEngagementReady { .. }
            | ChannelEvent::Connecting
            | ChannelEvent::Connected
            | ChannelEvent::ResponseSent
            | ChannelEvent::Redirect { .. }
            | ChannelEvent::Disconnected => Transition::Ignore,
        }
    }
}
