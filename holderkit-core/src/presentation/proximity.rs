use super::{Channel, ChannelEvent, PresentationRequest, PresentationSession, SessionFailure, Transition};
use crate::engine::{CredentialEngine, EngineError};

/// State of a proximity (QR engagement) presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProximityState {
    /// Nothing running.
    Idle,
    /// Transport starting.
    Initializing,
    /// Engagement QR content ready to display.
    EngagementReady {
        /// QR content.
        content: String,
    },
    /// A reader is connecting.
    Connecting,
    /// A reader is connected.
    Connected,
    /// The reader's request waits for the holder.
    RequestReceived(PresentationRequest),
    /// The response is being generated and sent.
    SendingResponse,
    /// The response was delivered.
    ResponseSent,
    /// The reader went away. The transport is released.
    Disconnected,
    /// The session failed.
    Error {
        /// Message for the holder.
        message: String,
    },
}

/// Proximity channel: engagement over QR, transfer over the radio transport.
#[derive(Debug, Clone, Copy)]
pub struct Proximity;

/// A proximity presentation session.
pub type ProximitySession = PresentationSession<Proximity>;

impl Channel for Proximity {
    type Input = ();
    type State = ProximityState;

    const NAME: &'static str = "proximity";

    fn idle() -> ProximityState {
        ProximityState::Idle
    }

    fn is_idle(state: &ProximityState) -> bool {
        matches!(state, ProximityState::Idle)
    }

    fn starting() -> ProximityState {
        ProximityState::Initializing
    }

    fn request_received(request: PresentationRequest) -> ProximityState {
        ProximityState::RequestReceived(request)
    }

    fn sending_response() -> ProximityState {
        ProximityState::SendingResponse
    }

    fn failed(failure: SessionFailure) -> ProximityState {
        ProximityState::Error {
            message: failure.message,
        }
    }

    fn start(engine: &dyn CredentialEngine, (): ()) -> Result<(), EngineError> {
        engine.start_proximity()
    }

    fn stop(engine: &dyn CredentialEngine) -> Result<(), EngineError> {
        engine.stop_proximity()
    }

    fn on_event(event: ChannelEvent) -> Transition<ProximityState> {
        match event {
            ChannelEvent::QrEngagementReady { content } => {
                Transition::Enter(ProximityState::EngagementReady { content })
            }
            ChannelEvent::Connecting => Transition::Enter(ProximityState::Connecting),
            ChannelEvent::Connected => Transition::Enter(ProximityState::Connected),
            ChannelEvent::ResponseSent => Transition::Enter(ProximityState::ResponseSent),
            ChannelEvent::Disconnected => Transition::Close(ProximityState::Disconnected),
            ChannelEvent::Redirect { .. } | ChannelEvent::IntentToSend(_) => Transition::Ignore,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::engine::memory::{EngineCall, MemoryEngine};
    use crate::engine::{EngineHandle, TransferEvent};

    #[tokio::test]
    async fn test_engagement_to_disconnect() {
        let engine = Arc::new(MemoryEngine::new());
        let session = ProximitySession::new(EngineHandle::new(engine.clone()));
        session.start(()).await.unwrap();
        assert_eq!(session.state(), ProximityState::Initializing);

        engine.emit(TransferEvent::QrEngagementReady {
            content: "mdoc:owBjMS4w".to_string(),
        });
        assert_eq!(
            session.state(),
            ProximityState::EngagementReady {
                content: "mdoc:owBjMS4w".to_string()
            }
        );

        engine.emit(TransferEvent::Connecting);
        engine.emit(TransferEvent::Connected);
        assert_eq!(session.state(), ProximityState::Connected);

        engine.emit(TransferEvent::Disconnected);
        assert_eq!(session.state(), ProximityState::Disconnected);
        assert_eq!(engine.listener_count(), 0);
        assert_eq!(
            engine.calls(),
            vec![EngineCall::StartProximity, EngineCall::StopProximity]
        );

        // a second stop must not touch the transport again
        session.stop();
        assert_eq!(engine.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_start_failure_is_reported() {
        let engine = Arc::new(MemoryEngine::new());
        engine.fail_next_start(EngineError::failure("bluetooth off"));
        let session = ProximitySession::new(EngineHandle::new(engine.clone()));

        let err = session.start(()).await.unwrap_err();
        assert!(matches!(err, crate::error::HolderKitError::Engine { .. }));
        assert_eq!(
            session.state(),
            ProximityState::Error {
                message: "Failed to start presentation: bluetooth off".to_string()
            }
        );
    }

    #[test]
    fn test_redirect_is_ignored() {
        assert_eq!(
            Proximity::on_event(ChannelEvent::Redirect {
                uri: "https://verifier.example".to_string()
            }),
            Transition::Ignore
        );
    }
}
