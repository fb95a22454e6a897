use thiserror::Error;

use super::ResultPayload;

/// A failure reported by the credential engine.
///
/// Engine failures never travel through the event emission path as panics or
/// unwinds; the orchestrator converts them into typed terminal states at the
/// session or coordinator boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Generic engine failure.
    #[error("{message}")]
    Failure {
        /// Message reported by the engine.
        message: String,
    },
    /// Browser-mediated failure that carries a result payload meant for the
    /// invoking caller.
    #[error("{message}")]
    WithResultPayload {
        /// Message reported by the engine.
        message: String,
        /// The payload to hand back to the caller.
        payload: ResultPayload,
    },
    /// The engine had no issuance session to act on.
    #[error("no issuance session")]
    NoSession,
}

impl EngineError {
    /// Builds a generic failure.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
        }
    }

    /// The result payload carried by a browser-mediated failure, if any.
    #[must_use]
    pub const fn result_payload(&self) -> Option<&ResultPayload> {
        match self {
            Self::WithResultPayload { payload, .. } => Some(payload),
            Self::Failure { .. } | Self::NoSession => None,
        }
    }
}
