use thiserror::Error;

use crate::engine::EngineError;

/// Error outputs from `HolderKit`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "ffi", derive(uniffi::Error))]
#[cfg_attr(feature = "ffi", uniffi(flat_error))]
pub enum HolderKitError {
    /// A required configuration value is missing or malformed. The engine
    /// cannot be initialized until the configuration is fixed.
    #[error("configuration_error: {attribute}: {reason}")]
    Configuration {
        /// The configuration attribute that failed validation.
        attribute: String,
        /// Why the attribute was rejected.
        reason: String,
    },
    /// An operation needed the engine before `initialize` succeeded.
    #[error("not_initialized")]
    NotInitialized,
    /// The credential engine reported a failure.
    #[error("engine_error: {context}: {source}")]
    Engine {
        /// What the orchestrator was doing when the engine failed.
        context: String,
        /// The failure reported by the engine.
        source: EngineError,
    },
    /// A presentation transfer failed. The session is terminal.
    #[error("transfer_error: {message}")]
    Transfer {
        /// Human readable description of the failure.
        message: String,
    },
    /// `approve` was called while no request was pending.
    #[error("no_active_request")]
    NoActiveRequest,
    /// An authorization redirect arrived but the issuance session it belonged
    /// to no longer exists. Issuance must restart from offer resolution.
    #[error("resume_lost")]
    ResumeLost,
    /// The presented input is not valid for the requested operation.
    #[error("invalid_input_{attribute}: {reason}")]
    InvalidInput {
        /// The input that was rejected.
        attribute: String,
        /// Why the input was rejected.
        reason: String,
    },
    /// No holder document exists with the given id.
    #[error("document_not_found: {document_id}")]
    DocumentNotFound {
        /// The id that was looked up.
        document_id: String,
    },
    /// Local storage (paths, flow state) failed.
    #[error("storage_error: {error}")]
    Storage {
        /// Description of the storage failure.
        error: String,
    },
}

impl HolderKitError {
    /// Wraps an engine failure with the operation that triggered it.
    #[must_use]
    pub fn engine(context: impl Into<String>, source: EngineError) -> Self {
        Self::Engine {
            context: context.into(),
            source,
        }
    }

    /// Builds a configuration error for `attribute`.
    #[must_use]
    pub fn configuration(attribute: &str, reason: impl Into<String>) -> Self {
        Self::Configuration {
            attribute: attribute.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error can only be cleared by fixing the configuration.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}

impl From<std::io::Error> for HolderKitError {
    fn from(error: std::io::Error) -> Self {
        Self::Storage {
            error: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for HolderKitError {
    fn from(error: serde_json::Error) -> Self {
        Self::InvalidInput {
            attribute: "json".to_string(),
            reason: error.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for HolderKitError {
    fn from(error: tokio::task::JoinError) -> Self {
        Self::engine(
            "background task",
            EngineError::failure(format!("worker did not complete: {error}")),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_display_keeps_context() {
        let error = HolderKitError::engine(
            "resolve offer",
            EngineError::failure("issuer unreachable"),
        );
        assert_eq!(
            error.to_string(),
            "engine_error: resolve offer: issuer unreachable"
        );
    }

    #[test]
    fn test_configuration_flag() {
        let error = HolderKitError::configuration("license_key", "blank");
        assert!(error.is_configuration());
        assert!(!HolderKitError::NotInitialized.is_configuration());
    }
}
