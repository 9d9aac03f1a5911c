// Error types for the analysis engine

use juris_abstraction::{ModelError, StoreError};
use juris_store::{CacheConfigError, LockConfigError};
use thiserror::Error;

use crate::keys::KeyError;
use crate::retry::{RetryError, RetryTelemetry};

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Terminal failure of an analysis request.
///
/// Lock contention is not an error; see [`super::AnalysisOutcome::Busy`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// The case has nothing to key on
    #[error("Key derivation failed: {0}")]
    Key(#[from] KeyError),

    /// A shared store failed; the request fails closed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The model call failed after retries and fallback
    #[error("Model error: {error}")]
    Model {
        /// Final unrecovered error
        error: ModelError,
        /// Attempt telemetry
        telemetry: RetryTelemetry,
    },

    /// The caller cancelled the request
    #[error("Analysis cancelled")]
    Cancelled,

    /// The engine was built with invalid settings
    #[error("Invalid engine configuration: {0}")]
    Config(String),
}

impl EngineError {
    /// Whether the same request may succeed later.
    ///
    /// Store outages and transient model failures are retryable; bad input,
    /// authorization and configuration problems are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Store(StoreError::Unavailable(_)) | EngineError::Cancelled => true,
            EngineError::Model { error, .. } => error.is_retryable(),
            EngineError::Key(_) | EngineError::Store(_) | EngineError::Config(_) => false,
        }
    }

    /// Human-readable reason for the caller.
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

impl From<RetryError> for EngineError {
    fn from(err: RetryError) -> Self {
        match err {
            RetryError::Exhausted { error, telemetry } => EngineError::Model { error, telemetry },
            RetryError::Cancelled { .. } => EngineError::Cancelled,
        }
    }
}

impl From<CacheConfigError> for EngineError {
    fn from(err: CacheConfigError) -> Self {
        EngineError::Config(format!("cache: {}", err))
    }
}

impl From<LockConfigError> for EngineError {
    fn from(err: LockConfigError) -> Self {
        EngineError::Config(format!("lock: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_flag() {
        let rate_limited = EngineError::Model {
            error: ModelError::RateLimited { retry_after_secs: Some(5) },
            telemetry: RetryTelemetry::default(),
        };
        assert!(rate_limited.is_retryable());

        let unauthorized = EngineError::Model {
            error: ModelError::Unauthorized("bad key".to_string()),
            telemetry: RetryTelemetry::default(),
        };
        assert!(!unauthorized.is_retryable());

        assert!(EngineError::Store(StoreError::Unavailable("down".to_string())).is_retryable());
        assert!(!EngineError::Store(StoreError::NotFound("case-9".to_string())).is_retryable());
        assert!(!EngineError::Key(KeyError::EmptyDocumentSet).is_retryable());
    }

    #[test]
    fn test_retry_error_conversion() {
        let err: EngineError = RetryError::Cancelled { telemetry: RetryTelemetry::default() }.into();
        assert!(matches!(err, EngineError::Cancelled));
        assert_eq!(err.reason(), "Analysis cancelled");
    }
}
