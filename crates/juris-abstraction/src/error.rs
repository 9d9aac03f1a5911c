//! Error taxonomy shared by every collaborator of the analysis engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tier::Tier;

/// How the retry orchestrator should react to a failed model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient failure: back off and retry at the same tier.
    Retryable,
    /// The request itself is wrong; retrying cannot help.
    Fatal,
    /// The tier has no capacity left; move to a cheaper tier if one exists.
    TierExhausted,
}

/// Represents an error returned by a model executor.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelError {
    /// Provider rejected the call because of request rate.
    #[error("Rate limited{}", .retry_after_secs.map(|s| format!(" (retry after {}s)", s)).unwrap_or_default())]
    RateLimited {
        /// Provider-suggested wait, when the response carried one.
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_after_secs: Option<u64>,
    },

    /// The call did not complete within the client timeout.
    #[error("Model call timed out after {0}ms")]
    Timeout(u64),

    /// The provider failed internally (HTTP 5xx or equivalent).
    #[error("Model server error ({status}): {message}")]
    Server {
        /// Status code reported by the provider.
        status: u16,
        /// Body or reason reported by the provider.
        message: String,
    },

    /// Connection-level failure before a response was received.
    #[error("Network error: {0}")]
    Network(String),

    /// The provider answered, but the body could not be understood.
    #[error("Invalid model response: {0}")]
    InvalidResponse(String),

    /// Malformed request (HTTP 4xx other than auth/quota/rate limit).
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Credentials were missing or rejected.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The quota for a tier is exhausted.
    #[error("Quota exhausted for tier '{tier}'{}", .message.as_ref().map(|m| format!(": {}", m)).unwrap_or_default())]
    QuotaExhausted {
        /// The tier whose quota ran out.
        tier: Tier,
        /// Optional message from the provider.
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl ModelError {
    /// Classifies this error for the retry state machine.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::RateLimited { .. }
            | Self::Timeout(_)
            | Self::Server { .. }
            | Self::Network(_)
            | Self::InvalidResponse(_) => ErrorClass::Retryable,
            Self::BadRequest(_) | Self::Unauthorized(_) => ErrorClass::Fatal,
            Self::QuotaExhausted { .. } => ErrorClass::TierExhausted,
        }
    }

    /// Whether a later call with the same input may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.class(), ErrorClass::Retryable)
    }
}

/// Error raised by a shared store (key-value, job persistence, document source).
///
/// Store failures are fatal for the current request: the engine fails closed
/// instead of computing without cache or lock protection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store could not be reached or failed the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The requested record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A stored record violates an expected invariant.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
