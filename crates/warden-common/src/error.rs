//! Common error types for Warden components.

use thiserror::Error;

use crate::types::UnknownReason;

/// Common errors across Warden components
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WardenError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Candidate or request failed a local rule
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Remote call exceeded its deadline
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Transport-level failure (connect, reset, DNS)
    #[error("Network error: {0}")]
    Network(String),

    /// Connectivity monitor reports no network
    #[error("Network is offline")]
    Offline,

    /// Provider answered 429
    #[error("Rate limited by provider (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Provider declared itself unavailable (5xx)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Provider refused the request (4xx other than 429)
    #[error("Request rejected with status {status}")]
    Rejected { status: u16 },

    /// Provider answered with a body we cannot parse
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Circuit breaker refused the call
    #[error("Circuit open, retry in {retry_in_ms}ms")]
    CircuitOpen { retry_in_ms: u64 },

    /// A recent failure for the same candidate is still cached
    #[error("Recent failure for this candidate is still cached")]
    RecentlyFailed,

    /// Caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl WardenError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Config(_) => 500,
            Self::InvalidInput(_) => 400,
            Self::Timeout(_) => 504,
            Self::Network(_) => 502,
            Self::Offline => 503,
            Self::RateLimited { .. } => 429,
            Self::ServiceUnavailable(_) => 503,
            Self::Rejected { .. } => 502,
            Self::MalformedResponse(_) => 502,
            Self::CircuitOpen { .. } => 503,
            Self::RecentlyFailed => 503,
            Self::Cancelled => 499,
            Self::Internal(_) => 500,
        }
    }

    /// Returns true if this error should be retried
    ///
    /// Rate limiting is deliberately absent: a 429 trips the breaker instead.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_)
                | Self::Network(_)
                | Self::Offline
                | Self::ServiceUnavailable(_)
                | Self::CircuitOpen { .. }
                | Self::RecentlyFailed
        )
    }

    /// The reason surfaced in an `Unknown` verdict when this error ends a check
    pub fn unknown_reason(&self) -> UnknownReason {
        match self {
            Self::InvalidInput(_) => UnknownReason::NotChecked,
            Self::Cancelled => UnknownReason::Cancelled,
            Self::RateLimited { .. } => UnknownReason::RateLimited,
            _ => UnknownReason::ServiceUnavailable,
        }
    }
}
