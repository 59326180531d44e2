//! Costwise error types

use std::time::Duration;

/// Costwise error types
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum CostwiseError {
    /// Request failed validation (bad parameters, empty input).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Caller exceeded its request budget.
    ///
    /// `retry_after` is populated when the limiter can compute a useful
    /// wait time; `None` otherwise.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// No model passed the availability filter, not even the healthy-only
    /// fallback scan. Routing cannot proceed.
    #[error("no healthy backend available")]
    NoHealthyBackend,

    /// A backend did not answer within its deadline.
    #[error("backend '{model}' timed out")]
    BackendTimeout { model: String },

    /// A backend answered with an error.
    #[error("backend '{model}' error: {message}")]
    BackendError { model: String, message: String },

    /// A cache tier failed. Never user-visible — the orchestrator logs
    /// these and treats the lookup as a miss.
    #[error("cache error: {0}")]
    Cache(String),

    /// Engine wiring or settings problem detected at build time.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Invariant violation inside the engine (lost waiter, poisoned lock).
    #[error("internal error: {0}")]
    Internal(String),
}

impl CostwiseError {
    /// Whether this error is transient and the dispatch may succeed on retry.
    ///
    /// Drives the batch dispatch retry loop: transient errors walk the
    /// fallback chain with backoff, permanent errors surface immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::BackendTimeout { .. } | Self::BackendError { .. } => true,
            Self::RateLimited { .. } => true,

            Self::InvalidRequest(_)
            | Self::NoHealthyBackend
            | Self::Cache(_)
            | Self::Configuration(_)
            | Self::Internal(_) => false,
        }
    }

    /// HTTP status the (out-of-crate) API layer should map this error to.
    ///
    /// Backend errors report 502 only after the fallback chain is
    /// exhausted — before that the orchestrator retries internally.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) => 400,
            Self::RateLimited { .. } => 429,
            Self::NoHealthyBackend => 503,
            Self::BackendTimeout { .. } | Self::BackendError { .. } => 502,
            Self::Cache(_) | Self::Configuration(_) | Self::Internal(_) => 500,
        }
    }

    /// For `RateLimited` errors, the suggested wait before retrying.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<serde_json::Error> for CostwiseError {
    fn from(err: serde_json::Error) -> Self {
        CostwiseError::Internal(err.to_string())
    }
}

/// Result type alias for costwise operations
pub type Result<T> = std::result::Result<T, CostwiseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_errors_are_transient() {
        assert!(
            CostwiseError::BackendTimeout { model: "m".into() }.is_transient()
        );
        assert!(
            CostwiseError::BackendError {
                model: "m".into(),
                message: "boom".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn validation_errors_are_permanent() {
        assert!(!CostwiseError::InvalidRequest("bad".into()).is_transient());
        assert!(!CostwiseError::NoHealthyBackend.is_transient());
    }

    #[test]
    fn status_mapping() {
        assert_eq!(CostwiseError::InvalidRequest("x".into()).http_status(), 400);
        assert_eq!(
            CostwiseError::RateLimited { retry_after: None }.http_status(),
            429
        );
        assert_eq!(CostwiseError::NoHealthyBackend.http_status(), 503);
        assert_eq!(
            CostwiseError::BackendError {
                model: "m".into(),
                message: "e".into()
            }
            .http_status(),
            502
        );
        assert_eq!(CostwiseError::Internal("x".into()).http_status(), 500);
    }
}
