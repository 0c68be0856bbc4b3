//! The error taxonomy shared across the cache front-end.
//!
//! Every component-local error type (breaker, retry, gateway) eventually maps
//! into one of these kinds at the boundary it crosses into the coordinator or
//! the read API. Conversions are explicit rather than blanket `From` impls so
//! it stays visible which component a failure originated in.

use thiserror::Error;

/// A distinguishable failure kind, stable across the whole read path.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// Network-level failure talking to the upstream (connect, read, DNS, ...).
    #[error("upstream transport error: {0}")]
    TransportError(String),

    /// The upstream replied with a retryable status (408, 429, 5xx).
    #[error("upstream returned retryable status {status}")]
    UpstreamRetryableStatus {
        status: u16,
        retry_after: Option<std::time::Duration>,
    },

    /// The upstream replied with a non-retryable 4xx status other than 408/429.
    #[error("upstream returned non-retryable status {status}")]
    UpstreamFatalStatus { status: u16 },

    /// The circuit breaker refused the call without attempting it.
    #[error("circuit breaker open, retry after {retry_after:?}")]
    CircuitRefused { retry_after: std::time::Duration },

    /// The retry executor exhausted its attempt budget.
    #[error("retries exhausted after {attempts} attempt(s): {last_cause}")]
    RetriesExhausted { attempts: usize, last_cause: String },

    /// No snapshot exists anywhere in the cluster and upstream cannot be reached.
    #[error("no data available")]
    Unavailable,

    /// A request was malformed (invalid date range, unknown field, ...).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A requested line id is unknown.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller's deadline elapsed before a reply was produced.
    #[error("request timed out")]
    Timeout,
}

impl CoreError {
    /// True for the kinds that should be recorded as a circuit-breaker failure.
    ///
    /// `CircuitRefused` is explicitly excluded: the breaker only counts calls
    /// it actually let through.
    pub fn counts_as_breaker_failure(&self) -> bool {
        !matches!(self, CoreError::CircuitRefused { .. })
    }

    /// True for the kinds C3 should retry, given no upstream-specific context.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::TransportError(_) | CoreError::UpstreamRetryableStatus { .. }
        )
    }
}
