use std::time::Duration;
use thiserror::Error;

/// Errors returned by the [`crate::CircuitBreaker`] service (§4.2).
#[derive(Debug, Error)]
pub enum CircuitBreakerError<E> {
    /// The circuit is open; the call was never attempted. Carries a hint of
    /// how long the caller should wait before trying again.
    #[error("circuit open, retry after {retry_after:?}")]
    Refused { retry_after: Duration },

    /// The inner call ran and failed. Only this variant increments the
    /// breaker's failure counter — `Refused` never does.
    #[error("inner call failed: {0}")]
    Failed(E),
}

impl<E> CircuitBreakerError<E> {
    pub fn is_refused(&self) -> bool {
        matches!(self, CircuitBreakerError::Refused { .. })
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            CircuitBreakerError::Failed(e) => Some(e),
            CircuitBreakerError::Refused { .. } => None,
        }
    }
}

impl<E> From<E> for CircuitBreakerError<E> {
    fn from(err: E) -> Self {
        CircuitBreakerError::Failed(err)
    }
}
