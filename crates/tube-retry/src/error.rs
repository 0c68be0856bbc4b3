use thiserror::Error;

/// Errors returned by the [`crate::Retry`] executor (§4.3, §7).
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The error was classified non-retryable; the inner call ran exactly
    /// once and its error is surfaced unwrapped.
    #[error("non-retryable error: {0}")]
    NonRetryable(E),

    /// Every attempt failed and the attempt budget is exhausted.
    #[error("retries exhausted after {attempts} attempt(s): {last_cause}")]
    Exhausted { last_cause: E, attempts: usize },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> usize {
        match self {
            RetryError::NonRetryable(_) => 1,
            RetryError::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn into_inner(self) -> E {
        match self {
            RetryError::NonRetryable(e) => e,
            RetryError::Exhausted { last_cause, .. } => last_cause,
        }
    }
}
