use std::time::{Duration, Instant};
use tube_core::ResilienceEvent;

/// Events emitted by the retry executor (§4.3).
#[derive(Debug, Clone)]
pub enum RetryEvent {
    /// A retry attempt is about to be made after `delay`.
    Retry {
        pattern_name: String,
        timestamp: Instant,
        attempt: usize,
        delay: Duration,
    },
    /// The operation succeeded, on the first attempt or after retries.
    Success {
        pattern_name: String,
        timestamp: Instant,
        attempts: usize,
    },
    /// All attempts were exhausted without success.
    Exhausted {
        pattern_name: String,
        timestamp: Instant,
        attempts: usize,
    },
    /// The error was classified non-retryable; no retry was attempted.
    NonRetryable {
        pattern_name: String,
        timestamp: Instant,
    },
}

impl ResilienceEvent for RetryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RetryEvent::Retry { .. } => "Retry",
            RetryEvent::Success { .. } => "Success",
            RetryEvent::Exhausted { .. } => "Exhausted",
            RetryEvent::NonRetryable { .. } => "NonRetryable",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RetryEvent::Retry { timestamp, .. }
            | RetryEvent::Success { timestamp, .. }
            | RetryEvent::Exhausted { timestamp, .. }
            | RetryEvent::NonRetryable { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            RetryEvent::Retry { pattern_name, .. }
            | RetryEvent::Success { pattern_name, .. }
            | RetryEvent::Exhausted { pattern_name, .. }
            | RetryEvent::NonRetryable { pattern_name, .. } => pattern_name,
        }
    }
}
