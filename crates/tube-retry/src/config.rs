use crate::events::RetryEvent;
use std::sync::Arc;
use std::time::Duration;
use tube_core::{Clock, EventListeners, FnListener, SystemClock};

pub(crate) type RetryPredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;
pub(crate) type RetryAfterHint<E> = Arc<dyn Fn(&E) -> Option<Duration> + Send + Sync>;

/// Configuration for the retry executor (§4.3): base delay, max delay,
/// jitter fraction, max attempts, and a retryability predicate.
pub struct RetryConfig<E> {
    pub(crate) base_delay: Duration,
    pub(crate) max_delay: Duration,
    pub(crate) jitter: f64,
    pub(crate) max_attempts: usize,
    pub(crate) retryable: RetryPredicate<E>,
    pub(crate) retry_after_hint: RetryAfterHint<E>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) event_listeners: EventListeners<RetryEvent>,
    pub(crate) name: String,
}

/// `delay(n) = min(maxDelay, baseDelay * 2^(n-1))`, then jittered by a
/// uniformly random factor in `[1 - jitter, 1 + jitter]` (§4.3, P7).
///
/// `attempt` is 1-indexed: the delay computed *before* the second attempt.
pub(crate) fn backoff_delay(
    base_delay: Duration,
    max_delay: Duration,
    jitter: f64,
    attempt: usize,
    jitter_sample: f64,
) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31) as u32;
    let exponential = base_delay.saturating_mul(1u32.checked_shl(exponent).unwrap_or(u32::MAX));
    let capped = exponential.min(max_delay);

    let factor = 1.0 - jitter + jitter_sample * (2.0 * jitter);
    capped.mul_f64(factor.max(0.0))
}

impl<E> RetryConfig<E> {
    pub fn builder() -> RetryConfigBuilder<E> {
        RetryConfigBuilder::new()
    }
}

/// Builder for [`RetryConfig`]. Validates at `build()` time.
pub struct RetryConfigBuilder<E> {
    base_delay: Duration,
    max_delay: Duration,
    jitter: f64,
    max_attempts: usize,
    retryable: RetryPredicate<E>,
    retry_after_hint: RetryAfterHint<E>,
    clock: Arc<dyn Clock>,
    event_listeners: EventListeners<RetryEvent>,
    name: String,
}

impl<E> Default for RetryConfigBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> RetryConfigBuilder<E> {
    /// Creates a builder with spec defaults: base delay 1s, max delay 30s,
    /// jitter 0.25, 4 max attempts (1 initial + 3 retries), every error
    /// retryable, no retry-after hint.
    pub fn new() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: 0.25,
            max_attempts: 4,
            retryable: Arc::new(|_| true),
            retry_after_hint: Arc::new(|_| None),
            clock: Arc::new(SystemClock),
            event_listeners: EventListeners::new(),
            name: String::from("<unnamed>"),
        }
    }

    /// Sets the first backoff delay. Default: 1s.
    pub fn base_delay(mut self, d: Duration) -> Self {
        self.base_delay = d;
        self
    }

    /// Caps the backoff delay. Default: 30s.
    pub fn max_delay(mut self, d: Duration) -> Self {
        self.max_delay = d;
        self
    }

    /// Sets the jitter fraction applied to each computed delay. Default: 0.25.
    pub fn jitter(mut self, fraction: f64) -> Self {
        self.jitter = fraction;
        self
    }

    /// Sets the total number of attempts including the initial one.
    /// Default: 4 (initial + 3 retries).
    pub fn max_attempts(mut self, n: usize) -> Self {
        self.max_attempts = n;
        self
    }

    /// Sets the predicate classifying which errors should be retried.
    /// Default: every error is retryable.
    pub fn retryable<F>(mut self, f: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.retryable = Arc::new(f);
        self
    }

    /// Sets a function extracting an upstream-provided retry-after hint from
    /// an error (§4.3: a 429 retry-after larger than the computed backoff
    /// MUST override it). Default: no hint is ever present.
    pub fn retry_after_hint<F>(mut self, f: F) -> Self
    where
        F: Fn(&E) -> Option<Duration> + Send + Sync + 'static,
    {
        self.retry_after_hint = Arc::new(f);
        self
    }

    /// Injects the clock used to stamp retry events. Production code never
    /// needs this; tests use it for deterministic event timestamps.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Names this retry instance for observability.
    pub fn name<N: Into<String>>(mut self, n: N) -> Self {
        self.name = n.into();
        self
    }

    /// Registers a callback fired before each retry sleep.
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &RetryEvent| {
            if let RetryEvent::Retry { attempt, delay, .. } = event {
                f(*attempt, *delay);
            }
        }));
        self
    }

    /// Registers a callback fired when the call succeeds.
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &RetryEvent| {
            if let RetryEvent::Success { attempts, .. } = event {
                f(*attempts);
            }
        }));
        self
    }

    /// Registers a callback fired when attempts are exhausted.
    pub fn on_exhausted<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &RetryEvent| {
            if let RetryEvent::Exhausted { attempts, .. } = event {
                f(*attempts);
            }
        }));
        self
    }

    /// Builds the configuration. Panics if `max_attempts` is zero — a
    /// structurally invalid retry policy that could never make a call.
    pub fn build(self) -> crate::layer::RetryLayer<E> {
        assert!(
            self.max_attempts >= 1,
            "retry max_attempts must be at least 1"
        );

        let config = RetryConfig {
            base_delay: self.base_delay,
            max_delay: self.max_delay,
            jitter: self.jitter,
            max_attempts: self.max_attempts,
            retryable: self.retryable,
            retry_after_hint: self.retry_after_hint,
            clock: self.clock,
            event_listeners: self.event_listeners,
            name: self.name,
        };

        crate::layer::RetryLayer::new(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = RetryConfig::<()>::builder();
        assert_eq!(config.base_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert_eq!(config.jitter, 0.25);
        assert_eq!(config.max_attempts, 4);
    }

    #[test]
    #[should_panic(expected = "max_attempts")]
    fn zero_attempts_panics_at_build() {
        let _ = RetryConfig::<()>::builder().max_attempts(0).build();
    }

    #[test]
    fn backoff_delay_respects_cap_and_jitter_bounds() {
        let base = Duration::from_secs(1);
        let max = Duration::from_secs(10);
        for attempt in 1..=6 {
            for sample in [0.0, 0.5, 1.0] {
                let d = backoff_delay(base, max, 0.25, attempt, sample);
                let unjittered = base
                    .saturating_mul(1u32 << (attempt - 1).min(31))
                    .min(max);
                let lower = unjittered.mul_f64(0.75);
                let upper = unjittered.mul_f64(1.25);
                assert!(d >= lower && d <= upper, "attempt {attempt} sample {sample}: {d:?} not in [{lower:?}, {upper:?}]");
            }
        }
    }
}
