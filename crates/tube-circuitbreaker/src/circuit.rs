use crate::config::CircuitBreakerConfig;
use crate::events::CircuitBreakerEvent;
#[cfg(feature = "metrics")]
use metrics::counter;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

/// The three states a circuit can be in (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl CircuitState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

/// The breaker's mutable state: `{CLOSED, OPEN, HALF_OPEN}`, a consecutive
/// failure counter, and the instant it last opened (§3).
///
/// Guarded by the caller's mutex; a separate atomic mirror of `state` lets
/// [`crate::CircuitBreaker::state_sync`] answer without awaiting the lock.
pub(crate) struct Circuit {
    state: CircuitState,
    state_atomic: std::sync::Arc<AtomicU8>,
    consecutive_failures: usize,
    opened_at: Option<Instant>,
    half_open_calls: usize,
}

impl Circuit {
    pub(crate) fn new_with_atomic(state_atomic: std::sync::Arc<AtomicU8>) -> Self {
        Self {
            state: CircuitState::Closed,
            state_atomic,
            consecutive_failures: 0,
            opened_at: None,
            half_open_calls: 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn new() -> Self {
        Self::new_with_atomic(std::sync::Arc::new(AtomicU8::new(CircuitState::Closed as u8)))
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Refreshes `OPEN -> HALF_OPEN` if `openDuration` has elapsed, then
    /// decides whether to permit the call (§4.2). Emits `CallPermitted` or
    /// `CallRejected`.
    pub fn try_acquire<Res, Err>(&mut self, config: &CircuitBreakerConfig<Res, Err>) -> bool {
        let now = config.clock.now();

        if self.state == CircuitState::Open {
            if let Some(opened_at) = self.opened_at {
                if now.duration_since(opened_at) >= config.wait_duration_in_open {
                    self.transition_to(CircuitState::HalfOpen, config);
                }
            }
        }

        let permitted = match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => self.half_open_calls < config.permitted_calls_in_half_open,
        };

        if permitted {
            if self.state == CircuitState::HalfOpen {
                self.half_open_calls += 1;
            }
            config.event_listeners.emit(&CircuitBreakerEvent::CallPermitted {
                pattern_name: config.name.clone(),
                timestamp: config.clock.now(),
                state: self.state,
            });
        } else {
            config.event_listeners.emit(&CircuitBreakerEvent::CallRejected {
                pattern_name: config.name.clone(),
                timestamp: config.clock.now(),
            });
        }
        permitted
    }

    /// The retry-after hint for a refused call: `openDuration - (now - openedAt)`.
    pub fn retry_after<Res, Err>(&self, config: &CircuitBreakerConfig<Res, Err>) -> Duration {
        match self.opened_at {
            Some(opened_at) => config
                .wait_duration_in_open
                .saturating_sub(config.clock.now().duration_since(opened_at)),
            None => Duration::ZERO,
        }
    }

    pub fn record_success<Res, Err>(&mut self, config: &CircuitBreakerConfig<Res, Err>) {
        config.event_listeners.emit(&CircuitBreakerEvent::SuccessRecorded {
            pattern_name: config.name.clone(),
            timestamp: config.clock.now(),
            state: self.state,
        });
        #[cfg(feature = "metrics")]
        counter!("circuitbreaker_calls_total", "circuitbreaker" => config.name.clone(), "outcome" => "success").increment(1);

        match self.state {
            CircuitState::HalfOpen => self.transition_to(CircuitState::Closed, config),
            CircuitState::Closed => self.consecutive_failures = 0,
            CircuitState::Open => {}
        }
    }

    pub fn record_failure<Res, Err>(&mut self, config: &CircuitBreakerConfig<Res, Err>) {
        self.consecutive_failures += 1;
        config.event_listeners.emit(&CircuitBreakerEvent::FailureRecorded {
            pattern_name: config.name.clone(),
            timestamp: config.clock.now(),
            state: self.state,
            consecutive_failures: self.consecutive_failures,
        });
        #[cfg(feature = "metrics")]
        counter!("circuitbreaker_calls_total", "circuitbreaker" => config.name.clone(), "outcome" => "failure").increment(1);

        match self.state {
            CircuitState::HalfOpen => self.transition_to(CircuitState::Open, config),
            CircuitState::Closed => {
                if self.consecutive_failures >= config.failure_threshold {
                    self.transition_to(CircuitState::Open, config);
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn force_open<Res, Err>(&mut self, config: &CircuitBreakerConfig<Res, Err>) {
        self.transition_to(CircuitState::Open, config);
    }

    pub fn force_closed<Res, Err>(&mut self, config: &CircuitBreakerConfig<Res, Err>) {
        self.transition_to(CircuitState::Closed, config);
    }

    pub fn reset<Res, Err>(&mut self, config: &CircuitBreakerConfig<Res, Err>) {
        self.transition_to(CircuitState::Closed, config);
    }

    fn transition_to<Res, Err>(&mut self, state: CircuitState, config: &CircuitBreakerConfig<Res, Err>) {
        if self.state == state {
            return;
        }
        let from_state = self.state;
        let now = config.clock.now();

        config.event_listeners.emit(&CircuitBreakerEvent::StateTransition {
            pattern_name: config.name.clone(),
            timestamp: now,
            from_state,
            to_state: state,
        });

        #[cfg(feature = "tracing")]
        tracing::info!(breaker = %config.name, from = ?from_state, to = ?state, "circuit breaker state transition");

        #[cfg(feature = "metrics")]
        {
            use metrics::gauge;
            counter!(
                "circuitbreaker_transitions_total",
                "circuitbreaker" => config.name.clone()
            )
            .increment(1);
            gauge!("circuitbreaker_state", "circuitbreaker" => config.name.clone()).set(state as u8 as f64);
        }

        self.state = state;
        self.state_atomic.store(state as u8, Ordering::Release);
        self.consecutive_failures = 0;
        self.half_open_calls = 0;
        self.opened_at = if state == CircuitState::Open { Some(now) } else { None };
    }
}
