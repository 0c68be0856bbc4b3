use crate::circuit::CircuitState;
use std::time::Instant;
use tube_core::ResilienceEvent;

/// Events emitted by a circuit breaker instance.
#[derive(Debug, Clone)]
pub enum CircuitBreakerEvent {
    /// The breaker moved from one state to another.
    StateTransition {
        pattern_name: String,
        timestamp: Instant,
        from_state: CircuitState,
        to_state: CircuitState,
    },
    /// A call was permitted to run.
    CallPermitted {
        pattern_name: String,
        timestamp: Instant,
        state: CircuitState,
    },
    /// A call was refused without running.
    CallRejected {
        pattern_name: String,
        timestamp: Instant,
    },
    /// A permitted call succeeded.
    SuccessRecorded {
        pattern_name: String,
        timestamp: Instant,
        state: CircuitState,
    },
    /// A permitted call failed.
    FailureRecorded {
        pattern_name: String,
        timestamp: Instant,
        state: CircuitState,
        consecutive_failures: usize,
    },
}

impl ResilienceEvent for CircuitBreakerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CircuitBreakerEvent::StateTransition { .. } => "StateTransition",
            CircuitBreakerEvent::CallPermitted { .. } => "CallPermitted",
            CircuitBreakerEvent::CallRejected { .. } => "CallRejected",
            CircuitBreakerEvent::SuccessRecorded { .. } => "SuccessRecorded",
            CircuitBreakerEvent::FailureRecorded { .. } => "FailureRecorded",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            CircuitBreakerEvent::StateTransition { timestamp, .. }
            | CircuitBreakerEvent::CallPermitted { timestamp, .. }
            | CircuitBreakerEvent::CallRejected { timestamp, .. }
            | CircuitBreakerEvent::SuccessRecorded { timestamp, .. }
            | CircuitBreakerEvent::FailureRecorded { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            CircuitBreakerEvent::StateTransition { pattern_name, .. }
            | CircuitBreakerEvent::CallPermitted { pattern_name, .. }
            | CircuitBreakerEvent::CallRejected { pattern_name, .. }
            | CircuitBreakerEvent::SuccessRecorded { pattern_name, .. }
            | CircuitBreakerEvent::FailureRecorded { pattern_name, .. } => pattern_name,
        }
    }
}
