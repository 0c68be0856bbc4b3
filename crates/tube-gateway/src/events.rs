use std::time::Instant;
use tube_core::ResilienceEvent;

/// Observability events emitted by the gateway actor (§9: "the core emits
/// events, collaborators attach instrumentation").
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    FetchStarted {
        node_id: String,
        timestamp: Instant,
        kind: &'static str,
    },
    FetchSucceeded {
        node_id: String,
        timestamp: Instant,
        kind: &'static str,
        line_count: usize,
    },
    FetchFailed {
        node_id: String,
        timestamp: Instant,
        kind: &'static str,
        error_kind: &'static str,
    },
    ShutdownCompleted {
        node_id: String,
        timestamp: Instant,
        dropped: usize,
    },
}

impl ResilienceEvent for GatewayEvent {
    fn event_type(&self) -> &'static str {
        match self {
            GatewayEvent::FetchStarted { .. } => "fetch_started",
            GatewayEvent::FetchSucceeded { .. } => "fetch_succeeded",
            GatewayEvent::FetchFailed { .. } => "fetch_failed",
            GatewayEvent::ShutdownCompleted { .. } => "shutdown_completed",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            GatewayEvent::FetchStarted { timestamp, .. }
            | GatewayEvent::FetchSucceeded { timestamp, .. }
            | GatewayEvent::FetchFailed { timestamp, .. }
            | GatewayEvent::ShutdownCompleted { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            GatewayEvent::FetchStarted { node_id, .. }
            | GatewayEvent::FetchSucceeded { node_id, .. }
            | GatewayEvent::FetchFailed { node_id, .. }
            | GatewayEvent::ShutdownCompleted { node_id, .. } => node_id,
        }
    }
}
