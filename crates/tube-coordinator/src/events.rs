use std::time::Instant;
use tube_core::ResilienceEvent;

/// Observability events emitted by the coordinator.
#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
    RefreshStarted {
        node_id: String,
        timestamp: Instant,
        trigger: &'static str,
    },
    RefreshSucceeded {
        node_id: String,
        timestamp: Instant,
        waiters_satisfied: usize,
    },
    RefreshFailed {
        node_id: String,
        timestamp: Instant,
        waiters_satisfied: usize,
    },
    WaiterEnqueued {
        node_id: String,
        timestamp: Instant,
        queue_len: usize,
    },
    WaitersDrained {
        node_id: String,
        timestamp: Instant,
        count: usize,
    },
    PeerUpdateApplied {
        node_id: String,
        timestamp: Instant,
        waiters_satisfied: usize,
    },
    PeriodicTickSkippedFetch {
        node_id: String,
        timestamp: Instant,
    },
    WaiterDeadlineElapsed {
        node_id: String,
        timestamp: Instant,
    },
    ShutdownCompleted {
        node_id: String,
        timestamp: Instant,
        waiters_dropped: usize,
    },
}

impl ResilienceEvent for CoordinatorEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CoordinatorEvent::RefreshStarted { .. } => "refresh_started",
            CoordinatorEvent::RefreshSucceeded { .. } => "refresh_succeeded",
            CoordinatorEvent::RefreshFailed { .. } => "refresh_failed",
            CoordinatorEvent::WaiterEnqueued { .. } => "waiter_enqueued",
            CoordinatorEvent::WaitersDrained { .. } => "waiters_drained",
            CoordinatorEvent::PeerUpdateApplied { .. } => "peer_update_applied",
            CoordinatorEvent::PeriodicTickSkippedFetch { .. } => "periodic_tick_skipped_fetch",
            CoordinatorEvent::WaiterDeadlineElapsed { .. } => "waiter_deadline_elapsed",
            CoordinatorEvent::ShutdownCompleted { .. } => "shutdown_completed",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            CoordinatorEvent::RefreshStarted { timestamp, .. }
            | CoordinatorEvent::RefreshSucceeded { timestamp, .. }
            | CoordinatorEvent::RefreshFailed { timestamp, .. }
            | CoordinatorEvent::WaiterEnqueued { timestamp, .. }
            | CoordinatorEvent::WaitersDrained { timestamp, .. }
            | CoordinatorEvent::PeerUpdateApplied { timestamp, .. }
            | CoordinatorEvent::PeriodicTickSkippedFetch { timestamp, .. }
            | CoordinatorEvent::WaiterDeadlineElapsed { timestamp, .. }
            | CoordinatorEvent::ShutdownCompleted { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            CoordinatorEvent::RefreshStarted { node_id, .. }
            | CoordinatorEvent::RefreshSucceeded { node_id, .. }
            | CoordinatorEvent::RefreshFailed { node_id, .. }
            | CoordinatorEvent::WaiterEnqueued { node_id, .. }
            | CoordinatorEvent::WaitersDrained { node_id, .. }
            | CoordinatorEvent::PeerUpdateApplied { node_id, .. }
            | CoordinatorEvent::PeriodicTickSkippedFetch { node_id, .. }
            | CoordinatorEvent::WaiterDeadlineElapsed { node_id, .. }
            | CoordinatorEvent::ShutdownCompleted { node_id, .. } => node_id,
        }
    }
}
