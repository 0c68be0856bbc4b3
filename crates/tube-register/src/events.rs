use std::time::Instant;
use tube_core::ResilienceEvent;

/// Observability events emitted by a register instance.
#[derive(Debug, Clone)]
pub enum RegisterEvent {
    /// A local or peer write was merged into the register (it superseded
    /// the previous value).
    Merged {
        node_id: String,
        timestamp: Instant,
        key: String,
    },
    /// A write or peer value lost the LWW comparison and was dropped.
    Superseded {
        node_id: String,
        timestamp: Instant,
        key: String,
    },
    /// A `write` call's gossip fan-out finished, successfully or not.
    GossipSettled {
        node_id: String,
        timestamp: Instant,
        key: String,
        acked: usize,
        total_peers: usize,
        majority_reached: bool,
    },
}

impl ResilienceEvent for RegisterEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RegisterEvent::Merged { .. } => "merged",
            RegisterEvent::Superseded { .. } => "superseded",
            RegisterEvent::GossipSettled { .. } => "gossip_settled",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RegisterEvent::Merged { timestamp, .. }
            | RegisterEvent::Superseded { timestamp, .. }
            | RegisterEvent::GossipSettled { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            RegisterEvent::Merged { node_id, .. }
            | RegisterEvent::Superseded { node_id, .. }
            | RegisterEvent::GossipSettled { node_id, .. } => node_id,
        }
    }
}
