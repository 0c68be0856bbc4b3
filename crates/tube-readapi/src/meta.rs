use chrono::{DateTime, Utc};
use tube_core::Snapshot;

/// The reply envelope around any read API operation (§6.1 `meta`).
#[derive(Debug, Clone)]
pub struct Meta {
    pub queried_at: DateTime<Utc>,
    pub queried_by: String,
    pub age_ms: i64,
    pub stale: bool,
    pub floor_applied: bool,
}

impl Meta {
    pub(crate) fn build(snapshot: &Snapshot, now: DateTime<Utc>, stale: bool, floor_applied: bool) -> Self {
        Self {
            queried_at: snapshot.queried_at(),
            queried_by: snapshot.queried_by().to_string(),
            age_ms: snapshot.age_ms(now),
            stale,
            floor_applied,
        }
    }
}

/// A snapshot (possibly filtered) paired with its envelope.
#[derive(Debug, Clone)]
pub struct ReadReply {
    pub snapshot: Snapshot,
    pub meta: Meta,
}
