use tube_core::Snapshot;

/// A value that can be merged under last-writer-wins semantics (§4.5).
///
/// `self.supersedes(other)` must define a total, deterministic order so that
/// every node converges on the same value regardless of arrival order
/// (§8 P2).
pub trait Mergeable {
    fn supersedes(&self, other: &Self) -> bool;
}

impl Mergeable for Snapshot {
    fn supersedes(&self, other: &Self) -> bool {
        Snapshot::supersedes(self, other)
    }
}
