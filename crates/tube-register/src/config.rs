use std::time::Duration;

/// Configuration for a register instance (C5, §6.3).
pub struct RegisterConfig {
    pub(crate) node_id: String,
    pub(crate) write_majority_timeout: Duration,
    pub(crate) mailbox_capacity: usize,
    pub(crate) subscriber_capacity: usize,
}

impl RegisterConfig {
    pub fn builder(node_id: impl Into<String>) -> RegisterConfigBuilder {
        RegisterConfigBuilder::new(node_id)
    }
}

/// Builder for [`RegisterConfig`]. Defaults match §6.3.
pub struct RegisterConfigBuilder {
    node_id: String,
    write_majority_timeout: Duration,
    mailbox_capacity: usize,
    subscriber_capacity: usize,
}

impl RegisterConfigBuilder {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            write_majority_timeout: Duration::from_secs(3),
            mailbox_capacity: 64,
            subscriber_capacity: 16,
        }
    }

    /// Time `write` awaits a majority of reachable peers' acks before
    /// returning with `majority_reached = false` (gossip continues
    /// best-effort in the background regardless, §4.5).
    pub fn write_majority_timeout(mut self, d: Duration) -> Self {
        self.write_majority_timeout = d;
        self
    }

    pub fn mailbox_capacity(mut self, n: usize) -> Self {
        self.mailbox_capacity = n;
        self
    }

    /// Bounds each key's subscriber broadcast channel. A slow subscriber
    /// that falls behind this many updates misses the oldest ones (standard
    /// `tokio::sync::broadcast` lagging semantics) rather than blocking
    /// writers.
    pub fn subscriber_capacity(mut self, n: usize) -> Self {
        self.subscriber_capacity = n;
        self
    }

    pub fn build(self) -> RegisterConfig {
        RegisterConfig {
            node_id: self.node_id,
            write_majority_timeout: self.write_majority_timeout,
            mailbox_capacity: self.mailbox_capacity,
            subscriber_capacity: self.subscriber_capacity,
        }
    }
}
