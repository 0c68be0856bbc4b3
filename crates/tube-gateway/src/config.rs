use std::sync::Arc;
use std::time::Duration;
use tube_core::{Clock, SystemClock};

/// Configuration for the upstream gateway (C4, §4.4 + §6.3): how the breaker
/// and retry layers wrapping the upstream HTTP client are tuned, plus the
/// identity stamped into every snapshot this gateway produces.
pub struct GatewayConfig {
    pub(crate) node_id: String,
    pub(crate) base_url: String,
    pub(crate) breaker_failure_threshold: usize,
    pub(crate) breaker_open_duration: Duration,
    pub(crate) breaker_half_open_probes: usize,
    pub(crate) retry_max_attempts: usize,
    pub(crate) retry_base_delay: Duration,
    pub(crate) retry_max_delay: Duration,
    pub(crate) retry_jitter: f64,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) mailbox_capacity: usize,
}

impl GatewayConfig {
    pub fn builder(node_id: impl Into<String>, base_url: impl Into<String>) -> GatewayConfigBuilder {
        GatewayConfigBuilder::new(node_id, base_url)
    }
}

/// Builder for [`GatewayConfig`]. Defaults match §6.3.
pub struct GatewayConfigBuilder {
    node_id: String,
    base_url: String,
    breaker_failure_threshold: usize,
    breaker_open_duration: Duration,
    breaker_half_open_probes: usize,
    retry_max_attempts: usize,
    retry_base_delay: Duration,
    retry_max_delay: Duration,
    retry_jitter: f64,
    clock: Arc<dyn Clock>,
    mailbox_capacity: usize,
}

impl GatewayConfigBuilder {
    pub fn new(node_id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            base_url: base_url.into(),
            breaker_failure_threshold: 5,
            breaker_open_duration: Duration::from_secs(30),
            breaker_half_open_probes: 1,
            retry_max_attempts: 4,
            retry_base_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(30),
            retry_jitter: 0.25,
            clock: Arc::new(SystemClock),
            mailbox_capacity: 32,
        }
    }

    pub fn breaker_failure_threshold(mut self, n: usize) -> Self {
        self.breaker_failure_threshold = n;
        self
    }

    pub fn breaker_open_duration(mut self, d: Duration) -> Self {
        self.breaker_open_duration = d;
        self
    }

    pub fn breaker_half_open_probes(mut self, n: usize) -> Self {
        self.breaker_half_open_probes = n;
        self
    }

    pub fn retry_max_attempts(mut self, n: usize) -> Self {
        self.retry_max_attempts = n;
        self
    }

    pub fn retry_base_delay(mut self, d: Duration) -> Self {
        self.retry_base_delay = d;
        self
    }

    pub fn retry_max_delay(mut self, d: Duration) -> Self {
        self.retry_max_delay = d;
        self
    }

    pub fn retry_jitter(mut self, fraction: f64) -> Self {
        self.retry_jitter = fraction;
        self
    }

    /// Injects the clock used both to stamp `queriedAt` and to drive the
    /// breaker/retry timers. Production code never needs this; tests use it
    /// for deterministic snapshots.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Bounds the actor's mailbox. A full mailbox applies backpressure to
    /// callers awaiting `send` rather than growing unbounded.
    pub fn mailbox_capacity(mut self, n: usize) -> Self {
        self.mailbox_capacity = n;
        self
    }

    pub fn build(self) -> GatewayConfig {
        GatewayConfig {
            node_id: self.node_id,
            base_url: self.base_url,
            breaker_failure_threshold: self.breaker_failure_threshold,
            breaker_open_duration: self.breaker_open_duration,
            breaker_half_open_probes: self.breaker_half_open_probes,
            retry_max_attempts: self.retry_max_attempts,
            retry_base_delay: self.retry_base_delay,
            retry_max_delay: self.retry_max_delay,
            retry_jitter: self.retry_jitter,
            clock: self.clock,
            mailbox_capacity: self.mailbox_capacity,
        }
    }
}
