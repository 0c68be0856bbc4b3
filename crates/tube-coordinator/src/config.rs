use std::time::Duration;

/// Configuration for the refresh coordinator (C6, §6.3).
pub struct CoordinatorConfig {
    pub(crate) node_id: String,
    pub(crate) refresh_interval: Duration,
    pub(crate) refresh_jitter: Duration,
    pub(crate) recent_enough_threshold: Duration,
    pub(crate) background_refresh_threshold: Duration,
    pub(crate) ask_timeout: Duration,
    pub(crate) drain_timeout: Duration,
    pub(crate) mailbox_capacity: usize,
}

impl CoordinatorConfig {
    pub fn builder(node_id: impl Into<String>) -> CoordinatorConfigBuilder {
        CoordinatorConfigBuilder::new(node_id)
    }
}

/// Builder for [`CoordinatorConfig`]. Defaults match §6.3.
pub struct CoordinatorConfigBuilder {
    node_id: String,
    refresh_interval: Duration,
    refresh_jitter: Duration,
    recent_enough_threshold: Duration,
    background_refresh_threshold: Duration,
    ask_timeout: Duration,
    drain_timeout: Duration,
    mailbox_capacity: usize,
}

impl CoordinatorConfigBuilder {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            refresh_interval: Duration::from_secs(30),
            refresh_jitter: Duration::from_secs(5),
            recent_enough_threshold: Duration::from_secs(5),
            background_refresh_threshold: Duration::from_secs(20),
            ask_timeout: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(10),
            mailbox_capacity: 256,
        }
    }

    pub fn refresh_interval(mut self, d: Duration) -> Self {
        self.refresh_interval = d;
        self
    }

    /// Upper bound of the random addition to each refresh interval, used to
    /// stagger peers (§6.3: "≤ 5s").
    pub fn refresh_jitter(mut self, d: Duration) -> Self {
        self.refresh_jitter = d;
        self
    }

    pub fn recent_enough_threshold(mut self, d: Duration) -> Self {
        self.recent_enough_threshold = d;
        self
    }

    pub fn background_refresh_threshold(mut self, d: Duration) -> Self {
        self.background_refresh_threshold = d;
        self
    }

    pub fn ask_timeout(mut self, d: Duration) -> Self {
        self.ask_timeout = d;
        self
    }

    /// Must exceed `ask_timeout` (§6.3); the builder does not enforce this
    /// invariant itself since tests intentionally construct tighter windows,
    /// but production configuration should respect it.
    pub fn drain_timeout(mut self, d: Duration) -> Self {
        self.drain_timeout = d;
        self
    }

    pub fn mailbox_capacity(mut self, n: usize) -> Self {
        self.mailbox_capacity = n;
        self
    }

    pub fn build(self) -> CoordinatorConfig {
        CoordinatorConfig {
            node_id: self.node_id,
            refresh_interval: self.refresh_interval,
            refresh_jitter: self.refresh_jitter,
            recent_enough_threshold: self.recent_enough_threshold,
            background_refresh_threshold: self.background_refresh_threshold,
            ask_timeout: self.ask_timeout,
            drain_timeout: self.drain_timeout,
            mailbox_capacity: self.mailbox_capacity,
        }
    }
}
