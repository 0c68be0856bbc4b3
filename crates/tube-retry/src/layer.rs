use crate::{Retry, RetryConfig};
use std::sync::Arc;
use tower::Layer;

/// A Tower [`Layer`] applying bounded retry with exponential backoff and
/// jitter (§4.3, C3) to an inner service.
#[derive(Clone)]
pub struct RetryLayer<E> {
    config: Arc<RetryConfig<E>>,
}

impl<E> RetryLayer<E> {
    pub(crate) fn new(config: RetryConfig<E>) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Creates a new builder with spec defaults (§6.3).
    pub fn builder() -> crate::RetryConfigBuilder<E> {
        crate::RetryConfigBuilder::new()
    }
}

impl<S, Req, E> Layer<S> for RetryLayer<E>
where
    Req: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    type Service = Retry<S, Req, E>;

    fn layer(&self, service: S) -> Self::Service {
        Retry::new(service, Arc::clone(&self.config))
    }
}
