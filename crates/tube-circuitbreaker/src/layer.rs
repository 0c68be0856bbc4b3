use crate::config::CircuitBreakerConfig;
use crate::CircuitBreaker;
use std::sync::Arc;
use tower::Layer;

/// A Tower [`Layer`] applying the three-state circuit breaker (§4.2, C2) to
/// an inner service.
#[derive(Clone)]
pub struct CircuitBreakerLayer<Res, Err> {
    config: Arc<CircuitBreakerConfig<Res, Err>>,
}

impl<Res, Err> CircuitBreakerLayer<Res, Err> {
    pub(crate) fn new(config: CircuitBreakerConfig<Res, Err>) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Creates a new builder with spec defaults (§4.2: threshold 5, open
    /// duration 30s, 1 half-open probe).
    pub fn builder() -> crate::CircuitBreakerConfigBuilder<Res, Err> {
        crate::CircuitBreakerConfigBuilder::new()
    }
}

impl<S, Req, Res, Err> Layer<S> for CircuitBreakerLayer<Res, Err>
where
    S: tower::Service<Req, Response = Res, Error = Err>,
{
    type Service = CircuitBreaker<S, Req, Res, Err>;

    fn layer(&self, service: S) -> Self::Service {
        CircuitBreaker::new(service, Arc::clone(&self.config))
    }
}
