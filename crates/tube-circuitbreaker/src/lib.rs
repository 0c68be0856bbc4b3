//! C2: a three-state circuit breaker gating a fallible operation (§4.2).
//!
//! Unlike failure-rate breakers tracking a sliding window of call outcomes,
//! this breaker counts *consecutive* failures: `CLOSED` -> `OPEN` after
//! `failure_threshold` failures in a row, `OPEN` -> `HALF_OPEN` after
//! `wait_duration_in_open` elapses, and a single probe call in `HALF_OPEN`
//! decides whether to close again or re-open.
//!
//! ## Basic example
//!
//! ```
//! use tube_circuitbreaker::CircuitBreakerLayer;
//! use tower::{Service, ServiceBuilder, ServiceExt, service_fn};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let layer = CircuitBreakerLayer::<String, ()>::builder()
//!     .failure_threshold(5)
//!     .wait_duration_in_open(Duration::from_secs(30))
//!     .build();
//!
//! let svc = service_fn(|req: String| async move { Ok::<String, ()>(req) });
//! let mut service = ServiceBuilder::new().layer(layer).service(svc);
//! let _ = service.ready().await?.call("ping".to_string()).await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Fallback handler
//!
//! ```
//! use tube_circuitbreaker::CircuitBreakerLayer;
//! use tower::{service_fn, Layer};
//! use futures::future::BoxFuture;
//!
//! # async fn example() {
//! let layer = CircuitBreakerLayer::<String, ()>::builder().build();
//! let base_service = service_fn(|req: String| async move { Ok::<String, ()>(req) });
//!
//! let mut service = layer.layer(base_service)
//!     .with_fallback(|_req: String| -> BoxFuture<'static, Result<String, ()>> {
//!         Box::pin(async { Ok("fallback response".to_string()) })
//!     });
//! # }
//! ```
//!
//! ## Feature flags
//! - `metrics`: records breaker state and transitions via the `metrics` crate.
//! - `tracing`: emits structured `tracing` events for state transitions.

use crate::circuit::Circuit;
use futures::future::BoxFuture;
#[cfg(feature = "metrics")]
use metrics::counter;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::Mutex;
use tower::Service;
#[cfg(feature = "tracing")]
use tracing::debug;

pub use circuit::CircuitState;
pub use config::{CircuitBreakerConfig, CircuitBreakerConfigBuilder};
pub use error::CircuitBreakerError;
pub use events::CircuitBreakerEvent;
pub use layer::CircuitBreakerLayer;

mod circuit;
mod config;
mod error;
mod events;
mod layer;

pub(crate) type FailureClassifier<Res, Err> = dyn Fn(&Result<Res, Err>) -> bool + Send + Sync;
pub(crate) type SharedFailureClassifier<Res, Err> = Arc<FailureClassifier<Res, Err>>;

pub(crate) type FallbackFn<Req, Res, Err> =
    dyn Fn(Req) -> BoxFuture<'static, Result<Res, Err>> + Send + Sync;
pub(crate) type SharedFallback<Req, Res, Err> = Arc<FallbackFn<Req, Res, Err>>;

/// A Tower [`Service`] applying circuit breaker logic to an inner service.
pub struct CircuitBreaker<S, Req, Res, Err> {
    inner: S,
    circuit: Arc<Mutex<Circuit>>,
    state_atomic: Arc<std::sync::atomic::AtomicU8>,
    config: Arc<CircuitBreakerConfig<Res, Err>>,
    fallback: Option<SharedFallback<Req, Res, Err>>,
    _phantom: std::marker::PhantomData<Req>,
}

impl<S, Req, Res, Err> CircuitBreaker<S, Req, Res, Err> {
    pub(crate) fn new(inner: S, config: Arc<CircuitBreakerConfig<Res, Err>>) -> Self {
        let state_atomic = Arc::new(std::sync::atomic::AtomicU8::new(CircuitState::Closed as u8));
        Self {
            inner,
            circuit: Arc::new(Mutex::new(Circuit::new_with_atomic(Arc::clone(
                &state_atomic,
            )))),
            state_atomic,
            config,
            fallback: None,
            _phantom: std::marker::PhantomData,
        }
    }

    /// Sets a fallback invoked instead of returning `Refused` when the
    /// circuit is open.
    pub fn with_fallback<F>(mut self, fallback: F) -> Self
    where
        F: Fn(Req) -> BoxFuture<'static, Result<Res, Err>> + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(fallback));
        self
    }

    pub async fn force_open(&self) {
        let mut circuit = self.circuit.lock().await;
        circuit.force_open(&self.config);
    }

    pub async fn force_closed(&self) {
        let mut circuit = self.circuit.lock().await;
        circuit.force_closed(&self.config);
    }

    pub async fn reset(&self) {
        let mut circuit = self.circuit.lock().await;
        circuit.reset(&self.config);
    }

    pub async fn state(&self) -> CircuitState {
        let circuit = self.circuit.lock().await;
        circuit.state()
    }

    /// Returns the current breaker state without requiring async context —
    /// safe to call from the readiness signal exported to collaborators
    /// (§7: "the breaker's state is observable via the InspectBreaker path").
    pub fn state_sync(&self) -> CircuitState {
        CircuitState::from_u8(self.state_atomic.load(std::sync::atomic::Ordering::Acquire))
    }
}

impl<S, Req, Res, Err> Clone for CircuitBreaker<S, Req, Res, Err>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            circuit: Arc::clone(&self.circuit),
            state_atomic: Arc::clone(&self.state_atomic),
            config: Arc::clone(&self.config),
            fallback: self.fallback.clone(),
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<S, Req, Res, Err> Service<Req> for CircuitBreaker<S, Req, Res, Err>
where
    S: Service<Req, Response = Res, Error = Err> + Clone + Send + 'static,
    S::Future: Send + 'static,
    Res: Send + 'static,
    Err: Send + 'static,
    Req: Send + 'static,
{
    type Response = Res;
    type Error = CircuitBreakerError<Err>;
    type Future = BoxFuture<'static, Result<Res, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner
            .poll_ready(cx)
            .map_err(CircuitBreakerError::Failed)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let config = Arc::clone(&self.config);
        let circuit = Arc::clone(&self.circuit);
        let mut inner = self.inner.clone();
        let fallback = self.fallback.clone();

        Box::pin(async move {
            let permitted = {
                let mut circuit = circuit.lock().await;
                circuit.try_acquire(&config)
            };

            if !permitted {
                let retry_after = {
                    let circuit = circuit.lock().await;
                    circuit.retry_after(&config)
                };

                #[cfg(feature = "tracing")]
                debug!(breaker = %config.name, ?retry_after, "circuit breaker refused call");
                #[cfg(feature = "metrics")]
                counter!("circuitbreaker_calls_total", "circuitbreaker" => config.name.clone(), "outcome" => "refused").increment(1);

                if let Some(fallback_fn) = fallback {
                    return fallback_fn(req).await.map_err(CircuitBreakerError::Failed);
                }
                return Err(CircuitBreakerError::Refused { retry_after });
            }

            let result = inner.call(req).await;

            let mut circuit = circuit.lock().await;
            if (config.failure_classifier)(&result) {
                circuit.record_failure(&config);
            } else {
                circuit.record_success(&config);
            }

            result.map_err(CircuitBreakerError::Failed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::{service_fn, Layer, ServiceExt};
    use tube_core::TestClock;

    #[tokio::test]
    async fn closed_breaker_passes_calls_through() {
        let layer = CircuitBreakerLayer::<String, &'static str>::builder().build();
        let svc = service_fn(|req: String| async move { Ok::<_, &'static str>(req) });
        let mut svc = layer.layer(svc);

        let resp = svc.ready().await.unwrap().call("ping".to_string()).await.unwrap();
        assert_eq!(resp, "ping");
    }

    /// P5: after exactly `failureThreshold` consecutive failures, the next
    /// call is refused without hitting the inner service.
    #[tokio::test]
    async fn opens_after_threshold_and_refuses_without_calling_inner() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let cc = Arc::clone(&call_count);

        let layer = CircuitBreakerLayer::<String, &'static str>::builder()
            .failure_threshold(3)
            .build();
        let svc = service_fn(move |_req: String| {
            let cc = Arc::clone(&cc);
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                Err::<String, _>("boom")
            }
        });
        let mut svc = layer.layer(svc);

        for _ in 0..3 {
            let _ = svc.ready().await.unwrap().call("x".to_string()).await;
        }
        assert_eq!(call_count.load(Ordering::SeqCst), 3);

        let err = svc.ready().await.unwrap().call("x".to_string()).await.unwrap_err();
        assert!(err.is_refused());
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    /// P6: half-open after the wait duration; success closes, failure
    /// re-opens with a fresh `openedAt`.
    #[tokio::test]
    async fn half_opens_then_recovers_on_success() {
        let clock = TestClock::default();
        let should_fail = Arc::new(std::sync::atomic::AtomicBool::new(true));
        let sf = Arc::clone(&should_fail);

        let layer = CircuitBreakerLayer::<String, &'static str>::builder()
            .failure_threshold(1)
            .wait_duration_in_open(Duration::from_secs(10))
            .clock(Arc::new(clock.clone()))
            .build();
        let svc = service_fn(move |_req: String| {
            let sf = Arc::clone(&sf);
            async move {
                if sf.load(Ordering::SeqCst) {
                    Err::<String, _>("boom")
                } else {
                    Ok("ok".to_string())
                }
            }
        });
        let mut svc = layer.layer(svc);

        let _ = svc.ready().await.unwrap().call("x".to_string()).await;
        let err = svc.ready().await.unwrap().call("x".to_string()).await.unwrap_err();
        assert!(err.is_refused());

        clock.advance(Duration::from_secs(10));
        should_fail.store(false, Ordering::SeqCst);

        let resp = svc.ready().await.unwrap().call("x".to_string()).await.unwrap();
        assert_eq!(resp, "ok");
    }

    #[test]
    fn error_helpers_distinguish_refused_from_failed() {
        let refused: CircuitBreakerError<&str> = CircuitBreakerError::Refused {
            retry_after: Duration::from_secs(1),
        };
        assert!(refused.is_refused());
        assert_eq!(refused.into_inner(), None);

        let failed = CircuitBreakerError::Failed("boom");
        assert!(!failed.is_refused());
        assert_eq!(failed.into_inner(), Some("boom"));
    }

    #[tokio::test]
    async fn event_listeners_observe_state_transitions() {
        let transitions = Arc::new(AtomicUsize::new(0));
        let t = Arc::clone(&transitions);

        let layer = CircuitBreakerLayer::<String, &'static str>::builder()
            .failure_threshold(2)
            .on_state_transition(move |_, _| {
                t.fetch_add(1, Ordering::SeqCst);
            })
            .build();
        let svc = service_fn(|_req: String| async move { Err::<String, _>("boom") });
        let mut svc = layer.layer(svc);

        for _ in 0..2 {
            let _ = svc.ready().await.unwrap().call("x".to_string()).await;
        }
        assert_eq!(transitions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fallback_runs_when_circuit_refuses() {
        let layer = CircuitBreakerLayer::<String, &'static str>::builder()
            .failure_threshold(1)
            .build();
        let svc = service_fn(|_req: String| async move { Err::<String, _>("boom") });
        let mut svc = layer.layer(svc).with_fallback(|_req: String| {
            Box::pin(async { Ok::<String, &'static str>("fallback".to_string()) })
                as BoxFuture<'static, Result<String, &'static str>>
        });

        let _ = svc.ready().await.unwrap().call("x".to_string()).await;
        let resp = svc.ready().await.unwrap().call("x".to_string()).await.unwrap();
        assert_eq!(resp, "fallback");
    }

    #[tokio::test]
    async fn state_sync_matches_async_state() {
        let layer = CircuitBreakerLayer::<String, &'static str>::builder()
            .failure_threshold(1)
            .build();
        let svc = service_fn(|_req: String| async move { Err::<String, _>("boom") });
        let svc = layer.layer(svc);

        assert_eq!(svc.state_sync(), CircuitState::Closed);
        svc.force_open().await;
        assert_eq!(svc.state_sync(), CircuitState::Open);
        assert_eq!(svc.state().await, CircuitState::Open);
    }
}
