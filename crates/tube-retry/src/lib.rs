//! C3: bounded retry executor with exponential backoff, jitter, and an
//! injectable retryability classification (§4.3).
//!
//! ```
//! use tube_retry::RetryLayer;
//! use tower::{Service, ServiceBuilder, ServiceExt, service_fn};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let layer = RetryLayer::<std::io::Error>::builder()
//!     .max_attempts(3)
//!     .base_delay(Duration::from_millis(10))
//!     .retryable(|_| true)
//!     .build();
//!
//! let mut service = ServiceBuilder::new()
//!     .layer(layer)
//!     .service(service_fn(|req: String| async move {
//!         Ok::<_, std::io::Error>(req)
//!     }));
//!
//! let response = service.ready().await?.call("hi".into()).await;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod events;
mod layer;

pub use config::{RetryConfig, RetryConfigBuilder};
pub use error::RetryError;
pub use events::RetryEvent;
pub use layer::RetryLayer;

use config::backoff_delay;
use futures::future::BoxFuture;
use rand::Rng;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;

#[cfg(feature = "metrics")]
use metrics::{counter, histogram};

/// A Tower [`Service`] that retries a failed call up to `max_attempts`
/// times, sleeping `delay(attempt)` (§4.3) between attempts.
///
/// Cancellation (§5) is cooperative: dropping the returned future — for
/// instance because an outer `tokio::time::timeout` elapsed — drops the
/// in-flight backoff sleep along with it. There is no separate cancel token.
pub struct Retry<S, Req, E> {
    inner: S,
    config: Arc<RetryConfig<E>>,
    _phantom: std::marker::PhantomData<Req>,
}

impl<S, Req, E> Retry<S, Req, E> {
    pub(crate) fn new(inner: S, config: Arc<RetryConfig<E>>) -> Self {
        Self {
            inner,
            config,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<S, Req, E> Clone for Retry<S, Req, E>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            config: Arc::clone(&self.config),
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<S, Req, E> Service<Req> for Retry<S, Req, E>
where
    S: Service<Req, Error = E> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    Req: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    type Response = S::Response;
    type Error = RetryError<E>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner
            .poll_ready(cx)
            .map_err(|e| RetryError::NonRetryable(e))
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let mut service = self.inner.clone();
        let config = Arc::clone(&self.config);

        Box::pin(async move {
            let mut attempt = 1usize;

            loop {
                let result = service.call(req.clone()).await;

                match result {
                    Ok(response) => {
                        #[cfg(feature = "metrics")]
                        {
                            counter!("retry_calls_total", "retry" => config.name.clone(), "outcome" => "success").increment(1);
                            histogram!("retry_attempts", "retry" => config.name.clone()).record(attempt as f64);
                        }
                        #[cfg(feature = "tracing")]
                        tracing::debug!(retry = %config.name, attempts = attempt, "retry executor succeeded");

                        config.event_listeners.emit(&RetryEvent::Success {
                            pattern_name: config.name.clone(),
                            timestamp: config.clock.now(),
                            attempts: attempt,
                        });
                        return Ok(response);
                    }
                    Err(error) => {
                        if !(config.retryable)(&error) {
                            config.event_listeners.emit(&RetryEvent::NonRetryable {
                                pattern_name: config.name.clone(),
                                timestamp: config.clock.now(),
                            });
                            #[cfg(feature = "tracing")]
                            tracing::debug!(retry = %config.name, "error classified non-retryable");
                            return Err(RetryError::NonRetryable(error));
                        }

                        if attempt >= config.max_attempts {
                            #[cfg(feature = "metrics")]
                            counter!("retry_calls_total", "retry" => config.name.clone(), "outcome" => "exhausted").increment(1);
                            #[cfg(feature = "tracing")]
                            tracing::warn!(retry = %config.name, attempts = attempt, "retry attempts exhausted");

                            config.event_listeners.emit(&RetryEvent::Exhausted {
                                pattern_name: config.name.clone(),
                                timestamp: config.clock.now(),
                                attempts: attempt,
                            });
                            return Err(RetryError::Exhausted {
                                last_cause: error,
                                attempts: attempt,
                            });
                        }

                        let jitter_sample: f64 = rand::rng().random();
                        let mut delay = backoff_delay(
                            config.base_delay,
                            config.max_delay,
                            config.jitter,
                            attempt,
                            jitter_sample,
                        );
                        if let Some(hint) = (config.retry_after_hint)(&error) {
                            delay = delay.max(hint);
                        }

                        #[cfg(feature = "metrics")]
                        counter!("retry_attempts_total", "retry" => config.name.clone()).increment(1);
                        #[cfg(feature = "tracing")]
                        tracing::debug!(retry = %config.name, attempt, delay_ms = delay.as_millis() as u64, "retrying after delay");

                        config.event_listeners.emit(&RetryEvent::Retry {
                            pattern_name: config.name.clone(),
                            timestamp: config.clock.now(),
                            attempt,
                            delay,
                        });

                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::service_fn;
    use tower::{Layer, ServiceExt};

    #[derive(Debug, Clone, PartialEq)]
    struct TestError(&'static str);

    #[tokio::test(start_paused = true)]
    async fn succeeds_without_retry_on_first_try() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let cc = Arc::clone(&call_count);
        let service = service_fn(move |req: String| {
            let cc = Arc::clone(&cc);
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TestError>(req)
            }
        });

        let layer = RetryLayer::<TestError>::builder()
            .max_attempts(3)
            .base_delay(Duration::from_millis(1))
            .build();
        let mut svc = layer.layer(service);

        let resp = svc.ready().await.unwrap().call("hi".to_string()).await.unwrap();
        assert_eq!(resp, "hi");
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_retryable_errors_up_to_max_attempts() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let cc = Arc::clone(&call_count);
        let service = service_fn(move |_req: String| {
            let cc = Arc::clone(&cc);
            async move {
                let n = cc.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(TestError("transient"))
                } else {
                    Ok::<_, TestError>("ok".to_string())
                }
            }
        });

        let layer = RetryLayer::<TestError>::builder()
            .max_attempts(4)
            .base_delay(Duration::from_millis(1))
            .build();
        let mut svc = layer.layer(service);

        let resp = svc.ready().await.unwrap().call("x".to_string()).await.unwrap();
        assert_eq!(resp, "ok");
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_max_attempts_wraps_error() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let cc = Arc::clone(&call_count);
        let service = service_fn(move |_req: String| {
            let cc = Arc::clone(&cc);
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                Err::<String, _>(TestError("permanent"))
            }
        });

        let layer = RetryLayer::<TestError>::builder()
            .max_attempts(4)
            .base_delay(Duration::from_millis(1))
            .build();
        let mut svc = layer.layer(service);

        let err = svc.ready().await.unwrap().call("x".to_string()).await.unwrap_err();
        assert_eq!(call_count.load(Ordering::SeqCst), 4);
        match err {
            RetryError::Exhausted { attempts, last_cause } => {
                assert_eq!(attempts, 4);
                assert_eq!(last_cause, TestError("permanent"));
            }
            _ => panic!("expected Exhausted, got {err:?}"),
        }
    }

    /// P8: a non-retryable error produces exactly one attempt.
    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_produces_exactly_one_attempt() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let cc = Arc::clone(&call_count);
        let service = service_fn(move |_req: String| {
            let cc = Arc::clone(&cc);
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                Err::<String, _>(TestError("fatal"))
            }
        });

        let layer = RetryLayer::<TestError>::builder()
            .max_attempts(5)
            .base_delay(Duration::from_millis(1))
            .retryable(|_| false)
            .build();
        let mut svc = layer.layer(service);

        let err = svc.ready().await.unwrap().call("x".to_string()).await.unwrap_err();
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert!(matches!(err, RetryError::NonRetryable(_)));
    }

    /// P7 + the 429 override: a retry-after hint larger than the computed
    /// backoff wins.
    #[tokio::test(start_paused = true)]
    async fn retry_after_hint_overrides_computed_backoff() {
        let start = std::time::Instant::now();
        let call_count = Arc::new(AtomicUsize::new(0));
        let cc = Arc::clone(&call_count);
        let service = service_fn(move |_req: String| {
            let cc = Arc::clone(&cc);
            async move {
                let n = cc.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err(TestError("429"))
                } else {
                    Ok::<_, TestError>("ok".to_string())
                }
            }
        });

        let layer = RetryLayer::<TestError>::builder()
            .max_attempts(2)
            .base_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(1))
            .retry_after_hint(|e| (e.0 == "429").then(|| Duration::from_secs(5)))
            .build();
        let mut svc = layer.layer(service);

        svc.ready().await.unwrap().call("x".to_string()).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn event_listeners_observe_retry_and_success() {
        let retries = Arc::new(AtomicUsize::new(0));
        let successes = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&retries);
        let s = Arc::clone(&successes);

        let call_count = Arc::new(AtomicUsize::new(0));
        let cc = Arc::clone(&call_count);
        let service = service_fn(move |_req: String| {
            let cc = Arc::clone(&cc);
            async move {
                let n = cc.fetch_add(1, Ordering::SeqCst);
                if n < 1 {
                    Err(TestError("transient"))
                } else {
                    Ok::<_, TestError>("ok".to_string())
                }
            }
        });

        let layer = RetryLayer::<TestError>::builder()
            .max_attempts(3)
            .base_delay(Duration::from_millis(1))
            .on_retry(move |_, _| {
                r.fetch_add(1, Ordering::SeqCst);
            })
            .on_success(move |_| {
                s.fetch_add(1, Ordering::SeqCst);
            })
            .build();
        let mut svc = layer.layer(service);

        svc.ready().await.unwrap().call("x".to_string()).await.unwrap();
        assert_eq!(retries.load(Ordering::SeqCst), 1);
        assert_eq!(successes.load(Ordering::SeqCst), 1);
    }
}
