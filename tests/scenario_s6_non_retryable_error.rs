//! S6 — Non-retryable error (spec §8, P6).
//!
//! Upstream returns 404 for the all-lines URL. A single fetch should hit
//! the upstream exactly once — a 404 is fatal, not retryable — and the
//! breaker's consecutive-failure counter advances by one, but the locally
//! cached snapshot (if any) is left untouched.

mod support;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use tube_core::{Clock, CoreError, EventListeners, SystemClock};
use tube_gateway::{GatewayConfig, UpstreamError};

#[tokio::test(flavor = "multi_thread")]
async fn fatal_status_is_not_retried_and_still_counts_against_the_breaker() {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (upstream, calls) = support::failing_upstream(UpstreamError::Fatal { status: 404 });

    let (gateway, _gw) = tube_gateway::spawn_with_upstream(
        GatewayConfig::builder("n1", "unused")
            .clock(Arc::clone(&clock))
            .breaker_failure_threshold(5)
            .build(),
        upstream,
        EventListeners::new(),
    );

    let err = gateway.fetch_all_lines().await.unwrap_err();

    assert!(matches!(err, CoreError::UpstreamFatalStatus { status: 404 }));
    // Exactly one upstream hit: the retry executor never retries a
    // non-retryable error.
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // One failure isn't enough to trip a threshold-5 breaker.
    assert_eq!(
        gateway.inspect_breaker().await,
        tube_circuitbreaker::CircuitState::Closed
    );

    // A second fatal call advances the failure count further without ever
    // tripping it open below the configured threshold.
    let err2 = gateway.fetch_all_lines().await.unwrap_err();
    assert!(matches!(err2, CoreError::UpstreamFatalStatus { status: 404 }));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        gateway.inspect_breaker().await,
        tube_circuitbreaker::CircuitState::Closed
    );
}
