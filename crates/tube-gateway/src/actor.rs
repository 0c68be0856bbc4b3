use crate::config::GatewayConfig;
use crate::error::to_core_error;
use crate::events::GatewayEvent;
use chrono::NaiveDate;
use std::sync::Arc;
use tokio::sync::oneshot;
use tower::{Service, ServiceExt};
use tube_circuitbreaker::{CircuitBreakerLayer, CircuitState};
use tube_core::{Clock, CoreError, EventListeners, LineRecord, Snapshot};
use tube_retry::{RetryError, RetryLayer};
use tube_upstream_http::{UpstreamClient, UpstreamError, UpstreamRequest};

/// The circuit-breaker-over-retry-over-upstream stack, generic over the
/// innermost upstream transport so tests can swap in a fake (§4.4 composes
/// `circuit.execute(retry.execute(http.get))`).
type GatewayStack<U> = tube_circuitbreaker::CircuitBreaker<
    tube_retry::Retry<U, UpstreamRequest, UpstreamError>,
    UpstreamRequest,
    Vec<LineRecord>,
    RetryError<UpstreamError>,
>;

enum GatewayMsg {
    FetchAllLines {
        reply: oneshot::Sender<Result<Snapshot, CoreError>>,
    },
    FetchLineDateRange {
        line_id: String,
        from: NaiveDate,
        to: NaiveDate,
        reply: oneshot::Sender<Result<Snapshot, CoreError>>,
    },
    InspectBreaker {
        reply: oneshot::Sender<CircuitState>,
    },
    /// Explicit shutdown request (§4.6 "Shutdown"): stop accepting work,
    /// fail every request still sitting in the mailbox with `Unavailable`,
    /// then ack.
    Shutdown {
        ack: oneshot::Sender<()>,
    },
}

/// A cheaply-cloneable handle to the gateway actor (C4, §4.4). All calls go
/// through a single mailbox, so the gateway's own fetches are naturally
/// serialised — "defence in depth" coalescing behind the coordinator's
/// primary coalescing (§4.4).
#[derive(Clone)]
pub struct GatewayHandle {
    tx: tokio::sync::mpsc::Sender<GatewayMsg>,
}

impl GatewayHandle {
    /// Fetches the whole-network snapshot (§4.4 `FetchAllLines`).
    pub async fn fetch_all_lines(&self) -> Result<Snapshot, CoreError> {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(GatewayMsg::FetchAllLines { reply })
            .await
            .is_err()
        {
            return Err(CoreError::Unavailable);
        }
        rx.await.unwrap_or(Err(CoreError::Unavailable))
    }

    /// Fetches a single line's status over a date range, bypassing the
    /// cache entirely (§4.4 `FetchLineWithDateRange`, §4.7).
    pub async fn fetch_line_date_range(
        &self,
        line_id: impl Into<String>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Snapshot, CoreError> {
        let (reply, rx) = oneshot::channel();
        let msg = GatewayMsg::FetchLineDateRange {
            line_id: line_id.into(),
            from,
            to,
            reply,
        };
        if self.tx.send(msg).await.is_err() {
            return Err(CoreError::Unavailable);
        }
        rx.await.unwrap_or(Err(CoreError::Unavailable))
    }

    /// Returns the breaker's current state (§4.4 `InspectBreaker`).
    pub async fn inspect_breaker(&self) -> CircuitState {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(GatewayMsg::InspectBreaker { reply })
            .await
            .is_err()
        {
            return CircuitState::Open;
        }
        rx.await.unwrap_or(CircuitState::Open)
    }

    /// Stops the gateway's processing loop: anything still queued in the
    /// mailbox fails with `Unavailable`, no further requests are accepted,
    /// and this resolves once the loop has acknowledged (§4.6 "Shutdown").
    /// A no-op, resolving immediately, if the loop has already exited.
    pub async fn shutdown(&self) {
        let (ack, rx) = oneshot::channel();
        if self.tx.send(GatewayMsg::Shutdown { ack }).await.is_err() {
            return;
        }
        let _ = rx.await;
    }
}

/// Spawns the gateway actor against the real upstream HTTP client.
pub fn spawn(
    config: GatewayConfig,
    event_listeners: EventListeners<GatewayEvent>,
) -> (GatewayHandle, tokio::task::JoinHandle<()>) {
    let upstream = UpstreamClient::new(config.base_url.clone());
    spawn_with_upstream(config, upstream, event_listeners)
}

/// Spawns the gateway actor against a caller-supplied upstream service.
/// Production code uses [`spawn`]; tests inject a fake transport here to
/// exercise the breaker/retry composition deterministically (§4.4, §4.3).
///
/// The task owns the resulting stack and processes exactly one message at a
/// time (§5: "logical single-threaded processor").
pub fn spawn_with_upstream<U>(
    config: GatewayConfig,
    upstream: U,
    event_listeners: EventListeners<GatewayEvent>,
) -> (GatewayHandle, tokio::task::JoinHandle<()>)
where
    U: Service<UpstreamRequest, Response = Vec<LineRecord>, Error = UpstreamError>
        + Clone
        + Send
        + 'static,
    U::Future: Send + 'static,
{
    let (tx, rx) = tokio::sync::mpsc::channel(config.mailbox_capacity);

    let retry_layer = RetryLayer::<UpstreamError>::builder()
        .max_attempts(config.retry_max_attempts)
        .base_delay(config.retry_base_delay)
        .max_delay(config.retry_max_delay)
        .jitter(config.retry_jitter)
        .clock(Arc::clone(&config.clock))
        .retryable(UpstreamError::is_retryable)
        .retry_after_hint(UpstreamError::retry_after)
        .name(format!("{}-upstream-retry", config.node_id))
        .build();

    let circuit_layer =
        CircuitBreakerLayer::<Vec<LineRecord>, RetryError<UpstreamError>>::builder()
            .failure_threshold(config.breaker_failure_threshold)
            .wait_duration_in_open(config.breaker_open_duration)
            .permitted_calls_in_half_open(config.breaker_half_open_probes)
            .clock(Arc::clone(&config.clock))
            .name(format!("{}-upstream-breaker", config.node_id))
            .build();

    let stack: GatewayStack<U> = circuit_layer.layer(retry_layer.layer(upstream));

    let node_id = config.node_id.clone();
    let clock = Arc::clone(&config.clock);
    let join = tokio::spawn(run(rx, stack, node_id, clock, event_listeners));

    (GatewayHandle { tx }, join)
}

async fn run<U>(
    mut rx: tokio::sync::mpsc::Receiver<GatewayMsg>,
    mut stack: GatewayStack<U>,
    node_id: String,
    clock: Arc<dyn Clock>,
    events: EventListeners<GatewayEvent>,
) where
    U: Service<UpstreamRequest, Response = Vec<LineRecord>, Error = UpstreamError>
        + Clone
        + Send
        + 'static,
    U::Future: Send + 'static,
{
    while let Some(msg) = rx.recv().await {
        match msg {
            GatewayMsg::FetchAllLines { reply } => {
                let result = call(
                    &mut stack,
                    UpstreamRequest::AllLines,
                    "all_lines",
                    &node_id,
                    &clock,
                    &events,
                )
                .await;
                let _ = reply.send(result);
            }
            GatewayMsg::FetchLineDateRange {
                line_id,
                from,
                to,
                reply,
            } => {
                let req = UpstreamRequest::LineDateRange { line_id, from, to };
                let result = call(
                    &mut stack,
                    req,
                    "line_date_range",
                    &node_id,
                    &clock,
                    &events,
                )
                .await;
                let _ = reply.send(result);
            }
            GatewayMsg::InspectBreaker { reply } => {
                let _ = reply.send(stack.state_sync());
            }
            GatewayMsg::Shutdown { ack } => {
                let dropped = drain_mailbox(&mut rx);
                events.emit(&GatewayEvent::ShutdownCompleted {
                    node_id: node_id.clone(),
                    timestamp: clock.now(),
                    dropped,
                });
                let _ = ack.send(());
                break;
            }
        }
    }
}

/// Fails every request still sitting in the mailbox with `Unavailable` and
/// returns how many were dropped. Called once, right before a gateway's
/// processing loop exits on `Shutdown`.
fn drain_mailbox(rx: &mut tokio::sync::mpsc::Receiver<GatewayMsg>) -> usize {
    let mut dropped = 0;
    while let Ok(msg) = rx.try_recv() {
        dropped += 1;
        match msg {
            GatewayMsg::FetchAllLines { reply } => {
                let _ = reply.send(Err(CoreError::Unavailable));
            }
            GatewayMsg::FetchLineDateRange { reply, .. } => {
                let _ = reply.send(Err(CoreError::Unavailable));
            }
            GatewayMsg::InspectBreaker { reply } => {
                let _ = reply.send(CircuitState::Open);
            }
            GatewayMsg::Shutdown { ack } => {
                let _ = ack.send(());
            }
        }
    }
    dropped
}

async fn call<U>(
    stack: &mut GatewayStack<U>,
    req: UpstreamRequest,
    kind: &'static str,
    node_id: &str,
    clock: &Arc<dyn Clock>,
    events: &EventListeners<GatewayEvent>,
) -> Result<Snapshot, CoreError>
where
    U: Service<UpstreamRequest, Response = Vec<LineRecord>, Error = UpstreamError>
        + Clone
        + Send
        + 'static,
    U::Future: Send + 'static,
{
    events.emit(&GatewayEvent::FetchStarted {
        node_id: node_id.to_string(),
        timestamp: clock.now(),
        kind,
    });

    let ready = match stack.ready().await {
        Ok(svc) => svc,
        Err(e) => {
            let core_err = to_core_error(e);
            events.emit(&GatewayEvent::FetchFailed {
                node_id: node_id.to_string(),
                timestamp: clock.now(),
                kind,
                error_kind: error_kind_label(&core_err),
            });
            return Err(core_err);
        }
    };

    match ready.call(req).await {
        Ok(lines) => {
            events.emit(&GatewayEvent::FetchSucceeded {
                node_id: node_id.to_string(),
                timestamp: clock.now(),
                kind,
                line_count: lines.len(),
            });
            Ok(Snapshot::new(lines, clock.utc_now(), node_id.to_string()))
        }
        Err(e) => {
            let core_err = to_core_error(e);
            events.emit(&GatewayEvent::FetchFailed {
                node_id: node_id.to_string(),
                timestamp: clock.now(),
                kind,
                error_kind: error_kind_label(&core_err),
            });
            Err(core_err)
        }
    }
}

fn error_kind_label(err: &CoreError) -> &'static str {
    match err {
        CoreError::TransportError(_) => "transport_error",
        CoreError::UpstreamRetryableStatus { .. } => "upstream_retryable_status",
        CoreError::UpstreamFatalStatus { .. } => "upstream_fatal_status",
        CoreError::CircuitRefused { .. } => "circuit_refused",
        CoreError::RetriesExhausted { .. } => "retries_exhausted",
        CoreError::Unavailable => "unavailable",
        CoreError::BadRequest(_) => "bad_request",
        CoreError::NotFound(_) => "not_found",
        CoreError::Timeout => "timeout",
    }
}
