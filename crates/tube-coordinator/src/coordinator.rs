use crate::config::CoordinatorConfig;
use crate::events::CoordinatorEvent;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tube_core::{Clock, CoreError, EventListeners, Snapshot};
use tube_gateway::GatewayHandle;
use tube_register::RegisterHandle;

/// The single key this coordinator's register traffic is keyed under. The
/// register itself is key-agnostic (§4.5); this workspace only ever
/// replicates one logical value.
pub const REGISTER_KEY: &str = "tube-status";

/// How much earlier a waiter's internal stale-reply deadline fires than the
/// `ask_timeout` the external `CoordinatorHandle::get_status_with_freshness`
/// wrapper measures from request send. Without this margin the internal
/// path's mailbox round trip means it can never win the race.
const WAITER_DEADLINE_MARGIN: Duration = Duration::from_millis(20);

/// A coordinator reply: the snapshot plus whether it satisfied the
/// requester's freshness bound (§4.6, §6.1 `meta.stale`).
#[derive(Debug, Clone)]
pub struct StatusReply {
    pub snapshot: Snapshot,
    pub stale: bool,
}

struct Waiter {
    id: u64,
    max_age_ms: u64,
    reply: oneshot::Sender<Result<StatusReply, CoreError>>,
}

enum CoordinatorMsg {
    GetStatus {
        reply: oneshot::Sender<Result<StatusReply, CoreError>>,
    },
    GetStatusWithFreshness {
        max_age_ms: u64,
        reply: oneshot::Sender<Result<StatusReply, CoreError>>,
    },
    RefreshTick,
    TriggerRefresh,
    FetchComplete(Result<Snapshot, CoreError>),
    PeerUpdate(Snapshot),
    DrainStaleWaiters {
        generation: u64,
    },
    /// A single waiter's `askTimeout` elapsed (§3, §4.6: "a reply handle,
    /// and a deadline"). Fires before the batch `DrainStaleWaiters` safety
    /// net in the common case, since `drainTimeout` must exceed
    /// `askTimeout` (§6.3).
    WaiterDeadline {
        id: u64,
    },
    /// Explicit shutdown request (§4.6 "Shutdown"): stop accepting work,
    /// reply to every still-queued waiter with `Unavailable`, then ack.
    Shutdown {
        ack: oneshot::Sender<()>,
    },
}

/// A cheaply-cloneable handle to the coordinator actor (C6, §4.6).
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<CoordinatorMsg>,
    ask_timeout: Duration,
}

impl CoordinatorHandle {
    /// Returns `local` immediately, whatever its age (§4.6 `GetStatus`).
    pub async fn get_status(&self) -> Result<StatusReply, CoreError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(CoordinatorMsg::GetStatus { reply })
            .await
            .map_err(|_| CoreError::Unavailable)?;
        rx.await.unwrap_or(Err(CoreError::Unavailable))
    }

    /// Returns `local` if fresh enough, otherwise waits (bounded by
    /// `askTimeout`) for a refresh to land (§4.6 `GetStatusWithFreshness`).
    pub async fn get_status_with_freshness(
        &self,
        max_age_ms: u64,
    ) -> Result<StatusReply, CoreError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(CoordinatorMsg::GetStatusWithFreshness { max_age_ms, reply })
            .await
            .map_err(|_| CoreError::Unavailable)?;

        match tokio::time::timeout(self.ask_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CoreError::Unavailable),
            Err(_) => Err(CoreError::Timeout),
        }
    }

    /// Fire-and-forget explicit refresh request (§4.6 `TriggerRefresh`).
    pub fn trigger_refresh(&self) {
        let _ = self.tx.try_send(CoordinatorMsg::TriggerRefresh);
    }

    /// True once the coordinator has any local snapshot at all. A cheap
    /// proxy for cluster readiness (§7: "Readiness goes false" on cold
    /// start with upstream down).
    pub async fn is_ready(&self) -> bool {
        self.get_status().await.is_ok()
    }

    /// Stops the coordinator's processing loop: still-queued waiters are
    /// replied to with `Unavailable`, no further messages are accepted, and
    /// this resolves once the loop has acknowledged (§4.6 "Shutdown"). A
    /// no-op, resolving immediately, if the loop has already exited.
    pub async fn shutdown(&self) {
        let (ack, rx) = oneshot::channel();
        if self.tx.send(CoordinatorMsg::Shutdown { ack }).await.is_err() {
            return;
        }
        let _ = rx.await;
    }
}

/// Spawns the coordinator actor, wiring it to the gateway (C4) and the
/// replicated register (C5) it was given.
pub fn spawn(
    config: CoordinatorConfig,
    gateway: GatewayHandle,
    register: RegisterHandle<Snapshot>,
    event_listeners: EventListeners<CoordinatorEvent>,
    clock: Arc<dyn Clock>,
) -> (CoordinatorHandle, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(config.mailbox_capacity);
    let ask_timeout = config.ask_timeout;

    spawn_refresh_ticker(tx.clone(), config.refresh_interval, config.refresh_jitter);
    spawn_peer_update_bridge(tx.clone(), register.clone());

    let join = tokio::spawn(run(
        rx,
        tx.clone(),
        config,
        gateway,
        register,
        event_listeners,
        clock,
    ));

    (CoordinatorHandle { tx, ask_timeout }, join)
}

fn spawn_refresh_ticker(tx: mpsc::Sender<CoordinatorMsg>, interval: Duration, jitter: Duration) {
    tokio::spawn(async move {
        loop {
            let jitter_ms = if jitter.is_zero() {
                0
            } else {
                rand::rng().random_range(0..=jitter.as_millis() as u64)
            };
            tokio::time::sleep(interval + Duration::from_millis(jitter_ms)).await;
            if tx.send(CoordinatorMsg::RefreshTick).await.is_err() {
                break;
            }
        }
    });
}

fn spawn_peer_update_bridge(tx: mpsc::Sender<CoordinatorMsg>, register: RegisterHandle<Snapshot>) {
    tokio::spawn(async move {
        let Ok(mut sub) = register.subscribe(REGISTER_KEY).await else {
            return;
        };
        loop {
            match sub.recv().await {
                Ok(snapshot) => {
                    if tx.send(CoordinatorMsg::PeerUpdate(snapshot)).await.is_err() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// The processing loop's private state (§4.6: "owned state is private and
/// mutated only by this component's single processing loop").
struct State {
    local: Option<Snapshot>,
    refresh_in_flight: bool,
    waiters: Vec<Waiter>,
    drain_generation: u64,
    next_waiter_id: u64,
}

/// Bundles the handles and config every message-handling function needs, so
/// individual handlers take one argument instead of six.
struct Ctx<'a> {
    tx: &'a mpsc::Sender<CoordinatorMsg>,
    gateway: &'a GatewayHandle,
    register: &'a RegisterHandle<Snapshot>,
    config: &'a CoordinatorConfig,
    events: &'a EventListeners<CoordinatorEvent>,
    clock: &'a Arc<dyn Clock>,
}

async fn run(
    mut rx: mpsc::Receiver<CoordinatorMsg>,
    tx: mpsc::Sender<CoordinatorMsg>,
    config: CoordinatorConfig,
    gateway: GatewayHandle,
    register: RegisterHandle<Snapshot>,
    events: EventListeners<CoordinatorEvent>,
    clock: Arc<dyn Clock>,
) {
    let mut state = State {
        local: None,
        refresh_in_flight: false,
        waiters: Vec::new(),
        drain_generation: 0,
        next_waiter_id: 0,
    };
    let ctx = Ctx {
        tx: &tx,
        gateway: &gateway,
        register: &register,
        config: &config,
        events: &events,
        clock: &clock,
    };

    while let Some(msg) = rx.recv().await {
        match msg {
            CoordinatorMsg::GetStatus { reply } => {
                let result = match &state.local {
                    Some(snapshot) => Ok(StatusReply {
                        snapshot: snapshot.clone(),
                        stale: false,
                    }),
                    None => Err(CoreError::Unavailable),
                };
                let _ = reply.send(result);
            }

            CoordinatorMsg::GetStatusWithFreshness { max_age_ms, reply } => {
                handle_get_status_with_freshness(&mut state, &ctx, max_age_ms, reply);
            }

            CoordinatorMsg::TriggerRefresh => {
                maybe_start_fetch(&mut state, &ctx, "trigger");
            }

            CoordinatorMsg::RefreshTick => {
                handle_refresh_tick(&mut state, &ctx).await;
            }

            CoordinatorMsg::FetchComplete(result) => {
                handle_fetch_complete(&mut state, &ctx, result);
            }

            CoordinatorMsg::PeerUpdate(snapshot) => {
                handle_peer_update(&mut state, &ctx, snapshot);
            }

            CoordinatorMsg::DrainStaleWaiters { generation } => {
                if generation == state.drain_generation {
                    drain_waiters(&mut state, &ctx);
                }
            }

            CoordinatorMsg::WaiterDeadline { id } => {
                handle_waiter_deadline(&mut state, &ctx, id);
            }

            CoordinatorMsg::Shutdown { ack } => {
                shutdown(&mut state, &ctx);
                let _ = ack.send(());
                break;
            }
        }
    }
}

fn age_ms(snapshot: &Snapshot, clock: &Arc<dyn Clock>) -> i64 {
    snapshot.age_ms(clock.utc_now())
}

fn handle_get_status_with_freshness(
    state: &mut State,
    ctx: &Ctx<'_>,
    max_age_ms: u64,
    reply: oneshot::Sender<Result<StatusReply, CoreError>>,
) {
    if let Some(snapshot) = &state.local {
        let age = age_ms(snapshot, ctx.clock);
        if age <= max_age_ms as i64 {
            let _ = reply.send(Ok(StatusReply {
                snapshot: snapshot.clone(),
                stale: false,
            }));
            if age >= ctx.config.background_refresh_threshold.as_millis() as i64 {
                maybe_start_fetch(state, ctx, "background_warm");
            }
            return;
        }
    }

    let was_empty = state.waiters.is_empty();
    let id = state.next_waiter_id;
    state.next_waiter_id += 1;
    state.waiters.push(Waiter {
        id,
        max_age_ms,
        reply,
    });
    ctx.events.emit(&CoordinatorEvent::WaiterEnqueued {
        node_id: ctx.config.node_id.clone(),
        timestamp: ctx.clock.now(),
        queue_len: state.waiters.len(),
    });

    // Per-waiter deadline (§3/§4.6): this waiter gets its own stale reply
    // at `askTimeout`, independent of the batch drain safety net below.
    // `CoordinatorHandle::get_status_with_freshness` starts its own
    // `ask_timeout` clock before this message even reaches the mailbox, so
    // sleeping the full `ask_timeout` here would lose the race and surface
    // as `CoreError::Timeout` instead of a stale reply. Shave a small margin
    // off so the internal deadline always fires first.
    let tx = ctx.tx.clone();
    let internal_deadline = ctx.config.ask_timeout.saturating_sub(WAITER_DEADLINE_MARGIN);
    tokio::spawn(async move {
        tokio::time::sleep(internal_deadline).await;
        let _ = tx.send(CoordinatorMsg::WaiterDeadline { id }).await;
    });

    if was_empty {
        state.drain_generation += 1;
        let generation = state.drain_generation;
        let tx = ctx.tx.clone();
        let drain_timeout = ctx.config.drain_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(drain_timeout).await;
            let _ = tx
                .send(CoordinatorMsg::DrainStaleWaiters { generation })
                .await;
        });
    }

    maybe_start_fetch(state, ctx, "waiter");
}

/// A single waiter's `askTimeout` elapsed before the fetch it is attached to
/// completed (§4.6: "if this node reaches its per-request deadline first,
/// reply with the (stale) `local` marked stale"). Replies with whatever
/// `local` now holds, stale if present, `Unavailable` if the cache is still
/// empty; a no-op if the waiter was already satisfied or drained.
fn handle_waiter_deadline(state: &mut State, ctx: &Ctx<'_>, id: u64) {
    let Some(pos) = state.waiters.iter().position(|w| w.id == id) else {
        return;
    };
    let waiter = state.waiters.remove(pos);

    let reply = match &state.local {
        Some(snapshot) => Ok(StatusReply {
            snapshot: snapshot.clone(),
            stale: true,
        }),
        None => Err(CoreError::Unavailable),
    };
    let _ = waiter.reply.send(reply);

    ctx.events.emit(&CoordinatorEvent::WaiterDeadlineElapsed {
        node_id: ctx.config.node_id.clone(),
        timestamp: ctx.clock.now(),
    });
}

/// Starts a fetch if one isn't already in flight. Shared by the waiter path,
/// the background-warm fast path, `TriggerRefresh`, and the periodic timer.
/// This is the enforcement point for the single-flight invariant (§8 P3):
/// `refresh_in_flight` is owned exclusively by this actor's loop, so no
/// synchronization beyond the mailbox is needed.
fn maybe_start_fetch(state: &mut State, ctx: &Ctx<'_>, trigger: &'static str) {
    if state.refresh_in_flight {
        return;
    }
    state.refresh_in_flight = true;

    ctx.events.emit(&CoordinatorEvent::RefreshStarted {
        node_id: ctx.config.node_id.clone(),
        timestamp: ctx.clock.now(),
        trigger,
    });

    let gateway = ctx.gateway.clone();
    let tx = ctx.tx.clone();
    tokio::spawn(async move {
        let result = gateway.fetch_all_lines().await;
        let _ = tx.send(CoordinatorMsg::FetchComplete(result)).await;
    });
}

async fn handle_refresh_tick(state: &mut State, ctx: &Ctx<'_>) {
    if let Ok(Some(peer_snapshot)) = ctx.register.read(REGISTER_KEY).await {
        let fresher_than_local = match &state.local {
            None => true,
            Some(local) => peer_snapshot.queried_at() > local.queried_at(),
        };
        let recent_enough =
            age_ms(&peer_snapshot, ctx.clock) <= ctx.config.recent_enough_threshold.as_millis() as i64;
        if fresher_than_local && recent_enough {
            state.local = Some(peer_snapshot);
            ctx.events
                .emit(&CoordinatorEvent::PeriodicTickSkippedFetch {
                    node_id: ctx.config.node_id.clone(),
                    timestamp: ctx.clock.now(),
                });
            return;
        }
    }

    maybe_start_fetch(state, ctx, "periodic");
}

fn handle_fetch_complete(state: &mut State, ctx: &Ctx<'_>, result: Result<Snapshot, CoreError>) {
    state.refresh_in_flight = false;
    state.drain_generation += 1;

    match result {
        Ok(snapshot) => {
            let register = ctx.register.clone();
            let published = snapshot.clone();
            tokio::spawn(async move {
                let _ = register.write(REGISTER_KEY, published).await;
            });

            state.local = Some(snapshot.clone());

            let satisfied = state.waiters.len();
            for waiter in state.waiters.drain(..) {
                let age = age_ms(&snapshot, ctx.clock);
                let stale = age > waiter.max_age_ms as i64;
                let _ = waiter.reply.send(Ok(StatusReply {
                    snapshot: snapshot.clone(),
                    stale,
                }));
            }

            ctx.events.emit(&CoordinatorEvent::RefreshSucceeded {
                node_id: ctx.config.node_id.clone(),
                timestamp: ctx.clock.now(),
                waiters_satisfied: satisfied,
            });
        }
        Err(_e) => {
            let satisfied = state.waiters.len();
            for waiter in state.waiters.drain(..) {
                let reply = match &state.local {
                    Some(snapshot) => Ok(StatusReply {
                        snapshot: snapshot.clone(),
                        stale: true,
                    }),
                    None => Err(CoreError::Unavailable),
                };
                let _ = waiter.reply.send(reply);
            }

            ctx.events.emit(&CoordinatorEvent::RefreshFailed {
                node_id: ctx.config.node_id.clone(),
                timestamp: ctx.clock.now(),
                waiters_satisfied: satisfied,
            });
        }
    }
}

/// Applies a peer-propagated snapshot (§4.6 peer update path). A fresher
/// peer value both updates `local` and can satisfy queued waiters directly
/// ("fetch avoidance", §8 P11) without touching the gateway at all.
fn handle_peer_update(state: &mut State, ctx: &Ctx<'_>, snapshot: Snapshot) {
    let should_apply = match &state.local {
        None => true,
        Some(local) => snapshot.queried_at() > local.queried_at(),
    };
    if should_apply {
        state.local = Some(snapshot.clone());
    }

    let snapshot_age = age_ms(&snapshot, ctx.clock);
    let (satisfied, remaining): (Vec<Waiter>, Vec<Waiter>) = state
        .waiters
        .drain(..)
        .partition(|w| snapshot_age <= w.max_age_ms as i64);
    state.waiters = remaining;

    let satisfied_count = satisfied.len();
    for waiter in satisfied {
        let _ = waiter.reply.send(Ok(StatusReply {
            snapshot: snapshot.clone(),
            stale: false,
        }));
    }

    if satisfied_count > 0 {
        ctx.events.emit(&CoordinatorEvent::PeerUpdateApplied {
            node_id: ctx.config.node_id.clone(),
            timestamp: ctx.clock.now(),
            waiters_satisfied: satisfied_count,
        });
    }
}

/// The drain-timer safety net (§4.6, §8 P10): every queued waiter gets a
/// reply — stale `local` if any exists, `Unavailable` otherwise — no later
/// than `drainTimeout` after the batch it belongs to was opened.
fn drain_waiters(state: &mut State, ctx: &Ctx<'_>) {
    let count = state.waiters.len();
    for waiter in state.waiters.drain(..) {
        let reply = match &state.local {
            Some(snapshot) => Ok(StatusReply {
                snapshot: snapshot.clone(),
                stale: true,
            }),
            None => Err(CoreError::Unavailable),
        };
        let _ = waiter.reply.send(reply);
    }
    if count > 0 {
        ctx.events.emit(&CoordinatorEvent::WaitersDrained {
            node_id: ctx.config.node_id.clone(),
            timestamp: ctx.clock.now(),
            count,
        });
    }
}

/// Stops accepting new work and replies `Unavailable` to every waiter still
/// in the queue (§4.6 "Shutdown"). Callers break the processing loop right
/// after this returns; any fetch already in flight simply has its eventual
/// `FetchComplete` dropped on the floor once the mailbox closes.
fn shutdown(state: &mut State, ctx: &Ctx<'_>) {
    let dropped = state.waiters.len();
    for waiter in state.waiters.drain(..) {
        let _ = waiter.reply.send(Err(CoreError::Unavailable));
    }
    ctx.events.emit(&CoordinatorEvent::ShutdownCompleted {
        node_id: ctx.config.node_id.clone(),
        timestamp: ctx.clock.now(),
        waiters_dropped: dropped,
    });
}
