use crate::config::RegisterConfig;
use crate::error::RegisterError;
use crate::events::RegisterEvent;
use crate::mergeable::Mergeable;
use crate::transport::{PeerId, PeerTransport};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tube_core::{Clock, EventListeners};

/// The result of a [`RegisterHandle::write`] (§4.5: "acknowledgement should
/// indicate when at least a majority of currently-reachable peers have
/// observed the write").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteAck {
    pub acked: usize,
    pub total_peers: usize,
    pub majority_reached: bool,
}

pub(crate) enum RegisterMsg<V> {
    Write {
        key: String,
        value: V,
        reply: Option<oneshot::Sender<WriteAck>>,
    },
    Read {
        key: String,
        reply: oneshot::Sender<Option<V>>,
    },
    Subscribe {
        key: String,
        reply: oneshot::Sender<broadcast::Receiver<V>>,
    },
    /// A value pushed by a peer's gossip. `ack` fires once merge has been
    /// attempted (regardless of whether it superseded anything), so the
    /// sender's transport can count it toward the write's majority.
    PeerUpdate {
        key: String,
        value: V,
        ack: Option<oneshot::Sender<()>>,
    },
}

/// A cheaply-cloneable handle to a register actor (C5, §4.5).
#[derive(Clone)]
pub struct RegisterHandle<V> {
    tx: mpsc::Sender<RegisterMsg<V>>,
}

impl<V> RegisterHandle<V>
where
    V: Mergeable + Clone + Send + Sync + 'static,
{
    /// Inserts `value` under `key`, merging locally and gossiping to every
    /// known peer. Returns once a majority of reachable peers have acked or
    /// `writeMajorityTimeout` elapses, whichever comes first; gossip to the
    /// remaining peers continues in the background either way.
    pub async fn write(&self, key: impl Into<String>, value: V) -> Result<WriteAck, RegisterError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RegisterMsg::Write {
                key: key.into(),
                value,
                reply: Some(reply),
            })
            .await
            .map_err(|_| RegisterError::Unavailable)?;
        rx.await.map_err(|_| RegisterError::Unavailable)
    }

    /// Reads the locally-converged value. Never blocks on peers.
    pub async fn read(&self, key: impl Into<String>) -> Result<Option<V>, RegisterError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RegisterMsg::Read {
                key: key.into(),
                reply,
            })
            .await
            .map_err(|_| RegisterError::Unavailable)?;
        rx.await.map_err(|_| RegisterError::Unavailable)
    }

    /// Subscribes to merged updates for `key`. The returned receiver yields
    /// every value that wins a merge from this point on, local or peer.
    pub async fn subscribe(
        &self,
        key: impl Into<String>,
    ) -> Result<broadcast::Receiver<V>, RegisterError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RegisterMsg::Subscribe {
                key: key.into(),
                reply,
            })
            .await
            .map_err(|_| RegisterError::Unavailable)?;
        rx.await.map_err(|_| RegisterError::Unavailable)
    }

    pub(crate) fn raw_sender(&self) -> mpsc::Sender<RegisterMsg<V>> {
        self.tx.clone()
    }
}

/// Spawns a register actor (C5). `transport` drives gossip fan-out on every
/// successful local write; peer values arrive back through the same
/// transport's wiring (see [`crate::loopback`] for the in-process case).
pub fn spawn<V>(
    config: RegisterConfig,
    transport: Arc<dyn PeerTransport<V>>,
    event_listeners: EventListeners<RegisterEvent>,
    clock: Arc<dyn Clock>,
) -> (RegisterHandle<V>, tokio::task::JoinHandle<()>)
where
    V: Mergeable + Clone + Send + Sync + 'static,
{
    let (tx, rx) = mpsc::channel(config.mailbox_capacity);
    let handle = RegisterHandle { tx };
    let join = tokio::spawn(run(rx, config, transport, event_listeners, clock));
    (handle, join)
}

/// A key's converged value plus the subscriber fan-out for it. `value` is
/// `None` until the first write or peer update for this key arrives, but the
/// subscriber channel is created eagerly so `subscribe` never races a write.
struct KeyState<V> {
    value: Option<V>,
    subscribers: broadcast::Sender<V>,
}

async fn run<V>(
    mut rx: mpsc::Receiver<RegisterMsg<V>>,
    config: RegisterConfig,
    transport: Arc<dyn PeerTransport<V>>,
    events: EventListeners<RegisterEvent>,
    clock: Arc<dyn Clock>,
) where
    V: Mergeable + Clone + Send + Sync + 'static,
{
    let mut state: HashMap<String, KeyState<V>> = HashMap::new();
    let subscriber_capacity = config.subscriber_capacity;

    while let Some(msg) = rx.recv().await {
        match msg {
            RegisterMsg::Write { key, value, reply } => {
                let merged = merge_in(&mut state, &key, value.clone(), subscriber_capacity);
                emit_merge_event(&events, &config.node_id, clock.as_ref(), &key, merged);

                let peers = transport.peers();
                let total_peers = peers.len();
                let node_id = config.node_id.clone();
                let key_for_task = key.clone();
                let transport = Arc::clone(&transport);
                let timeout = config.write_majority_timeout;
                let events = events.clone();
                let clock_for_task = Arc::clone(&clock);

                tokio::spawn(async move {
                    let ack = gossip_and_await_majority(
                        transport,
                        peers,
                        key_for_task.clone(),
                        value,
                        timeout,
                    )
                    .await;
                    events.emit(&RegisterEvent::GossipSettled {
                        node_id,
                        timestamp: clock_for_task.now(),
                        key: key_for_task,
                        acked: ack.acked,
                        total_peers,
                        majority_reached: ack.majority_reached,
                    });
                    if let Some(reply) = reply {
                        let _ = reply.send(ack);
                    }
                });
            }
            RegisterMsg::Read { key, reply } => {
                let value = state.get(&key).and_then(|s| s.value.clone());
                let _ = reply.send(value);
            }
            RegisterMsg::Subscribe { key, reply } => {
                let entry = state.entry(key).or_insert_with(|| KeyState {
                    value: None,
                    subscribers: broadcast::channel(subscriber_capacity).0,
                });
                let _ = reply.send(entry.subscribers.subscribe());
            }
            RegisterMsg::PeerUpdate { key, value, ack } => {
                let merged = merge_in(&mut state, &key, value, subscriber_capacity);
                emit_merge_event(&events, &config.node_id, clock.as_ref(), &key, merged);
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            }
        }
    }
}

fn emit_merge_event(
    events: &EventListeners<RegisterEvent>,
    node_id: &str,
    clock: &dyn Clock,
    key: &str,
    merged: bool,
) {
    let event = if merged {
        RegisterEvent::Merged {
            node_id: node_id.to_string(),
            timestamp: clock.now(),
            key: key.to_string(),
        }
    } else {
        RegisterEvent::Superseded {
            node_id: node_id.to_string(),
            timestamp: clock.now(),
            key: key.to_string(),
        }
    };
    events.emit(&event);
}

/// Merges `value` into `state[key]`, creating the key if absent. Returns
/// `true` if the new value won (was applied), `false` if it lost the LWW
/// comparison and was dropped.
fn merge_in<V>(
    state: &mut HashMap<String, KeyState<V>>,
    key: &str,
    value: V,
    subscriber_capacity: usize,
) -> bool
where
    V: Mergeable + Clone,
{
    let entry = state.entry(key.to_string()).or_insert_with(|| KeyState {
        value: None,
        subscribers: broadcast::channel(subscriber_capacity).0,
    });

    let wins = match &entry.value {
        None => true,
        Some(existing) => value.supersedes(existing),
    };

    if wins {
        entry.value = Some(value.clone());
        let _ = entry.subscribers.send(value);
    }
    wins
}

async fn gossip_and_await_majority<V>(
    transport: Arc<dyn PeerTransport<V>>,
    peers: Vec<PeerId>,
    key: String,
    value: V,
    timeout: std::time::Duration,
) -> WriteAck
where
    V: Clone + Send + Sync + 'static,
{
    let total_peers = peers.len();
    if total_peers == 0 {
        return WriteAck {
            acked: 0,
            total_peers: 0,
            majority_reached: true,
        };
    }

    let majority = total_peers / 2 + 1;
    let sends = peers.into_iter().map(|peer| {
        let transport = Arc::clone(&transport);
        let key = key.clone();
        let value = value.clone();
        transport.send(peer, key, value)
    });

    let fan_out = futures::future::join_all(sends);
    let acked = match tokio::time::timeout(timeout, fan_out).await {
        Ok(results) => results.into_iter().filter(|r| r.is_ok()).count(),
        Err(_) => 0,
    };

    WriteAck {
        acked,
        total_peers,
        majority_reached: acked >= majority,
    }
}
