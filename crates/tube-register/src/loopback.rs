use crate::register::{RegisterHandle, RegisterMsg};
use crate::transport::{PeerId, PeerTransport};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::{mpsc, oneshot};

/// An in-process gossip hub connecting several register actors in the same
/// process (single-process multi-node demo, and the workspace-root
/// scenario tests' transport of choice). Production deployments supply a
/// real network [`PeerTransport`] instead.
pub struct LoopbackHub<V> {
    mailboxes: Mutex<HashMap<PeerId, mpsc::Sender<RegisterMsg<V>>>>,
}

impl<V> Default for LoopbackHub<V> {
    fn default() -> Self {
        Self {
            mailboxes: Mutex::new(HashMap::new()),
        }
    }
}

impl<V> LoopbackHub<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `node_id`'s mailbox with the hub so other nodes' transports
    /// can reach it. Call this right after spawning that node's register.
    pub fn join(&self, node_id: impl Into<String>, handle: &RegisterHandle<V>) {
        self.mailboxes
            .lock()
            .expect("loopback hub mutex poisoned")
            .insert(node_id.into(), handle.raw_sender());
    }

    /// Builds the transport a given node should gossip through: every other
    /// joined node is a peer, `self_id` excluded. Takes `Arc<Self>` by value;
    /// callers pass `Arc::clone(&hub)`.
    pub fn transport_for(self: std::sync::Arc<Self>, self_id: impl Into<String>) -> LoopbackTransport<V> {
        LoopbackTransport {
            hub: self,
            self_id: self_id.into(),
        }
    }
}

pub struct LoopbackTransport<V> {
    hub: std::sync::Arc<LoopbackHub<V>>,
    self_id: PeerId,
}

impl<V: Send + Sync + 'static> PeerTransport<V> for LoopbackTransport<V> {
    fn peers(&self) -> Vec<PeerId> {
        self.hub
            .mailboxes
            .lock()
            .expect("loopback hub mutex poisoned")
            .keys()
            .filter(|id| **id != self.self_id)
            .cloned()
            .collect()
    }

    fn send(&self, peer: PeerId, key: String, value: V) -> BoxFuture<'static, Result<(), ()>> {
        let mailbox = self
            .hub
            .mailboxes
            .lock()
            .expect("loopback hub mutex poisoned")
            .get(&peer)
            .cloned();

        Box::pin(async move {
            let Some(mailbox) = mailbox else {
                return Err(());
            };
            let (ack_tx, ack_rx) = oneshot::channel();
            if mailbox
                .send(RegisterMsg::PeerUpdate {
                    key,
                    value,
                    ack: Some(ack_tx),
                })
                .await
                .is_err()
            {
                return Err(());
            }
            ack_rx.await.map_err(|_| ())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegisterConfig;
    use crate::events::RegisterEvent;
    use std::sync::Arc;
    use std::time::Duration;
    use tube_core::{Clock, Snapshot, SystemClock};

    fn snap(secs: i64, by: &str) -> Snapshot {
        Snapshot::new(vec![], chrono::DateTime::from_timestamp(secs, 0).unwrap(), by)
    }

    #[tokio::test]
    async fn write_on_one_node_propagates_to_a_joined_peer() {
        let hub = Arc::new(LoopbackHub::<Snapshot>::new());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let (h1, _j1) = crate::register::spawn(
            RegisterConfig::builder("n1")
                .write_majority_timeout(Duration::from_millis(200))
                .build(),
            Arc::new(Arc::clone(&hub).transport_for("n1")),
            tube_core::EventListeners::<RegisterEvent>::new(),
            Arc::clone(&clock),
        );
        hub.join("n1", &h1);

        let (h2, _j2) = crate::register::spawn(
            RegisterConfig::builder("n2")
                .write_majority_timeout(Duration::from_millis(200))
                .build(),
            Arc::new(Arc::clone(&hub).transport_for("n2")),
            tube_core::EventListeners::<RegisterEvent>::new(),
            Arc::clone(&clock),
        );
        hub.join("n2", &h2);

        let ack = h1.write("tube-status", snap(100, "n1")).await.unwrap();
        assert!(ack.majority_reached);
        assert_eq!(ack.total_peers, 1);

        let seen = h2.read("tube-status").await.unwrap().unwrap();
        assert_eq!(seen.queried_by(), "n1");
    }

    /// P2: a later write always wins, regardless of which node merges it.
    #[tokio::test]
    async fn later_write_wins_over_concurrent_earlier_one() {
        let hub = Arc::new(LoopbackHub::<Snapshot>::new());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let (h1, _j1) = crate::register::spawn(
            RegisterConfig::builder("n1").build(),
            Arc::new(Arc::clone(&hub).transport_for("n1")),
            tube_core::EventListeners::new(),
            Arc::clone(&clock),
        );
        hub.join("n1", &h1);
        let (h2, _j2) = crate::register::spawn(
            RegisterConfig::builder("n2").build(),
            Arc::new(Arc::clone(&hub).transport_for("n2")),
            tube_core::EventListeners::new(),
            Arc::clone(&clock),
        );
        hub.join("n2", &h2);

        h1.write("tube-status", snap(5, "n1")).await.unwrap();
        h2.write("tube-status", snap(10, "n2")).await.unwrap();

        let v1 = h1.read("tube-status").await.unwrap().unwrap();
        let v2 = h2.read("tube-status").await.unwrap().unwrap();
        assert_eq!(v1.queried_by(), "n2");
        assert_eq!(v2.queried_by(), "n2");
    }

    #[tokio::test]
    async fn subscribe_observes_a_later_peer_update() {
        let hub = Arc::new(LoopbackHub::<Snapshot>::new());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let (h1, _j1) = crate::register::spawn(
            RegisterConfig::builder("n1").build(),
            Arc::new(Arc::clone(&hub).transport_for("n1")),
            tube_core::EventListeners::new(),
            Arc::clone(&clock),
        );
        hub.join("n1", &h1);
        let (h2, _j2) = crate::register::spawn(
            RegisterConfig::builder("n2").build(),
            Arc::new(Arc::clone(&hub).transport_for("n2")),
            tube_core::EventListeners::new(),
            Arc::clone(&clock),
        );
        hub.join("n2", &h2);

        let mut rx = h2.subscribe("tube-status").await.unwrap();
        h1.write("tube-status", snap(1, "n1")).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.queried_by(), "n1");
    }
}
