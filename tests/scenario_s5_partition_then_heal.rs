//! S5 — Partition then heal (spec §8, P1/P2).
//!
//! Three nodes. N3 starts partitioned from N1/N2's gossip hub. N1 writes
//! snapshot A while N3 is isolated; N3 writes its own snapshot B a second
//! later. Both sides keep serving local reads during the partition. Once
//! N3 rejoins, all three nodes converge on B, the snapshot with the later
//! `queriedAt`.

mod support;

use std::sync::Arc;
use std::time::Duration;
use chrono::{TimeZone, Utc};
use tube_core::{Clock, EventListeners, Snapshot, SystemClock};
use tube_register::{LoopbackHub, RegisterConfig};

fn snapshot_at(epoch_secs: i64, queried_by: &str) -> Snapshot {
    Snapshot::new(
        Vec::new(),
        Utc.timestamp_opt(epoch_secs, 0).unwrap(),
        queried_by.to_string(),
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn partitioned_node_converges_on_later_snapshot_once_healed() {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let hub = Arc::new(LoopbackHub::<Snapshot>::new());

    let (n1, _j1) = tube_register::spawn(
        RegisterConfig::builder("n1").build(),
        Arc::new(Arc::clone(&hub).transport_for("n1")),
        EventListeners::new(),
        Arc::clone(&clock),
    );
    hub.join("n1", &n1);

    let (n2, _j2) = tube_register::spawn(
        RegisterConfig::builder("n2").build(),
        Arc::new(Arc::clone(&hub).transport_for("n2")),
        EventListeners::new(),
        Arc::clone(&clock),
    );
    hub.join("n2", &n2);

    // N3 is constructed but never joined to the hub yet: it is partitioned
    // from N1/N2 from the start.
    let (n3, _j3) = tube_register::spawn(
        RegisterConfig::builder("n3").build(),
        Arc::new(Arc::clone(&hub).transport_for("n3")),
        EventListeners::new(),
        Arc::clone(&clock),
    );

    // T=0: N1 writes snapshot A, seen by N2 but never reaching N3.
    let snapshot_a = snapshot_at(0, "n1");
    n1.write("tube-status", snapshot_a.clone()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // T=1s: N3 writes its own snapshot B while still isolated.
    let snapshot_b = snapshot_at(1, "n3");
    n3.write("tube-status", snapshot_b.clone()).await.unwrap();

    // T=5s (simulated): both sides still serve local reads.
    assert_eq!(n2.read("tube-status").await.unwrap().unwrap(), snapshot_a);
    assert_eq!(n3.read("tube-status").await.unwrap().unwrap(), snapshot_b);

    // T=10s: the partition heals. N3 rejoins the hub and re-announces its
    // value — the anti-entropy nudge a real transport performs on
    // reconnect; this register has no periodic anti-entropy of its own.
    hub.join("n3", &n3);
    n3.write("tube-status", snapshot_b.clone()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    for (name, handle) in [("n1", &n1), ("n2", &n2), ("n3", &n3)] {
        let converged = handle.read("tube-status").await.unwrap().unwrap();
        assert_eq!(
            converged, snapshot_b,
            "{name} did not converge on the later snapshot"
        );
    }
}
