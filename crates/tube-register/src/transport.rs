use futures::future::BoxFuture;

/// A peer's logical identifier (§4.5: "propagating ... to all known peers").
pub type PeerId = String;

/// The gossip transport, abstracted from the register's merge logic (§9:
/// "the gossip transport is pluggable"). A push either lands or it doesn't;
/// the register only cares whether it landed in time for the majority-ack
/// count, not how it travelled.
pub trait PeerTransport<V>: Send + Sync {
    /// The peers currently known to be reachable. Best-effort: a stale
    /// membership view only affects how many acks `write` waits for, not
    /// correctness (delivery is still eventual via later gossip or reads).
    fn peers(&self) -> Vec<PeerId>;

    /// Pushes `value` under `key` to `peer`. Resolves `Ok(())` once the peer
    /// has observed (merged) the value, `Err(())` if the push could not be
    /// delivered.
    fn send(&self, peer: PeerId, key: String, value: V) -> BoxFuture<'static, Result<(), ()>>;
}

/// A transport with no peers. Useful for a single-node deployment or as a
/// default before membership is known.
pub struct NoopTransport;

impl<V: Send + 'static> PeerTransport<V> for NoopTransport {
    fn peers(&self) -> Vec<PeerId> {
        Vec::new()
    }

    fn send(&self, _peer: PeerId, _key: String, _value: V) -> BoxFuture<'static, Result<(), ()>> {
        Box::pin(async { Ok(()) })
    }
}
