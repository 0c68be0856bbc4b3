//! The replicated register (C5, §4.5): a last-writer-wins value gossiped to
//! peers, merged on receipt. The coordinator (C6) is the only consumer in
//! this workspace, keyed by a single logical tag (`"tube-status"`), but the
//! register itself is key-agnostic.

mod config;
mod error;
mod events;
mod loopback;
mod mergeable;
mod register;
mod transport;

pub use config::{RegisterConfig, RegisterConfigBuilder};
pub use error::RegisterError;
pub use events::RegisterEvent;
pub use loopback::{LoopbackHub, LoopbackTransport};
pub use mergeable::Mergeable;
pub use register::{spawn, RegisterHandle, WriteAck};
pub use transport::{NoopTransport, PeerId, PeerTransport};
