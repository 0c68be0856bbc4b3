//! The refresh coordinator (C6, §4.6): the heart of the core. Owns the
//! cached snapshot and the waiter queue behind a single message loop,
//! coalescing concurrent reads into at most one outstanding upstream fetch
//! at a time (§8 P3/P4).

mod config;
mod coordinator;
mod events;

pub use config::{CoordinatorConfig, CoordinatorConfigBuilder};
pub use coordinator::{spawn, CoordinatorHandle, StatusReply, REGISTER_KEY};
pub use events::CoordinatorEvent;
