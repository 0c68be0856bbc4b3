//! Shared infrastructure for the tube-status cache front-end.
//!
//! This crate provides the pieces every other crate in the workspace depends
//! on:
//! - [`clock`]: the injectable time source (C1).
//! - [`snapshot`]: the cached payload and its LWW ordering (§3).
//! - [`error`]: the error taxonomy every component boundary maps into (§7).
//! - [`events`]: the observability event system reused by every pattern.

pub mod clock;
pub mod error;
pub mod events;
pub mod snapshot;

pub use clock::{Clock, SystemClock, TestClock};
pub use error::CoreError;
pub use events::{EventListener, EventListeners, FnListener, ResilienceEvent};
pub use snapshot::{Disruption, LineRecord, Snapshot, KNOWN_LINE_IDS};
