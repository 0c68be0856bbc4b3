//! The upstream gateway (C4, §4.4): a single-serialised actor wrapping the
//! upstream HTTP client behind a circuit breaker and retry layer. Every node
//! runs exactly one of these; the coordinator (C6) is its only caller.

mod actor;
mod config;
mod error;
mod events;

pub use actor::{spawn, spawn_with_upstream, GatewayHandle};
pub use config::{GatewayConfig, GatewayConfigBuilder};
pub use events::GatewayEvent;

pub use tube_upstream_http::{UpstreamClient, UpstreamError, UpstreamRequest};
