//! The upstream HTTP transport (§6.2): an external collaborator, out of the
//! core's scope proper, but needed for a working binary. Wrapped by C4
//! (`tube-gateway`) behind the circuit breaker and retry layers; never
//! touched directly by the coordinator or read API.

mod client;
mod error;
mod parse;

pub use client::{UpstreamClient, UpstreamRequest, UpstreamResponse};
pub use error::UpstreamError;
