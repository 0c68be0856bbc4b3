//! The read API adapter (C7, §4.7): the thin layer external callers go
//! through. Shapes every read into a coordinator or gateway call and wraps
//! the result in a `meta` envelope; holds no cache of its own.

mod adapter;
mod config;
mod meta;

pub use adapter::ReadApi;
pub use config::{ReadApiConfig, ReadApiConfigBuilder};
pub use meta::{Meta, ReadReply};
