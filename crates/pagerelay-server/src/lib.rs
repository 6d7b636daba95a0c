//! `pagerelay` crate (library surface).
//!
//! The primary entrypoint for end users is the `pagerelay` binary. The library exposes the
//! dispatcher and router so the HTTP contract can be driven in-process.

pub mod config;
pub mod dispatch;
pub mod http;

pub use config::RelayConfig;
pub use dispatch::Relay;
pub use http::{router, ApiError, AppState};
pub use pagerelay_core as core;
pub use pagerelay_local as local;
