//! Argus network policy layer
//!
//! Everything a collector needs before it may touch the network:
//! - Scope governor: blacklist/whitelist containment checks
//! - Rate governor: per-collector token buckets, burst 1
//! - HTTP client construction with optional SOCKS proxying (ghost mode)

pub mod client;
pub mod limiter;
pub mod scope;

pub use client::*;
pub use limiter::*;
pub use scope::*;
