//! Argus Engine
//!
//! The execution core: a dependency-injected collector registry, the gated
//! concurrent run loop (consent -> scope -> rate -> collect -> persist ->
//! ingest), the AI-analysis bridge with its content-hash cache, and TOML
//! configuration for the whole stack.

pub mod analysis;
pub mod config;
pub mod engine;
pub mod registry;

pub use analysis::*;
pub use config::*;
pub use engine::*;
pub use registry::*;
