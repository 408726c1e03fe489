//! Argus Core - domain model for evidence-first OSINT
//!
//! This crate provides the foundational primitives:
//! - Investigation cases and their typed intelligence entities
//! - Directed, typed relationships between entities
//! - Immutable, hash-verified evidence records
//! - Tagged metadata values shared by collectors and ingestion

pub mod hash;
pub mod meta;
pub mod model;

pub use hash::*;
pub use meta::*;
pub use model::*;

/// Default confidence for newly discovered entities
pub const DEFAULT_ENTITY_CONFIDENCE: f64 = 0.5;

/// Confidence assigned to manually curated entities and links
pub const MANUAL_CONFIDENCE: f64 = 1.0;

/// Default status for new cases
pub const CASE_STATUS_ACTIVE: &str = "active";

/// Source label for entities created by hand rather than a collector
pub const SOURCE_MANUAL: &str = "manual";
