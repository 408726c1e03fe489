//! Argus Store - durable case data and graph ingestion
//!
//! The store exclusively owns all persisted rows. Uniqueness constraints on
//! entities and relationships are the correctness backstop for concurrent
//! collection; there is no application-level locking above the serialized
//! connection.

pub mod ingest;
pub mod store;

pub use ingest::*;
pub use store::*;
