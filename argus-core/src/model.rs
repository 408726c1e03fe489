//! Investigation cases, entities, relationships, and evidence
//!
//! The graph is built from three row kinds scoped to a case:
//! - `Entity`: a typed intelligence node, unique on (case, type, value)
//! - `Relationship`: a directed, typed edge, unique on (from, to, type)
//! - `Evidence`: an append-only, hash-verified record of one collection act

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{MetaMap, CASE_STATUS_ACTIVE, DEFAULT_ENTITY_CONFIDENCE};

/// An investigation container. Cases are never hard-deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    pub id: String,
    pub name: String,
    pub description: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Case {
    pub fn new(name: &str, description: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.to_string(),
            status: CASE_STATUS_ACTIVE.to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A typed intelligence node (e.g. type="ip", value="1.1.1.1").
///
/// `(case_id, entity_type, value)` is the sole deduplication key. Type, value,
/// and case are immutable once created; only metadata may change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub case_id: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub value: String,
    pub source: String,
    pub confidence: f64,
    pub discovered_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: MetaMap,
}

impl Entity {
    pub fn new(case_id: &str, entity_type: &str, value: &str, source: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            case_id: case_id.to_string(),
            entity_type: entity_type.to_string(),
            value: value.to_string(),
            source: source.to_string(),
            confidence: DEFAULT_ENTITY_CONFIDENCE,
            discovered_at: Utc::now(),
            metadata: MetaMap::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }
}

/// A directed, typed edge between two entities within one case.
///
/// `(from, to, rel_type)` is unique per case; recreating an existing edge is a
/// no-op. Self-loops are allowed and used to attach evidence as a property of
/// its own subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    pub case_id: String,
    pub from_entity_id: String,
    pub to_entity_id: String,
    #[serde(rename = "type")]
    pub rel_type: String,
    pub confidence: f64,
    pub evidence_id: Option<String>,
    pub discovered_at: DateTime<Utc>,
}

impl Relationship {
    pub fn new(case_id: &str, from: &str, to: &str, rel_type: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            case_id: case_id.to_string(),
            from_entity_id: from.to_string(),
            to_entity_id: to.to_string(),
            rel_type: rel_type.to_string(),
            confidence: 1.0,
            evidence_id: None,
            discovered_at: Utc::now(),
        }
    }

    pub fn with_evidence(mut self, evidence_id: &str) -> Self {
        self.evidence_id = Some(evidence_id.to_string());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }
}

/// An immutable record of one collection act.
///
/// The raw payload lives on disk at `file_path`; `file_hash` is the SHA-256 of
/// that payload, making after-the-fact tampering detectable. Metadata carries
/// the collector-specific key facts ingestion reads (always `target`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub id: String,
    pub case_id: String,
    #[serde(default)]
    pub entity_id: Option<String>,
    pub collector: String,
    pub file_path: String,
    pub file_hash: String,
    pub collected_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: MetaMap,
}

impl Evidence {
    pub fn new(case_id: &str, collector: &str, file_path: &str, file_hash: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            case_id: case_id.to_string(),
            entity_id: None,
            collector: collector.to_string(),
            file_path: file_path.to_string(),
            file_hash: file_hash.to_string(),
            collected_at: Utc::now(),
            metadata: MetaMap::new(),
        }
    }

    /// Fetch a required string metadata field.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}

/// A cached AI-analysis result for a case.
///
/// `context_hash` keys the cache: when the aggregated case context has not
/// changed, the stored analysis is reused instead of re-running the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub case_id: String,
    pub findings: Vec<String>,
    pub risks: Vec<String>,
    pub connections: Vec<String>,
    pub next_steps: Vec<String>,
    pub confidence: f64,
    #[serde(default)]
    pub context_hash: String,
    #[serde(default = "Utc::now")]
    pub analyzed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_case_defaults() {
        let c = Case::new("Breach 42", "who owns the exfil host");
        assert_eq!(c.status, "active");
        assert!(!c.id.is_empty());
    }

    #[test]
    fn test_entity_defaults() {
        let e = Entity::new("case-1", "ip", "1.1.1.1", "dns");
        assert_eq!(e.confidence, DEFAULT_ENTITY_CONFIDENCE);
        assert!(e.metadata.is_empty());
    }

    #[test]
    fn test_relationship_self_loop_allowed() {
        let r = Relationship::new("case-1", "ent-1", "ent-1", "has_screenshot");
        assert_eq!(r.from_entity_id, r.to_entity_id);
    }

    #[test]
    fn test_evidence_meta_str() {
        let mut ev = Evidence::new("case-1", "dns", "/tmp/x.json", "abc");
        ev.metadata.insert("target".into(), "example.com".into());
        assert_eq!(ev.meta_str("target"), Some("example.com"));
        assert_eq!(ev.meta_str("missing"), None);
    }
}
