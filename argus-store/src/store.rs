//! SQLite-backed evidence store
//!
//! All writes go through one serialized connection. Entities are unique on
//! (case_id, type, value); relationships on (from, to, type). Evidence rows
//! are append-only and carry the SHA-256 of their on-disk payload.

use std::collections::HashMap;
use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use tracing::debug;

use argus_core::{hash_payload, Analysis, Case, Entity, Evidence, MetaMap, Relationship};

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("duplicate {kind} '{key}'")]
    Duplicate { kind: &'static str, key: String },

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("metadata serialization failed: {0}")]
    Meta(#[from] serde_json::Error),

    #[error("evidence file unreadable: {0}")]
    EvidenceFile(#[from] std::io::Error),
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cases (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    status TEXT DEFAULT 'active',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS entities (
    id TEXT PRIMARY KEY,
    case_id TEXT NOT NULL,
    type TEXT NOT NULL,
    value TEXT NOT NULL,
    source TEXT,
    confidence REAL DEFAULT 0.5,
    discovered_at TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    FOREIGN KEY (case_id) REFERENCES cases(id),
    UNIQUE(case_id, type, value)
);

CREATE TABLE IF NOT EXISTS relationships (
    id TEXT PRIMARY KEY,
    case_id TEXT NOT NULL,
    from_entity TEXT NOT NULL,
    to_entity TEXT NOT NULL,
    rel_type TEXT NOT NULL,
    confidence REAL DEFAULT 0.5,
    evidence_id TEXT,
    discovered_at TEXT NOT NULL,
    FOREIGN KEY (case_id) REFERENCES cases(id),
    FOREIGN KEY (from_entity) REFERENCES entities(id),
    FOREIGN KEY (to_entity) REFERENCES entities(id),
    UNIQUE(from_entity, to_entity, rel_type)
);

CREATE TABLE IF NOT EXISTS evidence (
    id TEXT PRIMARY KEY,
    case_id TEXT NOT NULL,
    entity_id TEXT,
    collector TEXT NOT NULL,
    file_path TEXT NOT NULL,
    file_hash TEXT NOT NULL,
    collected_at TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    FOREIGN KEY (case_id) REFERENCES cases(id),
    FOREIGN KEY (entity_id) REFERENCES entities(id)
);

CREATE TABLE IF NOT EXISTS analyses (
    id TEXT PRIMARY KEY,
    case_id TEXT NOT NULL,
    findings TEXT,
    risks TEXT,
    connections TEXT,
    next_steps TEXT,
    confidence REAL,
    context_hash TEXT NOT NULL,
    analyzed_at TEXT NOT NULL,
    FOREIGN KEY (case_id) REFERENCES cases(id)
);

CREATE INDEX IF NOT EXISTS idx_entities_case_id ON entities(case_id);
CREATE INDEX IF NOT EXISTS idx_entities_type ON entities(type);
CREATE INDEX IF NOT EXISTS idx_relationships_case_id ON relationships(case_id);
CREATE INDEX IF NOT EXISTS idx_relationships_from ON relationships(from_entity);
CREATE INDEX IF NOT EXISTS idx_relationships_to ON relationships(to_entity);
CREATE INDEX IF NOT EXISTS idx_evidence_case_id ON evidence(case_id);
CREATE INDEX IF NOT EXISTS idx_analyses_hash ON analyses(case_id, context_hash);
"#;

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// The evidence store. Cheap to share behind an `Arc`.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::Open(e.to_string()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// In-memory store, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Open(e.to_string()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.lock().execute_batch(SCHEMA)?;
        Ok(())
    }

    // ---- cases ----

    pub fn create_case(&self, c: &Case) -> Result<(), StoreError> {
        self.conn.lock().execute(
            "INSERT INTO cases (id, name, description, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![c.id, c.name, c.description, c.status, c.created_at, c.updated_at],
        )?;
        Ok(())
    }

    pub fn get_case(&self, id: &str) -> Result<Option<Case>, StoreError> {
        let conn = self.conn.lock();
        let case = conn
            .query_row(
                "SELECT id, name, description, status, created_at, updated_at
                 FROM cases WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Case {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        description: row.get(2)?,
                        status: row.get(3)?,
                        created_at: row.get(4)?,
                        updated_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(case)
    }

    pub fn list_cases(&self) -> Result<Vec<Case>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, description, status, created_at, updated_at
             FROM cases ORDER BY created_at",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Case {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                status: row.get(3)?,
                created_at: row.get(4)?,
                updated_at: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ---- entities ----

    /// Insert a new entity. A (case, type, value) collision is surfaced as
    /// [`StoreError::Duplicate`]; callers decide whether that is an error.
    pub fn create_entity(&self, e: &Entity) -> Result<(), StoreError> {
        let metadata = serde_json::to_string(&e.metadata)?;
        let result = self.conn.lock().execute(
            "INSERT INTO entities (id, case_id, type, value, source, confidence, discovered_at, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                e.id,
                e.case_id,
                e.entity_type,
                e.value,
                e.source,
                e.confidence,
                e.discovered_at,
                metadata
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(err) if is_constraint_violation(&err) => Err(StoreError::Duplicate {
                kind: "entity",
                key: format!("{}/{}/{}", e.case_id, e.entity_type, e.value),
            }),
            Err(err) => Err(err.into()),
        }
    }

    fn row_to_entity(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Entity, String)> {
        Ok((
            Entity {
                id: row.get(0)?,
                case_id: row.get(1)?,
                entity_type: row.get(2)?,
                value: row.get(3)?,
                source: row.get(4)?,
                confidence: row.get(5)?,
                discovered_at: row.get(6)?,
                metadata: MetaMap::new(),
            },
            row.get(7)?,
        ))
    }

    fn finish_entity((mut entity, meta_json): (Entity, String)) -> Result<Entity, StoreError> {
        entity.metadata = serde_json::from_str(&meta_json)?;
        Ok(entity)
    }

    pub fn get_entity(&self, id: &str) -> Result<Option<Entity>, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT id, case_id, type, value, source, confidence, discovered_at, metadata
                 FROM entities WHERE id = ?1",
                params![id],
                Self::row_to_entity,
            )
            .optional()?;
        row.map(Self::finish_entity).transpose()
    }

    /// Exact-value lookup within a case. Returns the first created row when
    /// the same value exists under multiple types.
    pub fn get_entity_by_value(
        &self,
        case_id: &str,
        value: &str,
    ) -> Result<Option<Entity>, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT id, case_id, type, value, source, confidence, discovered_at, metadata
                 FROM entities WHERE case_id = ?1 AND value = ?2
                 ORDER BY discovered_at LIMIT 1",
                params![case_id, value],
                Self::row_to_entity,
            )
            .optional()?;
        row.map(Self::finish_entity).transpose()
    }

    pub fn list_entities(&self, case_id: &str) -> Result<Vec<Entity>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, case_id, type, value, source, confidence, discovered_at, metadata
             FROM entities WHERE case_id = ?1 ORDER BY discovered_at",
        )?;
        let rows = stmt.query_map(params![case_id], Self::row_to_entity)?;
        rows.map(|r| Self::finish_entity(r?))
            .collect::<Result<Vec<_>, _>>()
    }

    /// Merge new metadata keys into an existing entity. Existing keys are
    /// overwritten by the patch; keys absent from the patch are kept.
    pub fn merge_entity_metadata(&self, id: &str, patch: &MetaMap) -> Result<(), StoreError> {
        let mut entity = self.get_entity(id)?.ok_or_else(|| StoreError::NotFound {
            kind: "entity",
            id: id.to_string(),
        })?;
        for (key, value) in patch {
            entity.metadata.insert(key.clone(), value.clone());
        }
        let metadata = serde_json::to_string(&entity.metadata)?;
        self.conn.lock().execute(
            "UPDATE entities SET metadata = ?1 WHERE id = ?2",
            params![metadata, id],
        )?;
        Ok(())
    }

    // ---- relationships ----

    /// Insert an edge. Recreating an existing (from, to, type) edge is a
    /// harmless no-op; returns whether a new row was written.
    pub fn create_relationship(&self, r: &Relationship) -> Result<bool, StoreError> {
        let result = self.conn.lock().execute(
            "INSERT INTO relationships
               (id, case_id, from_entity, to_entity, rel_type, confidence, evidence_id, discovered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                r.id,
                r.case_id,
                r.from_entity_id,
                r.to_entity_id,
                r.rel_type,
                r.confidence,
                r.evidence_id,
                r.discovered_at
            ],
        );
        match result {
            Ok(_) => Ok(true),
            Err(err) if is_constraint_violation(&err) => {
                debug!(
                    from = %r.from_entity_id,
                    to = %r.to_entity_id,
                    rel_type = %r.rel_type,
                    "edge already exists, skipping"
                );
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn list_relationships(&self, case_id: &str) -> Result<Vec<Relationship>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, case_id, from_entity, to_entity, rel_type, confidence, evidence_id, discovered_at
             FROM relationships WHERE case_id = ?1 ORDER BY discovered_at",
        )?;
        let rows = stmt.query_map(params![case_id], |row| {
            Ok(Relationship {
                id: row.get(0)?,
                case_id: row.get(1)?,
                from_entity_id: row.get(2)?,
                to_entity_id: row.get(3)?,
                rel_type: row.get(4)?,
                confidence: row.get(5)?,
                evidence_id: row.get(6)?,
                discovered_at: row.get(7)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ---- evidence ----

    pub fn create_evidence(&self, ev: &Evidence) -> Result<(), StoreError> {
        let metadata = serde_json::to_string(&ev.metadata)?;
        self.conn.lock().execute(
            "INSERT INTO evidence
               (id, case_id, entity_id, collector, file_path, file_hash, collected_at, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                ev.id,
                ev.case_id,
                ev.entity_id,
                ev.collector,
                ev.file_path,
                ev.file_hash,
                ev.collected_at,
                metadata
            ],
        )?;
        Ok(())
    }

    fn row_to_evidence(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Evidence, String)> {
        Ok((
            Evidence {
                id: row.get(0)?,
                case_id: row.get(1)?,
                entity_id: row.get(2)?,
                collector: row.get(3)?,
                file_path: row.get(4)?,
                file_hash: row.get(5)?,
                collected_at: row.get(6)?,
                metadata: MetaMap::new(),
            },
            row.get(7)?,
        ))
    }

    pub fn get_evidence(&self, id: &str) -> Result<Option<Evidence>, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT id, case_id, entity_id, collector, file_path, file_hash, collected_at, metadata
                 FROM evidence WHERE id = ?1",
                params![id],
                Self::row_to_evidence,
            )
            .optional()?;
        row.map(|(mut ev, meta_json)| {
            ev.metadata = serde_json::from_str(&meta_json)?;
            Ok(ev)
        })
        .transpose()
    }

    pub fn list_evidence(&self, case_id: &str) -> Result<Vec<Evidence>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, case_id, entity_id, collector, file_path, file_hash, collected_at, metadata
             FROM evidence WHERE case_id = ?1 ORDER BY collected_at",
        )?;
        let rows = stmt.query_map(params![case_id], Self::row_to_evidence)?;
        rows.map(|r| {
            let (mut ev, meta_json) = r?;
            ev.metadata = serde_json::from_str(&meta_json)?;
            Ok(ev)
        })
        .collect::<Result<Vec<_>, StoreError>>()
    }

    /// Recompute the SHA-256 of the stored raw file and compare it against the
    /// recorded hash.
    pub fn verify_evidence(&self, id: &str) -> Result<bool, StoreError> {
        let ev = self.get_evidence(id)?.ok_or_else(|| StoreError::NotFound {
            kind: "evidence",
            id: id.to_string(),
        })?;
        let data = std::fs::read(&ev.file_path)?;
        Ok(hash_payload(&data) == ev.file_hash)
    }

    // ---- analyses ----

    pub fn save_analysis(&self, a: &Analysis) -> Result<(), StoreError> {
        self.conn.lock().execute(
            "INSERT INTO analyses
               (id, case_id, findings, risks, connections, next_steps, confidence, context_hash, analyzed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                a.id,
                a.case_id,
                serde_json::to_string(&a.findings)?,
                serde_json::to_string(&a.risks)?,
                serde_json::to_string(&a.connections)?,
                serde_json::to_string(&a.next_steps)?,
                a.confidence,
                a.context_hash,
                a.analyzed_at
            ],
        )?;
        Ok(())
    }

    /// Cached analysis lookup keyed by the case-context content hash.
    pub fn get_analysis_by_hash(
        &self,
        case_id: &str,
        context_hash: &str,
    ) -> Result<Option<Analysis>, StoreError> {
        let conn = self.conn.lock();
        let row: Option<(String, String, String, String, String, f64, chrono::DateTime<chrono::Utc>)> = conn
            .query_row(
                "SELECT id, findings, risks, connections, next_steps, confidence, analyzed_at
                 FROM analyses WHERE case_id = ?1 AND context_hash = ?2
                 ORDER BY analyzed_at DESC LIMIT 1",
                params![case_id, context_hash],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                    ))
                },
            )
            .optional()?;

        row.map(
            |(id, findings, risks, connections, next_steps, confidence, analyzed_at)| {
                Ok(Analysis {
                    id,
                    case_id: case_id.to_string(),
                    findings: serde_json::from_str(&findings)?,
                    risks: serde_json::from_str(&risks)?,
                    connections: serde_json::from_str(&connections)?,
                    next_steps: serde_json::from_str(&next_steps)?,
                    confidence,
                    context_hash: context_hash.to_string(),
                    analyzed_at,
                })
            },
        )
        .transpose()
    }

    /// Per-case row counts, used by status displays.
    pub fn case_stats(&self, case_id: &str) -> Result<HashMap<&'static str, i64>, StoreError> {
        let conn = self.conn.lock();
        let mut stats = HashMap::new();
        for (label, table) in [
            ("entities", "entities"),
            ("relationships", "relationships"),
            ("evidence", "evidence"),
        ] {
            let count: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM {table} WHERE case_id = ?1"),
                params![case_id],
                |row| row.get(0),
            )?;
            stats.insert(label, count);
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_case() -> (Store, Case) {
        let store = Store::open_in_memory().unwrap();
        let c = Case::new("test case", "unit fixture");
        store.create_case(&c).unwrap();
        (store, c)
    }

    #[test]
    fn test_entity_uniqueness() {
        let (store, c) = store_with_case();

        let first = Entity::new(&c.id, "ip", "1.1.1.1", "dns");
        store.create_entity(&first).unwrap();

        let second = Entity::new(&c.id, "ip", "1.1.1.1", "geo");
        let err = store.create_entity(&second).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { kind: "entity", .. }));

        // Lookups always return the surviving first row.
        let found = store.get_entity_by_value(&c.id, "1.1.1.1").unwrap().unwrap();
        assert_eq!(found.id, first.id);
        assert_eq!(found.source, "dns");
    }

    #[test]
    fn test_same_value_different_type_is_distinct() {
        let (store, c) = store_with_case();
        store
            .create_entity(&Entity::new(&c.id, "domain", "x.example", "dns"))
            .unwrap();
        store
            .create_entity(&Entity::new(&c.id, "username", "x.example", "social"))
            .unwrap();
        assert_eq!(store.list_entities(&c.id).unwrap().len(), 2);
    }

    #[test]
    fn test_relationship_idempotence() {
        let (store, c) = store_with_case();
        let a = Entity::new(&c.id, "domain", "example.com", "dns");
        let b = Entity::new(&c.id, "ip", "93.184.216.34", "dns");
        store.create_entity(&a).unwrap();
        store.create_entity(&b).unwrap();

        let edge = Relationship::new(&c.id, &a.id, &b.id, "resolves_to");
        assert!(store.create_relationship(&edge).unwrap());

        let again = Relationship::new(&c.id, &a.id, &b.id, "resolves_to");
        assert!(!store.create_relationship(&again).unwrap());

        assert_eq!(store.list_relationships(&c.id).unwrap().len(), 1);
    }

    #[test]
    fn test_self_loop_edge() {
        let (store, c) = store_with_case();
        let a = Entity::new(&c.id, "domain", "example.com", "screenshot");
        store.create_entity(&a).unwrap();

        let edge = Relationship::new(&c.id, &a.id, &a.id, "has_screenshot");
        assert!(store.create_relationship(&edge).unwrap());
    }

    #[test]
    fn test_metadata_merge_keeps_existing_keys() {
        let (store, c) = store_with_case();
        let mut e = Entity::new(&c.id, "ip", "8.8.8.8", "dns");
        e.metadata.insert("seen_by".into(), "dns".into());
        store.create_entity(&e).unwrap();

        let mut patch = MetaMap::new();
        patch.insert("country".into(), "US".into());
        store.merge_entity_metadata(&e.id, &patch).unwrap();

        let merged = store.get_entity(&e.id).unwrap().unwrap();
        assert_eq!(merged.metadata.get("seen_by").unwrap().as_str(), Some("dns"));
        assert_eq!(merged.metadata.get("country").unwrap().as_str(), Some("US"));
    }

    #[test]
    fn test_evidence_integrity() {
        let (store, c) = store_with_case();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dns_example.com_1.json");
        let payload = br#"{"A": ["93.184.216.34"]}"#;
        std::fs::write(&path, payload).unwrap();

        let ev = Evidence::new(
            &c.id,
            "dns",
            path.to_str().unwrap(),
            &hash_payload(payload),
        );
        store.create_evidence(&ev).unwrap();
        assert!(store.verify_evidence(&ev.id).unwrap());

        // Tampering after the fact is detectable.
        std::fs::write(&path, b"altered").unwrap();
        assert!(!store.verify_evidence(&ev.id).unwrap());
    }

    #[test]
    fn test_analysis_cache_round_trip() {
        let (store, c) = store_with_case();
        let analysis = Analysis {
            id: "an-1".to_string(),
            case_id: c.id.clone(),
            findings: vec!["exposed ssh".to_string()],
            risks: vec!["weak auth".to_string()],
            connections: vec![],
            next_steps: vec!["rotate keys".to_string()],
            confidence: 0.8,
            context_hash: "abc123".to_string(),
            analyzed_at: chrono::Utc::now(),
        };
        store.save_analysis(&analysis).unwrap();

        let hit = store.get_analysis_by_hash(&c.id, "abc123").unwrap().unwrap();
        assert_eq!(hit.findings, analysis.findings);
        assert!(store.get_analysis_by_hash(&c.id, "other").unwrap().is_none());
    }
}
