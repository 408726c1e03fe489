//! Ingestion engine - evidence to graph
//!
//! Each evidence item is dispatched by collector name to a routine that
//! resolves or creates the subject entity, derives related entities from the
//! payload, and links them with collector-specific edge types. Collectors
//! without a routine are simply not graphed.
//!
//! Entity resolution is read-then-create by exact value. Under true
//! parallelism two ingestions of the same new value can race; the loser's
//! insert fails the unique constraint and is logged, not retried - the edge
//! may be missing, never duplicated.

use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use argus_core::{Entity, Evidence, MetaMap, Relationship};

use crate::{Store, StoreError};

/// Errors from graph ingestion. All of these leave the evidence record
/// intact; graph completeness is best-effort.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("evidence {evidence_id} missing metadata field '{field}'")]
    MissingField {
        evidence_id: String,
        field: &'static str,
    },

    #[error("failed to read evidence payload: {0}")]
    Payload(#[from] std::io::Error),

    #[error("failed to parse evidence payload: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Map one evidence item into entity/relationship mutations.
pub fn ingest_evidence(store: &Store, ev: &Evidence) -> Result<(), IngestError> {
    match ev.collector.as_str() {
        "dns" => ingest_dns(store, ev),
        "whois" => ingest_whois(store, ev),
        "github" => ingest_github(store, ev),
        "geo" => ingest_geo(store, ev),
        "ports" => ingest_ports(store, ev),
        "http" => ingest_http(store, ev),
        "screenshot" => ingest_screenshot(store, ev),
        other => {
            debug!(collector = other, "no ingestion routine, skipping");
            Ok(())
        }
    }
}

fn required_target(ev: &Evidence) -> Result<&str, IngestError> {
    ev.meta_str("target").ok_or_else(|| IngestError::MissingField {
        evidence_id: ev.id.clone(),
        field: "target",
    })
}

/// Resolve an entity by exact value, creating it when absent.
fn ensure_entity(
    store: &Store,
    case_id: &str,
    entity_type: &str,
    value: &str,
    source: &str,
) -> Result<Entity, IngestError> {
    if let Some(existing) = store.get_entity_by_value(case_id, value)? {
        return Ok(existing);
    }
    let entity = Entity::new(case_id, entity_type, value, source);
    store.create_entity(&entity)?;
    Ok(entity)
}

/// Subject entities are usually a domain, but port/geo targets are IPs.
/// A leading digit is the discriminator, same heuristic throughout.
fn guess_target_type(target: &str) -> &'static str {
    if target.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        "ip"
    } else {
        "domain"
    }
}

fn ingest_dns(store: &Store, ev: &Evidence) -> Result<(), IngestError> {
    let target = required_target(ev)?;

    let data = std::fs::read(&ev.file_path)?;
    let records: HashMap<String, Vec<String>> = serde_json::from_slice(&data)?;

    let subject = ensure_entity(store, &ev.case_id, "domain", target, "dns")?;

    for ip in records.get("A").into_iter().flatten() {
        let ip_ent = ensure_entity(store, &ev.case_id, "ip", ip, "dns")?;
        let edge = Relationship::new(&ev.case_id, &subject.id, &ip_ent.id, "resolves_to")
            .with_evidence(&ev.id);
        store.create_relationship(&edge)?;
    }

    for mx in records.get("MX").into_iter().flatten() {
        let mx_ent = ensure_entity(store, &ev.case_id, "domain", mx, "dns")?;
        let edge =
            Relationship::new(&ev.case_id, &mx_ent.id, &subject.id, "mx_for").with_evidence(&ev.id);
        store.create_relationship(&edge)?;
    }

    for ns in records.get("NS").into_iter().flatten() {
        let ns_ent = ensure_entity(store, &ev.case_id, "domain", ns, "dns")?;
        let edge =
            Relationship::new(&ev.case_id, &ns_ent.id, &subject.id, "ns_for").with_evidence(&ev.id);
        store.create_relationship(&edge)?;
    }

    Ok(())
}

fn ingest_whois(store: &Store, ev: &Evidence) -> Result<(), IngestError> {
    let target = required_target(ev)?;
    let subject = ensure_entity(store, &ev.case_id, "domain", target, "whois")?;

    if let Some(email) = ev.meta_str("registrant_email").filter(|e| !e.is_empty()) {
        let email_ent = ensure_entity(store, &ev.case_id, "email", email, "whois")?;
        let edge = Relationship::new(&ev.case_id, &subject.id, &email_ent.id, "registered_by")
            .with_evidence(&ev.id);
        store.create_relationship(&edge)?;
    }

    Ok(())
}

#[derive(Debug, Deserialize)]
struct GitHubSearchPayload {
    #[serde(default)]
    items: Vec<GitHubRepoItem>,
}

#[derive(Debug, Deserialize)]
struct GitHubRepoItem {
    html_url: String,
    owner: GitHubOwner,
}

#[derive(Debug, Deserialize)]
struct GitHubOwner {
    login: String,
}

fn ingest_github(store: &Store, ev: &Evidence) -> Result<(), IngestError> {
    let data = std::fs::read(&ev.file_path)?;
    let payload: GitHubSearchPayload = serde_json::from_slice(&data)?;

    for item in payload.items {
        let repo = ensure_entity(store, &ev.case_id, "repo", &item.html_url, "github")?;
        let owner = ensure_entity(store, &ev.case_id, "username", &item.owner.login, "github")?;

        let edge =
            Relationship::new(&ev.case_id, &owner.id, &repo.id, "owns").with_evidence(&ev.id);
        store.create_relationship(&edge)?;
    }

    Ok(())
}

/// Geo enrichment mutates the subject IP's metadata; no new entities.
fn ingest_geo(store: &Store, ev: &Evidence) -> Result<(), IngestError> {
    let target = required_target(ev)?;
    let subject = ensure_entity(store, &ev.case_id, "ip", target, "geo")?;

    let mut patch = MetaMap::new();
    for field in ["country", "city", "isp", "lat", "lon"] {
        if let Some(value) = ev.metadata.get(field) {
            patch.insert(field.to_string(), value.clone());
        }
    }
    if !patch.is_empty() {
        store.merge_entity_metadata(&subject.id, &patch)?;
    }

    Ok(())
}

fn ingest_ports(store: &Store, ev: &Evidence) -> Result<(), IngestError> {
    let target = required_target(ev)?;

    let data = std::fs::read(&ev.file_path)?;
    let results: HashMap<String, String> = serde_json::from_slice(&data)?;

    let subject = ensure_entity(store, &ev.case_id, "ip", target, "ports")?;

    for (port, status) in &results {
        if status != "open" {
            continue;
        }
        let service = format!("TCP/{port}");
        let svc_ent = ensure_entity(store, &ev.case_id, "service", &service, "ports")?;
        let edge = Relationship::new(&ev.case_id, &subject.id, &svc_ent.id, "has_port")
            .with_evidence(&ev.id);
        store.create_relationship(&edge)?;
    }

    Ok(())
}

fn ingest_http(store: &Store, ev: &Evidence) -> Result<(), IngestError> {
    let target = required_target(ev)?;
    let subject = ensure_entity(store, &ev.case_id, "domain", target, "http")?;

    if let Some(server) = ev.meta_str("server").filter(|s| !s.is_empty()) {
        let svc_ent = ensure_entity(store, &ev.case_id, "service", server, "http")?;
        let edge = Relationship::new(&ev.case_id, &subject.id, &svc_ent.id, "runs_service")
            .with_evidence(&ev.id);
        store.create_relationship(&edge)?;
    }

    Ok(())
}

/// The screenshot is not an entity of its own; a self-loop edge records the
/// evidence id against the subject.
fn ingest_screenshot(store: &Store, ev: &Evidence) -> Result<(), IngestError> {
    let target = required_target(ev)?;
    let subject = ensure_entity(
        store,
        &ev.case_id,
        guess_target_type(target),
        target,
        "screenshot",
    )?;

    let edge = Relationship::new(&ev.case_id, &subject.id, &subject.id, "has_screenshot")
        .with_evidence(&ev.id);
    store.create_relationship(&edge)?;
    Ok(())
}
