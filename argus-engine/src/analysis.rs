//! AI-analysis bridge
//!
//! The core does not analyze; it aggregates the case into a prompt-ready
//! context blob, hashes it, and hands it to an external bridge subprocess
//! that returns a structured report. The hash keys a cache in the store, so
//! unchanged case data never re-runs the bridge.

use std::process::Stdio;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};
use uuid::Uuid;

use argus_core::{hash_payload, Analysis};
use argus_store::{Store, StoreError};

use crate::LlmSection;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("case '{0}' not found")]
    CaseNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to run analysis bridge: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("analysis bridge timed out after {0:?}")]
    Timeout(Duration),

    #[error("analysis bridge failed: {0}")]
    Bridge(String),

    #[error("failed to parse bridge response: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Request sent to the bridge on stdin.
#[derive(Debug, Serialize)]
struct BridgeRequest<'a> {
    task: &'static str,
    case_name: &'a str,
    context: &'a str,
    model: &'a str,
    llm: BridgeLlmConfig<'a>,
}

#[derive(Debug, Serialize)]
struct BridgeLlmConfig<'a> {
    provider: &'a str,
    url: &'a str,
    api_key: &'a str,
    timeout: u64,
}

/// Aggregate all case data into a prompt-ready text blob. Its SHA-256 is the
/// analysis cache key.
pub fn build_case_context(store: &Store, case_id: &str) -> Result<String, AnalysisError> {
    let case = store
        .get_case(case_id)?
        .ok_or_else(|| AnalysisError::CaseNotFound(case_id.to_string()))?;
    let entities = store.list_entities(case_id)?;
    let relationships = store.list_relationships(case_id)?;
    let evidence = store.list_evidence(case_id)?;

    let mut out = String::new();
    out.push_str(&format!("CASE: {}\n", case.name));
    out.push_str(&format!("DESCRIPTION: {}\n\n", case.description));

    out.push_str("ENTITIES:\n");
    for e in &entities {
        out.push_str(&format!(
            "- [{}] {} (source: {})\n",
            e.entity_type, e.value, e.source
        ));
    }
    out.push('\n');

    out.push_str("RELATIONSHIPS:\n");
    let label = |id: &str| {
        entities
            .iter()
            .find(|e| e.id == id)
            .map(|e| format!("{} ({})", e.value, e.entity_type))
            .unwrap_or_else(|| id.to_string())
    };
    for r in &relationships {
        out.push_str(&format!(
            "- {} --[{}]--> {}\n",
            label(&r.from_entity_id),
            r.rel_type,
            label(&r.to_entity_id)
        ));
    }
    out.push('\n');

    out.push_str("EVIDENCE:\n");
    for ev in &evidence {
        out.push_str(&format!("- {} (collector: {})\n", ev.file_path, ev.collector));
    }

    Ok(out)
}

/// Drives the external analysis subprocess.
pub struct AnalysisBridge {
    llm: LlmSection,
}

impl AnalysisBridge {
    pub fn new(llm: LlmSection) -> Self {
        Self { llm }
    }

    /// Analyze a case, reusing the cached report when the aggregated context
    /// has not changed.
    pub async fn analyze(&self, store: &Store, case_id: &str) -> Result<Analysis, AnalysisError> {
        let case = store
            .get_case(case_id)?
            .ok_or_else(|| AnalysisError::CaseNotFound(case_id.to_string()))?;

        let context = build_case_context(store, case_id)?;
        let context_hash = hash_payload(context.as_bytes());

        if let Some(cached) = store.get_analysis_by_hash(case_id, &context_hash)? {
            info!(case = case_id, "analysis cache hit");
            return Ok(cached);
        }

        let request = BridgeRequest {
            task: "synthesize",
            case_name: &case.name,
            context: &context,
            model: &self.llm.model,
            llm: BridgeLlmConfig {
                provider: &self.llm.provider,
                url: &self.llm.url,
                api_key: &self.llm.api_key,
                timeout: self.llm.timeout_secs,
            },
        };
        let request_json = serde_json::to_vec(&request)?;

        debug!(command = %self.llm.command, "spawning analysis bridge");
        let mut child = Command::new(&self.llm.command)
            .args(&self.llm.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&request_json).await?;
            // Close stdin so the bridge sees EOF.
            drop(stdin);
        }

        let timeout = Duration::from_secs(self.llm.timeout_secs);
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| AnalysisError::Timeout(timeout))??;

        if !output.status.success() {
            return Err(AnalysisError::Bridge(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let mut analysis: Analysis = serde_json::from_slice(&output.stdout)?;
        analysis.id = Uuid::new_v4().to_string();
        analysis.case_id = case_id.to_string();
        analysis.context_hash = context_hash;

        store.save_analysis(&analysis)?;
        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_core::{Case, Entity, Relationship};
    use std::sync::Arc;

    fn seeded_store() -> (Arc<Store>, Case) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let case = Case::new("Exfil Host", "trace the staging server");
        store.create_case(&case).unwrap();

        let domain = Entity::new(&case.id, "domain", "example.com", "dns");
        let ip = Entity::new(&case.id, "ip", "93.184.216.34", "dns");
        store.create_entity(&domain).unwrap();
        store.create_entity(&ip).unwrap();
        store
            .create_relationship(&Relationship::new(
                &case.id,
                &domain.id,
                &ip.id,
                "resolves_to",
            ))
            .unwrap();
        (store, case)
    }

    #[test]
    fn test_context_renders_graph() {
        let (store, case) = seeded_store();
        let context = build_case_context(&store, &case.id).unwrap();

        assert!(context.contains("CASE: Exfil Host"));
        assert!(context.contains("- [domain] example.com (source: dns)"));
        assert!(context.contains("example.com (domain) --[resolves_to]--> 93.184.216.34 (ip)"));
    }

    #[test]
    fn test_context_hash_is_stable() {
        let (store, case) = seeded_store();
        let a = build_case_context(&store, &case.id).unwrap();
        let b = build_case_context(&store, &case.id).unwrap();
        assert_eq!(hash_payload(a.as_bytes()), hash_payload(b.as_bytes()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_bridge_round_trip_and_cache() {
        let (store, case) = seeded_store();

        // A stand-in bridge: drain stdin, emit a fixed report.
        let llm = LlmSection {
            command: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                r#"cat > /dev/null; echo '{"findings":["open ssh"],"risks":[],"connections":[],"next_steps":["verify owner"],"confidence":0.7}'"#
                    .to_string(),
            ],
            timeout_secs: 10,
            ..LlmSection::default()
        };
        let bridge = AnalysisBridge::new(llm);

        let first = bridge.analyze(&store, &case.id).await.unwrap();
        assert_eq!(first.findings, vec!["open ssh"]);
        assert_eq!(first.case_id, case.id);
        assert!(!first.context_hash.is_empty());

        // Unchanged context: the cached row comes back, not a fresh run.
        let second = bridge.analyze(&store, &case.id).await.unwrap();
        assert_eq!(second.id, first.id);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_bridge_failure_is_reported() {
        let (store, case) = seeded_store();
        let llm = LlmSection {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), "echo no provider >&2; exit 1".to_string()],
            timeout_secs: 10,
            ..LlmSection::default()
        };
        let bridge = AnalysisBridge::new(llm);

        let err = bridge.analyze(&store, &case.id).await.unwrap_err();
        match err {
            AnalysisError::Bridge(msg) => assert!(msg.contains("no provider")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_bridge_timeout_is_distinct() {
        let (store, case) = seeded_store();
        let llm = LlmSection {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), "sleep 30".to_string()],
            timeout_secs: 0,
            ..LlmSection::default()
        };
        let bridge = AnalysisBridge::new(llm);

        let err = bridge.analyze(&store, &case.id).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Timeout(_)));
    }
}
