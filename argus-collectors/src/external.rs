//! Subprocess-backed external collectors
//!
//! A plugin is a directory holding a `plugin.toml` manifest; directories
//! without one are not registered. Invocation is `<command> <args...>
//! <target>` in the plugin's own directory, and stdout must be JSON -
//! an array of evidence-shaped objects (or a single object). The host fills
//! in the case id and persists the raw output.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{info, warn};

use argus_core::{meta_from_json, Evidence};

use crate::{CollectError, Collector, EvidenceArchive};

/// Manifest file expected in each plugin directory
pub const MANIFEST_FILE: &str = "plugin.toml";

/// Declared shape of an external plugin.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginManifest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub is_active: bool,
}

pub struct ExternalCollector {
    manifest: PluginManifest,
    dir: PathBuf,
    archive: Arc<EvidenceArchive>,
    timeout: Duration,
}

impl ExternalCollector {
    pub fn new(
        manifest: PluginManifest,
        dir: PathBuf,
        archive: Arc<EvidenceArchive>,
        timeout: Duration,
    ) -> Self {
        Self {
            manifest,
            dir,
            archive,
            timeout,
        }
    }
}

/// Interpret plugin stdout as a list of evidence-shaped objects.
fn parse_plugin_output(
    plugin: &str,
    stdout: &[u8],
) -> Result<Vec<serde_json::Map<String, serde_json::Value>>, CollectError> {
    let value: serde_json::Value = serde_json::from_slice(stdout)
        .map_err(|e| CollectError::PluginOutput(plugin.to_string(), e.to_string()))?;

    match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                serde_json::Value::Object(obj) => Ok(obj),
                other => Err(CollectError::PluginOutput(
                    plugin.to_string(),
                    format!("expected object in array, got {other}"),
                )),
            })
            .collect(),
        serde_json::Value::Object(obj) => Ok(vec![obj]),
        other => Err(CollectError::PluginOutput(
            plugin.to_string(),
            format!("expected array or object, got {other}"),
        )),
    }
}

#[async_trait]
impl Collector for ExternalCollector {
    fn name(&self) -> &str {
        &self.manifest.name
    }

    fn description(&self) -> &str {
        &self.manifest.description
    }

    fn is_active(&self) -> bool {
        self.manifest.is_active
    }

    async fn collect(
        &self,
        case_id: &str,
        target: &str,
    ) -> Result<Vec<Evidence>, CollectError> {
        let mut cmd = Command::new(&self.manifest.command);
        cmd.args(&self.manifest.args)
            .arg(target)
            .current_dir(&self.dir)
            .kill_on_drop(true);

        // The dropped future kills the child via kill_on_drop.
        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| CollectError::Timeout(self.timeout))?
            .map_err(|e| {
                CollectError::Network(format!(
                    "failed to execute plugin '{}': {e}",
                    self.manifest.name
                ))
            })?;

        if !output.status.success() {
            return Err(CollectError::PluginExit {
                name: self.manifest.name.clone(),
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let items = parse_plugin_output(&self.manifest.name, &output.stdout)?;
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let base = self
            .archive
            .persist(case_id, &self.manifest.name, target, "json", &output.stdout)
            .await?;

        let rows = items
            .into_iter()
            .map(|obj| {
                let mut ev = Evidence::new(
                    case_id,
                    &self.manifest.name,
                    &base.file_path,
                    &base.file_hash,
                );
                for (key, value) in &obj {
                    ev.metadata.insert(key.clone(), meta_from_json(value));
                }
                ev.metadata
                    .entry("target".to_string())
                    .or_insert_with(|| target.into());
                ev.metadata.insert("source".into(), "external_plugin".into());
                ev
            })
            .collect();

        Ok(rows)
    }
}

/// Scan a plugins directory for manifest-bearing subdirectories.
///
/// Broken manifests are logged and skipped; a missing directory is not an
/// error, just zero plugins.
pub fn discover_plugins(
    plugins_dir: &Path,
    archive: Arc<EvidenceArchive>,
    timeout: Duration,
) -> Vec<ExternalCollector> {
    let entries = match std::fs::read_dir(plugins_dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut collectors = Vec::new();
    for entry in entries.flatten() {
        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }
        let manifest_path = dir.join(MANIFEST_FILE);
        let raw = match std::fs::read_to_string(&manifest_path) {
            Ok(raw) => raw,
            Err(_) => continue,
        };
        match toml::from_str::<PluginManifest>(&raw) {
            Ok(manifest) => {
                info!(name = %manifest.name, path = %dir.display(), "loaded external plugin");
                collectors.push(ExternalCollector::new(
                    manifest,
                    dir,
                    archive.clone(),
                    timeout,
                ));
            }
            Err(e) => {
                warn!(path = %manifest_path.display(), error = %e, "invalid plugin manifest");
            }
        }
    }

    collectors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_parse() {
        let raw = r#"
name = "echo_test"
description = "echoes the target back"
command = "python3"
args = ["main.py"]
is_active = false
"#;
        let manifest: PluginManifest = toml::from_str(raw).unwrap();
        assert_eq!(manifest.name, "echo_test");
        assert_eq!(manifest.args, vec!["main.py"]);
        assert!(!manifest.is_active);
    }

    #[test]
    fn test_manifest_defaults() {
        let manifest: PluginManifest =
            toml::from_str("name = \"x\"\ncommand = \"/bin/x\"").unwrap();
        assert!(manifest.args.is_empty());
        assert!(!manifest.is_active);
    }

    #[test]
    fn test_parse_array_output() {
        let items =
            parse_plugin_output("p", br#"[{"status": "ok"}, {"status": "ok"}]"#).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_parse_single_object_output() {
        let items = parse_plugin_output("p", br#"{"status": "ok"}"#).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(matches!(
            parse_plugin_output("p", b"not json"),
            Err(CollectError::PluginOutput(_, _))
        ));
        assert!(matches!(
            parse_plugin_output("p", b"42"),
            Err(CollectError::PluginOutput(_, _))
        ));
    }

    #[test]
    fn test_discovery_skips_bare_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("no_manifest")).unwrap();

        let plugin_dir = dir.path().join("echoer");
        std::fs::create_dir(&plugin_dir).unwrap();
        std::fs::write(
            plugin_dir.join(MANIFEST_FILE),
            "name = \"echoer\"\ncommand = \"echo\"",
        )
        .unwrap();

        let archive = Arc::new(EvidenceArchive::new(dir.path().join("evidence")));
        let plugins = discover_plugins(dir.path(), archive, Duration::from_secs(5));
        assert_eq!(plugins.len(), 1);
        assert_eq!(plugins[0].name(), "echoer");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_collect_runs_subprocess() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Arc::new(EvidenceArchive::new(dir.path().join("evidence")));

        // `sh -c 'echo ...' sh <target>` emits a fixed evidence array while
        // still receiving the target as the trailing argument.
        let manifest = PluginManifest {
            name: "echoer".to_string(),
            description: "test fixture".to_string(),
            command: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                r#"echo "[{\"status\":\"ok\",\"probe\":\"$1\"}]""#.to_string(),
                "sh".to_string(),
            ],
            is_active: false,
        };

        let collector = ExternalCollector::new(
            manifest,
            dir.path().to_path_buf(),
            archive,
            Duration::from_secs(5),
        );

        let rows = collector.collect("case-1", "example.com").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].meta_str("status"), Some("ok"));
        assert_eq!(rows[0].meta_str("probe"), Some("example.com"));
        assert_eq!(rows[0].meta_str("source"), Some("external_plugin"));
        assert_eq!(rows[0].case_id, "case-1");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_collect_surfaces_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Arc::new(EvidenceArchive::new(dir.path().join("evidence")));

        let manifest = PluginManifest {
            name: "broken".to_string(),
            description: String::new(),
            command: "sh".to_string(),
            args: vec!["-c".to_string(), "echo boom >&2; exit 3".to_string()],
            is_active: false,
        };

        let collector = ExternalCollector::new(
            manifest,
            dir.path().to_path_buf(),
            archive,
            Duration::from_secs(5),
        );

        let err = collector.collect("case-1", "x").await.unwrap_err();
        match err {
            CollectError::PluginExit { name, code, stderr } => {
                assert_eq!(name, "broken");
                assert_eq!(code, 3);
                assert!(stderr.contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_collect_timeout_is_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Arc::new(EvidenceArchive::new(dir.path().join("evidence")));

        let manifest = PluginManifest {
            name: "sleeper".to_string(),
            description: String::new(),
            command: "sh".to_string(),
            args: vec!["-c".to_string(), "sleep 30".to_string()],
            is_active: false,
        };

        let collector = ExternalCollector::new(
            manifest,
            dir.path().to_path_buf(),
            archive,
            Duration::from_millis(100),
        );

        let err = collector.collect("case-1", "x").await.unwrap_err();
        assert!(matches!(err, CollectError::Timeout(_)));
    }
}
