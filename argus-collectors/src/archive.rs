//! Evidence file archive
//!
//! Every collection act leaves a raw payload file under
//! `<root>/<case_id>/<collector>_<target>_<unix ts>.<ext>` plus a SHA-256
//! hash recorded on the evidence row. Files are never rewritten.

use std::path::{Path, PathBuf};

use argus_core::{hash_payload, Evidence};

use crate::CollectError;

/// Writes and hashes raw evidence payloads under a per-case directory.
#[derive(Debug, Clone)]
pub struct EvidenceArchive {
    root: PathBuf,
}

impl EvidenceArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem-safe rendering of a target string.
    fn sanitize(target: &str) -> String {
        target
            .replace("://", "_")
            .replace([':', '/', '\\', ' '], "_")
    }

    /// Reserve the path an evidence file will live at, creating the case
    /// directory. Used by collectors whose tooling writes the file itself.
    pub async fn reserve_path(
        &self,
        case_id: &str,
        collector: &str,
        target: &str,
        ext: &str,
    ) -> Result<PathBuf, CollectError> {
        let dir = self.root.join(case_id);
        tokio::fs::create_dir_all(&dir).await?;
        let name = format!(
            "{collector}_{}_{}.{ext}",
            Self::sanitize(target),
            chrono::Utc::now().timestamp()
        );
        Ok(dir.join(name))
    }

    /// Write a payload, hash it, and build the evidence row. The `target`
    /// metadata key is pre-filled since every ingestion routine needs it.
    pub async fn persist(
        &self,
        case_id: &str,
        collector: &str,
        target: &str,
        ext: &str,
        payload: &[u8],
    ) -> Result<Evidence, CollectError> {
        let path = self.reserve_path(case_id, collector, target, ext).await?;
        tokio::fs::write(&path, payload).await?;

        let mut ev = Evidence::new(
            case_id,
            collector,
            &path.to_string_lossy(),
            &hash_payload(payload),
        );
        ev.metadata.insert("target".into(), target.into());
        Ok(ev)
    }

    /// Hash and register a file some external tool already wrote at a
    /// reserved path.
    pub async fn adopt(
        &self,
        case_id: &str,
        collector: &str,
        target: &str,
        path: &Path,
    ) -> Result<Evidence, CollectError> {
        let payload = tokio::fs::read(path).await?;
        let mut ev = Evidence::new(
            case_id,
            collector,
            &path.to_string_lossy(),
            &hash_payload(&payload),
        );
        ev.metadata.insert("target".into(), target.into());
        Ok(ev)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_core::hash_payload;

    #[tokio::test]
    async fn test_persist_writes_and_hashes() {
        let dir = tempfile::tempdir().unwrap();
        let archive = EvidenceArchive::new(dir.path());

        let ev = archive
            .persist("case-1", "dns", "example.com", "json", b"{\"A\": []}")
            .await
            .unwrap();

        let on_disk = std::fs::read(&ev.file_path).unwrap();
        assert_eq!(hash_payload(&on_disk), ev.file_hash);
        assert_eq!(ev.meta_str("target"), Some("example.com"));
        assert!(ev.file_path.contains("case-1"));
    }

    #[test]
    fn test_sanitize_strips_separators() {
        assert_eq!(
            EvidenceArchive::sanitize("https://example.com/a:b"),
            "https_example.com_a_b"
        );
    }
}
