//! Active page screenshot collector
//!
//! Renders the target in a headless browser subprocess and captures a PNG.
//! Ghost mode routes the browser through the anonymizing proxy. The browser
//! writes the capture file directly; the archive adopts and hashes it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use argus_core::Evidence;
use argus_net::NetConfig;

use crate::{CollectError, Collector, EvidenceArchive};

const CAPTURE_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ScreenshotCollector {
    archive: Arc<EvidenceArchive>,
    browser: String,
    proxy: Option<String>,
}

impl ScreenshotCollector {
    /// `browser` is the headless-capable chromium binary to invoke.
    pub fn new(archive: Arc<EvidenceArchive>, browser: String, net: &NetConfig) -> Self {
        Self {
            archive,
            browser,
            proxy: net.effective_proxy().map(str::to_string),
        }
    }

    fn normalize_url(target: &str) -> String {
        if target.starts_with("http://") || target.starts_with("https://") {
            target.to_string()
        } else {
            format!("http://{target}")
        }
    }
}

#[async_trait]
impl Collector for ScreenshotCollector {
    fn name(&self) -> &str {
        "screenshot"
    }

    fn description(&self) -> &str {
        "Captures full-page screenshots of the target"
    }

    fn is_active(&self) -> bool {
        true
    }

    async fn collect(
        &self,
        case_id: &str,
        target: &str,
    ) -> Result<Vec<Evidence>, CollectError> {
        let url = Self::normalize_url(target);
        let out_path = self
            .archive
            .reserve_path(case_id, "screenshot", target, "png")
            .await?;

        let mut cmd = Command::new(&self.browser);
        cmd.arg("--headless")
            .arg("--disable-gpu")
            .arg("--hide-scrollbars")
            .arg("--window-size=1280,900")
            .arg(format!("--screenshot={}", out_path.display()));
        if let Some(proxy) = &self.proxy {
            cmd.arg(format!("--proxy-server={proxy}"));
        }
        cmd.arg(&url).kill_on_drop(true);

        debug!(target, browser = %self.browser, "launching headless capture");
        let output = tokio::time::timeout(CAPTURE_TIMEOUT, cmd.output())
            .await
            .map_err(|_| CollectError::Timeout(CAPTURE_TIMEOUT))?
            .map_err(|e| CollectError::Network(format!("failed to launch browser: {e}")))?;

        if !output.status.success() {
            return Err(CollectError::Network(format!(
                "screenshot failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let mut ev = self
            .archive
            .adopt(case_id, "screenshot", target, &out_path)
            .await?;
        let size = tokio::fs::metadata(&out_path).await?.len() as usize;
        ev.metadata.insert("size".into(), size.into());
        ev.metadata.insert("type".into(), "image/png".into());

        Ok(vec![ev])
    }
}
