//! Active HTTP service discovery
//!
//! Fetches the target over HTTPS with an HTTP fallback and records status,
//! headers, and the page title. The title comes from the first 4 KiB of the
//! body; anything past that is not worth pulling for fingerprinting.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use argus_core::Evidence;
use argus_net::{build_client, NetConfig, NetError};

use crate::{CollectError, Collector, EvidenceArchive};

static TITLE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());

const BODY_SAMPLE_BYTES: usize = 4096;

#[derive(Debug, Serialize)]
struct ProbeResult {
    url: String,
    status_code: u16,
    headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
}

pub struct HttpProbeCollector {
    archive: Arc<EvidenceArchive>,
    client: Client,
}

impl HttpProbeCollector {
    pub fn new(archive: Arc<EvidenceArchive>, net: &NetConfig) -> Result<Self, NetError> {
        // Probes get a tighter deadline than general API traffic.
        let config = NetConfig {
            timeout_secs: 10,
            ..net.clone()
        };
        Ok(Self {
            archive,
            client: build_client(&config)?,
        })
    }

    pub(crate) fn extract_title(body: &str) -> Option<String> {
        TITLE_REGEX
            .captures(body)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|t| !t.is_empty())
    }
}

#[async_trait]
impl Collector for HttpProbeCollector {
    fn name(&self) -> &str {
        "http"
    }

    fn description(&self) -> &str {
        "Active HTTP service discovery (headers, title)"
    }

    fn is_active(&self) -> bool {
        true
    }

    async fn collect(
        &self,
        case_id: &str,
        target: &str,
    ) -> Result<Vec<Evidence>, CollectError> {
        let (url, response) = if target.starts_with("http") {
            let resp = self.client.get(target).send().await?;
            (target.to_string(), resp)
        } else {
            let https_url = format!("https://{target}");
            match self.client.get(&https_url).send().await {
                Ok(resp) => (https_url, resp),
                Err(e) => {
                    debug!(target, error = %e, "https probe failed, falling back to http");
                    let http_url = format!("http://{target}");
                    let resp = self.client.get(&http_url).send().await?;
                    (http_url, resp)
                }
            }
        };

        let status_code = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.to_string(),
                    v.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();

        let body = response.bytes().await.unwrap_or_default();
        let sample = String::from_utf8_lossy(&body[..body.len().min(BODY_SAMPLE_BYTES)]);
        let title = Self::extract_title(&sample);

        let result = ProbeResult {
            url,
            status_code,
            headers: headers.clone(),
            title: title.clone(),
        };

        let payload = serde_json::to_vec_pretty(&result)?;
        let mut ev = self
            .archive
            .persist(case_id, "http", target, "json", &payload)
            .await?;

        if let Some(server) = headers.get("server") {
            ev.metadata.insert("server".into(), server.as_str().into());
        }
        if let Some(title) = title {
            ev.metadata.insert("title".into(), title.into());
        }

        Ok(vec![ev])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_extraction() {
        let body = "<html><head><TITLE>  Admin Panel </TITLE></head></html>";
        assert_eq!(
            HttpProbeCollector::extract_title(body).as_deref(),
            Some("Admin Panel")
        );
    }

    #[test]
    fn test_title_spanning_lines() {
        let body = "<title>\nlogin\n</title>";
        assert_eq!(
            HttpProbeCollector::extract_title(body).as_deref(),
            Some("login")
        );
    }

    #[test]
    fn test_missing_title() {
        assert!(HttpProbeCollector::extract_title("<h1>no title</h1>").is_none());
    }
}
