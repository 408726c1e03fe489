//! Active social-username sweep
//!
//! Probes a fixed set of platforms for a username by URL templating. The
//! internal fan-out is capped so one sweep cannot overwhelm the rate governor
//! or the network; only confirmed profiles become evidence.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use argus_core::Evidence;
use argus_net::{build_client, NetConfig, NetError, RateGovernor};

use crate::{CollectError, Collector, EvidenceArchive};

/// Platform name and profile URL template; `{}` is the username slot.
const PLATFORMS: &[(&str, &str)] = &[
    ("GitHub", "https://github.com/{}"),
    ("Twitter", "https://twitter.com/{}"),
    ("Instagram", "https://www.instagram.com/{}"),
    ("Reddit", "https://www.reddit.com/user/{}"),
    ("Facebook", "https://www.facebook.com/{}"),
    ("GitLab", "https://gitlab.com/{}"),
    ("Medium", "https://medium.com/@{}"),
    ("YouTube", "https://www.youtube.com/@{}"),
    ("Twitch", "https://www.twitch.tv/{}"),
    ("TikTok", "https://www.tiktok.com/@{}"),
];

/// Concurrent probes in flight per sweep
const SWEEP_CONCURRENCY: usize = 5;

#[derive(Debug, Clone, Serialize)]
struct PlatformHit {
    site: String,
    url: String,
    status: String,
}

pub struct SocialCollector {
    archive: Arc<EvidenceArchive>,
    client: Client,
    governor: Arc<RateGovernor>,
}

impl SocialCollector {
    pub fn new(
        archive: Arc<EvidenceArchive>,
        net: &NetConfig,
        governor: Arc<RateGovernor>,
    ) -> Result<Self, NetError> {
        Ok(Self {
            archive,
            client: build_client(net)?,
            governor,
        })
    }

    pub(crate) fn profile_url(template: &str, username: &str) -> String {
        template.replace("{}", username)
    }

    async fn probe(&self, site: &str, template: &str, username: &str) -> Option<PlatformHit> {
        self.governor.wait("social").await;

        let url = Self::profile_url(template, username);
        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().as_u16() == 200 => Some(PlatformHit {
                site: site.to_string(),
                url,
                status: "found".to_string(),
            }),
            Ok(resp) => {
                debug!(site, status = resp.status().as_u16(), "no profile");
                None
            }
            Err(e) => {
                debug!(site, error = %e, "probe failed");
                None
            }
        }
    }
}

#[async_trait]
impl Collector for SocialCollector {
    fn name(&self) -> &str {
        "social"
    }

    fn description(&self) -> &str {
        "Checks for username presence across social media sites"
    }

    fn is_active(&self) -> bool {
        true
    }

    async fn collect(
        &self,
        case_id: &str,
        target: &str,
    ) -> Result<Vec<Evidence>, CollectError> {
        let username = target;

        let platforms: Vec<(String, String)> = PLATFORMS
            .iter()
            .map(|&(site, template)| (site.to_string(), template.to_string()))
            .collect();

        let hits: Vec<PlatformHit> = stream::iter(platforms)
            .map(|(site, template)| async move {
                self.probe(&site, &template, username).await
            })
            .buffer_unordered(SWEEP_CONCURRENCY)
            .filter_map(|hit| async move { hit })
            .collect()
            .await;

        // Nothing found is a result, not an error.
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let payload = serde_json::to_vec_pretty(&hits)?;
        let mut ev = self
            .archive
            .persist(case_id, "social", username, "json", &payload)
            .await?;
        ev.metadata.insert("count".into(), hits.len().into());

        Ok(vec![ev])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_url_templating() {
        assert_eq!(
            SocialCollector::profile_url("https://medium.com/@{}", "ghost"),
            "https://medium.com/@ghost"
        );
        assert_eq!(
            SocialCollector::profile_url("https://github.com/{}", "octocat"),
            "https://github.com/octocat"
        );
    }

    #[test]
    fn test_platform_set_is_fixed() {
        assert_eq!(PLATFORMS.len(), 10);
        assert!(PLATFORMS.iter().all(|(_, t)| t.contains("{}")));
    }
}
