//! Passive GitHub search collector
//!
//! Repository search against the GitHub API. A personal access token is
//! optional and only raises the rate limit; the raw search response is the
//! evidence payload, parsed later by ingestion.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;

use argus_core::Evidence;
use argus_net::{build_client, NetConfig, NetError};

use crate::{CollectError, Collector, EvidenceArchive};

pub struct GitHubCollector {
    archive: Arc<EvidenceArchive>,
    client: Client,
    token: Option<String>,
}

impl GitHubCollector {
    pub fn new(
        archive: Arc<EvidenceArchive>,
        net: &NetConfig,
        token: Option<String>,
    ) -> Result<Self, NetError> {
        Ok(Self {
            archive,
            client: build_client(net)?,
            token,
        })
    }
}

#[async_trait]
impl Collector for GitHubCollector {
    fn name(&self) -> &str {
        "github"
    }

    fn description(&self) -> &str {
        "Search GitHub for repositories and users"
    }

    fn is_active(&self) -> bool {
        false
    }

    async fn collect(
        &self,
        case_id: &str,
        target: &str,
    ) -> Result<Vec<Evidence>, CollectError> {
        let url = format!(
            "https://api.github.com/search/repositories?q={}",
            urlencoding::encode(target)
        );

        let mut request = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github.v3+json");
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("token {token}"));
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(CollectError::Api {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        let ev = self
            .archive
            .persist(case_id, "github", target, "json", &body)
            .await?;

        Ok(vec![ev])
    }
}
