//! Passive GeoIP collector
//!
//! Enriches IP addresses with geolocation via the ip-api.com JSON endpoint.
//! The extracted fields land in evidence metadata; ingestion merges them into
//! the subject entity instead of creating location entities.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;

use argus_core::{meta_from_json, Evidence};
use argus_net::{build_client, NetConfig, NetError};

use crate::{CollectError, Collector, EvidenceArchive};

pub struct GeoIpCollector {
    archive: Arc<EvidenceArchive>,
    client: Client,
}

impl GeoIpCollector {
    pub fn new(archive: Arc<EvidenceArchive>, net: &NetConfig) -> Result<Self, NetError> {
        Ok(Self {
            archive,
            client: build_client(net)?,
        })
    }
}

#[async_trait]
impl Collector for GeoIpCollector {
    fn name(&self) -> &str {
        "geo"
    }

    fn description(&self) -> &str {
        "Enrich IP addresses with geolocation data via ip-api.com"
    }

    fn is_active(&self) -> bool {
        false
    }

    async fn collect(
        &self,
        case_id: &str,
        target: &str,
    ) -> Result<Vec<Evidence>, CollectError> {
        let url = format!("http://ip-api.com/json/{target}");
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollectError::Api {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body = response.bytes().await?;
        let result: serde_json::Value = serde_json::from_slice(&body)?;

        if result["status"] == "fail" {
            return Err(CollectError::Lookup(format!(
                "geoip lookup for '{target}' failed: {}",
                result["message"].as_str().unwrap_or("unknown reason")
            )));
        }

        let mut ev = self
            .archive
            .persist(case_id, "geo", target, "json", &body)
            .await?;

        for (meta_key, api_key) in [
            ("country", "countryCode"),
            ("city", "city"),
            ("isp", "isp"),
            ("lat", "lat"),
            ("lon", "lon"),
        ] {
            if let Some(value) = result.get(api_key).filter(|v| !v.is_null()) {
                ev.metadata.insert(meta_key.into(), meta_from_json(value));
            }
        }

        Ok(vec![ev])
    }
}
