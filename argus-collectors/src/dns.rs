//! Passive DNS collector
//!
//! Resolves A, MX, and NS records. Record types fail independently; the
//! evidence payload holds whatever succeeded.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use tracing::debug;

use argus_core::Evidence;

use crate::{CollectError, Collector, EvidenceArchive};

pub struct DnsCollector {
    archive: Arc<EvidenceArchive>,
    resolver: TokioAsyncResolver,
}

impl DnsCollector {
    pub fn new(archive: Arc<EvidenceArchive>) -> Self {
        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(5);
        opts.attempts = 2;
        let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), opts);
        Self { archive, resolver }
    }

    fn trim_root(name: String) -> String {
        name.trim_end_matches('.').to_string()
    }
}

#[async_trait]
impl Collector for DnsCollector {
    fn name(&self) -> &str {
        "dns"
    }

    fn description(&self) -> &str {
        "Passive DNS lookup for A, MX, and NS records"
    }

    fn is_active(&self) -> bool {
        false
    }

    async fn collect(
        &self,
        case_id: &str,
        target: &str,
    ) -> Result<Vec<Evidence>, CollectError> {
        let mut records: BTreeMap<String, Vec<String>> = BTreeMap::new();

        match self.resolver.lookup_ip(target).await {
            Ok(lookup) => {
                records.insert("A".into(), lookup.iter().map(|ip| ip.to_string()).collect());
            }
            Err(e) => {
                debug!(target, error = %e, "A lookup failed");
                records.insert("A".into(), Vec::new());
            }
        }

        if let Ok(lookup) = self.resolver.mx_lookup(target).await {
            records.insert(
                "MX".into(),
                lookup
                    .iter()
                    .map(|mx| Self::trim_root(mx.exchange().to_utf8()))
                    .collect(),
            );
        }

        if let Ok(lookup) = self.resolver.ns_lookup(target).await {
            records.insert(
                "NS".into(),
                lookup
                    .iter()
                    .map(|ns| Self::trim_root(ns.0.to_utf8()))
                    .collect(),
            );
        }

        let payload = serde_json::to_vec_pretty(&records)?;
        let mut ev = self
            .archive
            .persist(case_id, "dns", target, "json", &payload)
            .await?;
        ev.metadata.insert("types".into(), "A,MX,NS".into());

        Ok(vec![ev])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_root_label() {
        assert_eq!(
            DnsCollector::trim_root("mail.example.com.".to_string()),
            "mail.example.com"
        );
        assert_eq!(
            DnsCollector::trim_root("mail.example.com".to_string()),
            "mail.example.com"
        );
    }
}
