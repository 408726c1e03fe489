//! Collector registry
//!
//! An explicitly constructed mapping from collector name to instance, built
//! once at startup from the assembly point and shared read-only afterwards.
//! No ambient process-wide state: tests run as many isolated registries
//! concurrently as they like.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use argus_collectors::{
    discover_plugins, Collector, DnsCollector, EvidenceArchive, GeoIpCollector, GitHubCollector,
    HttpProbeCollector, PortsCollector, ScreenshotCollector, SocialCollector, WhoisCollector,
};
use argus_net::{NetConfig, NetError, RateGovernor};

use crate::AppConfig;

/// Name -> collector mapping. Registration is exclusive and completes before
/// any run begins; lookups afterwards are plain shared reads.
#[derive(Default)]
pub struct CollectorRegistry {
    collectors: HashMap<String, Arc<dyn Collector>>,
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a collector. A later registration under the same name wins.
    pub fn register(&mut self, collector: Arc<dyn Collector>) {
        let name = collector.name().to_string();
        debug!(collector = %name, "registered collector");
        self.collectors.insert(name, collector);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Collector>> {
        self.collectors.get(name).cloned()
    }

    /// All registered collectors, name-sorted for stable output.
    pub fn list(&self) -> Vec<Arc<dyn Collector>> {
        let mut all: Vec<_> = self.collectors.values().cloned().collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }
}

/// Build the registry from configuration: all built-ins plus any external
/// plugins discovered under the plugins directory.
pub fn assemble_registry(
    config: &AppConfig,
    archive: Arc<EvidenceArchive>,
    governor: Arc<RateGovernor>,
) -> Result<CollectorRegistry, NetError> {
    let net: NetConfig = config.net_config();
    let mut registry = CollectorRegistry::new();

    registry.register(Arc::new(DnsCollector::new(archive.clone())));
    registry.register(Arc::new(WhoisCollector::new(archive.clone())));
    registry.register(Arc::new(GeoIpCollector::new(archive.clone(), &net)?));
    registry.register(Arc::new(GitHubCollector::new(
        archive.clone(),
        &net,
        config.keys.get("github").cloned(),
    )?));
    registry.register(Arc::new(PortsCollector::new(
        archive.clone(),
        governor.clone(),
        config.ports_mode(),
    )));
    registry.register(Arc::new(HttpProbeCollector::new(archive.clone(), &net)?));
    registry.register(Arc::new(ScreenshotCollector::new(
        archive.clone(),
        config.collectors.screenshot.browser.clone(),
        &net,
    )));
    registry.register(Arc::new(SocialCollector::new(
        archive.clone(),
        &net,
        governor,
    )?));

    for plugin in discover_plugins(
        config.plugins.dir.as_ref(),
        archive,
        Duration::from_secs(config.plugins.timeout_secs),
    ) {
        registry.register(Arc::new(plugin));
    }

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_core::Evidence;
    use argus_collectors::CollectError;
    use async_trait::async_trait;

    struct FakeCollector(&'static str);

    #[async_trait]
    impl Collector for FakeCollector {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "fake"
        }
        fn is_active(&self) -> bool {
            false
        }
        async fn collect(
            &self,
            _case_id: &str,
            _target: &str,
        ) -> Result<Vec<Evidence>, CollectError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = CollectorRegistry::new();
        registry.register(Arc::new(FakeCollector("alpha")));
        registry.register(Arc::new(FakeCollector("beta")));

        assert_eq!(registry.len(), 2);
        assert!(registry.get("alpha").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_later_registration_wins() {
        let mut registry = CollectorRegistry::new();
        registry.register(Arc::new(FakeCollector("dup")));
        registry.register(Arc::new(FakeCollector("dup")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_list_is_name_sorted() {
        let mut registry = CollectorRegistry::new();
        registry.register(Arc::new(FakeCollector("zeta")));
        registry.register(Arc::new(FakeCollector("alpha")));

        let names: Vec<_> = registry.list().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_assemble_registry_includes_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::default();
        let archive = Arc::new(EvidenceArchive::new(dir.path()));
        let governor = Arc::new(RateGovernor::new());

        let registry = assemble_registry(&config, archive, governor).unwrap();
        for name in ["dns", "whois", "geo", "github", "ports", "http", "screenshot", "social"] {
            assert!(registry.get(name).is_some(), "missing builtin '{name}'");
        }
    }
}
