//! Execution engine
//!
//! Composes the gates in front of every collector run:
//! consent -> scope -> rate -> collect -> persist -> ingest.
//!
//! The consent gate comes first so that declining consent never consumes a
//! rate-limit token. Bulk runs fan out one task per eligible collector;
//! failures are isolated and reported per collector, never escalated to
//! abort the batch.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use thiserror::Error;
use tracing::{info, warn};

use argus_collectors::CollectError;
use argus_core::Evidence;
use argus_net::{GovernorError, RateGovernor, ScopeError, ScopePolicy};
use argus_store::{ingest_evidence, Store, StoreError};

use crate::CollectorRegistry;

/// Errors from a single collector invocation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("collector '{0}' not found")]
    UnknownCollector(String),

    #[error("collector '{0}' is an active probe; explicit consent is required to run it")]
    ConsentDenied(String),

    #[error("safety block: {0}")]
    Scope(#[from] ScopeError),

    #[error("rate limit: {0}")]
    Rate(#[from] GovernorError),

    #[error("collection failed: {0}")]
    Collect(#[from] CollectError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Per-collector result of a bulk run.
#[derive(Debug)]
pub struct CollectorOutcome {
    pub collector: String,
    /// Evidence count on success, reason string on failure
    pub result: Result<usize, String>,
}

/// The collection pipeline. Cheap to clone; all parts are shared.
#[derive(Clone)]
pub struct Engine {
    registry: Arc<CollectorRegistry>,
    governor: Arc<RateGovernor>,
    scope: Arc<ScopePolicy>,
    store: Arc<Store>,
    rate_deadline: Option<Duration>,
}

impl Engine {
    pub fn new(
        registry: Arc<CollectorRegistry>,
        governor: Arc<RateGovernor>,
        scope: Arc<ScopePolicy>,
        store: Arc<Store>,
    ) -> Self {
        Self {
            registry,
            governor,
            scope,
            store,
            rate_deadline: None,
        }
    }

    /// Bound rate-limit waits; past the deadline the run fails with a
    /// cancellation error instead of waiting forever.
    pub fn with_rate_deadline(mut self, deadline: Duration) -> Self {
        self.rate_deadline = Some(deadline);
        self
    }

    pub fn registry(&self) -> &CollectorRegistry {
        &self.registry
    }

    /// Run one collector through the full gate chain, persisting and
    /// ingesting whatever evidence it yields.
    pub async fn run(
        &self,
        name: &str,
        case_id: &str,
        target: &str,
        active_allowed: bool,
    ) -> Result<Vec<Evidence>, EngineError> {
        let collector = self
            .registry
            .get(name)
            .ok_or_else(|| EngineError::UnknownCollector(name.to_string()))?;

        // Consent is checked before anything else; a refusal must not cost a
        // rate-limit token or touch the network.
        if collector.is_active() && !active_allowed {
            return Err(EngineError::ConsentDenied(name.to_string()));
        }

        self.scope.check(target)?;

        match self.rate_deadline {
            Some(deadline) => self.governor.wait_with_deadline(name, deadline).await?,
            None => self.governor.wait(name).await,
        }

        let evidence = collector.collect(case_id, target).await?;
        info!(collector = name, items = evidence.len(), "collection complete");

        for ev in &evidence {
            self.store.create_evidence(ev)?;
            // Evidence persistence is the durability guarantee; the graph is
            // best-effort and ingestion failures are not rolled back.
            if let Err(e) = ingest_evidence(&self.store, ev) {
                warn!(collector = name, evidence = %ev.id, error = %e, "ingestion failed");
            }
        }

        Ok(evidence)
    }

    /// Collectors a bulk run would dispatch, honoring the consent flag.
    pub fn eligible_collectors(&self, active_allowed: bool) -> Vec<String> {
        self.registry
            .list()
            .into_iter()
            .filter(|c| active_allowed || !c.is_active())
            .map(|c| c.name().to_string())
            .collect()
    }

    /// Fan out every eligible collector concurrently. One collector's failure
    /// is reported in its own outcome and never delays or cancels siblings.
    pub async fn run_all(
        &self,
        case_id: &str,
        target: &str,
        active_allowed: bool,
    ) -> Vec<CollectorOutcome> {
        let names = self.eligible_collectors(active_allowed);
        info!(target, collectors = names.len(), "starting bulk collection");

        let tasks = names.into_iter().map(|name| {
            let engine = self.clone();
            let case_id = case_id.to_string();
            let target = target.to_string();
            tokio::spawn(async move {
                let result = engine
                    .run(&name, &case_id, &target, active_allowed)
                    .await
                    .map(|evidence| evidence.len())
                    .map_err(|e| e.to_string());
                CollectorOutcome {
                    collector: name,
                    result,
                }
            })
        });

        join_all(tasks)
            .await
            .into_iter()
            .map(|joined| match joined {
                Ok(outcome) => outcome,
                Err(e) => CollectorOutcome {
                    collector: "<panicked>".to_string(),
                    result: Err(format!("collector task failed: {e}")),
                },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_collectors::Collector;
    use argus_core::Case;
    use async_trait::async_trait;

    struct MockCollector {
        name: &'static str,
        active: bool,
        fail: bool,
        items: usize,
    }

    impl MockCollector {
        fn passive(name: &'static str, items: usize) -> Self {
            Self {
                name,
                active: false,
                fail: false,
                items,
            }
        }

        fn failing(name: &'static str) -> Self {
            Self {
                name,
                active: false,
                fail: true,
                items: 0,
            }
        }

        fn active(name: &'static str) -> Self {
            Self {
                name,
                active: true,
                fail: false,
                items: 1,
            }
        }
    }

    #[async_trait]
    impl Collector for MockCollector {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "mock"
        }
        fn is_active(&self) -> bool {
            self.active
        }
        async fn collect(
            &self,
            case_id: &str,
            target: &str,
        ) -> Result<Vec<Evidence>, CollectError> {
            if self.fail {
                return Err(CollectError::Network("connection refused".to_string()));
            }
            Ok((0..self.items)
                .map(|i| {
                    let mut ev =
                        Evidence::new(case_id, self.name, &format!("/tmp/mock_{i}.json"), "hash");
                    ev.metadata.insert("target".into(), target.into());
                    ev
                })
                .collect())
        }
    }

    fn engine_with(collectors: Vec<MockCollector>) -> (Engine, Arc<Store>, Case) {
        let mut registry = CollectorRegistry::new();
        for c in collectors {
            registry.register(Arc::new(c));
        }
        let store = Arc::new(Store::open_in_memory().unwrap());
        let case = Case::new("engine fixture", "");
        store.create_case(&case).unwrap();

        let engine = Engine::new(
            Arc::new(registry),
            Arc::new(RateGovernor::new()),
            Arc::new(ScopePolicy::default()),
            store.clone(),
        );
        (engine, store, case)
    }

    #[tokio::test]
    async fn test_unknown_collector() {
        let (engine, _store, case) = engine_with(vec![]);
        let err = engine
            .run("nope", &case.id, "example.com", false)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownCollector(_)));
    }

    #[tokio::test]
    async fn test_consent_denied_before_token_spend() {
        let (engine, _store, case) = engine_with(vec![MockCollector::active("probe")]);

        let err = engine
            .run("probe", &case.id, "example.com", false)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ConsentDenied(_)));

        // The refusal happened before the rate gate: the bucket is untouched.
        assert_eq!(engine.governor.available("probe"), 1.0);
    }

    #[tokio::test]
    async fn test_scope_block_before_token_spend() {
        let (engine, _store, case) = engine_with(vec![MockCollector::passive("lookup", 1)]);

        let err = engine
            .run("lookup", &case.id, "target.mil", false)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Scope(_)));
        assert_eq!(engine.governor.available("lookup"), 1.0);
    }

    #[tokio::test]
    async fn test_run_persists_evidence() {
        let (engine, store, case) = engine_with(vec![MockCollector::passive("lookup", 2)]);

        let evidence = engine
            .run("lookup", &case.id, "example.com", false)
            .await
            .unwrap();
        assert_eq!(evidence.len(), 2);
        assert_eq!(store.list_evidence(&case.id).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_active_consent_allows_run() {
        let (engine, _store, case) = engine_with(vec![MockCollector::active("probe")]);
        let evidence = engine
            .run("probe", &case.id, "example.com", true)
            .await
            .unwrap();
        assert_eq!(evidence.len(), 1);
    }

    #[tokio::test]
    async fn test_bulk_run_isolates_failures() {
        let (engine, _store, case) = engine_with(vec![
            MockCollector::passive("one", 1),
            MockCollector::passive("two", 1),
            MockCollector::failing("broken"),
            MockCollector::passive("three", 1),
            MockCollector::passive("four", 1),
        ]);

        let outcomes = engine.run_all(&case.id, "example.com", false).await;
        assert_eq!(outcomes.len(), 5);

        let failed: Vec<_> = outcomes.iter().filter(|o| o.result.is_err()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].collector, "broken");
        assert!(failed[0].result.as_ref().unwrap_err().contains("connection refused"));

        let succeeded = outcomes.iter().filter(|o| o.result.is_ok()).count();
        assert_eq!(succeeded, 4);
    }

    #[tokio::test]
    async fn test_bulk_run_skips_active_without_consent() {
        let (engine, _store, case) = engine_with(vec![
            MockCollector::passive("lookup", 1),
            MockCollector::active("probe"),
        ]);

        let outcomes = engine.run_all(&case.id, "example.com", false).await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].collector, "lookup");

        let outcomes = engine.run_all(&case.id, "example.com", true).await;
        assert_eq!(outcomes.len(), 2);
    }

    #[tokio::test]
    async fn test_rate_deadline_cancellation() {
        let (engine, _store, case) = engine_with(vec![MockCollector::passive("lookup", 1)]);
        let engine = engine.with_rate_deadline(Duration::from_millis(50));
        engine.governor.set_limit("lookup", 0.01);
        assert!(engine.governor.try_acquire("lookup"));

        let err = engine
            .run("lookup", &case.id, "example.com", false)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Rate(_)));
    }
}
