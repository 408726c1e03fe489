//! Active TCP port scanner
//!
//! Connect-scan over a configurable port list. Each port waits on the shared
//! rate governor before dialing and carries its own connect timeout, so a
//! full scan is bounded by (port count x per-port timeout) in the worst case.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

use argus_core::Evidence;
use argus_net::RateGovernor;

use crate::{CollectError, Collector, EvidenceArchive};

/// Which ports a scan covers.
#[derive(Debug, Clone, Default)]
pub enum PortScanMode {
    /// Short list of common service ports
    #[default]
    Common,
    /// Nmap-style top 100
    Top100,
    /// Operator-supplied list
    Custom(Vec<u16>),
}

impl PortScanMode {
    pub fn ports(&self) -> Vec<u16> {
        match self {
            PortScanMode::Common => COMMON_PORTS.to_vec(),
            PortScanMode::Top100 => TOP_100_PORTS.to_vec(),
            PortScanMode::Custom(list) => list.clone(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PortScanMode::Common => "common",
            PortScanMode::Top100 => "top-100",
            PortScanMode::Custom(_) => "custom",
        }
    }
}

const COMMON_PORTS: &[u16] = &[
    20, 21, 22, 23, 25, 53, 80, 110, 111, 135, 139, 143, 443, 445, 993, 995, 1723, 3306, 3389,
    5432, 5900, 8080, 8443,
];

const TOP_100_PORTS: &[u16] = &[
    20, 21, 22, 23, 25, 53, 80, 81, 88, 110, 111, 113, 119, 135, 137, 138, 139, 143, 161, 179,
    389, 443, 445, 465, 513, 514, 515, 548, 554, 587, 631, 636, 873, 990, 993, 995, 1025, 1026,
    1027, 1028, 1029, 1110, 1433, 1521, 1720, 1723, 1755, 1900, 2000, 2001, 2049, 2121, 2717,
    3000, 3128, 3306, 3389, 3690, 3999, 4444, 4899, 5000, 5009, 5051, 5060, 5101, 5190, 5357,
    5432, 5631, 5666, 5800, 5900, 6000, 6001, 6646, 6667, 7000, 7070, 8000, 8008, 8009, 8080,
    8081, 8443, 8888, 9000, 9090, 9100, 9102, 9999, 10000, 27017, 32768, 49152, 49153, 49154,
    49155, 50000,
];

pub struct PortsCollector {
    archive: Arc<EvidenceArchive>,
    governor: Arc<RateGovernor>,
    mode: PortScanMode,
    connect_timeout: Duration,
}

impl PortsCollector {
    pub fn new(
        archive: Arc<EvidenceArchive>,
        governor: Arc<RateGovernor>,
        mode: PortScanMode,
    ) -> Self {
        Self {
            archive,
            governor,
            mode,
            connect_timeout: Duration::from_secs(1),
        }
    }
}

#[async_trait]
impl Collector for PortsCollector {
    fn name(&self) -> &str {
        "ports"
    }

    fn description(&self) -> &str {
        "Active TCP port scanner for common services"
    }

    fn is_active(&self) -> bool {
        true
    }

    async fn collect(
        &self,
        case_id: &str,
        target: &str,
    ) -> Result<Vec<Evidence>, CollectError> {
        let mut results: BTreeMap<String, String> = BTreeMap::new();

        for port in self.mode.ports() {
            self.governor.wait("ports").await;

            let address = format!("{target}:{port}");
            match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&address)).await {
                Ok(Ok(_stream)) => {
                    debug!(target, port, "port open");
                    results.insert(port.to_string(), "open".to_string());
                }
                // Closed, filtered, and unresolvable all look the same to a
                // connect scan; only opens are recorded.
                Ok(Err(_)) | Err(_) => {}
            }
        }

        let payload = serde_json::to_vec_pretty(&results)?;
        let mut ev = self
            .archive
            .persist(case_id, "ports", target, "json", &payload)
            .await?;
        ev.metadata.insert("count".into(), results.len().into());
        ev.metadata.insert("mode".into(), self.mode.label().into());

        Ok(vec![ev])
    }
}
