//! Passive WHOIS collector
//!
//! RFC 3912 over TCP/43: ask the IANA root server for the authoritative
//! referral, then query it. The raw text is the evidence; registrar and
//! registrant fields are extracted into metadata for ingestion.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use argus_core::Evidence;

use crate::{CollectError, Collector, EvidenceArchive};

const IANA_HOST: &str = "whois.iana.org";
const QUERY_TIMEOUT: Duration = Duration::from_secs(10);

static REFERRAL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*refer:\s*(\S+)").unwrap());

static REGISTRAR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*Registrar:\s*(.+?)\s*$").unwrap());

static REGISTRANT_EMAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*Registrant Email:\s*(\S+@\S+)\s*$").unwrap());

static REGISTRANT_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*Registrant Name:\s*(.+?)\s*$").unwrap());

pub struct WhoisCollector {
    archive: Arc<EvidenceArchive>,
}

impl WhoisCollector {
    pub fn new(archive: Arc<EvidenceArchive>) -> Self {
        Self { archive }
    }

    async fn query_server(server: &str, query: &str) -> Result<String, CollectError> {
        let request = async {
            let mut stream = TcpStream::connect((server, 43)).await?;
            stream.write_all(query.as_bytes()).await?;
            stream.write_all(b"\r\n").await?;

            let mut raw = Vec::new();
            stream.read_to_end(&mut raw).await?;
            Ok::<_, std::io::Error>(String::from_utf8_lossy(&raw).into_owned())
        };

        tokio::time::timeout(QUERY_TIMEOUT, request)
            .await
            .map_err(|_| CollectError::Timeout(QUERY_TIMEOUT))?
            .map_err(|e| CollectError::Network(format!("whois query to {server} failed: {e}")))
    }

    fn first_capture(re: &Regex, text: &str) -> Option<String> {
        re.captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }
}

#[async_trait]
impl Collector for WhoisCollector {
    fn name(&self) -> &str {
        "whois"
    }

    fn description(&self) -> &str {
        "Retrieve domain registration information"
    }

    fn is_active(&self) -> bool {
        false
    }

    async fn collect(
        &self,
        case_id: &str,
        target: &str,
    ) -> Result<Vec<Evidence>, CollectError> {
        let root_response = Self::query_server(IANA_HOST, target).await?;

        // Follow the referral when IANA names an authoritative server.
        let raw = match Self::first_capture(&REFERRAL_REGEX, &root_response) {
            Some(server) => {
                debug!(target, server, "following whois referral");
                Self::query_server(&server, target).await?
            }
            None => root_response,
        };

        let mut ev = self
            .archive
            .persist(case_id, "whois", target, "txt", raw.as_bytes())
            .await?;

        if let Some(registrar) = Self::first_capture(&REGISTRAR_REGEX, &raw) {
            ev.metadata.insert("registrar".into(), registrar.into());
        }
        if let Some(email) = Self::first_capture(&REGISTRANT_EMAIL_REGEX, &raw) {
            ev.metadata.insert("registrant_email".into(), email.into());
        }
        if let Some(name) = Self::first_capture(&REGISTRANT_NAME_REGEX, &raw) {
            ev.metadata.insert("registrant_name".into(), name.into());
        }

        Ok(vec![ev])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
refer:        whois.verisign-grs.com

Domain Name: EXAMPLE.COM
Registrar: Example Registrar LLC
Registrant Name: Jane Analyst
Registrant Email: admin@example.com
";

    #[test]
    fn test_referral_extraction() {
        let server = WhoisCollector::first_capture(&REFERRAL_REGEX, SAMPLE);
        assert_eq!(server.as_deref(), Some("whois.verisign-grs.com"));
    }

    #[test]
    fn test_registrant_fields() {
        assert_eq!(
            WhoisCollector::first_capture(&REGISTRAR_REGEX, SAMPLE).as_deref(),
            Some("Example Registrar LLC")
        );
        assert_eq!(
            WhoisCollector::first_capture(&REGISTRANT_EMAIL_REGEX, SAMPLE).as_deref(),
            Some("admin@example.com")
        );
        assert_eq!(
            WhoisCollector::first_capture(&REGISTRANT_NAME_REGEX, SAMPLE).as_deref(),
            Some("Jane Analyst")
        );
    }

    #[test]
    fn test_no_referral() {
        assert!(WhoisCollector::first_capture(&REFERRAL_REGEX, "Domain: x.dev\n").is_none());
    }
}
