//! Config Analyzer client: validates a textual router configuration and
//! reports compatibility issues and routing loops detected offline.

use bgp_common::BgpError;
use bgp_resilience::ResilientClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Findings returned by the analyzer for one configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerFindings {
    pub valid: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub loops: Vec<String>,
}

/// Thin HTTP boundary over the config analyzer service.
pub struct ConfigAnalyzerClient {
    endpoint: Option<String>,
    http: reqwest::Client,
    resilient: ResilientClient,
}

impl ConfigAnalyzerClient {
    /// Builds a client pointed at `endpoint` (if configured) with the given
    /// resilience knobs. A `None` endpoint means the analyzer is disabled;
    /// calls return `Unavailable` without attempting any I/O.
    pub fn new(
        endpoint: Option<String>,
        failure_threshold: u32,
        recovery: Duration,
        semaphore_permits: usize,
        max_retries: u32,
    ) -> Self {
        Self {
            endpoint,
            http: reqwest::Client::new(),
            resilient: ResilientClient::new(
                "config-analyzer",
                failure_threshold,
                recovery,
                semaphore_permits,
                max_retries,
                Duration::from_secs(30),
            ),
        }
    }

    /// Submits `config_text` for validation. Lazily assumes the analyzer is
    /// already warmed up rather than polling a readiness endpoint itself —
    /// that orchestration lives at process bootstrap, not per call.
    pub async fn analyze(&self, config_text: &str) -> Result<AnalyzerFindings, BgpError> {
        let Some(endpoint) = self.endpoint.clone() else {
            return Err(BgpError::Unavailable("config analyzer not configured".into()));
        };

        self.resilient
            .call(|| {
                let endpoint = endpoint.clone();
                let body = config_text.to_string();
                let http = self.http.clone();
                async move {
                    let resp = http
                        .post(format!("{endpoint}/analyze"))
                        .body(body)
                        .send()
                        .await
                        .map_err(|e| e.to_string())?;
                    resp.json::<AnalyzerFindings>().await.map_err(|e| e.to_string())
                }
            })
            .await
    }
}
