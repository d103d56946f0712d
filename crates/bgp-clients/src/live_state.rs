//! Live State Poller client: retrieves the router's live view of a
//! device's BGP sessions.

use bgp_common::{BgpError, BgpSessionState};
use bgp_resilience::ResilientClient;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// One live session record as reported by the poller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveSessionRecord {
    pub peer_ip: IpAddr,
    pub peer_asn: u32,
    pub state: BgpSessionState,
    pub uptime_seconds: u64,
    pub prefix_count: u32,
    pub hold_time: u16,
    pub keepalive: u16,
    pub last_update: chrono::DateTime<chrono::Utc>,
}

/// Thin HTTP boundary over the live state poller.
pub struct LiveStatePollerClient {
    endpoint: Option<String>,
    http: reqwest::Client,
    resilient: ResilientClient,
}

impl LiveStatePollerClient {
    /// Builds a client pointed at `endpoint` (if configured).
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
                "live-state-poller",
                failure_threshold,
                recovery,
                semaphore_permits,
                max_retries,
                Duration::from_secs(30),
            ),
        }
    }

    /// Fetches the live session table for `device`.
    pub async fn sessions_for_device(&self, device: &str) -> Result<Vec<LiveSessionRecord>, BgpError> {
        let Some(endpoint) = self.endpoint.clone() else {
            return Err(BgpError::Unavailable("live state poller not configured".into()));
        };
        let device = device.to_string();

        self.resilient
            .call(|| {
                let endpoint = endpoint.clone();
                let device = device.clone();
                let http = self.http.clone();
                async move {
                    let resp = http
                        .get(format!("{endpoint}/bgp/session"))
                        .query(&[("hostname", device)])
                        .send()
                        .await
                        .map_err(|e| e.to_string())?;
                    resp.json::<Vec<LiveSessionRecord>>().await.map_err(|e| e.to_string())
                }
            })
            .await
    }
}
