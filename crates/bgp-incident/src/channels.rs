//! HTTP-backed on-call and chat channel implementations.

use crate::dispatcher::{Alert, ChatChannel, OnCallChannel};
use async_trait::async_trait;
use bgp_common::BgpError;

/// Posts incidents to an on-call system's REST API using a bearer token.
pub struct HttpOnCallChannel {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

impl HttpOnCallChannel {
    /// Builds a channel pointed at `base_url`, authenticating with `token`.
    pub fn new(base_url: String, token: String) -> Self {
        Self { base_url, token, http: reqwest::Client::new() }
    }
}

#[async_trait]
impl OnCallChannel for HttpOnCallChannel {
    async fn create_incident(&self, alert: &Alert) -> Result<String, BgpError> {
        #[derive(serde::Deserialize)]
        struct Response {
            id: String,
        }

        let resp = self
            .http
            .post(format!("{}/incidents", self.base_url))
            .bearer_auth(&self.token)
            .json(alert)
            .send()
            .await
            .map_err(|e| BgpError::Unavailable(e.to_string()))?;
        let body: Response = resp.json().await.map_err(|e| BgpError::Unavailable(e.to_string()))?;
        Ok(body.id)
    }

    async fn acknowledge(&self, external_id: &str, reason: &str) -> Result<(), BgpError> {
        self.http
            .post(format!("{}/incidents/{external_id}/acknowledge", self.base_url))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({"reason": reason}))
            .send()
            .await
            .map_err(|e| BgpError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn resolve(&self, external_id: &str, notes: &str) -> Result<(), BgpError> {
        self.http
            .post(format!("{}/incidents/{external_id}/resolve", self.base_url))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({"notes": notes}))
            .send()
            .await
            .map_err(|e| BgpError::Unavailable(e.to_string()))?;
        Ok(())
    }
}

/// Posts a chat message to a generic incoming webhook (Slack-compatible
/// `{"text": ...}` payload shape).
pub struct WebhookChatChannel {
    webhook_url: String,
    http: reqwest::Client,
}

impl WebhookChatChannel {
    /// Builds a channel posting to `webhook_url`.
    pub fn new(webhook_url: String) -> Self {
        Self { webhook_url, http: reqwest::Client::new() }
    }
}

#[async_trait]
impl ChatChannel for WebhookChatChannel {
    async fn post(&self, alert: &Alert) -> Result<(), BgpError> {
        let text = format!("[{:?}] {}: {}", alert.severity, alert.title, alert.description);
        self.http
            .post(&self.webhook_url)
            .json(&serde_json::json!({"text": text}))
            .send()
            .await
            .map_err(|e| BgpError::Unavailable(e.to_string()))?;
        Ok(())
    }
}
