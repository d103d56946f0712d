//! Incident dispatch: transforms conflicts and anomalies into typed
//! alerts and fans them out to independent on-call and chat channels.

use async_trait::async_trait;
use bgp_common::{BgpResult, Severity};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// A typed alert produced from a detected conflict or anomaly.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Alert {
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub source: String,
    pub labels: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    /// A stable fingerprint used for dedup: incidents with the same
    /// `(source, title)` while one is still open are folded together
    /// rather than re-notified.
    fn fingerprint(&self) -> String {
        format!("{}:{}", self.source, self.title)
    }
}

/// Boundary to an on-call paging system (e.g. PagerDuty/Opsgenie-style).
#[async_trait]
pub trait OnCallChannel: Send + Sync {
    /// Opens an incident for `alert`, returning the external incident id.
    async fn create_incident(&self, alert: &Alert) -> BgpResult<String>;
    /// Acknowledges the external incident.
    async fn acknowledge(&self, external_id: &str, reason: &str) -> BgpResult<()>;
    /// Resolves the external incident.
    async fn resolve(&self, external_id: &str, notes: &str) -> BgpResult<()>;
}

/// Boundary to a chat notification channel (e.g. a Slack webhook).
#[async_trait]
pub trait ChatChannel: Send + Sync {
    /// Posts a notification for `alert`.
    async fn post(&self, alert: &Alert) -> BgpResult<()>;
}

/// Lifecycle status of a dispatched incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Open,
    Acknowledged,
    Resolved,
}

/// One entry in an incident's history.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TimelineEntry {
    pub timestamp: DateTime<Utc>,
    pub action: String,
}

/// An incident tracked by the dispatcher, independent of whichever
/// external on-call/chat systems were notified about it.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Incident {
    pub id: Uuid,
    pub alert: Alert,
    pub status: IncidentStatus,
    pub on_call_ref: Option<String>,
    pub timeline: Vec<TimelineEntry>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

fn timeline_entry(action: impl Into<String>) -> TimelineEntry {
    TimelineEntry { timestamp: Utc::now(), action: action.into() }
}

/// Fans alerts out to independent on-call and chat channels, tracks
/// incident lifecycle, and auto-acknowledges incidents whose remediation
/// succeeded.
pub struct IncidentDispatcher {
    on_call: Option<Arc<dyn OnCallChannel>>,
    chat: Option<Arc<dyn ChatChannel>>,
    incidents: RwLock<HashMap<Uuid, Incident>>,
    open_fingerprints: RwLock<HashMap<String, Uuid>>,
}

impl IncidentDispatcher {
    /// Builds a dispatcher with the given channels. Either may be `None`
    /// to no-op that side of the fan-out.
    pub fn new(on_call: Option<Arc<dyn OnCallChannel>>, chat: Option<Arc<dyn ChatChannel>>) -> Self {
        Self { on_call, chat, incidents: RwLock::new(HashMap::new()), open_fingerprints: RwLock::new(HashMap::new()) }
    }

    /// Dispatches `alert`. If an open incident already exists for the
    /// same fingerprint, that incident's id is returned and no channel
    /// is re-notified. Otherwise a new incident is created and both
    /// channels are notified independently — a failure on one channel is
    /// logged but never suppresses the other.
    pub async fn dispatch(&self, alert: Alert) -> Uuid {
        let fingerprint = alert.fingerprint();
        if let Some(existing) = self.open_fingerprints.read().get(&fingerprint).copied() {
            return existing;
        }

        let id = Uuid::new_v4();
        let mut on_call_ref = None;

        if let Some(on_call) = &self.on_call {
            match on_call.create_incident(&alert).await {
                Ok(external_id) => on_call_ref = Some(external_id),
                Err(err) => tracing::error!(error = %err, incident = %id, "on-call channel failed to create incident"),
            }
        }
        if let Some(chat) = &self.chat {
            if let Err(err) = chat.post(&alert).await {
                tracing::error!(error = %err, incident = %id, "chat channel failed to post alert");
            }
        }

        let incident = Incident {
            id,
            alert,
            status: IncidentStatus::Open,
            on_call_ref,
            timeline: vec![timeline_entry("incident created")],
            created_at: Utc::now(),
            resolved_at: None,
        };
        self.incidents.write().insert(id, incident);
        self.open_fingerprints.write().insert(fingerprint, id);
        id
    }

    /// Acknowledges an open incident, forwarding to the on-call channel
    /// if the incident has an external reference.
    pub async fn acknowledge(&self, incident_id: Uuid, reason: &str) -> BgpResult<()> {
        let on_call_ref = {
            let mut incidents = self.incidents.write();
            let incident = match incidents.get_mut(&incident_id) {
                Some(i) => i,
                None => return Err(bgp_common::BgpError::NotFound(format!("incident {incident_id}"))),
            };
            incident.status = IncidentStatus::Acknowledged;
            incident.timeline.push(timeline_entry(format!("acknowledged: {reason}")));
            incident.on_call_ref.clone()
        };

        if let (Some(on_call), Some(external_id)) = (&self.on_call, on_call_ref) {
            if let Err(err) = on_call.acknowledge(&external_id, reason).await {
                tracing::error!(error = %err, incident = %incident_id, "on-call channel failed to acknowledge");
            }
        }
        Ok(())
    }

    /// Resolves an incident and clears it from the dedup table so a
    /// future alert with the same fingerprint opens a fresh incident.
    pub async fn resolve(&self, incident_id: Uuid, notes: &str) -> BgpResult<()> {
        let (on_call_ref, fingerprint) = {
            let mut incidents = self.incidents.write();
            let incident = match incidents.get_mut(&incident_id) {
                Some(i) => i,
                None => return Err(bgp_common::BgpError::NotFound(format!("incident {incident_id}"))),
            };
            incident.status = IncidentStatus::Resolved;
            incident.resolved_at = Some(Utc::now());
            incident.timeline.push(timeline_entry(format!("resolved: {notes}")));
            (incident.on_call_ref.clone(), incident.alert.fingerprint())
        };

        self.open_fingerprints.write().remove(&fingerprint);
        if let (Some(on_call), Some(external_id)) = (&self.on_call, on_call_ref) {
            if let Err(err) = on_call.resolve(&external_id, notes).await {
                tracing::error!(error = %err, incident = %incident_id, "on-call channel failed to resolve");
            }
        }
        Ok(())
    }

    /// Called after a remediation attempt for `incident_id` succeeds;
    /// auto-acknowledges with the fixed reason `"auto-remediated"`.
    pub async fn auto_acknowledge_on_remediation(&self, incident_id: Uuid) -> BgpResult<()> {
        self.acknowledge(incident_id, "auto-remediated").await
    }

    /// Fetches a tracked incident by id.
    pub fn get(&self, incident_id: Uuid) -> Option<Incident> {
        self.incidents.read().get(&incident_id).cloned()
    }

    /// All incidents not yet resolved.
    pub fn open_incidents(&self) -> Vec<Incident> {
        self.incidents.read().values().filter(|i| i.status != IncidentStatus::Resolved).cloned().collect()
    }

    /// Mean time to resolution, in minutes, across resolved incidents.
    pub fn mttr_minutes(&self) -> f64 {
        let incidents = self.incidents.read();
        let resolved: Vec<&Incident> = incidents.values().filter(|i| i.resolved_at.is_some()).collect();
        if resolved.is_empty() {
            return 0.0;
        }
        let total: i64 = resolved.iter().map(|i| (i.resolved_at.unwrap() - i.created_at).num_minutes()).sum();
        total as f64 / resolved.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn alert(title: &str) -> Alert {
        Alert {
            title: title.to_string(),
            description: "something happened".into(),
            severity: Severity::High,
            source: "conflict-detector".into(),
            labels: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    struct CountingOnCall {
        created: AtomicUsize,
    }

    #[async_trait]
    impl OnCallChannel for CountingOnCall {
        async fn create_incident(&self, _alert: &Alert) -> BgpResult<String> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok("ext-1".into())
        }
        async fn acknowledge(&self, _external_id: &str, _reason: &str) -> BgpResult<()> {
            Ok(())
        }
        async fn resolve(&self, _external_id: &str, _notes: &str) -> BgpResult<()> {
            Ok(())
        }
    }

    struct FailingChat;

    #[async_trait]
    impl ChatChannel for FailingChat {
        async fn post(&self, _alert: &Alert) -> BgpResult<()> {
            Err(bgp_common::BgpError::Unavailable("webhook down".into()))
        }
    }

    #[tokio::test]
    async fn dispatch_creates_incident_even_if_chat_fails() {
        let on_call = Arc::new(CountingOnCall { created: AtomicUsize::new(0) });
        let dispatcher = IncidentDispatcher::new(Some(on_call.clone()), Some(Arc::new(FailingChat)));
        let id = dispatcher.dispatch(alert("asn collision")).await;
        assert!(dispatcher.get(id).is_some());
        assert_eq!(on_call.created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn duplicate_fingerprint_dedups_while_open() {
        let dispatcher = IncidentDispatcher::new(None, None);
        let first = dispatcher.dispatch(alert("asn collision")).await;
        let second = dispatcher.dispatch(alert("asn collision")).await;
        assert_eq!(first, second);
        assert_eq!(dispatcher.open_incidents().len(), 1);
    }

    #[tokio::test]
    async fn resolve_allows_refiring_same_fingerprint() {
        let dispatcher = IncidentDispatcher::new(None, None);
        let first = dispatcher.dispatch(alert("asn collision")).await;
        dispatcher.resolve(first, "fixed").await.unwrap();
        let second = dispatcher.dispatch(alert("asn collision")).await;
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn auto_acknowledge_uses_fixed_reason() {
        let dispatcher = IncidentDispatcher::new(None, None);
        let id = dispatcher.dispatch(alert("flap storm")).await;
        dispatcher.auto_acknowledge_on_remediation(id).await.unwrap();
        let incident = dispatcher.get(id).unwrap();
        assert_eq!(incident.status, IncidentStatus::Acknowledged);
        assert!(incident.timeline.last().unwrap().action.contains("auto-remediated"));
    }
}
