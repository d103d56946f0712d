//! Core domain types shared across the orchestrator: peerings, conflicts,
//! anomalies, and the ephemeral BGP update event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifecycle status of a peering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeeringStatus {
    Active,
    Pending,
    Disabled,
}

/// BGP finite state machine session state, as reported by the live state
/// poller. The orchestrator never drives these transitions itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum BgpSessionState {
    Idle,
    Connect,
    Active,
    OpenSent,
    OpenConfirm,
    Established,
}

/// Address family a peering carries routes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AddressFamily {
    Ipv4Unicast,
    Ipv6Unicast,
    Vpnv4Unicast,
    Vpnv6Unicast,
    L2vpnEvpn,
}

/// The authoritative record of a BGP peering session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Peering {
    pub id: u64,
    pub name: String,
    pub local_asn: u32,
    pub peer_asn: u32,
    /// Raw as received/stored; not format-validated at the boundary. A
    /// malformed value is a detection-time concern, not an intake one —
    /// see [`crate::validators::is_private_ip`] and the prefix-sanity rule
    /// that parses this lazily.
    pub peer_ip: String,
    pub device: String,
    pub interface: Option<String>,
    pub hold_time: u16,
    pub keepalive: u16,
    pub status: PeeringStatus,
    pub address_families: Vec<AddressFamily>,
    pub routing_policy: serde_json::Value,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_by: String,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
}

impl Peering {
    /// The tuple that uniquely identifies one session on the wire.
    pub fn session_key(&self) -> (String, String, u32) {
        (self.device.clone(), self.peer_ip.clone(), self.peer_asn)
    }

    /// `import.as_path` from the routing policy document, if present.
    pub fn import_as_path(&self) -> Vec<u32> {
        self.routing_policy
            .get("import")
            .and_then(|v| v.get("as_path"))
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_u64()).map(|n| n as u32).collect())
            .unwrap_or_default()
    }
}

/// Caller-supplied fields for creating a new peering. The store assigns
/// `id`, audit fields, and soft-delete fields.
#[derive(Debug, Clone, Deserialize)]
pub struct PeeringDraft {
    pub name: String,
    pub local_asn: u32,
    pub peer_asn: u32,
    pub peer_ip: String,
    pub device: String,
    pub interface: Option<String>,
    pub hold_time: u16,
    pub keepalive: u16,
    pub status: PeeringStatus,
    pub address_families: Vec<AddressFamily>,
    #[serde(default = "default_routing_policy")]
    pub routing_policy: serde_json::Value,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_routing_policy() -> serde_json::Value {
    serde_json::json!({"import": {"as_path": []}, "export": {"as_path": []}})
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PeeringPatch {
    pub name: Option<String>,
    pub local_asn: Option<u32>,
    pub peer_asn: Option<u32>,
    pub peer_ip: Option<String>,
    pub device: Option<String>,
    pub interface: Option<Option<String>>,
    pub hold_time: Option<u16>,
    pub keepalive: Option<u16>,
    pub status: Option<PeeringStatus>,
    pub address_families: Option<Vec<AddressFamily>>,
    pub routing_policy: Option<serde_json::Value>,
    pub tags: Option<Vec<String>>,
}

/// Conflict type, fixed enumeration per the registry's taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    SessionOverlap,
    RoutingLoop,
    AsnCollision,
    ConfigurationMismatch,
    RpkiInvalid,
}

/// Conflict severity, fixed enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Immutable record produced by a detection rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    #[serde(rename = "type")]
    pub conflict_type: ConflictType,
    pub severity: Severity,
    pub description: String,
    pub affected_peers: Vec<u64>,
    pub recommended_action: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Anomaly type, mapped from the metric name that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    BgpFlap,
    CpuTemperature,
    InterfaceError,
    Other,
}

impl AnomalyType {
    /// Maps a metric name to its anomaly type, following the orchestrator's
    /// fixed metric vocabulary; anything unrecognized is `Other`.
    pub fn from_metric_name(metric_name: &str) -> Self {
        match metric_name {
            "bgp_session_flaps" => AnomalyType::BgpFlap,
            "cpu_temp" => AnomalyType::CpuTemperature,
            "interface_errors" => AnomalyType::InterfaceError,
            _ => AnomalyType::Other,
        }
    }
}

/// A persisted, time-indexed anomaly finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub id: uuid::Uuid,
    pub metric_name: String,
    pub anomaly_type: AnomalyType,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub expected_value: f64,
    pub deviation: f64,
    pub severity: Severity,
    pub device: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Kind of BGP update carried by a streamed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BgpUpdateType {
    Announce,
    Withdraw,
    Rib,
}

/// Ephemeral BGP update event, as received from the external event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BgpUpdateEvent {
    pub timestamp: DateTime<Utc>,
    pub peer_ip: String,
    pub peer_asn: u32,
    pub prefix: Option<String>,
    #[serde(default)]
    pub as_path: Vec<u32>,
    pub origin_asn: Option<u32>,
    pub next_hop: Option<String>,
    #[serde(rename = "type")]
    pub event_type: BgpUpdateType,
    pub communities: Option<Vec<String>>,
}

impl BgpUpdateEvent {
    /// Projects the event onto the fixed feature schema the Feature Sink
    /// stores, keyed by `peer_ip_peer_asn`.
    pub fn to_feature_map(&self) -> HashMap<String, serde_json::Value> {
        let mut features = HashMap::new();
        features.insert("peer_ip".into(), serde_json::json!(self.peer_ip));
        features.insert("peer_asn".into(), serde_json::json!(self.peer_asn));
        features.insert("prefix".into(), serde_json::json!(self.prefix));
        features.insert("as_path_length".into(), serde_json::json!(self.as_path.len()));
        features.insert("timestamp".into(), serde_json::json!(self.timestamp.to_rfc3339()));
        features.insert("message_type".into(), serde_json::json!(self.event_type));
        features.insert(
            "has_announce".into(),
            serde_json::json!(self.event_type == BgpUpdateType::Announce),
        );
        features.insert(
            "has_withdraw".into(),
            serde_json::json!(self.event_type == BgpUpdateType::Withdraw),
        );
        features
    }

    /// Feature-store entity key: `{peer_ip}_{peer_asn}`.
    pub fn feature_entity_id(&self) -> String {
        format!("{}_{}", self.peer_ip, self.peer_asn)
    }
}
