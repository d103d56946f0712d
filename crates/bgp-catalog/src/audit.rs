//! Append-only audit log. Every accepted mutation of the Peering Store
//! produces one row carrying an HMAC over a canonical rendering of its
//! contents (excluding `id` and `timestamp`) for tamper evidence.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Kind of mutation an audit row records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    BulkCreate,
    BulkUpdate,
    BulkDelete,
}

/// One immutable audit row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: uuid::Uuid,
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub peering_id: u64,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub actor: String,
    pub client_addr: Option<String>,
    pub correlation_id: String,
    pub hmac: String,
}

/// The part of an [`AuditLog`] that is HMAC-signed — everything except
/// `id` and `timestamp`, matching the canonicalization the store uses when
/// it verifies a row.
#[derive(Serialize)]
struct SignedPayload<'a> {
    action: AuditAction,
    peering_id: u64,
    old_value: &'a Option<serde_json::Value>,
    new_value: &'a Option<serde_json::Value>,
    actor: &'a str,
    client_addr: &'a Option<String>,
    correlation_id: &'a str,
}

fn sign(key: &[u8], payload: &SignedPayload<'_>) -> String {
    let canonical = serde_json::to_vec(payload).expect("audit payload always serializes");
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(&canonical);
    hex::encode(mac.finalize().into_bytes())
}

/// Append-only, in-process audit table. A real deployment would back this
/// with the `audit_logs` table of a durable store; the HMAC key is
/// injected rather than generated here (signing-key distribution is out
/// of scope for this crate).
pub struct AuditLogTable {
    key: Vec<u8>,
    rows: RwLock<Vec<AuditLog>>,
}

impl AuditLogTable {
    /// Builds an empty table signing new rows with `key`.
    pub fn new(key: Vec<u8>) -> Self {
        Self { key, rows: RwLock::new(Vec::new()) }
    }

    /// Appends a new, signed audit row and returns a clone of it.
    pub fn append(
        &self,
        action: AuditAction,
        peering_id: u64,
        old_value: Option<serde_json::Value>,
        new_value: Option<serde_json::Value>,
        actor: String,
        client_addr: Option<String>,
        correlation_id: String,
    ) -> AuditLog {
        let payload = SignedPayload {
            action,
            peering_id,
            old_value: &old_value,
            new_value: &new_value,
            actor: &actor,
            client_addr: &client_addr,
            correlation_id: &correlation_id,
        };
        let hmac = sign(&self.key, &payload);

        let row = AuditLog {
            id: uuid::Uuid::new_v4(),
            timestamp: Utc::now(),
            action,
            peering_id,
            old_value,
            new_value,
            actor,
            client_addr,
            correlation_id,
            hmac,
        };
        self.rows.write().push(row.clone());
        row
    }

    /// Recomputes `row`'s HMAC from its contents and compares it against
    /// the stored value. `false` means the row was tampered with (or
    /// signed under a different key).
    pub fn verify(&self, row: &AuditLog) -> bool {
        let payload = SignedPayload {
            action: row.action,
            peering_id: row.peering_id,
            old_value: &row.old_value,
            new_value: &row.new_value,
            actor: &row.actor,
            client_addr: &row.client_addr,
            correlation_id: &row.correlation_id,
        };
        sign(&self.key, &payload) == row.hmac
    }

    /// All rows for `peering_id`, oldest first.
    pub fn for_peering(&self, peering_id: u64) -> Vec<AuditLog> {
        self.rows.read().iter().filter(|r| r.peering_id == peering_id).cloned().collect()
    }

    /// The full audit trail, oldest first.
    pub fn all(&self) -> Vec<AuditLog> {
        self.rows.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appended_row_verifies() {
        let table = AuditLogTable::new(b"test-key".to_vec());
        let row = table.append(
            AuditAction::Create,
            1,
            None,
            Some(serde_json::json!({"name": "peer-a"})),
            "alice".into(),
            Some("10.0.0.5".into()),
            "corr-1".into(),
        );
        assert!(table.verify(&row));
    }

    #[test]
    fn tampered_row_fails_verification() {
        let table = AuditLogTable::new(b"test-key".to_vec());
        let mut row = table.append(AuditAction::Delete, 1, None, None, "bob".into(), None, "corr-2".into());
        row.actor = "mallory".into();
        assert!(!table.verify(&row));
    }

    #[test]
    fn for_peering_filters_by_id() {
        let table = AuditLogTable::new(b"k".to_vec());
        table.append(AuditAction::Create, 1, None, None, "a".into(), None, "c1".into());
        table.append(AuditAction::Create, 2, None, None, "a".into(), None, "c2".into());
        assert_eq!(table.for_peering(1).len(), 1);
        assert_eq!(table.all().len(), 2);
    }
}
