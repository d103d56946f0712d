//! The Peering Store: the authoritative, rule-checked, audited catalog of
//! BGP peerings.

use crate::audit::{AuditAction, AuditLogTable};
use async_trait::async_trait;
use bgp_common::{validators, BgpError, BgpResult, Peering, PeeringDraft, PeeringPatch, PeeringStatus};
use bgp_rules::RuleEvaluator;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const BULK_LIMIT: usize = 100;

/// Filters accepted by [`Storage::list`]. `None` means "don't filter on
/// this field".
#[derive(Debug, Clone, Default)]
pub struct PeeringFilter {
    pub device: Option<String>,
    pub status: Option<PeeringStatus>,
    pub peer_asn: Option<u32>,
}

impl PeeringFilter {
    fn matches(&self, peering: &Peering) -> bool {
        self.device.as_deref().map_or(true, |d| d == peering.device)
            && self.status.map_or(true, |s| s == peering.status)
            && self.peer_asn.map_or(true, |a| a == peering.peer_asn)
    }
}

/// Offset/limit pagination over a filtered listing.
#[derive(Debug, Clone, Copy)]
pub struct Paging {
    pub offset: usize,
    pub limit: usize,
}

impl Default for Paging {
    fn default() -> Self {
        Self { offset: 0, limit: 100 }
    }
}

/// Storage boundary for the peering catalog. Kept as a trait so a
/// database-backed implementation can be substituted without touching
/// callers; [`InMemoryPeeringStore`] is the reference implementation used
/// in tests and local runs.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Validates and rule-checks `draft`, then commits it. Rejects with
    /// `BgpError::Conflict` if any rule fires, `BgpError::Validation` if a
    /// field invariant fails.
    async fn create(&self, draft: PeeringDraft, actor: &str, client_addr: Option<String>, correlation_id: &str) -> BgpResult<Peering>;

    /// Applies `patch` to the peering at `id` after re-running rule checks
    /// on the patched candidate.
    async fn update(&self, id: u64, patch: PeeringPatch, actor: &str, client_addr: Option<String>, correlation_id: &str) -> BgpResult<Peering>;

    /// Soft-deletes the peering at `id`: sets `is_deleted`, forces
    /// `status` to `disabled`, and records the deleter.
    async fn delete(&self, id: u64, actor: &str, client_addr: Option<String>, correlation_id: &str) -> BgpResult<()>;

    /// Fetches a non-deleted peering by id.
    async fn get(&self, id: u64) -> BgpResult<Peering>;

    /// Lists non-deleted peerings matching `filter`, paginated.
    async fn list(&self, filter: PeeringFilter, paging: Paging) -> Vec<Peering>;

    /// Creates up to [`BULK_LIMIT`] peerings as one all-or-nothing batch.
    async fn bulk_create(&self, drafts: Vec<PeeringDraft>, actor: &str, client_addr: Option<String>, correlation_id: &str) -> BgpResult<Vec<Peering>>;

    /// Soft-deletes up to [`BULK_LIMIT`] peerings as one all-or-nothing batch.
    async fn bulk_delete(&self, ids: Vec<u64>, actor: &str, client_addr: Option<String>, correlation_id: &str) -> BgpResult<()>;

    /// Patches up to [`BULK_LIMIT`] peerings with the same patch, as one
    /// all-or-nothing batch.
    async fn bulk_update(&self, ids: Vec<u64>, patch: PeeringPatch, actor: &str, client_addr: Option<String>, correlation_id: &str) -> BgpResult<Vec<Peering>>;
}

/// In-process, concurrent, in-memory peering table standing in for the
/// durable Postgres-backed store of a production deployment.
pub struct InMemoryPeeringStore {
    rows: DashMap<u64, Peering>,
    next_id: AtomicU64,
    evaluator: Arc<RuleEvaluator>,
    audit: Arc<AuditLogTable>,
}

impl InMemoryPeeringStore {
    /// Builds an empty store backed by `evaluator` for rule checks and
    /// `audit` for the append-only audit trail.
    pub fn new(evaluator: Arc<RuleEvaluator>, audit: Arc<AuditLogTable>) -> Self {
        Self { rows: DashMap::new(), next_id: AtomicU64::new(1), evaluator, audit }
    }

    fn validate_draft(draft: &PeeringDraft) -> BgpResult<()> {
        if draft.address_families.is_empty() {
            return Err(BgpError::Validation("address_families must be non-empty".into()));
        }
        validators::validate_timers(draft.hold_time, draft.keepalive).map_err(BgpError::Validation)?;
        if !validators::validate_asn(draft.local_asn) || !validators::validate_asn(draft.peer_asn) {
            return Err(BgpError::Validation("asn must be in 1..=4294967295".into()));
        }
        Ok(())
    }

    fn non_deleted(&self) -> Vec<Peering> {
        self.rows.iter().filter(|r| !r.is_deleted).map(|r| r.value().clone()).collect()
    }

    fn name_taken(&self, name: &str, exclude_id: Option<u64>) -> bool {
        self.rows.iter().any(|r| !r.is_deleted && r.name == name && Some(r.id) != exclude_id)
    }

    fn materialize(id: u64, draft: PeeringDraft, actor: &str) -> Peering {
        let now = chrono::Utc::now();
        Peering {
            id,
            name: draft.name,
            local_asn: draft.local_asn,
            peer_asn: draft.peer_asn,
            peer_ip: draft.peer_ip,
            device: draft.device,
            interface: draft.interface,
            hold_time: draft.hold_time,
            keepalive: draft.keepalive,
            status: draft.status,
            address_families: draft.address_families,
            routing_policy: draft.routing_policy,
            tags: draft.tags,
            created_at: now,
            updated_at: now,
            created_by: actor.to_string(),
            updated_by: actor.to_string(),
            is_deleted: false,
            deleted_at: None,
            deleted_by: None,
        }
    }

    fn apply_patch(mut peering: Peering, patch: PeeringPatch, actor: &str) -> Peering {
        if let Some(name) = patch.name {
            peering.name = name;
        }
        if let Some(local_asn) = patch.local_asn {
            peering.local_asn = local_asn;
        }
        if let Some(peer_asn) = patch.peer_asn {
            peering.peer_asn = peer_asn;
        }
        if let Some(peer_ip) = patch.peer_ip {
            peering.peer_ip = peer_ip;
        }
        if let Some(device) = patch.device {
            peering.device = device;
        }
        if let Some(interface) = patch.interface {
            peering.interface = interface;
        }
        if let Some(hold_time) = patch.hold_time {
            peering.hold_time = hold_time;
        }
        if let Some(keepalive) = patch.keepalive {
            peering.keepalive = keepalive;
        }
        if let Some(status) = patch.status {
            peering.status = status;
        }
        if let Some(address_families) = patch.address_families {
            peering.address_families = address_families;
        }
        if let Some(routing_policy) = patch.routing_policy {
            peering.routing_policy = routing_policy;
        }
        if let Some(tags) = patch.tags {
            peering.tags = tags;
        }
        peering.updated_at = chrono::Utc::now();
        peering.updated_by = actor.to_string();
        peering
    }
}

#[async_trait]
impl Storage for InMemoryPeeringStore {
    async fn create(&self, draft: PeeringDraft, actor: &str, client_addr: Option<String>, correlation_id: &str) -> BgpResult<Peering> {
        Self::validate_draft(&draft)?;
        if self.name_taken(&draft.name, None) {
            return Err(BgpError::Validation(format!("name '{}' already in use", draft.name)));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let candidate = Self::materialize(id, draft, actor);
        let snapshot = self.non_deleted();

        let conflicts = self.evaluator.detect(&candidate, &snapshot).await;
        if !conflicts.is_empty() {
            return Err(BgpError::Conflict(conflicts));
        }

        self.rows.insert(id, candidate.clone());
        self.audit.append(
            AuditAction::Create,
            id,
            None,
            Some(serde_json::to_value(&candidate).unwrap_or_default()),
            actor.to_string(),
            client_addr,
            correlation_id.to_string(),
        );
        Ok(candidate)
    }

    async fn update(&self, id: u64, patch: PeeringPatch, actor: &str, client_addr: Option<String>, correlation_id: &str) -> BgpResult<Peering> {
        let existing = self.get(id).await?;
        if let Some(name) = &patch.name {
            if self.name_taken(name, Some(id)) {
                return Err(BgpError::Validation(format!("name '{name}' already in use")));
            }
        }

        let candidate = Self::apply_patch(existing.clone(), patch, actor);
        validators::validate_timers(candidate.hold_time, candidate.keepalive).map_err(BgpError::Validation)?;
        if candidate.address_families.is_empty() {
            return Err(BgpError::Validation("address_families must be non-empty".into()));
        }

        let snapshot: Vec<Peering> = self.non_deleted().into_iter().filter(|p| p.id != id).collect();
        let conflicts = self.evaluator.detect(&candidate, &snapshot).await;
        if !conflicts.is_empty() {
            return Err(BgpError::Conflict(conflicts));
        }

        self.rows.insert(id, candidate.clone());
        self.audit.append(
            AuditAction::Update,
            id,
            Some(serde_json::to_value(&existing).unwrap_or_default()),
            Some(serde_json::to_value(&candidate).unwrap_or_default()),
            actor.to_string(),
            client_addr,
            correlation_id.to_string(),
        );
        Ok(candidate)
    }

    async fn delete(&self, id: u64, actor: &str, client_addr: Option<String>, correlation_id: &str) -> BgpResult<()> {
        let existing = self.get(id).await?;
        let mut deleted = existing.clone();
        deleted.is_deleted = true;
        deleted.status = PeeringStatus::Disabled;
        deleted.deleted_at = Some(chrono::Utc::now());
        deleted.deleted_by = Some(actor.to_string());
        deleted.updated_at = deleted.deleted_at.unwrap();
        deleted.updated_by = actor.to_string();

        self.rows.insert(id, deleted.clone());
        self.audit.append(
            AuditAction::Delete,
            id,
            Some(serde_json::to_value(&existing).unwrap_or_default()),
            Some(serde_json::to_value(&deleted).unwrap_or_default()),
            actor.to_string(),
            client_addr,
            correlation_id.to_string(),
        );
        Ok(())
    }

    async fn get(&self, id: u64) -> BgpResult<Peering> {
        self.rows
            .get(&id)
            .filter(|r| !r.is_deleted)
            .map(|r| r.value().clone())
            .ok_or_else(|| BgpError::NotFound(format!("peering {id}")))
    }

    async fn list(&self, filter: PeeringFilter, paging: Paging) -> Vec<Peering> {
        let mut rows: Vec<Peering> = self.non_deleted().into_iter().filter(|p| filter.matches(p)).collect();
        rows.sort_by_key(|p| p.id);
        rows.into_iter().skip(paging.offset).take(paging.limit).collect()
    }

    async fn bulk_create(&self, drafts: Vec<PeeringDraft>, actor: &str, client_addr: Option<String>, correlation_id: &str) -> BgpResult<Vec<Peering>> {
        if drafts.len() > BULK_LIMIT {
            return Err(BgpError::Validation(format!("bulk_create accepts at most {BULK_LIMIT} drafts")));
        }
        for draft in &drafts {
            Self::validate_draft(draft)?;
        }

        let mut accumulated = self.non_deleted();
        let mut names_in_batch: Vec<&str> = Vec::new();
        let mut candidates = Vec::with_capacity(drafts.len());
        let mut next_id = self.next_id.load(Ordering::SeqCst);

        for draft in &drafts {
            if self.name_taken(&draft.name, None) || names_in_batch.contains(&draft.name.as_str()) {
                return Err(BgpError::Validation(format!("name '{}' already in use", draft.name)));
            }
            names_in_batch.push(&draft.name);

            let candidate = Self::materialize(next_id, draft.clone(), actor);
            next_id += 1;

            let conflicts = self.evaluator.detect(&candidate, &accumulated).await;
            if !conflicts.is_empty() {
                return Err(BgpError::Conflict(conflicts));
            }
            accumulated.push(candidate.clone());
            candidates.push(candidate);
        }

        for candidate in &candidates {
            self.next_id.fetch_add(1, Ordering::SeqCst);
            self.rows.insert(candidate.id, candidate.clone());
            self.audit.append(
                AuditAction::BulkCreate,
                candidate.id,
                None,
                Some(serde_json::to_value(candidate).unwrap_or_default()),
                actor.to_string(),
                client_addr.clone(),
                correlation_id.to_string(),
            );
        }
        Ok(candidates)
    }

    async fn bulk_delete(&self, ids: Vec<u64>, actor: &str, client_addr: Option<String>, correlation_id: &str) -> BgpResult<()> {
        if ids.len() > BULK_LIMIT {
            return Err(BgpError::Validation(format!("bulk_delete accepts at most {BULK_LIMIT} ids")));
        }
        let mut existing: Vec<Peering> = Vec::with_capacity(ids.len());
        for id in &ids {
            existing.push(self.get(*id).await?);
        }

        for peering in &existing {
            let mut deleted = peering.clone();
            deleted.is_deleted = true;
            deleted.status = PeeringStatus::Disabled;
            deleted.deleted_at = Some(chrono::Utc::now());
            deleted.deleted_by = Some(actor.to_string());
            deleted.updated_at = deleted.deleted_at.unwrap();
            deleted.updated_by = actor.to_string();

            self.rows.insert(deleted.id, deleted.clone());
            self.audit.append(
                AuditAction::BulkDelete,
                deleted.id,
                Some(serde_json::to_value(peering).unwrap_or_default()),
                Some(serde_json::to_value(&deleted).unwrap_or_default()),
                actor.to_string(),
                client_addr.clone(),
                correlation_id.to_string(),
            );
        }
        Ok(())
    }

    async fn bulk_update(&self, ids: Vec<u64>, patch: PeeringPatch, actor: &str, client_addr: Option<String>, correlation_id: &str) -> BgpResult<Vec<Peering>> {
        if ids.len() > BULK_LIMIT {
            return Err(BgpError::Validation(format!("bulk_update accepts at most {BULK_LIMIT} ids")));
        }

        let mut existing: Vec<Peering> = Vec::with_capacity(ids.len());
        for id in &ids {
            existing.push(self.get(*id).await?);
        }
        let mut accumulated: Vec<Peering> = self.non_deleted().into_iter().filter(|p| !ids.contains(&p.id)).collect();
        let mut candidates = Vec::with_capacity(existing.len());

        for current in &existing {
            let candidate = Self::apply_patch(current.clone(), patch.clone(), actor);
            validators::validate_timers(candidate.hold_time, candidate.keepalive).map_err(BgpError::Validation)?;
            if candidate.address_families.is_empty() {
                return Err(BgpError::Validation("address_families must be non-empty".into()));
            }

            let conflicts = self.evaluator.detect(&candidate, &accumulated).await;
            if !conflicts.is_empty() {
                return Err(BgpError::Conflict(conflicts));
            }
            accumulated.push(candidate.clone());
            candidates.push(candidate);
        }

        for (current, candidate) in existing.iter().zip(candidates.iter()) {
            self.rows.insert(candidate.id, candidate.clone());
            self.audit.append(
                AuditAction::BulkUpdate,
                candidate.id,
                Some(serde_json::to_value(current).unwrap_or_default()),
                Some(serde_json::to_value(candidate).unwrap_or_default()),
                actor.to_string(),
                client_addr.clone(),
                correlation_id.to_string(),
            );
        }
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bgp_common::AddressFamily;

    fn draft(name: &str, peer_ip: &str) -> PeeringDraft {
        PeeringDraft {
            name: name.to_string(),
            local_asn: 65001,
            peer_asn: 65000,
            peer_ip: peer_ip.to_string(),
            device: "edge1".into(),
            interface: None,
            hold_time: 180,
            keepalive: 60,
            status: PeeringStatus::Active,
            address_families: vec![AddressFamily::Ipv4Unicast],
            routing_policy: serde_json::json!({"import": {"as_path": []}, "export": {"as_path": []}}),
            tags: vec![],
        }
    }

    fn store() -> InMemoryPeeringStore {
        let evaluator = Arc::new(RuleEvaluator::new(std::time::Duration::from_secs(5)));
        let audit = Arc::new(AuditLogTable::new(b"test-key".to_vec()));
        InMemoryPeeringStore::new(evaluator, audit)
    }

    #[tokio::test]
    async fn create_and_get_round_trips() {
        let store = store();
        let created = store.create(draft("p1", "192.0.2.1"), "alice", None, "c1").await.unwrap();
        let fetched = store.get(created.id).await.unwrap();
        assert_eq!(fetched.name, "p1");
    }

    #[tokio::test]
    async fn duplicate_name_is_rejected() {
        let store = store();
        store.create(draft("p1", "192.0.2.1"), "alice", None, "c1").await.unwrap();
        let err = store.create(draft("p1", "192.0.2.2"), "alice", None, "c2").await.unwrap_err();
        assert!(matches!(err, BgpError::Validation(_)));
    }

    #[tokio::test]
    async fn soft_deleted_name_can_be_reused() {
        let store = store();
        let created = store.create(draft("p1", "192.0.2.1"), "alice", None, "c1").await.unwrap();
        store.delete(created.id, "alice", None, "c2").await.unwrap();
        let recreated = store.create(draft("p1", "192.0.2.2"), "alice", None, "c3").await;
        assert!(recreated.is_ok());
    }

    #[tokio::test]
    async fn delete_is_soft_and_hides_from_get() {
        let store = store();
        let created = store.create(draft("p1", "192.0.2.1"), "alice", None, "c1").await.unwrap();
        store.delete(created.id, "alice", None, "c2").await.unwrap();
        assert!(matches!(store.get(created.id).await, Err(BgpError::NotFound(_))));
    }

    #[tokio::test]
    async fn bulk_create_is_all_or_nothing_on_duplicate_name() {
        let store = store();
        let drafts = vec![draft("a", "192.0.2.1"), draft("a", "192.0.2.2")];
        let err = store.bulk_create(drafts, "alice", None, "c1").await.unwrap_err();
        assert!(matches!(err, BgpError::Validation(_)));
        assert!(store.list(PeeringFilter::default(), Paging::default()).await.is_empty());
    }

    #[tokio::test]
    async fn list_respects_paging() {
        let store = store();
        for i in 0..5 {
            store.create(draft(&format!("p{i}"), &format!("192.0.2.{}", i + 1)), "alice", None, "c1").await.unwrap();
        }
        let page = store.list(PeeringFilter::default(), Paging { offset: 2, limit: 2 }).await;
        assert_eq!(page.len(), 2);
    }
}
