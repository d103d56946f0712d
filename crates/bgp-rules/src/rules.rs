//! The five standard detection rules: ASN collision, session overlap,
//! routing loop, prefix/IP sanity, and RPKI validation.

use crate::evaluator::Rule;
use async_trait::async_trait;
use bgp_clients::{OriginValidation, PrefixOriginValidator};
use bgp_common::{validators, Conflict, ConflictType, Peering, PeeringStatus, Severity};
use std::collections::HashMap;
use std::sync::Arc;

/// Detects multiple active peerings sharing a `peer_asn` but different
/// `peer_ip`s, which usually indicates a duplicated or misconfigured session.
pub struct AsnCollisionRule;

#[async_trait]
impl Rule for AsnCollisionRule {
    fn name(&self) -> &'static str {
        "asn-collision"
    }

    async fn check(&self, candidate: &Peering, snapshot: &[Peering]) -> Option<Conflict> {
        let collisions: Vec<&Peering> = snapshot
            .iter()
            .filter(|p| {
                p.id != candidate.id
                    && p.peer_asn == candidate.peer_asn
                    && p.peer_ip != candidate.peer_ip
                    && p.status == PeeringStatus::Active
            })
            .collect();

        if collisions.is_empty() {
            return None;
        }

        let mut affected_peers = vec![candidate.id];
        affected_peers.extend(collisions.iter().map(|p| p.id));

        let mut metadata = HashMap::new();
        metadata.insert("collision_count".into(), serde_json::json!(collisions.len()));
        metadata.insert("peer_asn".into(), serde_json::json!(candidate.peer_asn));

        Some(Conflict {
            conflict_type: ConflictType::AsnCollision,
            severity: Severity::High,
            description: format!(
                "multiple active peerings found for ASN {} with different peer IPs",
                candidate.peer_asn
            ),
            affected_peers,
            recommended_action: "review peerings to ensure they are not duplicate sessions".into(),
            metadata,
        })
    }
}

/// Detects duplicate sessions: identical `(device, peer_ip, peer_asn)`.
pub struct SessionOverlapRule;

#[async_trait]
impl Rule for SessionOverlapRule {
    fn name(&self) -> &'static str {
        "session-overlap"
    }

    async fn check(&self, candidate: &Peering, snapshot: &[Peering]) -> Option<Conflict> {
        let overlaps: Vec<&Peering> = snapshot
            .iter()
            .filter(|p| {
                p.id != candidate.id
                    && p.device == candidate.device
                    && p.peer_ip == candidate.peer_ip
                    && p.peer_asn == candidate.peer_asn
            })
            .collect();

        if overlaps.is_empty() {
            return None;
        }

        let mut affected_peers = vec![candidate.id];
        affected_peers.extend(overlaps.iter().map(|p| p.id));

        let mut metadata = HashMap::new();
        metadata.insert("device".into(), serde_json::json!(candidate.device));
        metadata.insert("peer_ip".into(), serde_json::json!(candidate.peer_ip));
        metadata.insert("peer_asn".into(), serde_json::json!(candidate.peer_asn));

        Some(Conflict {
            conflict_type: ConflictType::SessionOverlap,
            severity: Severity::Critical,
            description: format!(
                "duplicate peering session on device {} for {}",
                candidate.device, candidate.peer_ip
            ),
            affected_peers,
            recommended_action: "remove the duplicate peering session".into(),
            metadata,
        })
    }
}

/// Detects conditions that create a routing loop: a direct ASN collision
/// between local and peer ASN, or the local ASN appearing in the import
/// policy's AS_PATH filter.
pub struct RoutingLoopRule;

#[async_trait]
impl Rule for RoutingLoopRule {
    fn name(&self) -> &'static str {
        "routing-loop"
    }

    async fn check(&self, candidate: &Peering, _snapshot: &[Peering]) -> Option<Conflict> {
        if candidate.local_asn == candidate.peer_asn {
            let mut metadata = HashMap::new();
            metadata.insert("local_asn".into(), serde_json::json!(candidate.local_asn));
            metadata.insert("peer_asn".into(), serde_json::json!(candidate.peer_asn));
            return Some(Conflict {
                conflict_type: ConflictType::RoutingLoop,
                severity: Severity::Critical,
                description: format!(
                    "local ASN {} matches peer ASN, creating an immediate loop condition",
                    candidate.local_asn
                ),
                affected_peers: vec![candidate.id],
                recommended_action: "change the local ASN or peer ASN to eliminate the collision".into(),
                metadata,
            });
        }

        let as_path = candidate.import_as_path();
        if as_path.contains(&candidate.local_asn) {
            let mut metadata = HashMap::new();
            metadata.insert("local_asn".into(), serde_json::json!(candidate.local_asn));
            metadata.insert("as_path".into(), serde_json::json!(as_path));
            return Some(Conflict {
                conflict_type: ConflictType::RoutingLoop,
                severity: Severity::Critical,
                description: format!(
                    "local ASN {} present in the import policy's AS_PATH filter",
                    candidate.local_asn
                ),
                affected_peers: vec![candidate.id],
                recommended_action: "review and adjust the import policy's AS_PATH filter".into(),
                metadata,
            });
        }

        None
    }
}

/// Validates the peer IP's format, flags private address space in an
/// active session, and catches the `peer_ip`-only duplicate that
/// [`SessionOverlapRule`] would miss if the ASN differs. `peer_ip` is
/// stored as a raw string (it is not format-validated at intake, matching
/// how the catalog can end up holding a malformed value from a bulk
/// import or a migrated record), so format validation is this rule's job.
pub struct PrefixSanityRule;

#[async_trait]
impl Rule for PrefixSanityRule {
    fn name(&self) -> &'static str {
        "prefix-sanity"
    }

    async fn check(&self, candidate: &Peering, snapshot: &[Peering]) -> Option<Conflict> {
        let parsed = match candidate.peer_ip.parse::<std::net::IpAddr>() {
            Ok(ip) => ip,
            Err(_) => {
                let mut metadata = HashMap::new();
                metadata.insert("invalid_ip".into(), serde_json::json!(candidate.peer_ip));
                return Some(Conflict {
                    conflict_type: ConflictType::ConfigurationMismatch,
                    severity: Severity::High,
                    description: format!("invalid IP address format: {}", candidate.peer_ip),
                    affected_peers: vec![candidate.id],
                    recommended_action: "correct IP address format to a valid IPv4 or IPv6 address".into(),
                    metadata,
                });
            }
        };

        if validators::is_private_ip(&parsed) && candidate.status == PeeringStatus::Active {
            let mut metadata = HashMap::new();
            metadata.insert("peer_ip".into(), serde_json::json!(candidate.peer_ip));
            metadata.insert("is_private".into(), serde_json::json!(true));
            return Some(Conflict {
                conflict_type: ConflictType::ConfigurationMismatch,
                severity: Severity::Medium,
                description: format!("private IP address space detected in active peering: {}", candidate.peer_ip),
                affected_peers: vec![candidate.id],
                recommended_action: "verify private IP usage is intentional for an internal peering".into(),
                metadata,
            });
        }

        let duplicates: Vec<&Peering> = snapshot
            .iter()
            .filter(|p| p.id != candidate.id && p.device == candidate.device && p.peer_ip == candidate.peer_ip)
            .collect();

        if duplicates.is_empty() {
            return None;
        }

        let mut affected_peers = vec![candidate.id];
        affected_peers.extend(duplicates.iter().map(|p| p.id));

        let mut metadata = HashMap::new();
        metadata.insert("device".into(), serde_json::json!(candidate.device));
        metadata.insert("peer_ip".into(), serde_json::json!(candidate.peer_ip));

        Some(Conflict {
            conflict_type: ConflictType::SessionOverlap,
            severity: Severity::Critical,
            description: format!("duplicate peer IP {} on device {}", candidate.peer_ip, candidate.device),
            affected_peers,
            recommended_action: "remove the duplicate peering session".into(),
            metadata,
        })
    }
}

/// Consults a pluggable prefix-origin validator for every announced prefix
/// covered by the peering; private ASNs are exempt since they never hold a
/// public RPKI ROA. A validator outage reports `NotDetermined`, never a
/// conflict.
pub struct RpkiValidationRule {
    validator: Arc<dyn PrefixOriginValidator>,
}

impl RpkiValidationRule {
    /// Builds the rule against the given validator boundary.
    pub fn new(validator: Arc<dyn PrefixOriginValidator>) -> Self {
        Self { validator }
    }
}

#[async_trait]
impl Rule for RpkiValidationRule {
    fn name(&self) -> &'static str {
        "rpki-validation"
    }

    async fn check(&self, candidate: &Peering, _snapshot: &[Peering]) -> Option<Conflict> {
        if validators::is_private_asn(candidate.peer_asn) {
            return None;
        }

        let prefix = format!("{}/32", candidate.peer_ip);
        match self.validator.check(&prefix, candidate.peer_asn).await {
            OriginValidation::Invalid => {
                let mut metadata = HashMap::new();
                metadata.insert("peer_asn".into(), serde_json::json!(candidate.peer_asn));
                metadata.insert("prefix".into(), serde_json::json!(prefix));
                Some(Conflict {
                    conflict_type: ConflictType::RpkiInvalid,
                    severity: Severity::Critical,
                    description: format!("ASN {} is not a valid RPKI origin for {}", candidate.peer_asn, prefix),
                    affected_peers: vec![candidate.id],
                    recommended_action: "verify the route origin authorization for this prefix".into(),
                    metadata,
                })
            }
            OriginValidation::Valid | OriginValidation::NotDetermined => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bgp_common::AddressFamily;
    use chrono::Utc;

    fn peering(id: u64, local_asn: u32, peer_asn: u32, peer_ip: &str, device: &str, status: PeeringStatus) -> Peering {
        Peering {
            id,
            name: format!("p{id}"),
            local_asn,
            peer_asn,
            peer_ip: peer_ip.to_string(),
            device: device.into(),
            interface: None,
            hold_time: 180,
            keepalive: 60,
            status,
            address_families: vec![AddressFamily::Ipv4Unicast],
            routing_policy: serde_json::json!({"import": {"as_path": []}, "export": {"as_path": []}}),
            tags: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
            created_by: "test".into(),
            updated_by: "test".into(),
            is_deleted: false,
            deleted_at: None,
            deleted_by: None,
        }
    }

    #[tokio::test]
    async fn asn_collision_detects_same_asn_different_ip() {
        let candidate = peering(1, 65001, 65000, "192.0.2.1", "edge1", PeeringStatus::Active);
        let other = peering(2, 65001, 65000, "192.0.2.2", "edge1", PeeringStatus::Active);
        let conflict = AsnCollisionRule.check(&candidate, &[candidate.clone(), other]).await;
        assert!(conflict.is_some());
        assert_eq!(conflict.unwrap().conflict_type, ConflictType::AsnCollision);
    }

    #[tokio::test]
    async fn asn_collision_ignores_disabled_peers() {
        let candidate = peering(1, 65001, 65000, "192.0.2.1", "edge1", PeeringStatus::Active);
        let other = peering(2, 65001, 65000, "192.0.2.2", "edge1", PeeringStatus::Disabled);
        assert!(AsnCollisionRule.check(&candidate, &[candidate.clone(), other]).await.is_none());
    }

    #[tokio::test]
    async fn session_overlap_detects_identical_triple() {
        let candidate = peering(1, 65001, 65000, "192.0.2.1", "edge1", PeeringStatus::Active);
        let other = peering(2, 65001, 65000, "192.0.2.1", "edge1", PeeringStatus::Pending);
        let conflict = SessionOverlapRule.check(&candidate, &[candidate.clone(), other]).await;
        assert!(conflict.is_some());
        assert_eq!(conflict.unwrap().severity, Severity::Critical);
    }

    #[tokio::test]
    async fn routing_loop_detects_direct_collision() {
        let candidate = peering(1, 65000, 65000, "192.0.2.1", "edge1", PeeringStatus::Active);
        let conflict = RoutingLoopRule.check(&candidate, &[]).await;
        assert!(conflict.is_some());
    }

    #[tokio::test]
    async fn routing_loop_detects_as_path_loop() {
        let mut candidate = peering(1, 65001, 65000, "192.0.2.1", "edge1", PeeringStatus::Active);
        candidate.routing_policy = serde_json::json!({"import": {"as_path": [65001, 65002]}});
        let conflict = RoutingLoopRule.check(&candidate, &[]).await;
        assert!(conflict.is_some());
    }

    #[tokio::test]
    async fn routing_loop_clean_peering_is_fine() {
        let candidate = peering(1, 65001, 65000, "192.0.2.1", "edge1", PeeringStatus::Active);
        assert!(RoutingLoopRule.check(&candidate, &[]).await.is_none());
    }

    #[tokio::test]
    async fn prefix_sanity_flags_private_active_ip() {
        let candidate = peering(1, 65001, 65000, "10.0.0.1", "edge1", PeeringStatus::Active);
        let conflict = PrefixSanityRule.check(&candidate, &[]).await;
        assert!(conflict.is_some());
        assert_eq!(conflict.unwrap().severity, Severity::Medium);
    }

    #[tokio::test]
    async fn prefix_sanity_allows_private_ip_when_pending() {
        let candidate = peering(1, 65001, 65000, "10.0.0.1", "edge1", PeeringStatus::Pending);
        assert!(PrefixSanityRule.check(&candidate, &[]).await.is_none());
    }

    #[tokio::test]
    async fn prefix_sanity_detects_duplicate_ip_regardless_of_asn() {
        let candidate = peering(1, 65001, 65000, "198.51.100.1", "edge1", PeeringStatus::Active);
        let other = peering(2, 65001, 65999, "198.51.100.1", "edge1", PeeringStatus::Active);
        let conflict = PrefixSanityRule.check(&candidate, &[candidate.clone(), other]).await;
        assert!(conflict.is_some());
    }

    #[tokio::test]
    async fn prefix_sanity_flags_malformed_ip_as_high_severity() {
        let mut candidate = peering(1, 65001, 65000, "192.0.2.1", "edge1", PeeringStatus::Active);
        candidate.peer_ip = "not-an-ip-address".into();
        let conflict = PrefixSanityRule.check(&candidate, &[]).await.unwrap();
        assert_eq!(conflict.conflict_type, ConflictType::ConfigurationMismatch);
        assert_eq!(conflict.severity, Severity::High);
    }

    #[tokio::test]
    async fn prefix_sanity_malformed_ip_wins_over_duplicate_check() {
        let mut candidate = peering(1, 65001, 65000, "192.0.2.1", "edge1", PeeringStatus::Active);
        candidate.peer_ip = "garbage".into();
        let mut other = peering(2, 65001, 65999, "192.0.2.1", "edge1", PeeringStatus::Active);
        other.peer_ip = "garbage".into();
        let conflict = PrefixSanityRule.check(&candidate, &[candidate.clone(), other]).await.unwrap();
        assert_eq!(conflict.severity, Severity::High);
    }

    struct StubValidator(OriginValidation);

    #[async_trait]
    impl PrefixOriginValidator for StubValidator {
        async fn check(&self, _prefix: &str, _origin_asn: u32) -> OriginValidation {
            self.0
        }
    }

    #[tokio::test]
    async fn rpki_rule_skips_private_asn() {
        let rule = RpkiValidationRule::new(Arc::new(StubValidator(OriginValidation::Invalid)));
        let candidate = peering(1, 65001, 64512, "198.51.100.1", "edge1", PeeringStatus::Active);
        assert!(rule.check(&candidate, &[]).await.is_none());
    }

    #[tokio::test]
    async fn rpki_rule_flags_invalid_origin() {
        let rule = RpkiValidationRule::new(Arc::new(StubValidator(OriginValidation::Invalid)));
        let candidate = peering(1, 65001, 65000, "198.51.100.1", "edge1", PeeringStatus::Active);
        let conflict = rule.check(&candidate, &[]).await.unwrap();
        assert_eq!(conflict.conflict_type, ConflictType::RpkiInvalid);
        assert_eq!(conflict.severity, Severity::Critical);
    }

    #[tokio::test]
    async fn rpki_rule_not_determined_is_not_a_conflict() {
        let rule = RpkiValidationRule::new(Arc::new(StubValidator(OriginValidation::NotDetermined)));
        let candidate = peering(1, 65001, 65000, "198.51.100.1", "edge1", PeeringStatus::Active);
        assert!(rule.check(&candidate, &[]).await.is_none());
    }
}
