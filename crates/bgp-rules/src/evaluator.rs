//! Rule trait and the concurrent evaluator that runs the registered rules
//! against a candidate peering.

use async_trait::async_trait;
use bgp_common::{Conflict, Peering};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

/// A single, stateless conflict-detection algorithm.
///
/// Implementations must not mutate `candidate` or `snapshot`, and must not
/// perform unbounded I/O — the evaluator budgets each call with a deadline
/// and treats a rule that blows past it as a failure, not as a conflict.
#[async_trait]
pub trait Rule: Send + Sync {
    /// Canonical, stable name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Inspects `candidate` against `snapshot` (all non-deleted peerings,
    /// candidate included or not depending on the caller) and returns a
    /// conflict if one is found.
    async fn check(&self, candidate: &Peering, snapshot: &[Peering]) -> Option<Conflict>;
}

/// Runs every registered [`Rule`] concurrently with a shared per-rule
/// timeout, absorbing rule panics and timeouts (fail-open) so that one
/// broken rule never suppresses the others.
pub struct RuleEvaluator {
    rules: RwLock<Vec<Arc<dyn Rule>>>,
    rule_timeout: Duration,
}

impl RuleEvaluator {
    /// Builds an empty evaluator with the given per-rule timeout. Callers
    /// register rules with [`RuleEvaluator::register`].
    pub fn new(rule_timeout: Duration) -> Self {
        Self { rules: RwLock::new(Vec::new()), rule_timeout }
    }

    /// Registers a rule. Order has no bearing on detection results since
    /// rules run concurrently and their output is unordered.
    pub fn register(&self, rule: Arc<dyn Rule>) {
        self.rules.write().push(rule);
    }

    /// Removes a registered rule by name. Idempotent.
    pub fn unregister(&self, name: &str) {
        self.rules.write().retain(|r| r.name() != name);
    }

    /// Number of currently registered rules.
    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    /// True if no rules are registered.
    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }

    /// Runs all registered rules concurrently against `(candidate, snapshot)`
    /// and returns every detected conflict. Rule timeouts and panics are
    /// logged and skipped; they never propagate to the caller.
    pub async fn detect(&self, candidate: &Peering, snapshot: &[Peering]) -> Vec<Conflict> {
        let candidate = candidate.clone();
        let snapshot = snapshot.to_vec();
        let rules = self.rules.read().clone();

        let mut handles = Vec::with_capacity(rules.len());
        for rule in &rules {
            let rule = Arc::clone(rule);
            let candidate = candidate.clone();
            let snapshot = snapshot.clone();
            let timeout = self.rule_timeout;
            let name = rule.name();
            handles.push(tokio::spawn(async move {
                let outcome = tokio::time::timeout(timeout, rule.check(&candidate, &snapshot)).await;
                (name, outcome)
            }));
        }

        let mut conflicts = Vec::new();
        for handle in handles {
            match handle.await {
                Ok((_name, Ok(Some(conflict)))) => conflicts.push(conflict),
                Ok((_name, Ok(None))) => {}
                Ok((name, Err(_elapsed))) => {
                    tracing::warn!(rule = name, timeout_ms = self.rule_timeout.as_millis() as u64, "rule exceeded timeout, skipping");
                }
                Err(join_error) => {
                    if join_error.is_panic() {
                        tracing::error!(error = %join_error, "rule panicked, skipping");
                    } else {
                        tracing::warn!(error = %join_error, "rule task cancelled, skipping");
                    }
                }
            }
        }
        conflicts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bgp_common::{AddressFamily, PeeringStatus};
    use chrono::Utc;

    fn peering(id: u64, peer_asn: u32, peer_ip: &str) -> Peering {
        Peering {
            id,
            name: format!("p{id}"),
            local_asn: 65001,
            peer_asn,
            peer_ip: peer_ip.to_string(),
            device: "edge1".into(),
            interface: None,
            hold_time: 180,
            keepalive: 60,
            status: PeeringStatus::Active,
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

    struct AlwaysTimesOut;

    #[async_trait]
    impl Rule for AlwaysTimesOut {
        fn name(&self) -> &'static str {
            "always-times-out"
        }

        async fn check(&self, _candidate: &Peering, _snapshot: &[Peering]) -> Option<Conflict> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            None
        }
    }

    struct AlwaysPanics;

    #[async_trait]
    impl Rule for AlwaysPanics {
        fn name(&self) -> &'static str {
            "always-panics"
        }

        async fn check(&self, _candidate: &Peering, _snapshot: &[Peering]) -> Option<Conflict> {
            panic!("boom");
        }
    }

    #[tokio::test]
    async fn timeout_and_panic_are_absorbed_fail_open() {
        let evaluator = RuleEvaluator::new(Duration::from_millis(20));
        evaluator.register(Arc::new(AlwaysTimesOut));
        evaluator.register(Arc::new(AlwaysPanics));

        let candidate = peering(1, 65000, "192.0.2.1");
        let conflicts = evaluator.detect(&candidate, &[candidate.clone()]).await;
        assert!(conflicts.is_empty());
    }

    #[tokio::test]
    async fn empty_registry_detects_nothing() {
        let evaluator = RuleEvaluator::new(Duration::from_secs(1));
        let candidate = peering(1, 65000, "192.0.2.1");
        assert!(evaluator.detect(&candidate, &[]).await.is_empty());
    }
}
