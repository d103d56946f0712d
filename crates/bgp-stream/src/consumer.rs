//! The Stream Consumer: pulls live BGP update messages, shards them by
//! peer identity for per-partition ordering, and drives the per-message
//! pipeline (conflict check, durable store, feature extraction).

use crate::feature::FeatureSink;
use crate::source::BgpEventSource;
use bgp_catalog::{Paging, PeeringFilter, Storage};
use bgp_common::BgpUpdateEvent;
use bgp_incident::{Alert, IncidentDispatcher};
use bgp_rules::RuleEvaluator;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Parses a raw JSON payload into a [`BgpUpdateEvent`]. Malformed
/// payloads return `None` so the caller can count and drop them rather
/// than stall the consumer.
pub fn parse_message(raw: &str) -> Option<BgpUpdateEvent> {
    serde_json::from_str(raw).ok()
}

fn shard_for(peer_ip: &str, shard_count: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    peer_ip.hash(&mut hasher);
    (hasher.finish() as usize) % shard_count.max(1)
}

/// Drives the per-message pipeline against the peering catalog, rule
/// evaluator, feature sink, and incident dispatcher.
pub struct StreamConsumer {
    catalog: Arc<dyn Storage>,
    evaluator: Arc<RuleEvaluator>,
    dispatcher: Arc<IncidentDispatcher>,
    feature_sink: Arc<FeatureSink>,
    durable_store: RwLock<Vec<BgpUpdateEvent>>,
    malformed_count: AtomicU64,
    processed_count: AtomicU64,
}

impl StreamConsumer {
    /// Builds a consumer wired against the given collaborators.
    pub fn new(
        catalog: Arc<dyn Storage>,
        evaluator: Arc<RuleEvaluator>,
        dispatcher: Arc<IncidentDispatcher>,
        feature_sink: Arc<FeatureSink>,
    ) -> Self {
        Self {
            catalog,
            evaluator,
            dispatcher,
            feature_sink,
            durable_store: RwLock::new(Vec::new()),
            malformed_count: AtomicU64::new(0),
            processed_count: AtomicU64::new(0),
        }
    }

    /// Runs the per-message pipeline for one already-parsed event:
    /// real-time conflict check, durable append, and feature extraction.
    pub async fn process_one(&self, event: BgpUpdateEvent) {
        let snapshot = self.catalog.list(PeeringFilter::default(), Paging { offset: 0, limit: usize::MAX }).await;
        let matches: Vec<_> = snapshot.iter().filter(|p| p.peer_ip == event.peer_ip).collect();

        for candidate in &matches {
            let conflicts = self.evaluator.detect(candidate, &snapshot).await;
            if conflicts.is_empty() {
                continue;
            }
            tracing::warn!(peer_ip = %event.peer_ip, peer_asn = event.peer_asn, conflicts = conflicts.len(), "real-time conflict check found conflicts");
            for conflict in conflicts {
                let mut labels = HashMap::new();
                labels.insert("peer_ip".to_string(), event.peer_ip.to_string());
                labels.insert("peer_asn".to_string(), event.peer_asn.to_string());
                self.dispatcher
                    .dispatch(Alert {
                        title: format!("{:?}", conflict.conflict_type),
                        description: conflict.description.clone(),
                        severity: conflict.severity,
                        source: "stream-consumer".to_string(),
                        labels,
                        created_at: chrono::Utc::now(),
                    })
                    .await;
            }
        }

        self.durable_store.write().push(event.clone());

        let entity_id = event.feature_entity_id();
        let features = event.to_feature_map();
        self.feature_sink.write(entity_id, features, event.timestamp);

        self.processed_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of messages successfully processed.
    pub fn processed_count(&self) -> u64 {
        self.processed_count.load(Ordering::Relaxed)
    }

    /// Number of messages dropped for failing to parse.
    pub fn malformed_count(&self) -> u64 {
        self.malformed_count.load(Ordering::Relaxed)
    }

    /// Snapshot of every event appended to the in-memory durable store.
    pub fn durable_events(&self) -> Vec<BgpUpdateEvent> {
        self.durable_store.read().clone()
    }

    /// Pulls from `source`, sharding by `peer_ip` across `shard_count`
    /// worker tasks so ordering is preserved per peer. Stops pulling new
    /// messages as soon as `shutdown` reports `true`, drains whatever is
    /// already queued, then returns.
    pub async fn run<S: BgpEventSource + 'static>(self: Arc<Self>, mut source: S, shard_count: usize, mut shutdown: watch::Receiver<bool>) {
        let mut senders = Vec::with_capacity(shard_count);
        let mut handles = Vec::with_capacity(shard_count);
        for _ in 0..shard_count {
            let (tx, mut rx) = mpsc::channel::<BgpUpdateEvent>(1024);
            senders.push(tx);
            let this = Arc::clone(&self);
            handles.push(tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    this.process_one(event).await;
                }
            }));
        }

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                maybe_raw = source.recv() => {
                    match maybe_raw {
                        Some(raw) => {
                            let Some(event) = parse_message(&raw) else {
                                self.malformed_count.fetch_add(1, Ordering::Relaxed);
                                tracing::warn!("dropping malformed stream message");
                                continue;
                            };
                            let shard = shard_for(&event.peer_ip, shard_count);
                            if senders[shard].send(event).await.is_err() {
                                tracing::error!(shard, "shard worker closed unexpectedly");
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        drop(senders);
        for handle in handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bgp_catalog::{AuditLogTable, InMemoryPeeringStore};
    use bgp_common::BgpUpdateType;
    use std::time::Duration;

    fn consumer() -> StreamConsumer {
        let evaluator = Arc::new(RuleEvaluator::new(Duration::from_secs(1)));
        let audit = Arc::new(AuditLogTable::new(b"k".to_vec()));
        let catalog: Arc<dyn Storage> = Arc::new(InMemoryPeeringStore::new(evaluator.clone(), audit));
        let dispatcher = Arc::new(IncidentDispatcher::new(None, None));
        let feature_sink = Arc::new(FeatureSink::new());
        StreamConsumer::new(catalog, evaluator, dispatcher, feature_sink)
    }

    fn event(peer_ip: &str, peer_asn: u32) -> BgpUpdateEvent {
        BgpUpdateEvent {
            timestamp: chrono::Utc::now(),
            peer_ip: peer_ip.to_string(),
            peer_asn,
            prefix: Some("198.51.100.0/24".into()),
            as_path: vec![65001, 65002],
            origin_asn: Some(peer_asn),
            next_hop: None,
            event_type: BgpUpdateType::Announce,
            communities: None,
        }
    }

    fn raw_message(peer_ip: &str, peer_asn: u32) -> String {
        serde_json::to_string(&event(peer_ip, peer_asn)).unwrap()
    }

    #[tokio::test]
    async fn process_one_appends_to_durable_store_and_feature_sink() {
        let consumer = consumer();
        let event = event("192.0.2.1", 65000);
        consumer.process_one(event.clone()).await;

        assert_eq!(consumer.processed_count(), 1);
        assert_eq!(consumer.durable_events().len(), 1);
        assert!(consumer.feature_sink.offline_len() == 1);
    }

    #[tokio::test]
    async fn run_drains_queued_messages_on_shutdown() {
        let consumer = Arc::new(consumer());
        let (source, tx) = crate::source::InMemoryEventSource::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        for i in 0..5 {
            tx.send(raw_message("192.0.2.1", 65000 + i)).await.unwrap();
        }
        drop(tx);

        let handle = tokio::spawn(consumer.clone().run(source, 4, shutdown_rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = shutdown_tx.send(true);
        handle.await.unwrap();

        assert_eq!(consumer.processed_count(), 5);
    }

    #[tokio::test]
    async fn run_drops_and_counts_malformed_messages() {
        let consumer = Arc::new(consumer());
        let (source, tx) = crate::source::InMemoryEventSource::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tx.send(raw_message("192.0.2.1", 65000)).await.unwrap();
        tx.send("not json".to_string()).await.unwrap();
        tx.send(raw_message("192.0.2.2", 65001)).await.unwrap();
        drop(tx);

        let handle = tokio::spawn(consumer.clone().run(source, 4, shutdown_rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = shutdown_tx.send(true);
        handle.await.unwrap();

        assert_eq!(consumer.processed_count(), 2);
        assert_eq!(consumer.malformed_count(), 1);
    }

    #[test]
    fn parse_message_rejects_malformed_json() {
        assert!(parse_message("not json").is_none());
    }

    #[test]
    fn parse_message_accepts_well_formed_event() {
        let raw = r#"{"timestamp":"2024-01-01T00:00:00Z","peer_ip":"192.0.2.1","peer_asn":65000,"as_path":[],"type":"announce"}"#;
        assert!(parse_message(raw).is_some());
    }
}
