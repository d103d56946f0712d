//! The Feature Sink: per-session feature vectors for downstream ML
//! scoring. Writes are fire-and-forget on the hot path; a periodic
//! background job materializes the offline store into the online one.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// One feature row: the projected feature map and when the originating
/// event happened.
#[derive(Debug, Clone)]
pub struct FeatureRow {
    pub features: HashMap<String, Value>,
    pub event_timestamp: DateTime<Utc>,
}

/// Online (low-latency, last-value-wins) and offline (append-only,
/// materialized periodically) feature stores keyed by entity id.
pub struct FeatureSink {
    online: DashMap<String, FeatureRow>,
    offline: RwLock<Vec<(String, FeatureRow)>>,
    write_failures: AtomicU64,
}

impl Default for FeatureSink {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureSink {
    /// Builds an empty sink.
    pub fn new() -> Self {
        Self { online: DashMap::new(), offline: RwLock::new(Vec::new()), write_failures: AtomicU64::new(0) }
    }

    /// Writes one feature row to the offline store. Fire-and-forget: the
    /// only failure mode is an unexpected panic inside serialization,
    /// which this method cannot hit since `features` is already a
    /// `serde_json::Value` map; kept fallible for parity with a real
    /// store's network failures, which increment the failure counter
    /// instead of propagating.
    pub fn write(&self, entity_id: String, features: HashMap<String, Value>, event_timestamp: DateTime<Utc>) {
        let row = FeatureRow { features, event_timestamp };
        self.offline.write().push((entity_id, row));
    }

    /// Records a failed write from a caller that attempted an external
    /// store and failed; the hot path must not block or retry.
    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Count of failed writes recorded via [`FeatureSink::record_write_failure`].
    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }

    /// Reads the current online value for `entity_id`, if materialized.
    pub fn read_online(&self, entity_id: &str) -> Option<FeatureRow> {
        self.online.get(entity_id).map(|r| r.value().clone())
    }

    /// Copies every offline row whose event occurred within the last
    /// `window` into the online store, so the serving path stays warm.
    /// Returns the number of rows materialized.
    pub fn materialize(&self, window: chrono::Duration) -> usize {
        let cutoff = Utc::now() - window;
        let rows = self.offline.read();
        let mut count = 0;
        for (entity_id, row) in rows.iter() {
            if row.event_timestamp >= cutoff {
                self.online.insert(entity_id.clone(), row.clone());
                count += 1;
            }
        }
        count
    }

    /// Number of rows currently in the offline store.
    pub fn offline_len(&self) -> usize {
        self.offline.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_materialize_populates_online() {
        let sink = FeatureSink::new();
        sink.write("10.0.0.1_65000".into(), HashMap::from([("peer_asn".to_string(), serde_json::json!(65000))]), Utc::now());
        assert!(sink.read_online("10.0.0.1_65000").is_none());

        let materialized = sink.materialize(chrono::Duration::minutes(5));
        assert_eq!(materialized, 1);
        assert!(sink.read_online("10.0.0.1_65000").is_some());
    }

    #[test]
    fn materialize_skips_rows_outside_window() {
        let sink = FeatureSink::new();
        sink.write("stale".into(), HashMap::new(), Utc::now() - chrono::Duration::hours(2));
        let materialized = sink.materialize(chrono::Duration::minutes(5));
        assert_eq!(materialized, 0);
        assert!(sink.read_online("stale").is_none());
    }

    #[test]
    fn write_failure_counter_tracks_external_failures() {
        let sink = FeatureSink::new();
        sink.record_write_failure();
        sink.record_write_failure();
        assert_eq!(sink.write_failures(), 2);
    }
}
