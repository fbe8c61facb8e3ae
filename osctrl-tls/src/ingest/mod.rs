//! Per-request byte/event accounting attributed to `(environment, node,
//! kind)`. Best-effort: a failure to record never fails the request
//! (spec.md §4.6, §7).

use crate::store::{IngestCounters, IngestDelta, IngestKey, IngestKind, Store};
use std::sync::Arc;
use tracing::warn;

pub struct IngestAccounting {
    store: Arc<dyn Store>,
}

impl IngestAccounting {
    pub fn new(store: Arc<dyn Store>) -> Self {
        IngestAccounting { store }
    }

    pub fn record(&self, key: IngestKey, body_len: u64) {
        if let Err(err) = self.store.record_ingest(IngestDelta { key, body_len }) {
            warn!(error = %err, kind = ?key.kind, "ingest accounting update failed");
        }
    }

    pub fn counters(&self, key: IngestKey) -> IngestCounters {
        self.store.ingest_counters(&key).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EnvironmentId, MemoryStore};
    use uuid::Uuid;

    #[test]
    fn record_accumulates_bytes_and_events_per_key() {
        let store = Arc::new(MemoryStore::new());
        let accounting = IngestAccounting::new(store);
        let key = IngestKey {
            environment_id: EnvironmentId(Uuid::new_v4()),
            node_id: 1,
            kind: IngestKind::LogStatus,
        };

        accounting.record(key, 100);
        accounting.record(key, 50);

        let counters = accounting.counters(key);
        assert_eq!(counters.events, 2);
        assert_eq!(counters.bytes, 150);
    }

    #[test]
    fn counters_for_unknown_key_are_zero() {
        let store = Arc::new(MemoryStore::new());
        let accounting = IngestAccounting::new(store);
        let key = IngestKey {
            environment_id: EnvironmentId(Uuid::new_v4()),
            node_id: 99,
            kind: IngestKind::Config,
        };
        let counters = accounting.counters(key);
        assert_eq!(counters.events, 0);
        assert_eq!(counters.bytes, 0);
    }
}
