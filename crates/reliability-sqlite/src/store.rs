use rusqlite::{params, ErrorCode, OptionalExtension};
use sift_core::reliability::{aggregate, AggregatedUpdate};
use sift_core::{unix_now, Fingerprint, ReliabilityRecord, ReliabilityStore, ReliabilityUpdate, StoreError};
use tracing::debug;

use crate::insert::upsert_reliability;
use crate::query::record_from_row;
use crate::SqliteStore;

fn store_err(e: rusqlite::Error) -> StoreError {
    match e.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => StoreError::Unavailable(e.to_string()),
        _ => StoreError::Backend(e.to_string()),
    }
}

impl ReliabilityStore for SqliteStore {
    fn get(&self, fingerprint: &Fingerprint) -> Result<ReliabilityRecord, StoreError> {
        let found = self
            .conn()
            .query_row(
                "SELECT successes, failures, last_latency_ms, last_tested FROM reliability WHERE fingerprint=?",
                params![fingerprint.to_hex()],
                |r| record_from_row(r, 0),
            )
            .optional()
            .map_err(store_err)?;
        Ok(found.unwrap_or_default())
    }

    fn record(&self, fingerprint: &Fingerprint, success: bool, latency_ms: Option<f64>) -> Result<(), StoreError> {
        let agg = AggregatedUpdate {
            successes: u64::from(success),
            failures: u64::from(!success),
            last_latency_ms: latency_ms,
            last_tested: unix_now(),
        };
        upsert_reliability(&self.conn(), fingerprint, &agg).map_err(store_err)
    }

    fn flush_batch(&self, updates: &[ReliabilityUpdate]) -> Result<(), StoreError> {
        if updates.is_empty() {
            return Ok(());
        }
        let grouped = aggregate(updates);
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(store_err)?;
        for (fp, agg) in &grouped {
            upsert_reliability(&tx, fp, agg).map_err(store_err)?;
        }
        tx.commit().map_err(store_err)?;
        debug!(updates = updates.len(), fingerprints = grouped.len(), "reliability batch committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn fp(s: &str) -> Fingerprint {
        Fingerprint::digest(s.as_bytes())
    }

    fn update(f: Fingerprint, success: bool, latency: Option<f64>, at: i64) -> ReliabilityUpdate {
        ReliabilityUpdate { fingerprint: f, success, latency_ms: latency, tested_at: at }
    }

    #[test]
    fn missing_fingerprint_is_zero() {
        let store = SqliteStore::open_in_memory().unwrap();
        let rec = store.get(&fp("nobody")).unwrap();
        assert_eq!(rec, ReliabilityRecord::default());
        assert_eq!(rec.score(), None);
    }

    #[test]
    fn record_accumulates() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = fp("a");
        store.record(&a, true, Some(12.5)).unwrap();
        store.record(&a, true, Some(10.0)).unwrap();
        store.record(&a, false, None).unwrap();
        let rec = store.get(&a).unwrap();
        assert_eq!((rec.successes, rec.failures), (2, 1));
        assert!((rec.score().unwrap() - 2.0 / 3.0).abs() < 1e-9);
        assert!(rec.last_tested > 0);
    }

    #[test]
    fn flush_batch_aggregates_per_fingerprint() {
        let store = SqliteStore::open_in_memory().unwrap();
        let (a, b) = (fp("a"), fp("b"));
        store.flush_batch(&[update(a, true, Some(5.0), 10), update(a, false, None, 9), update(b, false, None, 10)]).unwrap();
        store.flush_batch(&[update(a, true, Some(7.0), 20)]).unwrap();

        let ra = store.get(&a).unwrap();
        assert_eq!((ra.successes, ra.failures), (2, 1));
        assert_eq!(ra.last_latency_ms, Some(7.0));
        assert_eq!(ra.last_tested, 20);
        let rb = store.get(&b).unwrap();
        assert_eq!(rb.score(), Some(0.0));
    }

    #[test]
    fn older_batch_keeps_newer_latency() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = fp("a");
        store.flush_batch(&[update(a, true, Some(30.0), 50)]).unwrap();
        store.flush_batch(&[update(a, true, Some(99.0), 40)]).unwrap();
        let ra = store.get(&a).unwrap();
        assert_eq!(ra.successes, 2);
        assert_eq!(ra.last_latency_ms, Some(30.0));
        assert_eq!(ra.last_tested, 50);
    }

    #[test]
    fn rejects_malformed_fingerprint_rows() {
        let store = SqliteStore::open_in_memory().unwrap();
        let res = store.conn().execute("INSERT INTO reliability(fingerprint) VALUES ('short')", []);
        assert!(res.is_err());
    }

    #[test]
    fn concurrent_records_do_not_lose_counts() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let a = fp("shared");
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        store.record(&a, i % 2 == 0, Some(1.0)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let rec = store.get(&a).unwrap();
        assert_eq!(rec.total(), 200);
        assert_eq!((rec.successes, rec.failures), (100, 100));
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reliability.db");
        let a = fp("durable");
        {
            let store = SqliteStore::open_or_create(&path).unwrap();
            store.flush_batch(&[update(a, true, Some(3.0), 1), update(a, true, Some(4.0), 2)]).unwrap();
        }
        let store = SqliteStore::open_or_create(&path).unwrap();
        assert!(store.table_exists("runs").unwrap());
        assert_eq!(store.get(&a).unwrap().successes, 2);
    }

    #[test]
    fn history_orders_by_recency() {
        let store = SqliteStore::open_in_memory().unwrap();
        let (old, new) = (fp("old"), fp("new"));
        store.flush_batch(&[update(old, true, Some(1.0), 5), update(new, false, None, 50)]).unwrap();
        let h = store.history(10).unwrap();
        assert_eq!(h.len(), 2);
        assert_eq!(h[0].fingerprint, new);
        assert_eq!(h[0].score, Some(0.0));
        assert_eq!(h[1].fingerprint, old);
        assert_eq!(store.history(1).unwrap().len(), 1);
    }
}
