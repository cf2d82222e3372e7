use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::types::Fingerprint;

/// Persisted probe history for one fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityRecord {
    pub successes: u64,
    pub failures: u64,
    pub last_latency_ms: Option<f64>,
    pub last_tested: i64,
}

impl ReliabilityRecord {
    pub fn total(&self) -> u64 {
        self.successes + self.failures
    }

    pub fn score(&self) -> Option<f64> {
        score(self.successes, self.failures)
    }
}

/// `successes / (successes + failures)`, or `None` when never tested.
pub fn score(successes: u64, failures: u64) -> Option<f64> {
    let total = successes + failures;
    if total == 0 {
        None
    } else {
        Some(successes as f64 / total as f64)
    }
}

/// Pending history delta produced by one completed probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityUpdate {
    pub fingerprint: Fingerprint,
    pub success: bool,
    pub latency_ms: Option<f64>,
    pub tested_at: i64,
}

/// Per-fingerprint sum of a batch of updates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedUpdate {
    pub successes: u64,
    pub failures: u64,
    pub last_latency_ms: Option<f64>,
    pub last_tested: i64,
}

/// Collapse a batch so each fingerprint is written exactly once per flush.
/// The latest update (by `tested_at`, then batch order) supplies the latency.
pub fn aggregate(updates: &[ReliabilityUpdate]) -> BTreeMap<Fingerprint, AggregatedUpdate> {
    let mut out: BTreeMap<Fingerprint, AggregatedUpdate> = BTreeMap::new();
    for u in updates {
        let agg = out.entry(u.fingerprint).or_default();
        if u.success {
            agg.successes += 1;
        } else {
            agg.failures += 1;
        }
        if u.tested_at >= agg.last_tested {
            agg.last_tested = u.tested_at;
            agg.last_latency_ms = u.latency_ms;
        }
    }
    out
}

/// Durable fingerprint-keyed history. Implementations must make `record` and
/// each fingerprint's share of `flush_batch` atomic under concurrent callers.
pub trait ReliabilityStore: Send + Sync {
    fn get(&self, fingerprint: &Fingerprint) -> Result<ReliabilityRecord, StoreError>;

    fn record(&self, fingerprint: &Fingerprint, success: bool, latency_ms: Option<f64>) -> Result<(), StoreError>;

    fn flush_batch(&self, updates: &[ReliabilityUpdate]) -> Result<(), StoreError>;
}
