mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{config, inputs, pipeline, FakeConnector, FlakyStore};
use pipeline::{RunLedger, RunReport};
use reliability_sqlite::SqliteStore;
use sift_core::{ConfigError, PipelineConfig, ProbeStatus, ReliabilityStore, StoreError};
use uuid::Uuid;

const ALPHA: &str = "trojan://secret@alpha.test:443?sni=alpha.test";
const ALPHA_REORDERED: &str = "TROJAN://secret@ALPHA.test:443?type=tcp&sni=alpha.test#renamed";
const BETA: &str = "trojan://secret@beta.test:443";
const GAMMA_REFUSED: &str = "trojan://secret@gamma.test:1";
const INTERNAL: &str = "trojan://secret@internal.test:443";
const BAD_PORT: &str = "trojan://secret@alpha.test:99999";

#[tokio::test]
async fn end_to_end_report() {
    let store = Arc::new(FlakyStore::new(0));
    let p = pipeline(config(), store.clone());
    let report = p
        .run(inputs(&[BETA, ALPHA, ALPHA_REORDERED, "ftp://nope", "", GAMMA_REFUSED, INTERNAL, BAD_PORT, BETA]))
        .await
        .unwrap();

    let stats = report.dedup;
    assert_eq!(stats.input, 9);
    assert_eq!(stats.blank, 1);
    assert_eq!(stats.exact_duplicates, 1);
    assert_eq!(stats.unrecognized, 1);
    assert_eq!(stats.duplicate_fingerprints, 1);
    assert_eq!(stats.parse_failed, 1);
    assert_eq!(stats.kept, 5);

    let raws: Vec<&str> = report.entries.iter().map(|e| e.raw.as_str()).collect();
    let mut sorted = raws.clone();
    sorted.sort_unstable();
    assert_eq!(raws, sorted, "entries follow dedup order");
    // the uppercase variant sorts first and wins its group
    assert!(raws.contains(&ALPHA_REORDERED));
    assert!(!raws.contains(&ALPHA));

    let status = |raw: &str| report.entries.iter().find(|e| e.raw == raw).unwrap().result.status;
    assert_eq!(status(ALPHA_REORDERED), ProbeStatus::Reachable);
    assert_eq!(status(BETA), ProbeStatus::Reachable);
    assert_eq!(status(GAMMA_REFUSED), ProbeStatus::Refused);
    assert_eq!(status(INTERNAL), ProbeStatus::Unresolved);
    assert_eq!(status(BAD_PORT), ProbeStatus::Failed);

    let bad = report.entries.iter().find(|e| e.raw == BAD_PORT).unwrap();
    assert!(bad.endpoint.is_none() && bad.parse_error.is_some());
    assert!(bad.canonical.is_raw_fallback());

    assert_eq!(report.probed, 4);
    assert_eq!(report.reachable, 2);
    assert!(report.flushed);
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    assert_eq!(report.cache.dns_entries, 3, "internal.test is never cached");

    // parse failures are reported but not recorded
    assert_eq!(store.get(&bad.result.fingerprint).unwrap().total(), 0);
    let internal = report.entries.iter().find(|e| e.raw == INTERNAL).unwrap();
    assert_eq!(store.get(&internal.result.fingerprint).unwrap().failures, 1);
}

#[tokio::test]
async fn flush_recovers_within_retry_budget() {
    let store = Arc::new(FlakyStore::new(2));
    let cfg = sift_core::PipelineConfig { flush_attempts: 3, ..config() };
    let report = pipeline(cfg, store.clone()).run(inputs(&[ALPHA, BETA, GAMMA_REFUSED])).await.unwrap();

    assert_eq!(report.entries.len(), 3);
    assert!(report.flushed);
    assert_eq!(report.flush_attempts, 3);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("3 attempts"), "{:?}", report.warnings);

    for entry in &report.entries {
        let rec = store.get(&entry.result.fingerprint).unwrap();
        assert_eq!(rec.total(), 1);
        assert_eq!(rec.successes == 1, entry.result.reachable);
    }
}

#[tokio::test]
async fn persistent_flush_failure_is_a_warning() {
    let store = Arc::new(FlakyStore::new(u32::MAX));
    let cfg = sift_core::PipelineConfig { flush_attempts: 3, ..config() };
    let report = pipeline(cfg, store.clone()).run(inputs(&[ALPHA, BETA])).await.unwrap();

    assert_eq!(report.entries.len(), 2);
    assert_eq!(report.reachable, 2);
    assert!(!report.flushed);
    assert!(report.warnings.iter().any(|w| w.contains("not persisted")), "{:?}", report.warnings);
    assert_eq!(store.flush_calls.load(std::sync::atomic::Ordering::SeqCst), 3);
}

#[tokio::test]
async fn invalid_config_aborts_before_work() {
    let store = Arc::new(FlakyStore::new(0));
    let cfg = sift_core::PipelineConfig { concurrency_limit: 0, ..config() };
    let err = pipeline(cfg, store.clone()).run(inputs(&[ALPHA])).await.unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { field: "concurrency_limit", .. }));
    assert_eq!(store.flush_calls.load(std::sync::atomic::Ordering::SeqCst), 0);

    let cfg = sift_core::PipelineConfig { include_protocols: vec!["carrier-pigeon".into()], ..config() };
    assert!(matches!(pipeline(cfg, store).run(inputs(&[ALPHA])).await, Err(ConfigError::UnknownProtocol(_))));
}

#[tokio::test]
async fn reliability_carries_across_runs() {
    let store = Arc::new(FlakyStore::new(0));
    let first = pipeline(config(), store.clone()).run(inputs(&[ALPHA, GAMMA_REFUSED])).await.unwrap();
    assert!(first.entries.iter().all(|e| e.result.reliability.is_none()), "untested on first sight");

    let second = pipeline(config(), store.clone()).run(inputs(&[ALPHA, GAMMA_REFUSED])).await.unwrap();
    let score = |raw: &str| second.entries.iter().find(|e| e.raw == raw).unwrap().result.reliability;
    assert_eq!(score(ALPHA), Some(1.0));
    assert_eq!(score(GAMMA_REFUSED), Some(0.0));
}

#[tokio::test]
async fn unreadable_store_degrades_to_untested() {
    let mut flaky = FlakyStore::new(0);
    flaky.fail_reads = true;
    let report = pipeline(config(), Arc::new(flaky)).run(inputs(&[ALPHA, BETA])).await.unwrap();
    assert_eq!(report.reachable, 2);
    assert!(report.entries.iter().all(|e| e.result.reliability.is_none()));
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("2 endpoints"), "{:?}", report.warnings);
}

#[tokio::test]
async fn protocol_filters_apply() {
    let store = Arc::new(FlakyStore::new(0));
    let cfg = sift_core::PipelineConfig { exclude_protocols: vec!["Trojan".into()], ..config() };
    let report = pipeline(cfg, store).run(inputs(&[ALPHA, BETA, BAD_PORT])).await.unwrap();
    // the unparseable string cannot be attributed to a protocol and survives
    assert_eq!(report.dedup.filtered_by_protocol, 2);
    assert_eq!(report.entries.len(), 1);
    assert_eq!(report.probed, 0);
}

#[tokio::test(start_paused = true)]
async fn deadline_returns_partial_results() {
    let store = Arc::new(FlakyStore::new(0));
    let cfg = sift_core::PipelineConfig { concurrency_limit: 1, batch_deadline_ms: Some(1_500), ..config() };
    let report = pipeline(cfg, store.clone())
        .with_connector(Arc::new(FakeConnector { latency: Duration::from_secs(1) }))
        .run(inputs(&[ALPHA, BETA, "trojan://secret@gamma.test:443"]))
        .await
        .unwrap();

    assert_eq!(report.entries.len(), 3);
    assert_eq!(report.abandoned, 2);
    assert_eq!(report.reachable, 1);
    let abandoned: Vec<_> = report.entries.iter().filter(|e| e.result.status == ProbeStatus::Abandoned).collect();
    assert_eq!(abandoned.len(), 2);
    for e in abandoned {
        assert_eq!(store.get(&e.result.fingerprint).unwrap().total(), 0);
    }
    assert!(report.warnings.iter().any(|w| w.contains("abandoned")));
}

#[tokio::test]
async fn run_ledger_records_attrition() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let report = pipeline(config(), store.clone())
        .with_ledger(store.clone() as Arc<dyn RunLedger>)
        .run(inputs(&[ALPHA, BETA, BETA, INTERNAL]))
        .await
        .unwrap();

    let runs = store.runs(5).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].run_id, report.run_id.to_string());
    assert_eq!(runs[0].counts.input, 4);
    assert_eq!(runs[0].counts.kept, 3);
    assert_eq!(runs[0].counts.probed, 3);
    assert_eq!(runs[0].counts.reachable, 2);
    assert!(runs[0].finished_at.is_some());
    assert_eq!(store.history(10).unwrap().len(), 3);
}

struct ClosedLedger;

impl RunLedger for ClosedLedger {
    fn begin(&self, _run_id: Uuid, _started_at: i64, _config: &PipelineConfig) -> Result<(), StoreError> {
        Ok(())
    }

    fn finish(&self, _report: &RunReport) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("database is locked".into()))
    }
}

#[tokio::test]
async fn ledger_finish_failure_is_a_warning() {
    let store = Arc::new(FlakyStore::new(0));
    let report = pipeline(config(), store)
        .with_ledger(Arc::new(ClosedLedger))
        .run(inputs(&[ALPHA, BETA]))
        .await
        .unwrap();

    assert_eq!(report.entries.len(), 2);
    assert_eq!(report.warnings.len(), 1, "{:?}", report.warnings);
    assert!(report.warnings[0].starts_with("run ledger:"), "{}", report.warnings[0]);
    assert!(report.warnings[0].contains("database is locked"));
}
