#![allow(dead_code)]

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pipeline::Pipeline;
use probe::{Connector, NoGeo, Resolver};
use reliability_sqlite::SqliteStore;
use sift_core::{
    Fingerprint, LookupError, PipelineConfig, ProbeError, RawConnection, ReliabilityRecord, ReliabilityStore,
    ReliabilityUpdate, StoreError,
};

/// Fixed name table; anything else is NXDOMAIN.
pub struct TableResolver(pub HashMap<String, IpAddr>);

impl TableResolver {
    pub fn new(entries: &[(&str, &str)]) -> Self {
        TableResolver(entries.iter().map(|(h, ip)| (h.to_string(), ip.parse().unwrap())).collect())
    }
}

#[async_trait]
impl Resolver for TableResolver {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, LookupError> {
        self.0
            .get(host)
            .map(|ip| vec![*ip])
            .ok_or_else(|| LookupError::Dns { host: host.to_string(), reason: "nxdomain".into() })
    }
}

/// Port 1 refuses, everything else answers after `latency`.
pub struct FakeConnector {
    pub latency: Duration,
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, addr: SocketAddr, limit: Duration) -> Result<Duration, ProbeError> {
        if self.latency > limit {
            tokio::time::sleep(limit).await;
            return Err(ProbeError::Timeout);
        }
        tokio::time::sleep(self.latency).await;
        if addr.port() == 1 {
            return Err(ProbeError::Refused("connection refused".into()));
        }
        Ok(self.latency)
    }
}

/// SQLite underneath, with the first `fail_flushes` flushes and optionally
/// every read failing.
pub struct FlakyStore {
    pub inner: SqliteStore,
    pub fail_flushes: u32,
    pub fail_reads: bool,
    pub flush_calls: AtomicU32,
}

impl FlakyStore {
    pub fn new(fail_flushes: u32) -> Self {
        FlakyStore {
            inner: SqliteStore::open_in_memory().unwrap(),
            fail_flushes,
            fail_reads: false,
            flush_calls: AtomicU32::new(0),
        }
    }
}

impl ReliabilityStore for FlakyStore {
    fn get(&self, fp: &Fingerprint) -> Result<ReliabilityRecord, StoreError> {
        if self.fail_reads {
            return Err(StoreError::Unavailable("connection reset".into()));
        }
        self.inner.get(fp)
    }

    fn record(&self, fp: &Fingerprint, success: bool, latency_ms: Option<f64>) -> Result<(), StoreError> {
        self.inner.record(fp, success, latency_ms)
    }

    fn flush_batch(&self, updates: &[ReliabilityUpdate]) -> Result<(), StoreError> {
        let n = self.flush_calls.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_flushes {
            return Err(StoreError::Unavailable("database is locked".into()));
        }
        self.inner.flush_batch(updates)
    }
}

pub fn config() -> PipelineConfig {
    let mut cfg = PipelineConfig { concurrency_limit: 4, flush_backoff_ms: 5, ..Default::default() };
    cfg.geo.enabled = false;
    cfg
}

pub fn resolver() -> TableResolver {
    TableResolver::new(&[
        ("alpha.test", "198.51.100.1"),
        ("beta.test", "198.51.100.2"),
        ("gamma.test", "198.51.100.3"),
        ("internal.test", "10.0.0.5"),
    ])
}

pub fn pipeline(cfg: PipelineConfig, store: Arc<dyn ReliabilityStore>) -> Pipeline {
    Pipeline::new(cfg, store)
        .with_resolver(Arc::new(resolver()))
        .with_geo(Arc::new(NoGeo))
        .with_connector(Arc::new(FakeConnector { latency: Duration::from_millis(20) }))
}

pub fn inputs(raws: &[&str]) -> Vec<RawConnection> {
    raws.iter().map(|r| RawConnection::new(*r, "test-feed")).collect()
}
