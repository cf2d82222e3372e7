//! Concurrency-bounded reachability, latency and geo probing.

pub mod cache;
pub mod connector;
pub mod flush;
pub mod geo;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sift_core::ratelimiter::TargetRateLimiter;
use sift_core::{unix_now, Fingerprint, PipelineConfig, ProbeError, ProbeResult, ProbeStatus, ReliabilityUpdate};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

pub use cache::{CacheStats, GeoProvider, LookupCache, NoGeo, Resolver, SystemResolver};
pub use connector::{Connector, TcpConnector};
pub use flush::{flush_with_retry, FlushOutcome};
pub use geo::HttpGeoProvider;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeLimits {
    pub concurrency_limit: usize,
    pub probe_timeout: Duration,
    /// Connects per second per resolved address.
    pub rate_limit: f64,
}

impl ProbeLimits {
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        ProbeLimits {
            concurrency_limit: cfg.concurrency_limit,
            probe_timeout: cfg.probe_timeout(),
            rate_limit: cfg.rate_limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeTarget {
    /// Caller's position for this endpoint; results carry it back.
    pub index: usize,
    pub fingerprint: Fingerprint,
    pub host: String,
    pub port: u16,
    pub reliability: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct ProbeBatch {
    /// `(index, result)` in completion order.
    pub results: Vec<(usize, ProbeResult)>,
    pub updates: Vec<ReliabilityUpdate>,
    pub abandoned: usize,
}

pub struct ProbeEngine {
    cache: Arc<LookupCache>,
    connector: Arc<dyn Connector>,
    limits: ProbeLimits,
    rate: Arc<TargetRateLimiter>,
}

impl ProbeEngine {
    pub fn new(cache: Arc<LookupCache>, connector: Arc<dyn Connector>, limits: ProbeLimits) -> Self {
        let rate = Arc::new(TargetRateLimiter::new(limits.rate_limit));
        ProbeEngine { cache, connector, limits, rate }
    }

    pub fn cache(&self) -> &Arc<LookupCache> {
        &self.cache
    }

    /// Probe every target with at most `concurrency_limit` in flight. Tasks
    /// still running at `deadline` are aborted and reported as abandoned.
    pub async fn probe_batch(&self, targets: Vec<ProbeTarget>, deadline: Option<Instant>) -> ProbeBatch {
        let total = targets.len();
        let sem = Arc::new(Semaphore::new(self.limits.concurrency_limit.max(1)));
        let mut pending: HashMap<usize, (Fingerprint, Option<f64>)> = HashMap::with_capacity(total);
        let mut set = JoinSet::new();

        for target in targets {
            pending.insert(target.index, (target.fingerprint, target.reliability));
            let sem = sem.clone();
            let cache = self.cache.clone();
            let connector = self.connector.clone();
            let rate = self.rate.clone();
            let probe_timeout = self.limits.probe_timeout;
            set.spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                let outcome = probe_one(&cache, connector.as_ref(), &rate, &target, probe_timeout).await;
                (target.index, outcome)
            });
        }

        let mut batch = ProbeBatch::default();
        let mut expired = false;
        loop {
            let next = match deadline {
                Some(d) if !expired => match timeout_at(d, set.join_next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!(remaining = set.len(), "probe deadline reached, aborting");
                        expired = true;
                        set.abort_all();
                        continue;
                    }
                },
                _ => set.join_next().await,
            };
            match next {
                None => break,
                Some(Ok((index, (result, update)))) => {
                    pending.remove(&index);
                    batch.results.push((index, result));
                    batch.updates.extend(update);
                }
                Some(Err(e)) if e.is_panic() => warn!(error = %e, "probe task panicked"),
                Some(Err(_)) => {}
            }
        }

        // Whatever never reported back either panicked or was cut off.
        let status = if expired { ProbeStatus::Abandoned } else { ProbeStatus::Failed };
        let mut leftover: Vec<_> = pending.into_iter().collect();
        leftover.sort_unstable_by_key(|(index, _)| *index);
        for (index, (fingerprint, reliability)) in leftover {
            if expired {
                batch.abandoned += 1;
            } else {
                batch.updates.push(ReliabilityUpdate { fingerprint, success: false, latency_ms: None, tested_at: unix_now() });
            }
            batch.results.push((index, ProbeResult::unreachable(fingerprint, status, reliability)));
        }

        let reachable = batch.results.iter().filter(|(_, r)| r.reachable).count();
        info!(total, reachable, abandoned = batch.abandoned, "probe batch finished");
        batch
    }
}

async fn probe_one(
    cache: &LookupCache,
    connector: &dyn Connector,
    rate: &TargetRateLimiter,
    target: &ProbeTarget,
    probe_timeout: Duration,
) -> (ProbeResult, Option<ReliabilityUpdate>) {
    let failed = |status| {
        let result = ProbeResult::unreachable(target.fingerprint, status, target.reliability);
        let update = ReliabilityUpdate { fingerprint: target.fingerprint, success: false, latency_ms: None, tested_at: unix_now() };
        (result, Some(update))
    };

    let Some(ip) = cache.resolve(&target.host).await else {
        debug!(host = %target.host, "unresolved");
        return failed(ProbeStatus::Unresolved);
    };
    let geo = cache.geolocate(ip).await;
    rate.acquire(&ip.to_string()).await;

    let addr = SocketAddr::new(ip, target.port);
    let (mut result, update) = match connector.connect(addr, probe_timeout).await {
        Ok(elapsed) => {
            let latency_ms = elapsed.as_micros() as f64 / 1000.0;
            debug!(%addr, latency_ms, "reachable");
            let result = ProbeResult {
                reachable: true,
                status: ProbeStatus::Reachable,
                latency_ms: Some(latency_ms),
                ..ProbeResult::unreachable(target.fingerprint, ProbeStatus::Reachable, target.reliability)
            };
            let update = ReliabilityUpdate {
                fingerprint: target.fingerprint,
                success: true,
                latency_ms: Some(latency_ms),
                tested_at: unix_now(),
            };
            (result, Some(update))
        }
        Err(e) => {
            debug!(%addr, error = %e, "unreachable");
            let status = match e {
                ProbeError::Refused(_) => ProbeStatus::Refused,
                ProbeError::Timeout => ProbeStatus::TimedOut,
                ProbeError::Io(_) => ProbeStatus::Failed,
            };
            failed(status)
        }
    };
    result.ip = Some(ip);
    (result.with_geo(geo.as_ref()), update)
}
