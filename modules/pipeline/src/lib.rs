//! One pipeline run: dedup, seed reliability, probe, flush, report.

mod ledger;
mod report;

use std::sync::Arc;

use normalize::{dedup, Candidate};
use parsers::ParserRegistry;
use probe::{
    flush_with_retry, Connector, GeoProvider, HttpGeoProvider, LookupCache, NoGeo, ProbeEngine, ProbeLimits,
    ProbeTarget, Resolver, SystemResolver, TcpConnector,
};
use sift_core::{
    unix_now, ConfigError, PipelineConfig, ProbeResult, ProbeStatus, RawConnection, ReliabilityStore,
};
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

pub use ledger::RunLedger;
pub use report::{ReportEntry, RunReport};

pub struct Pipeline {
    config: PipelineConfig,
    registry: ParserRegistry,
    store: Arc<dyn ReliabilityStore>,
    resolver: Arc<dyn Resolver>,
    geo: Option<Arc<dyn GeoProvider>>,
    connector: Arc<dyn Connector>,
    ledger: Option<Arc<dyn RunLedger>>,
}

impl Pipeline {
    /// System DNS, plain TCP connects, and geolocation as configured.
    pub fn new(config: PipelineConfig, store: Arc<dyn ReliabilityStore>) -> Self {
        let registry = ParserRegistry::with_builtin_parsers(config.max_payload_bytes);
        Pipeline {
            config,
            registry,
            store,
            resolver: Arc::new(SystemResolver),
            geo: None,
            connector: Arc::new(TcpConnector),
            ledger: None,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Overrides the provider built from `config.geo`.
    pub fn with_geo(mut self, geo: Arc<dyn GeoProvider>) -> Self {
        self.geo = Some(geo);
        self
    }

    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn RunLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ParserRegistry {
        &self.registry
    }

    fn geo_provider(&self, warnings: &mut Vec<String>) -> Arc<dyn GeoProvider> {
        if let Some(geo) = &self.geo {
            return geo.clone();
        }
        if !self.config.geo.enabled {
            return Arc::new(NoGeo);
        }
        match HttpGeoProvider::from_config(&self.config.geo) {
            Ok(p) => Arc::new(p),
            Err(e) => {
                warnings.push(format!("geolocation disabled: {e}"));
                Arc::new(NoGeo)
            }
        }
    }

    /// Only an invalid configuration fails the run; everything else is
    /// counted in the report or surfaced as a warning.
    pub async fn run(&self, entries: Vec<RawConnection>) -> Result<RunReport, ConfigError> {
        let filters = self.config.validate()?;
        let run_id = Uuid::now_v7();
        let started_at = unix_now();
        let mut warnings = Vec::new();

        if let Some(ledger) = &self.ledger {
            if let Err(e) = ledger.begin(run_id, started_at, &self.config) {
                warn!(error = %e, "could not record run start");
                warnings.push(format!("run ledger: {e}"));
            }
        }

        let outcome = dedup(&entries, &filters, &self.registry);
        let kept: Vec<Candidate> = outcome.kept;

        // Seed each endpoint with its historical score before probing.
        let mut seed_failures = 0usize;
        let mut first_seed_error = None;
        let reliability: Vec<Option<f64>> = kept
            .iter()
            .map(|c| match self.store.get(&c.fingerprint) {
                Ok(rec) => rec.score(),
                Err(e) => {
                    seed_failures += 1;
                    first_seed_error.get_or_insert(e);
                    None
                }
            })
            .collect();
        if let Some(e) = first_seed_error {
            warn!(failures = seed_failures, error = %e, "reliability seed failed");
            warnings.push(format!("reliability unavailable for {seed_failures} endpoints: {e}"));
        }

        let mut results: Vec<Option<ProbeResult>> = vec![None; kept.len()];
        let mut targets = Vec::with_capacity(kept.len());
        for (index, candidate) in kept.iter().enumerate() {
            match &candidate.parsed {
                Ok(ep) => targets.push(ProbeTarget {
                    index,
                    fingerprint: candidate.fingerprint,
                    host: ep.host.clone(),
                    port: ep.port,
                    reliability: reliability[index],
                }),
                Err(_) => {
                    results[index] =
                        Some(ProbeResult::unreachable(candidate.fingerprint, ProbeStatus::Failed, reliability[index]));
                }
            }
        }
        let probed = targets.len();

        let cache = Arc::new(LookupCache::new(self.resolver.clone(), self.geo_provider(&mut warnings)));
        let engine = ProbeEngine::new(cache.clone(), self.connector.clone(), ProbeLimits::from_config(&self.config));
        let deadline = self.config.batch_deadline().map(|d| Instant::now() + d);
        let batch = engine.probe_batch(targets, deadline).await;
        if batch.abandoned > 0 {
            warnings.push(format!("batch deadline reached; {} probes abandoned", batch.abandoned));
        }

        let flush =
            flush_with_retry(self.store.clone(), &batch.updates, self.config.flush_attempts, self.config.flush_backoff())
                .await;
        match (flush.written, flush.errors.last()) {
            (true, Some(_)) => warnings.push(format!("reliability flush needed {} attempts", flush.attempts)),
            (false, Some(e)) => {
                warnings.push(format!("reliability history not persisted after {} attempts: {e}", flush.attempts))
            }
            _ => {}
        }

        for (index, result) in batch.results {
            if let Some(slot) = results.get_mut(index) {
                *slot = Some(result);
            }
        }
        let entries: Vec<ReportEntry> = kept
            .into_iter()
            .zip(results)
            .map(|(candidate, result)| {
                let result = result.unwrap_or_else(|| {
                    ProbeResult::unreachable(candidate.fingerprint, ProbeStatus::Failed, None)
                });
                ReportEntry::new(candidate, result)
            })
            .collect();
        let reachable = entries.iter().filter(|e| e.result.reachable).count();

        let cache_stats = cache.stats();
        cache.clear();

        let mut report = RunReport {
            run_id,
            started_at,
            finished_at: unix_now(),
            entries,
            dedup: outcome.stats,
            probed,
            reachable,
            abandoned: batch.abandoned,
            flush_attempts: flush.attempts,
            flushed: flush.written,
            cache: cache_stats,
            warnings,
        };
        if let Some(ledger) = &self.ledger {
            if let Err(e) = ledger.finish(&report) {
                warn!(error = %e, "could not record run finish");
                report.warnings.push(format!("run ledger: {e}"));
            }
        }
        info!(
            run_id = %report.run_id,
            kept = report.dedup.kept,
            probed,
            reachable,
            warnings = report.warnings.len(),
            "run finished"
        );
        Ok(report)
    }
}
