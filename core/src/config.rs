use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::ProtocolKind;

pub const DEFAULT_CONFIG_FILE: &str = "sift.yaml";
/// Slowest accepted per-target pace: one probe every ~17 minutes.
pub const MIN_RATE_LIMIT: f64 = 0.001;
pub const DEFAULT_GEO_ENDPOINT: &str = "http://ip-api.com/json/{ip}?fields=status,message,countryCode,isp,lat,lon";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    pub enabled: bool,
    /// URL template; `{ip}` is replaced with the address being looked up.
    pub endpoint: String,
    pub timeout_ms: u64,
}

impl Default for GeoConfig {
    fn default() -> Self {
        GeoConfig { enabled: true, endpoint: DEFAULT_GEO_ENDPOINT.to_string(), timeout_ms: 2_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub concurrency_limit: usize,
    pub probe_timeout_ms: u64,
    /// Probes per second per target address.
    pub rate_limit: f64,
    pub include_protocols: Vec<String>,
    pub exclude_protocols: Vec<String>,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub max_payload_bytes: usize,
    pub batch_deadline_ms: Option<u64>,
    pub flush_attempts: u32,
    pub flush_backoff_ms: u64,
    pub geo: GeoConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            concurrency_limit: 32,
            probe_timeout_ms: 3_000,
            rate_limit: 2.0,
            include_protocols: Vec::new(),
            exclude_protocols: Vec::new(),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            max_payload_bytes: 64 * 1024,
            batch_deadline_ms: None,
            flush_attempts: 3,
            flush_backoff_ms: 200,
            geo: GeoConfig::default(),
        }
    }
}

/// Validated dedup filters. Patterns are stored lower-cased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    pub include_protocols: BTreeSet<ProtocolKind>,
    pub exclude_protocols: BTreeSet<ProtocolKind>,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
}

impl Filters {
    pub fn protocol_allowed(&self, kind: ProtocolKind) -> bool {
        if self.exclude_protocols.contains(&kind) {
            return false;
        }
        self.include_protocols.is_empty() || self.include_protocols.contains(&kind)
    }

    pub fn excluded_by_pattern(&self, raw_lower: &str) -> bool {
        self.exclude_patterns.iter().any(|p| raw_lower.contains(p.as_str()))
    }

    pub fn included_by_pattern(&self, raw_lower: &str) -> bool {
        self.include_patterns.is_empty() || self.include_patterns.iter().any(|p| raw_lower.contains(p.as_str()))
    }
}

fn protocol_set(names: &[String]) -> Result<BTreeSet<ProtocolKind>, ConfigError> {
    names
        .iter()
        .map(|n| ProtocolKind::from_name(n).ok_or_else(|| ConfigError::UnknownProtocol(n.clone())))
        .collect()
}

fn pattern_list(field: &'static str, patterns: &[String]) -> Result<Vec<String>, ConfigError> {
    patterns
        .iter()
        .map(|p| {
            if p.trim().is_empty() {
                Err(ConfigError::invalid(field, "patterns must not be empty"))
            } else {
                Ok(p.to_lowercase())
            }
        })
        .collect()
}

impl PipelineConfig {
    /// Check every value before any work starts.
    pub fn validate(&self) -> Result<Filters, ConfigError> {
        if self.concurrency_limit == 0 {
            return Err(ConfigError::invalid("concurrency_limit", "must be a positive integer"));
        }
        if self.probe_timeout_ms == 0 {
            return Err(ConfigError::invalid("probe_timeout_ms", "must be positive"));
        }
        if !(self.rate_limit.is_finite() && self.rate_limit > 0.0) {
            return Err(ConfigError::invalid("rate_limit", format!("must be positive, got {}", self.rate_limit)));
        }
        if self.rate_limit < MIN_RATE_LIMIT {
            return Err(ConfigError::invalid(
                "rate_limit",
                format!("must be at least {MIN_RATE_LIMIT} probes/sec, got {}", self.rate_limit),
            ));
        }
        if self.max_payload_bytes == 0 {
            return Err(ConfigError::invalid("max_payload_bytes", "must be positive"));
        }
        if self.batch_deadline_ms == Some(0) {
            return Err(ConfigError::invalid("batch_deadline_ms", "must be positive when set"));
        }
        if self.flush_attempts == 0 {
            return Err(ConfigError::invalid("flush_attempts", "must be at least 1"));
        }
        if self.geo.enabled && !self.geo.endpoint.contains("{ip}") {
            return Err(ConfigError::invalid("geo.endpoint", "must contain an {ip} placeholder"));
        }
        let filters = Filters {
            include_protocols: protocol_set(&self.include_protocols)?,
            exclude_protocols: protocol_set(&self.exclude_protocols)?,
            include_patterns: pattern_list("include_patterns", &self.include_patterns)?,
            exclude_patterns: pattern_list("exclude_patterns", &self.exclude_patterns)?,
        };
        Ok(filters)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn batch_deadline(&self) -> Option<Duration> {
        self.batch_deadline_ms.map(Duration::from_millis)
    }

    pub fn flush_backoff(&self) -> Duration {
        Duration::from_millis(self.flush_backoff_ms)
    }

    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(s).map_err(|e| ConfigError::File { path: "<inline>".into(), reason: e.to_string() })
    }
}

/// Load `path`, or `./sift.yaml` when no path is given and the file exists.
pub fn load_config(path: Option<&Path>) -> Result<Option<PipelineConfig>, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new(DEFAULT_CONFIG_FILE);
            if p.exists() { p.to_path_buf() } else { return Ok(None); }
        }
    };
    let file_err = |reason: String| ConfigError::File { path: path.display().to_string(), reason };
    let s = fs::read_to_string(&path).map_err(|e| file_err(e.to_string()))?;
    let cfg = serde_yaml::from_str(&s).map_err(|e| file_err(e.to_string()))?;
    Ok(Some(cfg))
}
