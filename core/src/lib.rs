//! Core types shared by the sift parsers, normalizer, prober and store.

pub mod config;
pub mod error;
pub mod net;
pub mod ratelimiter;
pub mod reliability;
pub mod types;

pub use config::{Filters, GeoConfig, PipelineConfig};
pub use error::{ConfigError, LookupError, ParseError, ProbeError, StoreError};
pub use reliability::{score, ReliabilityRecord, ReliabilityStore, ReliabilityUpdate};
pub use types::{
    Fingerprint, GeoInfo, ParsedEndpoint, ProbeResult, ProbeStatus, ProtocolKind, RawConnection,
};

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Current wall clock as unix seconds.
pub fn unix_now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}
