//! Error taxonomy. Only [`ConfigError`] aborts a pipeline run; every other
//! kind is absorbed at the stage that produced it.

use std::net::IpAddr;

use thiserror::Error;

use crate::types::ProtocolKind;

/// A connection string matched a scheme but its body is structurally invalid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("malformed {protocol} uri: {reason}")]
    Malformed { protocol: ProtocolKind, reason: String },

    #[error("{0} uri is missing a host")]
    MissingHost(ProtocolKind),

    #[error("{protocol} uri has missing or invalid port {value:?}")]
    InvalidPort { protocol: ProtocolKind, value: String },

    #[error("{protocol} payload is not valid base64/utf-8: {reason}")]
    Encoding { protocol: ProtocolKind, reason: String },

    #[error("{protocol} payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge {
        protocol: ProtocolKind,
        size: usize,
        limit: usize,
    },
}

impl ParseError {
    pub fn malformed(protocol: ProtocolKind, reason: impl Into<String>) -> Self {
        ParseError::Malformed { protocol, reason: reason.into() }
    }

    /// Short stable code used for attrition counters.
    pub fn code(&self) -> &'static str {
        match self {
            ParseError::Malformed { .. } => "malformed",
            ParseError::MissingHost(_) => "missing_host",
            ParseError::InvalidPort { .. } => "invalid_port",
            ParseError::Encoding { .. } => "encoding",
            ParseError::PayloadTooLarge { .. } => "payload_too_large",
        }
    }
}

/// DNS or geolocation failure. Never leaves the lookup cache.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("dns lookup for {host} failed: {reason}")]
    Dns { host: String, reason: String },

    #[error("{host} has no routable address")]
    NoAddress { host: String },

    #[error("address {0} is in a blocked range")]
    Blocked(IpAddr),

    #[error("geolocation for {ip} failed: {reason}")]
    Geo { ip: IpAddr, reason: String },

    #[error("geolocation disabled")]
    Disabled,
}

/// Connection-level failure of a single probe.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("connection refused: {0}")]
    Refused(String),

    #[error("connect timed out")]
    Timeout,

    #[error("connect failed: {0}")]
    Io(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("reliability store unavailable: {0}")]
    Unavailable(String),

    #[error("reliability store backend error: {0}")]
    Backend(String),
}

/// Invalid caller-supplied configuration. Fails fast before any work starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("unknown protocol {0:?}")]
    UnknownProtocol(String),

    #[error("failed to load config {path}: {reason}")]
    File { path: String, reason: String },
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid { field, reason: reason.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_messages_name_protocol() {
        let e = ParseError::MissingHost(ProtocolKind::Trojan);
        assert_eq!(e.to_string(), "trojan uri is missing a host");
        let e = ParseError::PayloadTooLarge { protocol: ProtocolKind::VMess, size: 10, limit: 4 };
        assert!(e.to_string().contains("exceeds the 4 byte limit"));
        assert_eq!(e.code(), "payload_too_large");
    }

    #[test]
    fn config_error_helper() {
        let e = ConfigError::invalid("concurrency_limit", "must be > 0");
        assert_eq!(e.to_string(), "invalid concurrency_limit: must be > 0");
    }
}
