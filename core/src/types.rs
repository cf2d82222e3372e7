use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Closed set of supported proxy encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProtocolKind {
    VMess,
    VLess,
    Reality,
    Trojan,
    Shadowsocks,
    ShadowsocksR,
    Hysteria,
    Hysteria2,
    Tuic,
    WireGuard,
    Http,
    Socks,
}

impl ProtocolKind {
    pub const ALL: [ProtocolKind; 12] = [
        ProtocolKind::VMess,
        ProtocolKind::VLess,
        ProtocolKind::Reality,
        ProtocolKind::Trojan,
        ProtocolKind::Shadowsocks,
        ProtocolKind::ShadowsocksR,
        ProtocolKind::Hysteria,
        ProtocolKind::Hysteria2,
        ProtocolKind::Tuic,
        ProtocolKind::WireGuard,
        ProtocolKind::Http,
        ProtocolKind::Socks,
    ];

    /// Canonical lower-case name, also used as the scheme in canonical forms.
    pub fn name(self) -> &'static str {
        match self {
            ProtocolKind::VMess => "vmess",
            ProtocolKind::VLess => "vless",
            ProtocolKind::Reality => "reality",
            ProtocolKind::Trojan => "trojan",
            ProtocolKind::Shadowsocks => "ss",
            ProtocolKind::ShadowsocksR => "ssr",
            ProtocolKind::Hysteria => "hysteria",
            ProtocolKind::Hysteria2 => "hysteria2",
            ProtocolKind::Tuic => "tuic",
            ProtocolKind::WireGuard => "wireguard",
            ProtocolKind::Http => "http",
            ProtocolKind::Socks => "socks",
        }
    }

    /// Resolve a protocol name or one of its common spellings, case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.trim().to_ascii_lowercase();
        let kind = match lower.as_str() {
            "vmess" => ProtocolKind::VMess,
            "vless" => ProtocolKind::VLess,
            "reality" | "vless-reality" => ProtocolKind::Reality,
            "trojan" => ProtocolKind::Trojan,
            "ss" | "shadowsocks" => ProtocolKind::Shadowsocks,
            "ssr" | "shadowsocksr" => ProtocolKind::ShadowsocksR,
            "hysteria" | "hy" | "hysteria1" => ProtocolKind::Hysteria,
            "hysteria2" | "hy2" => ProtocolKind::Hysteria2,
            "tuic" => ProtocolKind::Tuic,
            "wireguard" | "wg" => ProtocolKind::WireGuard,
            "http" | "https" => ProtocolKind::Http,
            "socks" | "socks4" | "socks5" => ProtocolKind::Socks,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for ProtocolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProtocolKind::from_name(s).ok_or_else(|| format!("unknown protocol: {s}"))
    }
}

impl Serialize for ProtocolKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for ProtocolKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A raw connection string together with the source it was harvested from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RawConnection {
    pub raw: String,
    pub source: String,
}

impl RawConnection {
    pub fn new(raw: impl Into<String>, source: impl Into<String>) -> Self {
        RawConnection { raw: raw.into(), source: source.into() }
    }
}

impl From<&str> for RawConnection {
    fn from(s: &str) -> Self {
        RawConnection::new(s, "")
    }
}

/// Attribute set decoded from one connection string.
///
/// `transport_params` only holds parameters that were present (and non-empty)
/// in the string, under their canonical names. `implied_defaults` is the
/// parser's table of values that mean the same thing as absence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedEndpoint {
    pub protocol: ProtocolKind,
    pub host: String,
    pub port: u16,
    pub credentials: Option<String>,
    pub transport_params: BTreeMap<String, String>,
    pub name: Option<String>,
    pub raw: String,
    #[serde(skip)]
    pub implied_defaults: &'static [(&'static str, &'static str)],
}

impl ParsedEndpoint {
    pub fn new(protocol: ProtocolKind, host: impl Into<String>, port: u16, raw: impl Into<String>) -> Self {
        ParsedEndpoint {
            protocol,
            host: host.into(),
            port,
            credentials: None,
            transport_params: BTreeMap::new(),
            name: None,
            raw: raw.into(),
            implied_defaults: &[],
        }
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.transport_params.get(key).map(String::as_str)
    }

    /// Insert a parameter, ignoring empty values.
    pub fn set_param(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if !value.is_empty() {
            self.transport_params.insert(key.to_string(), value);
        }
    }

    pub fn is_implied_default(&self, key: &str, value: &str) -> bool {
        self.implied_defaults.iter().any(|(k, v)| *k == key && *v == value)
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// 128-bit digest identifying a logical endpoint.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint([u8; 16]);

impl Fingerprint {
    pub const HEX_LEN: usize = 32;

    /// BLAKE3 of `bytes`, truncated to 128 bits.
    pub fn digest(bytes: &[u8]) -> Self {
        let hash = blake3::hash(bytes);
        let mut out = [0u8; 16];
        out.copy_from_slice(&hash.as_bytes()[..16]);
        Fingerprint(out)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl FromStr for Fingerprint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != Self::HEX_LEN {
            return Err(format!("fingerprint must be {} hex chars, got {}", Self::HEX_LEN, s.len()));
        }
        let mut out = [0u8; 16];
        hex::decode_to_slice(s, &mut out).map_err(|e| e.to_string())?;
        Ok(Fingerprint(out))
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.to_hex()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoInfo {
    pub country: Option<String>,
    pub isp: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Reachable,
    Unresolved,
    Refused,
    TimedOut,
    Failed,
    Abandoned,
}

impl ProbeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProbeStatus::Reachable => "reachable",
            ProbeStatus::Unresolved => "unresolved",
            ProbeStatus::Refused => "refused",
            ProbeStatus::TimedOut => "timed_out",
            ProbeStatus::Failed => "failed",
            ProbeStatus::Abandoned => "abandoned",
        }
    }
}

/// Outcome of probing one endpoint in one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeResult {
    pub fingerprint: Fingerprint,
    pub reachable: bool,
    pub status: ProbeStatus,
    pub latency_ms: Option<f64>,
    pub ip: Option<IpAddr>,
    pub country: Option<String>,
    pub isp: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Historical success ratio; `None` when the endpoint was never tested.
    pub reliability: Option<f64>,
}

impl ProbeResult {
    pub fn unreachable(fingerprint: Fingerprint, status: ProbeStatus, reliability: Option<f64>) -> Self {
        ProbeResult {
            fingerprint,
            reachable: false,
            status,
            latency_ms: None,
            ip: None,
            country: None,
            isp: None,
            latitude: None,
            longitude: None,
            reliability,
        }
    }

    pub fn with_geo(mut self, geo: Option<&GeoInfo>) -> Self {
        if let Some(g) = geo {
            self.country = g.country.clone();
            self.isp = g.isp.clone();
            self.latitude = g.latitude;
            self.longitude = g.longitude;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_serializes_as_its_name() {
        let json = serde_json::to_string(&ProtocolKind::Shadowsocks).unwrap();
        assert_eq!(json, "\"ss\"");
        assert_eq!(serde_json::to_string(&ProtocolKind::ShadowsocksR).unwrap(), "\"ssr\"");
        let back: ProtocolKind = serde_json::from_str("\"shadowsocks\"").unwrap();
        assert_eq!(back, ProtocolKind::Shadowsocks);
        assert!(serde_json::from_str::<ProtocolKind>("\"gopher\"").is_err());
    }

    #[test]
    fn protocol_names_round_trip() {
        for kind in ProtocolKind::ALL {
            assert_eq!(ProtocolKind::from_name(kind.name()), Some(kind));
        }
    }

    #[test]
    fn protocol_aliases_are_case_insensitive() {
        assert_eq!(ProtocolKind::from_name("Shadowsocks"), Some(ProtocolKind::Shadowsocks));
        assert_eq!(ProtocolKind::from_name("HY2"), Some(ProtocolKind::Hysteria2));
        assert_eq!(ProtocolKind::from_name("socks5"), Some(ProtocolKind::Socks));
        assert_eq!(ProtocolKind::from_name("openvpn"), None);
    }

    #[test]
    fn fingerprint_hex_is_fixed_width() {
        let fp = Fingerprint::digest(b"trojan://pw@host:443");
        let hex = fp.to_hex();
        assert_eq!(hex.len(), Fingerprint::HEX_LEN);
        assert_eq!(hex.parse::<Fingerprint>().unwrap(), fp);
    }

    #[test]
    fn fingerprint_rejects_bad_hex() {
        assert!("abc".parse::<Fingerprint>().is_err());
        assert!("zz".repeat(16).parse::<Fingerprint>().is_err());
    }

    #[test]
    fn set_param_skips_empty_values() {
        let mut ep = ParsedEndpoint::new(ProtocolKind::Trojan, "h", 1, "trojan://x@h:1");
        ep.set_param("sni", "");
        ep.set_param("alpn", "h2");
        assert_eq!(ep.param("sni"), None);
        assert_eq!(ep.param("alpn"), Some("h2"));
    }

    #[test]
    fn authority_brackets_ipv6() {
        let ep = ParsedEndpoint::new(ProtocolKind::Socks, "2001:db8::1", 1080, "");
        assert_eq!(ep.authority(), "[2001:db8::1]:1080");
    }
}
