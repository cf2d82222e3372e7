//! Shared URI plumbing: scheme detection, authority parsing, query/fragment
//! decoding and parameter alias canonicalization.

use percent_encoding::percent_decode_str;
use sift_core::net::bare_host;
use sift_core::{ParseError, ParsedEndpoint, ProtocolKind};
use url::Url;

/// Split `scheme://rest`, returning the scheme as written.
pub fn split_scheme(raw: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = raw.split_once("://")?;
    if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
        return None;
    }
    Some((scheme, rest))
}

/// Case-insensitive check that `raw` starts with one of `schemes` followed by `://`.
pub fn has_scheme(raw: &str, schemes: &[&str]) -> bool {
    match split_scheme(raw.trim_start()) {
        Some((s, _)) => schemes.iter().any(|want| s.eq_ignore_ascii_case(want)),
        None => false,
    }
}

/// Body after `scheme://`, for the first matching scheme.
pub fn strip_scheme<'a>(raw: &'a str, schemes: &[&str]) -> Option<&'a str> {
    let (s, rest) = split_scheme(raw)?;
    schemes.iter().any(|want| s.eq_ignore_ascii_case(want)).then_some(rest)
}

pub fn percent_decode(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}

/// Split off `#fragment`, percent-decoding it into a display name.
pub fn split_fragment(s: &str) -> (&str, Option<String>) {
    match s.split_once('#') {
        Some((body, frag)) => {
            let name = percent_decode(frag).trim().to_string();
            (body, if name.is_empty() { None } else { Some(name) })
        }
        None => (s, None),
    }
}

/// Decode `a=1&b=2`. `+` is kept literally so base64 keys survive.
pub fn parse_query(q: &str) -> Vec<(String, String)> {
    q.split('&')
        .filter(|p| !p.is_empty())
        .filter_map(|p| {
            let (k, v) = p.split_once('=').unwrap_or((p, ""));
            let k = percent_decode(k).trim().to_string();
            if k.is_empty() {
                None
            } else {
                Some((k, percent_decode(v).trim().to_string()))
            }
        })
        .collect()
}

/// Parse `host:port`, handling bracketed IPv6.
pub fn parse_host_port(hostport: &str, protocol: ProtocolKind) -> Result<(String, u16), ParseError> {
    let (host, port_str) = if let Some(rest) = hostport.strip_prefix('[') {
        let end = rest
            .find(']')
            .ok_or_else(|| ParseError::malformed(protocol, "IPv6 address missing closing bracket"))?;
        let port = rest[end + 1..].strip_prefix(':').unwrap_or("");
        (&rest[..end], port)
    } else {
        match hostport.rfind(':') {
            Some(pos) => (&hostport[..pos], &hostport[pos + 1..]),
            None => (hostport, ""),
        }
    };
    if host.is_empty() {
        return Err(ParseError::MissingHost(protocol));
    }
    let port = parse_port(port_str, protocol)?;
    Ok((host.to_string(), port))
}

pub fn parse_port(s: &str, protocol: ProtocolKind) -> Result<u16, ParseError> {
    match s.trim().parse::<u16>() {
        Ok(p) if p != 0 => Ok(p),
        _ => Err(ParseError::InvalidPort { protocol, value: s.to_string() }),
    }
}

/// Authority-style URI: `scheme://[user[:pass]@]host:port[/path][?query][#fragment]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriParts {
    pub username: Option<String>,
    pub password: Option<String>,
    pub host: String,
    pub port: u16,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub name: Option<String>,
}

fn raw_authority(raw: &str) -> &str {
    let rest = split_scheme(raw).map(|(_, r)| r).unwrap_or(raw);
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let auth = &rest[..end];
    auth.rsplit_once('@').map(|(_, h)| h).unwrap_or(auth)
}

fn authority_has_port(raw: &str) -> bool {
    let auth = raw_authority(raw);
    let tail = match auth.rfind(']') {
        Some(i) => &auth[i + 1..],
        None => auth,
    };
    tail.rsplit_once(':').is_some_and(|(_, p)| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
}

pub fn parse_uri(raw: &str, protocol: ProtocolKind) -> Result<UriParts, ParseError> {
    let raw = raw.trim();
    let (without_fragment, name) = split_fragment(raw);
    let url = Url::parse(without_fragment).map_err(|e| match e {
        url::ParseError::EmptyHost => ParseError::MissingHost(protocol),
        url::ParseError::InvalidPort => ParseError::InvalidPort { protocol, value: raw_authority(raw).to_string() },
        other => ParseError::malformed(protocol, other.to_string()),
    })?;

    let host = url
        .host_str()
        .map(|h| bare_host(h).to_string())
        .filter(|h| !h.is_empty())
        .ok_or(ParseError::MissingHost(protocol))?;

    // Special schemes (http/https) drop an explicit default port; only accept
    // the known default when the string actually spelled a port out.
    let port = match url.port() {
        Some(p) => p,
        None if authority_has_port(without_fragment) => url
            .port_or_known_default()
            .ok_or_else(|| ParseError::InvalidPort { protocol, value: String::new() })?,
        None => return Err(ParseError::InvalidPort { protocol, value: String::new() }),
    };
    if port == 0 {
        return Err(ParseError::InvalidPort { protocol, value: "0".into() });
    }

    let username = Some(percent_decode(url.username())).filter(|u| !u.is_empty());
    let password = url.password().map(percent_decode).filter(|p| !p.is_empty());
    let query = url.query().map(parse_query).unwrap_or_default();
    let path = percent_decode(url.path());

    Ok(UriParts { username, password, host, port, path, query, name })
}

/// Per-protocol parameter handling applied at parse time so the normalizer
/// never needs protocol knowledge.
pub struct ParamRules {
    /// `(alias, canonical)` tables, searched in order.
    pub aliases: &'static [&'static [(&'static str, &'static str)]],
    /// Keys whose values are case-insensitive and get lower-cased.
    pub folded: &'static [&'static str],
    /// Boolean-ish keys normalized to `1`/`0`.
    pub flags: &'static [&'static str],
    /// Keys that carry no endpoint identity (display metadata).
    pub dropped: &'static [&'static str],
}

pub const TLS_ALIASES: &[(&str, &str)] = &[
    ("peer", "sni"),
    ("serverName", "sni"),
    ("servername", "sni"),
    ("server_name", "sni"),
    ("allowInsecure", "insecure"),
    ("allow_insecure", "insecure"),
    ("allowinsecure", "insecure"),
    ("skip-cert-verify", "insecure"),
    ("skip_cert_verify", "insecure"),
    ("fingerprint", "fp"),
    ("client-fingerprint", "fp"),
];

pub const TRANSPORT_ALIASES: &[(&str, &str)] = &[
    ("type", "network"),
    ("net", "network"),
    ("serviceName", "service_name"),
    ("servicename", "service_name"),
    ("headerType", "header_type"),
    ("headertype", "header_type"),
    ("pbk", "public_key"),
    ("publicKey", "public_key"),
    ("sid", "short_id"),
    ("shortId", "short_id"),
    ("spx", "spider_x"),
    ("spiderX", "spider_x"),
    ("packetEncoding", "packet_encoding"),
];

pub const COMMON_FOLDED: &[&str] = &[
    "network",
    "security",
    "sni",
    "host",
    "fp",
    "alpn",
    "header_type",
    "encryption",
    "flow",
    "mode",
    "cipher",
    "method",
    "protocol",
    "obfs",
    "congestion_control",
    "udp_relay_mode",
];

pub const COMMON_FLAGS: &[&str] = &["insecure", "udp", "tfo", "fast_open", "zero_rtt_handshake", "udp_over_stream"];

pub const COMMON_DROPPED: &[&str] = &["remarks", "remark", "group", "ps"];

impl ParamRules {
    pub fn canonical_key<'a>(&self, key: &'a str) -> (&'a str, bool) {
        for table in self.aliases {
            if let Some((_, canonical)) = table.iter().find(|(alias, _)| *alias == key) {
                return (canonical, true);
            }
        }
        (key, false)
    }

    fn normalize_value(&self, key: &str, value: &str) -> String {
        if self.flags.contains(&key) {
            return match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => "1".into(),
                "0" | "false" | "no" | "off" => "0".into(),
                other => other.to_string(),
            };
        }
        if self.folded.contains(&key) {
            value.to_lowercase()
        } else {
            value.to_string()
        }
    }

    /// Insert `pairs` into `ep` under canonical names. A value given under the
    /// canonical spelling wins over one given under an alias.
    pub fn apply(&self, ep: &mut ParsedEndpoint, pairs: &[(String, String)]) {
        for aliased_pass in [true, false] {
            for (k, v) in pairs {
                let (key, was_alias) = self.canonical_key(k);
                if was_alias != aliased_pass || self.dropped.contains(&key) {
                    continue;
                }
                let value = self.normalize_value(key, v);
                ep.set_param(key, value);
            }
        }
    }
}
