//! Plain HTTP(S) and SOCKS proxies, including Telegram `socks` share links.

use sift_core::{ParseError, ParsedEndpoint, ProtocolKind};

use super::{endpoint_from_uri, userinfo, Defaults};
use crate::base64::decode_bounded_utf8;
use crate::uri::{
    parse_host_port, parse_query, parse_uri, split_fragment, split_scheme, ParamRules, COMMON_DROPPED, COMMON_FLAGS,
    COMMON_FOLDED, TLS_ALIASES,
};
use crate::{ParseOptions, ProtocolParser};

const RULES: ParamRules = ParamRules {
    aliases: &[TLS_ALIASES],
    folded: COMMON_FOLDED,
    flags: COMMON_FLAGS,
    dropped: COMMON_DROPPED,
};

const HTTP_DEFAULTS: Defaults = &[("insecure", "0")];

const SOCKS_DEFAULTS: Defaults = &[("version", "5")];

pub struct HttpParser;

impl ProtocolParser for HttpParser {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Http
    }

    fn schemes(&self) -> &'static [&'static str] {
        &["http", "https"]
    }

    fn parse(&self, raw: &str, _opts: &ParseOptions) -> Result<ParsedEndpoint, ParseError> {
        let raw = raw.trim();
        let parts = parse_uri(raw, ProtocolKind::Http)?;
        let mut ep = endpoint_from_uri(ProtocolKind::Http, raw, &parts, &RULES, HTTP_DEFAULTS);
        ep.credentials = userinfo(&parts);
        if split_scheme(raw).is_some_and(|(s, _)| s.eq_ignore_ascii_case("https")) {
            ep.set_param("tls", "1");
        }
        Ok(ep)
    }
}

pub struct SocksParser;

const TELEGRAM_PREFIXES: &[&str] = &["tg://socks?", "https://t.me/socks?", "http://t.me/socks?", "t.me/socks?"];

fn telegram_query(raw: &str) -> Option<&str> {
    let raw = raw.trim();
    TELEGRAM_PREFIXES.iter().find_map(|prefix| {
        let head = raw.get(..prefix.len())?;
        head.eq_ignore_ascii_case(prefix).then(|| &raw[prefix.len()..])
    })
}

fn version_of(scheme: &str) -> &'static str {
    match scheme.to_ascii_lowercase().as_str() {
        "socks4" => "4",
        "socks4a" => "4a",
        _ => "5",
    }
}

impl SocksParser {
    fn parse_telegram(&self, raw: &str, query: &str) -> Result<ParsedEndpoint, ParseError> {
        let kind = ProtocolKind::Socks;
        let (query, name) = split_fragment(query);
        let pairs = parse_query(query);
        let get = |key: &str| pairs.iter().find(|(k, v)| k == key && !v.is_empty()).map(|(_, v)| v.clone());

        let server = get("server").ok_or(ParseError::MissingHost(kind))?;
        let port = get("port").unwrap_or_default();
        let hostport = if server.contains(':') && !server.starts_with('[') {
            format!("[{server}]:{port}")
        } else {
            format!("{server}:{port}")
        };
        let (host, port) = parse_host_port(&hostport, kind)?;

        let mut ep = ParsedEndpoint::new(kind, host, port, raw);
        ep.implied_defaults = SOCKS_DEFAULTS;
        ep.name = name;
        ep.credentials = match (get("user"), get("pass")) {
            (Some(u), Some(p)) => Some(format!("{u}:{p}")),
            (Some(u), None) => Some(u),
            (None, Some(p)) => Some(format!(":{p}")),
            (None, None) => None,
        };
        Ok(ep)
    }
}

impl ProtocolParser for SocksParser {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Socks
    }

    fn schemes(&self) -> &'static [&'static str] {
        &["socks", "socks4", "socks4a", "socks5", "socks5h"]
    }

    fn can_parse(&self, raw: &str) -> bool {
        crate::uri::has_scheme(raw, self.schemes()) || telegram_query(raw).is_some()
    }

    fn parse(&self, raw: &str, opts: &ParseOptions) -> Result<ParsedEndpoint, ParseError> {
        let raw = raw.trim();
        if let Some(query) = telegram_query(raw) {
            return self.parse_telegram(raw, query);
        }
        let kind = ProtocolKind::Socks;
        let parts = parse_uri(raw, kind)?;
        let mut ep = endpoint_from_uri(kind, raw, &parts, &RULES, SOCKS_DEFAULTS);
        let scheme = split_scheme(raw).map(|(s, _)| s).unwrap_or("socks");
        if ep.param("version").is_none() {
            ep.set_param("version", version_of(scheme));
        }

        // Some share links carry base64("user:pass") as the userinfo.
        ep.credentials = match (&parts.username, &parts.password) {
            (Some(u), None) => match decode_bounded_utf8(u, opts.max_payload_bytes, kind) {
                Ok(decoded) if decoded.contains(':') && !decoded.chars().any(char::is_control) => Some(decoded),
                _ => Some(u.clone()),
            },
            _ => userinfo(&parts),
        };
        Ok(ep)
    }
}
