//! `wireguard://privatekey@host:port?publickey=..&address=..&mtu=..`
//!
//! Keys are raw base64 and links in the wild often leave `/`, `+` and `=`
//! unescaped, so the authority is split by hand instead of through a URL parser.

use sift_core::{ParseError, ParsedEndpoint, ProtocolKind};

use super::Defaults;
use crate::uri::{parse_host_port, parse_query, percent_decode, split_fragment, strip_scheme, ParamRules, COMMON_DROPPED};
use crate::{ParseOptions, ProtocolParser};

const KIND: ProtocolKind = ProtocolKind::WireGuard;

const DEFAULTS: Defaults = &[("mtu", "1420")];

const WG_ALIASES: &[(&str, &str)] = &[
    ("publickey", "public_key"),
    ("publicKey", "public_key"),
    ("public-key", "public_key"),
    ("peer_public_key", "public_key"),
    ("peer-public-key", "public_key"),
    ("presharedkey", "pre_shared_key"),
    ("preSharedKey", "pre_shared_key"),
    ("pre-shared-key", "pre_shared_key"),
    ("psk", "pre_shared_key"),
    ("ip", "address"),
    ("local_address", "address"),
    ("local-address", "address"),
    ("privatekey", "private_key"),
    ("privateKey", "private_key"),
    ("secretkey", "private_key"),
    ("secretKey", "private_key"),
];

const RULES: ParamRules = ParamRules {
    aliases: &[WG_ALIASES],
    folded: &[],
    flags: &["udp"],
    dropped: COMMON_DROPPED,
};

pub struct WireGuardParser;

impl ProtocolParser for WireGuardParser {
    fn kind(&self) -> ProtocolKind {
        KIND
    }

    fn schemes(&self) -> &'static [&'static str] {
        &["wireguard", "wg"]
    }

    fn parse(&self, raw: &str, _opts: &ParseOptions) -> Result<ParsedEndpoint, ParseError> {
        let raw = raw.trim();
        let body = strip_scheme(raw, self.schemes()).ok_or_else(|| ParseError::malformed(KIND, "missing wireguard:// prefix"))?;
        let (body, name) = split_fragment(body);
        let (main, query) = body.split_once('?').unwrap_or((body, ""));
        let main = main.trim_end_matches('/');
        let (key, hostport) = match main.rsplit_once('@') {
            Some((k, hp)) => (Some(percent_decode(k)), hp),
            None => (None, main),
        };
        let (host, port) = parse_host_port(hostport, KIND)?;

        let mut ep = ParsedEndpoint::new(KIND, host, port, raw);
        ep.implied_defaults = DEFAULTS;
        ep.name = name;
        RULES.apply(&mut ep, &parse_query(query));
        // A key given in the query only counts when the userinfo had none.
        let query_key = ep.transport_params.remove("private_key");
        ep.credentials = key.filter(|k| !k.is_empty()).or(query_key);
        if let Some(addr) = ep.transport_params.get_mut("address") {
            let mut parts: Vec<&str> = addr.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
            parts.sort_unstable();
            *addr = parts.join(",");
        }
        Ok(ep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Result<ParsedEndpoint, ParseError> {
        WireGuardParser.parse(raw, &ParseOptions::default())
    }

    #[test]
    fn parses_unescaped_key() {
        let raw = "wireguard://yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk=@wg.example.com:51820?publickey=xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg=&address=10.0.0.2/32&mtu=1280#wg";
        let ep = parse(raw).unwrap();
        assert_eq!(ep.credentials.as_deref(), Some("yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk="));
        assert_eq!(ep.host, "wg.example.com");
        assert_eq!(ep.port, 51820);
        assert_eq!(ep.param("public_key"), Some("xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg="));
        assert_eq!(ep.param("address"), Some("10.0.0.2/32"));
        assert_eq!(ep.param("mtu"), Some("1280"));
    }

    #[test]
    fn key_with_slash_in_userinfo() {
        let ep = parse("wg://ab/cd=@h:51820").unwrap();
        assert_eq!(ep.credentials.as_deref(), Some("ab/cd="));
    }

    #[test]
    fn address_aliases_and_order() {
        let a = parse("wg://k@h:1?ip=fd00::2/128,10.0.0.2/32").unwrap();
        let b = parse("wg://k@h:1?local_address=10.0.0.2/32, fd00::2/128").unwrap();
        assert_eq!(a.param("address"), b.param("address"));
    }

    #[test]
    fn key_from_query() {
        let ep = parse("wireguard://h:51820?privatekey=abc%3D&peer_public_key=pk").unwrap();
        assert_eq!(ep.credentials.as_deref(), Some("abc="));
        assert_eq!(ep.param("private_key"), None);
        assert_eq!(ep.param("public_key"), Some("pk"));
    }

    #[test]
    fn missing_port() {
        assert!(matches!(parse("wireguard://k@h"), Err(ParseError::InvalidPort { .. })));
    }
}
