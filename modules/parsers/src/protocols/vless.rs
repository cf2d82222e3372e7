//! `vless://` and its Reality flavour (`security=reality` or `reality://`).

use sift_core::{ParseError, ParsedEndpoint, ProtocolKind};

use super::{endpoint_from_uri, Defaults};
use crate::uri::{
    has_scheme, parse_query, parse_uri, split_fragment, strip_scheme, ParamRules, COMMON_DROPPED, COMMON_FLAGS,
    COMMON_FOLDED, TLS_ALIASES, TRANSPORT_ALIASES,
};
use crate::{ParseOptions, ProtocolParser};

const VLESS_DEFAULTS: Defaults = &[
    ("encryption", "none"),
    ("network", "tcp"),
    ("security", "none"),
    ("header_type", "none"),
    ("insecure", "0"),
];

const REALITY_DEFAULTS: Defaults = &[
    ("encryption", "none"),
    ("network", "tcp"),
    ("security", "reality"),
    ("header_type", "none"),
    ("insecure", "0"),
];

const RULES: ParamRules = ParamRules {
    aliases: &[TLS_ALIASES, TRANSPORT_ALIASES],
    folded: COMMON_FOLDED,
    flags: COMMON_FLAGS,
    dropped: COMMON_DROPPED,
};

fn parse_vless(kind: ProtocolKind, raw: &str, defaults: Defaults) -> Result<ParsedEndpoint, ParseError> {
    let raw = raw.trim();
    let parts = parse_uri(raw, kind)?;
    let mut ep = endpoint_from_uri(kind, raw, &parts, &RULES, defaults);
    ep.credentials = parts.username.clone();
    Ok(ep)
}

/// `vless://` whose query selects `security=reality`.
fn is_reality_query(raw: &str) -> bool {
    let Some(body) = strip_scheme(raw.trim(), &["vless"]) else {
        return false;
    };
    let (body, _) = split_fragment(body);
    let Some((_, query)) = body.split_once('?') else {
        return false;
    };
    parse_query(query)
        .iter()
        .any(|(k, v)| k.eq_ignore_ascii_case("security") && v.eq_ignore_ascii_case("reality"))
}

pub struct VLessParser;

impl ProtocolParser for VLessParser {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::VLess
    }

    fn schemes(&self) -> &'static [&'static str] {
        &["vless"]
    }

    fn parse(&self, raw: &str, _opts: &ParseOptions) -> Result<ParsedEndpoint, ParseError> {
        parse_vless(ProtocolKind::VLess, raw, VLESS_DEFAULTS)
    }
}

pub struct RealityParser;

impl ProtocolParser for RealityParser {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Reality
    }

    fn schemes(&self) -> &'static [&'static str] {
        &["reality"]
    }

    fn can_parse(&self, raw: &str) -> bool {
        has_scheme(raw, self.schemes()) || is_reality_query(raw)
    }

    fn parse(&self, raw: &str, _opts: &ParseOptions) -> Result<ParsedEndpoint, ParseError> {
        parse_vless(ProtocolKind::Reality, raw, REALITY_DEFAULTS)
    }
}
