//! `vmess://` in both the base64 JSON share format and the URI form.

use serde_json::{Map, Value};
use sift_core::{ParseError, ParsedEndpoint, ProtocolKind};
use tracing::trace;

use super::{endpoint_from_uri, Defaults};
use crate::base64::decode_bounded_utf8;
use crate::uri::{
    parse_port, parse_uri, split_fragment, strip_scheme, ParamRules, COMMON_DROPPED, COMMON_FLAGS, COMMON_FOLDED,
    TLS_ALIASES, TRANSPORT_ALIASES,
};
use crate::{ParseOptions, ProtocolParser};

const KIND: ProtocolKind = ProtocolKind::VMess;

const DEFAULTS: Defaults = &[
    ("alter_id", "0"),
    ("cipher", "auto"),
    ("network", "tcp"),
    ("header_type", "none"),
    ("security", "none"),
    ("insecure", "0"),
];

/// JSON keys. `type` is the header type here, `net` the transport and `tls`
/// the security layer.
const JSON_ALIASES: &[(&str, &str)] = &[
    ("aid", "alter_id"),
    ("alterId", "alter_id"),
    ("scy", "cipher"),
    ("security", "cipher"),
    ("tls", "security"),
    ("net", "network"),
    ("type", "header_type"),
    ("serviceName", "service_name"),
];

const JSON_RULES: ParamRules = ParamRules {
    aliases: &[JSON_ALIASES, TLS_ALIASES],
    folded: COMMON_FOLDED,
    flags: COMMON_FLAGS,
    dropped: &["v", "ps", "add", "port", "id", "remarks", "remark", "group"],
};

const URI_ALIASES: &[(&str, &str)] = &[("encryption", "cipher"), ("scy", "cipher"), ("aid", "alter_id"), ("alterId", "alter_id")];

const URI_RULES: ParamRules = ParamRules {
    aliases: &[URI_ALIASES, TLS_ALIASES, TRANSPORT_ALIASES],
    folded: COMMON_FOLDED,
    flags: COMMON_FLAGS,
    dropped: COMMON_DROPPED,
};

pub struct VMessParser;

impl ProtocolParser for VMessParser {
    fn kind(&self) -> ProtocolKind {
        KIND
    }

    fn schemes(&self) -> &'static [&'static str] {
        &["vmess"]
    }

    fn parse(&self, raw: &str, opts: &ParseOptions) -> Result<ParsedEndpoint, ParseError> {
        let raw = raw.trim();
        let body = strip_scheme(raw, self.schemes()).ok_or_else(|| ParseError::malformed(KIND, "missing vmess:// prefix"))?;
        let (payload, fragment) = split_fragment(body);

        // '@' never appears in base64, so this is the URI form.
        if payload.contains('@') {
            let parts = parse_uri(raw, KIND)?;
            let mut ep = endpoint_from_uri(KIND, raw, &parts, &URI_RULES, DEFAULTS);
            ep.credentials = parts.username.clone();
            return Ok(ep);
        }

        let json = decode_bounded_utf8(payload, opts.max_payload_bytes, KIND)?;
        trace!(bytes = json.len(), "decoded vmess json");
        let object: Map<String, Value> =
            serde_json::from_str(json.trim()).map_err(|e| ParseError::malformed(KIND, format!("bad json: {e}")))?;

        let host = field(&object, "add").ok_or(ParseError::MissingHost(KIND))?;
        let port_str = field(&object, "port").unwrap_or_default();
        let port = parse_port(&port_str, KIND)?;

        let mut ep = ParsedEndpoint::new(KIND, host, port, raw);
        ep.implied_defaults = DEFAULTS;
        ep.credentials = field(&object, "id");
        ep.name = field(&object, "ps").or(fragment);

        let pairs: Vec<(String, String)> =
            object.keys().filter_map(|k| field(&object, k).map(|v| (k.clone(), v))).collect();
        JSON_RULES.apply(&mut ep, &pairs);
        Ok(ep)
    }
}

/// JSON value as a trimmed string; numbers and bools are stringified,
/// null and empty strings count as absent.
fn field(object: &Map<String, Value>, key: &str) -> Option<String> {
    let s = match object.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };
    (!s.is_empty()).then_some(s)
}
