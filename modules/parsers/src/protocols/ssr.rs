//! `ssr://base64(host:port:protocol:method:obfs:base64(password)/?obfsparam=..&protoparam=..&remarks=..)`

use sift_core::{ParseError, ParsedEndpoint, ProtocolKind};

use super::Defaults;
use crate::base64::decode_bounded_utf8;
use crate::uri::{parse_port, parse_query, split_fragment, strip_scheme};
use crate::{ParseOptions, ProtocolParser};

const KIND: ProtocolKind = ProtocolKind::ShadowsocksR;

const DEFAULTS: Defaults = &[("protocol", "origin"), ("obfs", "plain")];

pub struct ShadowsocksRParser;

impl ProtocolParser for ShadowsocksRParser {
    fn kind(&self) -> ProtocolKind {
        KIND
    }

    fn schemes(&self) -> &'static [&'static str] {
        &["ssr"]
    }

    fn parse(&self, raw: &str, opts: &ParseOptions) -> Result<ParsedEndpoint, ParseError> {
        let raw = raw.trim();
        let body = strip_scheme(raw, self.schemes()).ok_or_else(|| ParseError::malformed(KIND, "missing ssr:// prefix"))?;
        let (body, fragment) = split_fragment(body);
        let limit = opts.max_payload_bytes;
        let decoded = decode_bounded_utf8(body, limit, KIND)?;

        let (main, query) = match decoded.trim().split_once('?') {
            Some((m, q)) => (m.trim_end_matches('/').to_string(), q.to_string()),
            None => (decoded.trim().trim_end_matches('/').to_string(), String::new()),
        };

        let fields: Vec<&str> = main.rsplitn(6, ':').collect();
        let [pass_b64, obfs, method, protocol, port, host] = fields[..] else {
            return Err(ParseError::malformed(KIND, format!("expected 6 ':' separated fields, got {}", fields.len())));
        };
        let host = host.trim().trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(ParseError::MissingHost(KIND));
        }
        let port = parse_port(port, KIND)?;

        let mut ep = ParsedEndpoint::new(KIND, host, port, raw);
        ep.implied_defaults = DEFAULTS;
        ep.credentials = if pass_b64.is_empty() { None } else { Some(decode_bounded_utf8(pass_b64, limit, KIND)?) };
        ep.set_param("protocol", protocol.trim().to_lowercase());
        ep.set_param("method", method.trim().to_lowercase());
        ep.set_param("obfs", obfs.trim().to_lowercase());

        for (k, v) in parse_query(&query) {
            if v.is_empty() {
                continue;
            }
            match k.as_str() {
                "obfsparam" => ep.set_param("obfs_param", decode_bounded_utf8(&v, limit, KIND)?),
                "protoparam" => ep.set_param("proto_param", decode_bounded_utf8(&v, limit, KIND)?),
                "remarks" => ep.name = decode_bounded_utf8(&v, limit, KIND).ok().filter(|s| !s.is_empty()),
                "group" => {}
                _ => ep.set_param(&k, v),
            }
        }
        if ep.name.is_none() {
            ep.name = fragment;
        }
        Ok(ep)
    }
}
