//! `ss://` in SIP002 form (plain or base64 userinfo, optional SIP003 plugin)
//! and the legacy whole-body base64 form.

use sift_core::{ParseError, ParsedEndpoint, ProtocolKind};
use tracing::trace;

use super::Defaults;
use crate::base64::decode_bounded_utf8;
use crate::uri::{parse_host_port, parse_query, percent_decode, split_fragment, strip_scheme, ParamRules, COMMON_FLAGS, COMMON_FOLDED};
use crate::{ParseOptions, ProtocolParser};

const KIND: ProtocolKind = ProtocolKind::Shadowsocks;

const DEFAULTS: Defaults = &[];

const RULES: ParamRules = ParamRules {
    aliases: &[&[("group", "remarks")]],
    folded: COMMON_FOLDED,
    flags: COMMON_FLAGS,
    dropped: &["remarks", "plugin"],
};

pub struct ShadowsocksParser;

impl ProtocolParser for ShadowsocksParser {
    fn kind(&self) -> ProtocolKind {
        KIND
    }

    fn schemes(&self) -> &'static [&'static str] {
        &["ss"]
    }

    fn parse(&self, raw: &str, opts: &ParseOptions) -> Result<ParsedEndpoint, ParseError> {
        let raw = raw.trim();
        let body = strip_scheme(raw, self.schemes()).ok_or_else(|| ParseError::malformed(KIND, "missing ss:// prefix"))?;
        let (body, name) = split_fragment(body);
        let (main, query) = match body.split_once('?') {
            Some((m, q)) => (m, q),
            None => (body, ""),
        };

        let (userinfo, hostport) = match main.rsplit_once('@') {
            Some((user, hp)) => (decode_userinfo(user, opts)?, hp.trim_end_matches('/').to_string()),
            None => {
                trace!("legacy ss body");
                let decoded = decode_bounded_utf8(main, opts.max_payload_bytes, KIND)?;
                let (user, hp) = decoded
                    .trim()
                    .rsplit_once('@')
                    .ok_or_else(|| ParseError::malformed(KIND, "decoded body has no '@'"))?;
                (user.to_string(), hp.to_string())
            }
        };

        let (method, password) =
            userinfo.split_once(':').ok_or_else(|| ParseError::malformed(KIND, "userinfo is not method:password"))?;
        if method.trim().is_empty() {
            return Err(ParseError::malformed(KIND, "empty cipher method"));
        }
        let (host, port) = parse_host_port(hostport.trim(), KIND)?;

        let mut ep = ParsedEndpoint::new(KIND, host, port, raw);
        ep.implied_defaults = DEFAULTS;
        ep.name = name;
        ep.credentials = Some(password.to_string()).filter(|p| !p.is_empty());
        ep.set_param("method", method.trim().to_lowercase());

        let pairs = parse_query(query);
        RULES.apply(&mut ep, &pairs);
        if let Some((_, plugin)) = pairs.iter().find(|(k, _)| k == "plugin") {
            apply_plugin(&mut ep, plugin);
        }
        Ok(ep)
    }
}

/// Userinfo is either `method:password` (possibly percent-escaped) or
/// base64 of it.
fn decode_userinfo(user: &str, opts: &ParseOptions) -> Result<String, ParseError> {
    let plain = percent_decode(user);
    if plain.contains(':') {
        return Ok(plain);
    }
    decode_bounded_utf8(user, opts.max_payload_bytes, KIND)
}

/// SIP003 `plugin=name;opt=v;...`. `simple-obfs` is the old name of `obfs-local`.
fn apply_plugin(ep: &mut ParsedEndpoint, plugin: &str) {
    let mut parts = plugin.split(';').map(str::trim);
    let name = match parts.next().unwrap_or_default().to_lowercase().as_str() {
        "simple-obfs" => "obfs-local".to_string(),
        other => other.to_string(),
    };
    ep.set_param("plugin", name);
    let opts: Vec<&str> = parts.filter(|p| !p.is_empty()).collect();
    ep.set_param("plugin_opts", opts.join(";"));
}
