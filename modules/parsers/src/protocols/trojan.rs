use sift_core::{ParseError, ParsedEndpoint, ProtocolKind};

use super::{endpoint_from_uri, userinfo, Defaults};
use crate::uri::{parse_uri, ParamRules, COMMON_DROPPED, COMMON_FLAGS, COMMON_FOLDED, TLS_ALIASES, TRANSPORT_ALIASES};
use crate::{ParseOptions, ProtocolParser};

const KIND: ProtocolKind = ProtocolKind::Trojan;

const DEFAULTS: Defaults = &[("security", "tls"), ("network", "tcp"), ("header_type", "none"), ("insecure", "0")];

const RULES: ParamRules = ParamRules {
    aliases: &[TLS_ALIASES, TRANSPORT_ALIASES],
    folded: COMMON_FOLDED,
    flags: COMMON_FLAGS,
    dropped: COMMON_DROPPED,
};

/// `trojan://password@host:port?params#name`
pub struct TrojanParser;

impl ProtocolParser for TrojanParser {
    fn kind(&self) -> ProtocolKind {
        KIND
    }

    fn schemes(&self) -> &'static [&'static str] {
        &["trojan", "trojan-go"]
    }

    fn parse(&self, raw: &str, _opts: &ParseOptions) -> Result<ParsedEndpoint, ParseError> {
        let raw = raw.trim();
        let parts = parse_uri(raw, KIND)?;
        let mut ep = endpoint_from_uri(KIND, raw, &parts, &RULES, DEFAULTS);
        // A ':' in an unescaped password splits it into user and pass.
        ep.credentials = userinfo(&parts);
        Ok(ep)
    }
}
