use sift_core::{ParseError, ParsedEndpoint, ProtocolKind};

use super::hysteria::HYSTERIA_ALIASES;
use super::{endpoint_from_uri, userinfo, Defaults};
use crate::uri::{parse_uri, ParamRules, COMMON_DROPPED, COMMON_FLAGS, COMMON_FOLDED, TLS_ALIASES};
use crate::{ParseOptions, ProtocolParser};

const KIND: ProtocolKind = ProtocolKind::Hysteria2;

const DEFAULTS: Defaults = &[("insecure", "0"), ("obfs", "none")];

const RULES: ParamRules = ParamRules {
    aliases: &[TLS_ALIASES, HYSTERIA_ALIASES, &[("pinSHA256", "pin_sha256")]],
    folded: COMMON_FOLDED,
    flags: COMMON_FLAGS,
    dropped: COMMON_DROPPED,
};

/// `hysteria2://[user[:pass]@]host:port?sni=..&obfs=salamander&obfs-password=..`
pub struct Hysteria2Parser;

impl ProtocolParser for Hysteria2Parser {
    fn kind(&self) -> ProtocolKind {
        KIND
    }

    fn schemes(&self) -> &'static [&'static str] {
        &["hysteria2", "hy2"]
    }

    fn parse(&self, raw: &str, _opts: &ParseOptions) -> Result<ParsedEndpoint, ParseError> {
        let raw = raw.trim();
        let parts = parse_uri(raw, KIND)?;
        let mut ep = endpoint_from_uri(KIND, raw, &parts, &RULES, DEFAULTS);
        ep.credentials = userinfo(&parts);
        Ok(ep)
    }
}
