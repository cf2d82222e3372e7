use sift_core::{ParseError, ParsedEndpoint, ProtocolKind};

use super::{endpoint_from_uri, userinfo, Defaults};
use crate::uri::{parse_uri, ParamRules, COMMON_FLAGS, COMMON_FOLDED, TLS_ALIASES};
use crate::{ParseOptions, ProtocolParser};

const KIND: ProtocolKind = ProtocolKind::Hysteria;

const DEFAULTS: Defaults = &[("protocol", "udp"), ("insecure", "0")];

pub(super) const HYSTERIA_ALIASES: &[(&str, &str)] = &[
    ("upmbps", "up_mbps"),
    ("up", "up_mbps"),
    ("downmbps", "down_mbps"),
    ("down", "down_mbps"),
    ("obfsParam", "obfs_password"),
    ("obfs-password", "obfs_password"),
    ("obfsparam", "obfs_password"),
];

const RULES: ParamRules = ParamRules {
    aliases: &[TLS_ALIASES, HYSTERIA_ALIASES],
    folded: COMMON_FOLDED,
    flags: COMMON_FLAGS,
    dropped: &["auth", "auth_str", "remarks", "remark"],
};

/// Hysteria v1: `hysteria://host:port?protocol=udp&auth=..&upmbps=..&downmbps=..`
pub struct HysteriaParser;

impl ProtocolParser for HysteriaParser {
    fn kind(&self) -> ProtocolKind {
        KIND
    }

    fn schemes(&self) -> &'static [&'static str] {
        &["hysteria", "hy"]
    }

    fn parse(&self, raw: &str, _opts: &ParseOptions) -> Result<ParsedEndpoint, ParseError> {
        let raw = raw.trim();
        let parts = parse_uri(raw, KIND)?;
        let mut ep = endpoint_from_uri(KIND, raw, &parts, &RULES, DEFAULTS);
        let auth = ["auth", "auth_str"]
            .iter()
            .find_map(|key| parts.query.iter().find(|(k, v)| k == key && !v.is_empty()))
            .map(|(_, v)| v.clone());
        ep.credentials = auth.or_else(|| userinfo(&parts));
        Ok(ep)
    }
}
