//! One parser per scheme family.

mod generic;
mod hysteria;
mod hysteria2;
mod shadowsocks;
mod ssr;
mod trojan;
mod tuic;
mod vless;
mod vmess;
mod wireguard;

pub use generic::{HttpParser, SocksParser};
pub use hysteria::HysteriaParser;
pub use hysteria2::Hysteria2Parser;
pub use shadowsocks::ShadowsocksParser;
pub use ssr::ShadowsocksRParser;
pub use trojan::TrojanParser;
pub use tuic::TuicParser;
pub use vless::{RealityParser, VLessParser};
pub use vmess::VMessParser;
pub use wireguard::WireGuardParser;

use sift_core::{ParsedEndpoint, ProtocolKind};

use crate::uri::{ParamRules, UriParts};

type Defaults = &'static [(&'static str, &'static str)];

/// Endpoint skeleton from an authority-style URI, with its query run through `rules`.
fn endpoint_from_uri(
    kind: ProtocolKind,
    raw: &str,
    parts: &UriParts,
    rules: &ParamRules,
    defaults: Defaults,
) -> ParsedEndpoint {
    let mut ep = ParsedEndpoint::new(kind, parts.host.clone(), parts.port, raw.trim());
    ep.name = parts.name.clone();
    ep.implied_defaults = defaults;
    rules.apply(&mut ep, &parts.query);
    ep
}

/// `user` or `user:pass`, whichever the URI carried.
fn userinfo(parts: &UriParts) -> Option<String> {
    match (&parts.username, &parts.password) {
        (Some(u), Some(p)) => Some(format!("{u}:{p}")),
        (Some(u), None) => Some(u.clone()),
        (None, Some(p)) => Some(format!(":{p}")),
        (None, None) => None,
    }
}
