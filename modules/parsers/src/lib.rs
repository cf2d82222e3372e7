//! Connection-string parsers.
//!
//! Every supported scheme has a [`ProtocolParser`]; the [`ParserRegistry`]
//! holds them in priority order and picks the first one that claims a string.
//! Parameter aliases, case folding and implied defaults are all resolved here
//! so downstream code only ever sees canonical attribute names.

pub mod base64;
pub mod protocols;
pub mod uri;

use std::sync::Arc;

use sift_core::{ParseError, ParsedEndpoint, ProtocolKind};
use tracing::{debug, trace};

pub use protocols::{
    HttpParser, Hysteria2Parser, HysteriaParser, RealityParser, ShadowsocksParser, ShadowsocksRParser,
    SocksParser, TrojanParser, TuicParser, VLessParser, VMessParser, WireGuardParser,
};

pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Largest decoded size accepted for any nested base64 payload.
    pub max_payload_bytes: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions { max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES }
    }
}

pub trait ProtocolParser: Send + Sync {
    fn kind(&self) -> ProtocolKind;

    /// Schemes this parser accepts, lower-case, without `://`.
    fn schemes(&self) -> &'static [&'static str];

    fn can_parse(&self, raw: &str) -> bool {
        uri::has_scheme(raw, self.schemes())
    }

    fn parse(&self, raw: &str, opts: &ParseOptions) -> Result<ParsedEndpoint, ParseError>;
}

/// Priority-ordered parser list, built once at startup.
pub struct ParserRegistry {
    parsers: Vec<Arc<dyn ProtocolParser>>,
    opts: ParseOptions,
}

impl ParserRegistry {
    pub fn new(opts: ParseOptions) -> Self {
        ParserRegistry { parsers: Vec::new(), opts }
    }

    /// All built-in parsers. Reality precedes VLESS and SOCKS precedes HTTP
    /// because they claim subsets of the later parsers' inputs.
    pub fn with_builtin_parsers(max_payload_bytes: usize) -> Self {
        let mut registry = Self::new(ParseOptions { max_payload_bytes });
        registry.register(Arc::new(RealityParser));
        registry.register(Arc::new(VLessParser));
        registry.register(Arc::new(VMessParser));
        registry.register(Arc::new(TrojanParser));
        registry.register(Arc::new(ShadowsocksRParser));
        registry.register(Arc::new(ShadowsocksParser));
        registry.register(Arc::new(Hysteria2Parser));
        registry.register(Arc::new(HysteriaParser));
        registry.register(Arc::new(TuicParser));
        registry.register(Arc::new(WireGuardParser));
        registry.register(Arc::new(SocksParser));
        registry.register(Arc::new(HttpParser));
        registry
    }

    /// Append a parser at the lowest priority.
    pub fn register(&mut self, parser: Arc<dyn ProtocolParser>) {
        self.parsers.push(parser);
    }

    pub fn options(&self) -> &ParseOptions {
        &self.opts
    }

    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }

    pub fn detect(&self, raw: &str) -> Option<&dyn ProtocolParser> {
        let raw = raw.trim();
        self.parsers.iter().find(|p| p.can_parse(raw)).map(|p| p.as_ref())
    }

    /// `None` when no parser recognizes the string.
    pub fn parse(&self, raw: &str) -> Option<Result<ParsedEndpoint, ParseError>> {
        let raw = raw.trim();
        let parser = self.detect(raw)?;
        Some(self.parse_with(parser, raw))
    }

    /// Run `parser` on `raw`, rejecting strings too long to hold a payload
    /// within the configured bound.
    pub fn parse_with(&self, parser: &dyn ProtocolParser, raw: &str) -> Result<ParsedEndpoint, ParseError> {
        let kind = parser.kind();
        let limit = self.opts.max_payload_bytes.saturating_mul(2);
        if raw.len() > limit {
            return Err(ParseError::PayloadTooLarge { protocol: kind, size: raw.len(), limit });
        }
        let result = parser.parse(raw, &self.opts);
        match &result {
            Ok(ep) => trace!(protocol = %kind, host = %ep.host, port = ep.port, "parsed"),
            Err(e) => debug!(protocol = %kind, error = %e, "parse failed"),
        }
        result
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_builtin_parsers(DEFAULT_MAX_PAYLOAD_BYTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind_of(raw: &str) -> Option<ProtocolKind> {
        ParserRegistry::default().detect(raw).map(|p| p.kind())
    }

    #[test]
    fn detects_every_scheme() {
        let cases = [
            ("vmess://abc", ProtocolKind::VMess),
            ("vless://id@h:443", ProtocolKind::VLess),
            ("vless://id@h:443?security=reality&pbk=k", ProtocolKind::Reality),
            ("reality://id@h:443", ProtocolKind::Reality),
            ("trojan://pw@h:443", ProtocolKind::Trojan),
            ("ss://YWVzLTEyOC1nY206cHc@h:8388", ProtocolKind::Shadowsocks),
            ("ssr://abc", ProtocolKind::ShadowsocksR),
            ("hysteria://h:443", ProtocolKind::Hysteria),
            ("hy://h:443", ProtocolKind::Hysteria),
            ("hysteria2://pw@h:443", ProtocolKind::Hysteria2),
            ("hy2://pw@h:443", ProtocolKind::Hysteria2),
            ("tuic://u:p@h:443", ProtocolKind::Tuic),
            ("wireguard://k@h:51820", ProtocolKind::WireGuard),
            ("wg://k@h:51820", ProtocolKind::WireGuard),
            ("http://h:8080", ProtocolKind::Http),
            ("https://h:8443", ProtocolKind::Http),
            ("socks5://h:1080", ProtocolKind::Socks),
            ("socks4://h:1080", ProtocolKind::Socks),
            ("tg://socks?server=h&port=1080", ProtocolKind::Socks),
            ("https://t.me/socks?server=h&port=1080", ProtocolKind::Socks),
        ];
        for (raw, kind) in cases {
            assert_eq!(kind_of(raw), Some(kind), "{raw}");
        }
    }

    #[test]
    fn detection_ignores_scheme_case() {
        assert_eq!(kind_of("VMESS://abc"), Some(ProtocolKind::VMess));
        assert_eq!(kind_of("  Trojan://pw@h:1"), Some(ProtocolKind::Trojan));
        assert_eq!(kind_of("VLESS://id@h:443?SECURITY=REALITY"), Some(ProtocolKind::Reality));
    }

    #[test]
    fn unknown_schemes_are_unrecognized() {
        assert_eq!(kind_of("ftp://h:21"), None);
        assert_eq!(kind_of("just some text"), None);
        assert!(ParserRegistry::default().parse("naive+https://h:443").is_none());
    }

    #[test]
    fn builtin_priority_order() {
        let reg = ParserRegistry::default();
        assert_eq!(reg.len(), 12);
        let kinds: Vec<_> = reg.parsers.iter().map(|p| p.kind()).collect();
        let pos = |k| kinds.iter().position(|x| *x == k).unwrap();
        assert!(pos(ProtocolKind::Reality) < pos(ProtocolKind::VLess));
        assert!(pos(ProtocolKind::Hysteria2) < pos(ProtocolKind::Hysteria));
        assert!(pos(ProtocolKind::Socks) < pos(ProtocolKind::Http));
    }

    #[test]
    fn overlong_strings_are_rejected_before_parsing() {
        let reg = ParserRegistry::with_builtin_parsers(16);
        let raw = format!("trojan://{}@h:443", "p".repeat(64));
        let err = reg.parse(&raw).unwrap().unwrap_err();
        assert!(matches!(err, ParseError::PayloadTooLarge { protocol: ProtocolKind::Trojan, .. }));
    }

    #[test]
    fn structurally_invalid_bodies_fail() {
        let reg = ParserRegistry::default();
        assert!(reg.parse("trojan://pw@:443").unwrap().is_err());
        assert!(reg.parse("vmess://!!!").unwrap().is_err());
        assert!(reg.parse("vless://id@h").unwrap().is_err());
    }
}
