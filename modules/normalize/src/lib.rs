//! Encoding-invariant canonical forms and the fingerprints derived from them.

pub mod dedup;

use std::fmt;

use parsers::uri::split_scheme;
use parsers::ParserRegistry;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;
use sift_core::{Fingerprint, ParseError, ParsedEndpoint, ProtocolKind};

pub use dedup::{dedup, dedup_strings, DedupOutcome, DedupStats};

/// Everything except unreserved characters is escaped, so `:@?&=` inside a
/// component can never be confused with a delimiter.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

/// Bracketed IPv6 literals keep their colons.
const IPV6_HOST: &AsciiSet = &COMPONENT.remove(b':');

const RAW_PREFIX: &str = "raw:";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct CanonicalForm(String);

impl CanonicalForm {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when this form came from the raw-string fallback.
    pub fn is_raw_fallback(&self) -> bool {
        self.0.starts_with(RAW_PREFIX)
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::digest(self.0.as_bytes())
    }
}

impl fmt::Display for CanonicalForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn encode(s: &str) -> String {
    utf8_percent_encode(s, COMPONENT).to_string()
}

fn canonical_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('.').to_lowercase();
    if host.contains(':') {
        format!("[{}]", utf8_percent_encode(&host, IPV6_HOST))
    } else {
        encode(&host)
    }
}

/// `proto://cred@host:port?k=v&k=v` with the name dropped, parameters sorted,
/// implied defaults removed and the host lower-cased.
pub fn normalize(ep: &ParsedEndpoint) -> (CanonicalForm, Fingerprint) {
    let mut out = String::with_capacity(64);
    out.push_str(ep.protocol.name());
    out.push_str("://");
    if let Some(cred) = &ep.credentials {
        out.push_str(&encode(cred));
        out.push('@');
    }
    out.push_str(&canonical_host(&ep.host));
    out.push(':');
    out.push_str(&ep.port.to_string());

    let params: Vec<String> = ep
        .transport_params
        .iter()
        .filter(|(k, v)| !v.is_empty() && !ep.is_implied_default(k, v))
        .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
        .collect();
    if !params.is_empty() {
        out.push('?');
        out.push_str(&params.join("&"));
    }

    let canonical = CanonicalForm(out);
    let fp = canonical.fingerprint();
    (canonical, fp)
}

/// Fallback for strings that did not parse: whitespace removed, scheme
/// lower-cased and fragment stripped.
pub fn normalize_raw(raw: &str) -> (CanonicalForm, Fingerprint) {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let without_fragment = compact.split('#').next().unwrap_or_default();
    let body = match split_scheme(without_fragment) {
        Some((scheme, rest)) => format!("{}://{}", scheme.to_ascii_lowercase(), rest),
        None => without_fragment.to_string(),
    };
    let canonical = CanonicalForm(format!("{RAW_PREFIX}{body}"));
    let fp = canonical.fingerprint();
    (canonical, fp)
}

/// One recognized connection string with its identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub raw: String,
    pub source: String,
    pub protocol: ProtocolKind,
    pub fingerprint: Fingerprint,
    pub canonical: CanonicalForm,
    pub parsed: Result<ParsedEndpoint, ParseError>,
}

impl Candidate {
    pub fn endpoint(&self) -> Option<&ParsedEndpoint> {
        self.parsed.as_ref().ok()
    }
}

/// Detect, parse and fingerprint one string. `None` when no parser claims it.
pub fn identify(raw: &str, source: &str, registry: &ParserRegistry) -> Option<Candidate> {
    let raw = raw.trim();
    let parser = registry.detect(raw)?;
    let parsed = registry.parse_with(parser, raw);
    let (canonical, fingerprint) = match &parsed {
        Ok(ep) => normalize(ep),
        Err(_) => normalize_raw(raw),
    };
    Some(Candidate {
        raw: raw.to_string(),
        source: source.to_string(),
        protocol: parser.kind(),
        fingerprint,
        canonical,
        parsed,
    })
}
