//! Collapse a harvested batch to one connection string per fingerprint.

use std::collections::HashSet;

use parsers::ParserRegistry;
use serde::Serialize;
use sift_core::{Filters, Fingerprint, RawConnection};
use tracing::{debug, info};

use crate::{identify, Candidate};

/// Attrition counters. Every input lands in exactly one of `blank`,
/// `exact_duplicates`, `excluded_by_pattern`, `not_included_by_pattern`,
/// `unrecognized`, `filtered_by_protocol`, `duplicate_fingerprints` or `kept`.
/// `parse_failed` counts survivors of the filters that fell back to the raw form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DedupStats {
    pub input: usize,
    pub blank: usize,
    pub exact_duplicates: usize,
    pub excluded_by_pattern: usize,
    pub not_included_by_pattern: usize,
    pub unrecognized: usize,
    pub filtered_by_protocol: usize,
    pub parse_failed: usize,
    pub duplicate_fingerprints: usize,
    pub kept: usize,
}

impl DedupStats {
    pub fn dropped(&self) -> usize {
        self.blank
            + self.exact_duplicates
            + self.excluded_by_pattern
            + self.not_included_by_pattern
            + self.unrecognized
            + self.filtered_by_protocol
            + self.duplicate_fingerprints
    }
}

#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    /// Survivors in ascending raw-string order.
    pub kept: Vec<Candidate>,
    pub stats: DedupStats,
}

/// Deduplicate `entries` as a set: input order never affects the result, and
/// within a fingerprint group the lexicographically smallest string wins.
pub fn dedup(entries: &[RawConnection], filters: &Filters, registry: &ParserRegistry) -> DedupOutcome {
    let mut stats = DedupStats { input: entries.len(), ..Default::default() };

    let mut sorted: Vec<(&str, &str)> = Vec::with_capacity(entries.len());
    for e in entries {
        let raw = e.raw.trim();
        if raw.is_empty() {
            stats.blank += 1;
        } else {
            sorted.push((raw, e.source.as_str()));
        }
    }
    sorted.sort_unstable();
    let before = sorted.len();
    sorted.dedup_by(|a, b| a.0 == b.0);
    stats.exact_duplicates = before - sorted.len();

    let mut seen: HashSet<Fingerprint> = HashSet::with_capacity(sorted.len());
    let mut kept = Vec::new();
    for (raw, source) in sorted {
        let lower = raw.to_lowercase();
        if filters.excluded_by_pattern(&lower) {
            stats.excluded_by_pattern += 1;
            continue;
        }
        if !filters.included_by_pattern(&lower) {
            stats.not_included_by_pattern += 1;
            continue;
        }
        let Some(candidate) = identify(raw, source, registry) else {
            debug!(raw = %truncate(raw), "unrecognized connection string");
            stats.unrecognized += 1;
            continue;
        };
        if let Ok(ep) = &candidate.parsed {
            if !filters.protocol_allowed(ep.protocol) {
                stats.filtered_by_protocol += 1;
                continue;
            }
        }
        if !seen.insert(candidate.fingerprint) {
            debug!(fingerprint = %candidate.fingerprint, "duplicate endpoint");
            stats.duplicate_fingerprints += 1;
            continue;
        }
        if candidate.parsed.is_err() {
            stats.parse_failed += 1;
        }
        kept.push(candidate);
    }
    stats.kept = kept.len();

    info!(
        input = stats.input,
        kept = stats.kept,
        duplicates = stats.exact_duplicates + stats.duplicate_fingerprints,
        unrecognized = stats.unrecognized,
        parse_failed = stats.parse_failed,
        "dedup finished"
    );
    DedupOutcome { kept, stats }
}

/// [`dedup`] over bare strings, returning the surviving raw strings.
pub fn dedup_strings<I, S>(raws: I, filters: &Filters, registry: &ParserRegistry) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let entries: Vec<RawConnection> = raws.into_iter().map(|s| RawConnection::from(s.as_ref())).collect();
    dedup(&entries, filters, registry).kept.into_iter().map(|c| c.raw).collect()
}

fn truncate(s: &str) -> &str {
    match s.char_indices().nth(80) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
