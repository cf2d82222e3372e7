use normalize::{Candidate, CanonicalForm, DedupStats};
use probe::CacheStats;
use reliability_sqlite::RunCounts;
use serde::Serialize;
use sift_core::{ParsedEndpoint, ProbeResult, ProtocolKind};
use uuid::Uuid;

/// One surviving endpoint and what probing found.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    pub raw: String,
    pub source: String,
    pub protocol: ProtocolKind,
    pub canonical: CanonicalForm,
    pub endpoint: Option<ParsedEndpoint>,
    pub parse_error: Option<String>,
    pub result: ProbeResult,
}

impl ReportEntry {
    pub(crate) fn new(candidate: Candidate, result: ProbeResult) -> Self {
        let (endpoint, parse_error) = match candidate.parsed {
            Ok(ep) => (Some(ep), None),
            Err(e) => (None, Some(e.to_string())),
        };
        ReportEntry {
            raw: candidate.raw,
            source: candidate.source,
            protocol: candidate.protocol,
            canonical: candidate.canonical,
            endpoint,
            parse_error,
            result,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: i64,
    pub finished_at: i64,
    /// Dedup order, i.e. ascending raw string.
    pub entries: Vec<ReportEntry>,
    pub dedup: DedupStats,
    pub probed: usize,
    pub reachable: usize,
    pub abandoned: usize,
    pub flush_attempts: u32,
    pub flushed: bool,
    pub cache: CacheStats,
    pub warnings: Vec<String>,
}

impl RunReport {
    pub fn counts(&self) -> RunCounts {
        RunCounts {
            input: self.dedup.input as u64,
            kept: self.dedup.kept as u64,
            probed: self.probed as u64,
            reachable: self.reachable as u64,
            warnings: self.warnings.len() as u64,
        }
    }

    pub fn reachable_entries(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(|e| e.result.reachable)
    }
}
