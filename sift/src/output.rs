use std::io::Write;
use std::net::IpAddr;

use anyhow::Result;
use clap::ValueEnum;
use pipeline::{ReportEntry, RunReport};
use reliability_sqlite::StoredReliability;
use serde::Serialize;
use sift_core::{Fingerprint, ProbeStatus, ProtocolKind};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Jsonl,
    Csv,
}

pub fn rfc3339(unix: i64) -> String {
    OffsetDateTime::from_unix_timestamp(unix)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_default()
}

/// Flat per-endpoint record shared by the JSON lines and CSV writers.
#[derive(Debug, Serialize)]
struct ReportRow<'a> {
    fingerprint: Fingerprint,
    protocol: ProtocolKind,
    status: ProbeStatus,
    reachable: bool,
    latency_ms: Option<f64>,
    reliability: Option<f64>,
    host: Option<&'a str>,
    port: Option<u16>,
    ip: Option<IpAddr>,
    country: Option<&'a str>,
    isp: Option<&'a str>,
    source: &'a str,
    raw: &'a str,
    error: Option<&'a str>,
}

impl<'a> From<&'a ReportEntry> for ReportRow<'a> {
    fn from(e: &'a ReportEntry) -> Self {
        let r = &e.result;
        ReportRow {
            fingerprint: r.fingerprint,
            protocol: e.protocol,
            status: r.status,
            reachable: r.reachable,
            latency_ms: r.latency_ms.map(|v| (v * 100.0).round() / 100.0),
            reliability: r.reliability,
            host: e.endpoint.as_ref().map(|ep| ep.host.as_str()),
            port: e.endpoint.as_ref().map(|ep| ep.port),
            ip: r.ip,
            country: r.country.as_deref(),
            isp: r.isp.as_deref(),
            source: &e.source,
            raw: &e.raw,
            error: e.parse_error.as_deref(),
        }
    }
}

fn text_line(e: &ReportEntry) -> String {
    let r = &e.result;
    let latency = r.latency_ms.map(|v| format!("{v:.0}ms")).unwrap_or_else(|| "-".into());
    let reliability = r.reliability.map(|v| format!("{:.0}%", v * 100.0)).unwrap_or_else(|| "new".into());
    let country = r.country.as_deref().unwrap_or("--");
    format!("{:<10} {:>7} {:>4} {:<2} {:<9} {}", r.status.as_str(), latency, reliability, country, e.protocol, e.raw)
}

pub fn write_report(w: &mut dyn Write, report: &RunReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            for e in &report.entries {
                writeln!(w, "{}", text_line(e))?;
            }
        }
        OutputFormat::Jsonl => {
            for e in &report.entries {
                writeln!(w, "{}", serde_json::to_string(&ReportRow::from(e))?)?;
            }
        }
        OutputFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(w);
            for e in &report.entries {
                wtr.serialize(ReportRow::from(e))?;
            }
            wtr.flush()?;
        }
    }
    Ok(())
}

/// One-line attrition summary for stderr.
pub fn summary(report: &RunReport) -> String {
    let d = &report.dedup;
    format!(
        "run {}: {} input, {} kept ({} duplicates, {} unrecognized, {} filtered, {} unparsed), {} probed, {} reachable",
        report.run_id,
        d.input,
        d.kept,
        d.exact_duplicates + d.duplicate_fingerprints,
        d.unrecognized,
        d.excluded_by_pattern + d.not_included_by_pattern + d.filtered_by_protocol,
        d.parse_failed,
        report.probed,
        report.reachable,
    )
}

#[derive(Debug, Serialize)]
pub struct FingerprintRow {
    pub raw: String,
    pub protocol: Option<ProtocolKind>,
    pub fingerprint: Option<Fingerprint>,
    pub canonical: Option<String>,
    pub error: Option<String>,
}

pub fn write_fingerprints(w: &mut dyn Write, rows: &[FingerprintRow], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            for r in rows {
                match (&r.protocol, &r.fingerprint, &r.canonical) {
                    (Some(p), Some(fp), Some(c)) => {
                        write!(w, "{fp} {p:<9} {c}")?;
                        if let Some(e) = &r.error {
                            write!(w, " ({e})")?;
                        }
                        writeln!(w)?;
                    }
                    _ => writeln!(w, "unrecognized: {}", r.raw)?,
                }
            }
        }
        OutputFormat::Jsonl => {
            for r in rows {
                writeln!(w, "{}", serde_json::to_string(r)?)?;
            }
        }
        OutputFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(w);
            for r in rows {
                wtr.serialize(r)?;
            }
            wtr.flush()?;
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct HistoryRow {
    fingerprint: Fingerprint,
    successes: u64,
    failures: u64,
    score: Option<f64>,
    last_latency_ms: Option<f64>,
    last_tested: String,
}

pub fn write_history(w: &mut dyn Write, records: &[StoredReliability], format: OutputFormat) -> Result<()> {
    let rows = records.iter().map(|s| HistoryRow {
        fingerprint: s.fingerprint,
        successes: s.record.successes,
        failures: s.record.failures,
        score: s.score,
        last_latency_ms: s.record.last_latency_ms,
        last_tested: rfc3339(s.record.last_tested),
    });
    match format {
        OutputFormat::Text => {
            for r in rows {
                let score = r.score.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "untested".into());
                writeln!(w, "{} {:>5}/{:<5} {:>8} {}", r.fingerprint, r.successes, r.failures, score, r.last_tested)?;
            }
        }
        OutputFormat::Jsonl => {
            for r in rows {
                writeln!(w, "{}", serde_json::to_string(&r)?)?;
            }
        }
        OutputFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(w);
            for r in rows {
                wtr.serialize(r)?;
            }
            wtr.flush()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_core::{ParsedEndpoint, ProbeResult, ReliabilityRecord};

    fn entry(raw: &str, reachable: bool) -> ReportEntry {
        let fp = Fingerprint::digest(raw.as_bytes());
        let mut result = ProbeResult::unreachable(fp, ProbeStatus::Refused, None);
        if reachable {
            result.reachable = true;
            result.status = ProbeStatus::Reachable;
            result.latency_ms = Some(12.0);
            result.country = Some("DE".into());
            result.reliability = Some(0.5);
        }
        ReportEntry {
            raw: raw.into(),
            source: "feed".into(),
            protocol: ProtocolKind::Trojan,
            canonical: normalize::normalize_raw(raw).0,
            endpoint: Some(ParsedEndpoint::new(ProtocolKind::Trojan, "a.test", 443, raw)),
            parse_error: None,
            result,
        }
    }

    fn report(entries: Vec<ReportEntry>) -> RunReport {
        RunReport {
            run_id: uuid::Uuid::nil(),
            started_at: 0,
            finished_at: 0,
            entries,
            dedup: Default::default(),
            probed: 0,
            reachable: 0,
            abandoned: 0,
            flush_attempts: 1,
            flushed: true,
            cache: Default::default(),
            warnings: Vec::new(),
        }
    }

    fn render(report: &RunReport, format: OutputFormat) -> String {
        let mut buf = Vec::new();
        write_report(&mut buf, report, format).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn jsonl_is_one_object_per_entry() {
        let r = report(vec![entry("trojan://a@a.test:443", true), entry("trojan://b@a.test:443", false)]);
        let out = render(&r, OutputFormat::Jsonl);
        let lines: Vec<serde_json::Value> = out.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["status"], "reachable");
        assert_eq!(lines[0]["protocol"], "trojan");
        assert_eq!(lines[0]["latency_ms"], 12.0);
        assert_eq!(lines[0]["host"], "a.test");
        assert_eq!(lines[1]["reachable"], false);
        assert!(lines[1]["latency_ms"].is_null());
        assert_eq!(lines[1]["fingerprint"].as_str().unwrap().len(), 32);
    }

    #[test]
    fn csv_has_header_and_rows() {
        let r = report(vec![entry("trojan://a@a.test:443", true)]);
        let out = render(&r, OutputFormat::Csv);
        let mut lines = out.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("fingerprint,protocol,status,reachable,latency_ms"), "{header}");
        let row = lines.next().unwrap();
        assert!(row.contains(",trojan,reachable,true,"), "{row}");
        assert!(lines.next().is_none());
    }

    #[test]
    fn text_shows_status_and_raw() {
        let r = report(vec![entry("trojan://a@a.test:443", true), entry("trojan://b@a.test:443", false)]);
        let out = render(&r, OutputFormat::Text);
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[0].starts_with("reachable"));
        assert!(lines[0].contains("12ms") && lines[0].contains("50%") && lines[0].contains("DE"));
        assert!(lines[1].starts_with("refused") && lines[1].contains("new"));
        assert!(lines[1].ends_with("trojan://b@a.test:443"));
    }

    #[test]
    fn empty_report_renders_nothing() {
        assert_eq!(render(&report(Vec::new()), OutputFormat::Jsonl), "");
        assert_eq!(render(&report(Vec::new()), OutputFormat::Text), "");
    }

    #[test]
    fn history_text() {
        let rec = StoredReliability {
            fingerprint: Fingerprint::digest(b"x"),
            record: ReliabilityRecord { successes: 3, failures: 1, last_latency_ms: Some(9.0), last_tested: 0 },
            score: Some(0.75),
        };
        let mut buf = Vec::new();
        write_history(&mut buf, &[rec], OutputFormat::Text).unwrap();
        let out = String::from_utf8(buf).unwrap();
        assert!(out.contains("0.75") && out.contains("1970-01-01T00:00:00Z"), "{out}");
    }

    #[test]
    fn unrecognized_fingerprint_row() {
        let rows = [FingerprintRow { raw: "ftp://x".into(), protocol: None, fingerprint: None, canonical: None, error: None }];
        let mut buf = Vec::new();
        write_fingerprints(&mut buf, &rows, OutputFormat::Text).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "unrecognized: ftp://x\n");
    }

    #[test]
    fn rfc3339_of_epoch() {
        assert_eq!(rfc3339(0), "1970-01-01T00:00:00Z");
    }
}
