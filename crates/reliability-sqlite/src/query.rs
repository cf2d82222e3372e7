use anyhow::{anyhow, Result};
use rusqlite::{params, Row};
use sift_core::{Fingerprint, ReliabilityRecord};

use crate::{RunCounts, RunRecord, SqliteStore, StoredReliability};

pub(crate) fn record_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<ReliabilityRecord> {
    Ok(ReliabilityRecord {
        successes: row.get::<_, i64>(offset)?.max(0) as u64,
        failures: row.get::<_, i64>(offset + 1)?.max(0) as u64,
        last_latency_ms: row.get(offset + 2)?,
        last_tested: row.get(offset + 3)?,
    })
}

impl SqliteStore {
    pub fn table_exists(&self, name: &str) -> Result<bool> {
        let cnt: i64 = self.conn().query_row(
            "SELECT COUNT(1) FROM sqlite_master WHERE type='table' AND name=?",
            [name],
            |r| r.get(0),
        )?;
        Ok(cnt > 0)
    }

    /// Most recently tested endpoints first.
    pub fn history(&self, limit: usize) -> Result<Vec<StoredReliability>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT fingerprint, successes, failures, last_latency_ms, last_tested FROM reliability
             ORDER BY last_tested DESC, fingerprint LIMIT ?",
        )?;
        let rows = stmt.query_map(params![limit as i64], |r| Ok((r.get::<_, String>(0)?, record_from_row(r, 1)?)))?;
        let mut out = Vec::new();
        for row in rows {
            let (hex, record) = row?;
            let fingerprint: Fingerprint = hex.parse().map_err(|e| anyhow!("corrupt fingerprint {hex:?}: {e}"))?;
            let score = record.score();
            out.push(StoredReliability { fingerprint, record, score });
        }
        Ok(out)
    }

    pub fn runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT run_id, started_at, finished_at, tool_version, input_count, kept_count, probed_count, reachable_count, warning_count
             FROM runs ORDER BY started_at DESC, run_id DESC LIMIT ?",
        )?;
        let count = |r: &Row<'_>, i: usize| -> rusqlite::Result<u64> { Ok(r.get::<_, Option<i64>>(i)?.unwrap_or(0).max(0) as u64) };
        let rows = stmt.query_map(params![limit as i64], |r| {
            Ok(RunRecord {
                run_id: r.get(0)?,
                started_at: r.get(1)?,
                finished_at: r.get(2)?,
                tool_version: r.get(3)?,
                counts: RunCounts {
                    input: count(r, 4)?,
                    kept: count(r, 5)?,
                    probed: count(r, 6)?,
                    reachable: count(r, 7)?,
                    warnings: count(r, 8)?,
                },
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}
