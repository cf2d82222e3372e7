use anyhow::Result;
use rusqlite::{params, Connection};
use sift_core::reliability::AggregatedUpdate;
use sift_core::Fingerprint;
use uuid::Uuid;

use crate::{RunCounts, RunMeta, SqliteStore};

const UPSERT_RELIABILITY: &str = "INSERT INTO reliability(fingerprint,successes,failures,last_latency_ms,last_tested) VALUES (?,?,?,?,?)
     ON CONFLICT(fingerprint) DO UPDATE SET
       successes = successes + excluded.successes,
       failures = failures + excluded.failures,
       last_latency_ms = CASE WHEN excluded.last_tested >= last_tested THEN excluded.last_latency_ms ELSE last_latency_ms END,
       last_tested = MAX(last_tested, excluded.last_tested)";

/// Add one fingerprint's delta in a single statement.
pub(crate) fn upsert_reliability(conn: &Connection, fp: &Fingerprint, agg: &AggregatedUpdate) -> rusqlite::Result<()> {
    conn.prepare_cached(UPSERT_RELIABILITY)?.execute(params![
        fp.to_hex(),
        agg.successes as i64,
        agg.failures as i64,
        agg.last_latency_ms,
        agg.last_tested
    ])?;
    Ok(())
}

impl SqliteStore {
    pub fn begin_run(&self, meta: &RunMeta) -> Result<Uuid> {
        self.conn().execute(
            "INSERT INTO runs(run_id, started_at, tool_version, config_json) VALUES (?,?,?,?)",
            params![meta.run_id.to_string(), meta.started_at, meta.tool_version, meta.config_json],
        )?;
        Ok(meta.run_id)
    }

    pub fn finish_run(&self, run_id: &Uuid, finished_at: i64, counts: &RunCounts) -> Result<()> {
        self.conn().execute(
            "UPDATE runs SET finished_at=?, input_count=?, kept_count=?, probed_count=?, reachable_count=?, warning_count=? WHERE run_id=?",
            params![
                finished_at,
                counts.input as i64,
                counts.kept as i64,
                counts.probed as i64,
                counts.reachable as i64,
                counts.warnings as i64,
                run_id.to_string()
            ],
        )?;
        Ok(())
    }
}
