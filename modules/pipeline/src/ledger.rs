use reliability_sqlite::{RunMeta, SqliteStore};
use sift_core::{PipelineConfig, StoreError};
use uuid::Uuid;

use crate::RunReport;

/// Where run start/finish rows go. Failures only ever become warnings.
pub trait RunLedger: Send + Sync {
    fn begin(&self, run_id: Uuid, started_at: i64, config: &PipelineConfig) -> Result<(), StoreError>;

    fn finish(&self, report: &RunReport) -> Result<(), StoreError>;
}

impl RunLedger for SqliteStore {
    fn begin(&self, run_id: Uuid, started_at: i64, config: &PipelineConfig) -> Result<(), StoreError> {
        let config_json = serde_json::to_string(config).map_err(|e| StoreError::Backend(e.to_string()))?;
        let meta = RunMeta { run_id, started_at, tool_version: sift_core::version().to_string(), config_json };
        self.begin_run(&meta).map(|_| ()).map_err(|e| StoreError::Backend(format!("{e:#}")))
    }

    fn finish(&self, report: &RunReport) -> Result<(), StoreError> {
        self.finish_run(&report.run_id, report.finished_at, &report.counts())
            .map_err(|e| StoreError::Backend(format!("{e:#}")))
    }
}
