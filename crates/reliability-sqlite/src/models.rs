use serde::{Deserialize, Serialize};
use sift_core::{Fingerprint, ReliabilityRecord};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    pub run_id: Uuid,
    pub started_at: i64,
    pub tool_version: String,
    pub config_json: String,
}

/// Per-stage attrition written when a run completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub input: u64,
    pub kept: u64,
    pub probed: u64,
    pub reachable: u64,
    pub warnings: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    pub tool_version: String,
    pub counts: RunCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredReliability {
    pub fingerprint: Fingerprint,
    #[serde(flatten)]
    pub record: ReliabilityRecord,
    pub score: Option<f64>,
}
