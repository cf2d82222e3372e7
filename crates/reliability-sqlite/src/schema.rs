pub const MIG_0001_INIT: &str = r#"
BEGIN;

CREATE TABLE reliability (
  fingerprint     TEXT PRIMARY KEY CHECK (length(fingerprint) = 32),
  successes       INTEGER NOT NULL DEFAULT 0 CHECK (successes >= 0),
  failures        INTEGER NOT NULL DEFAULT 0 CHECK (failures >= 0),
  last_latency_ms REAL,
  last_tested     INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE runs (
  run_id          TEXT PRIMARY KEY,
  started_at      INTEGER NOT NULL,
  finished_at     INTEGER,
  tool_version    TEXT NOT NULL,
  config_json     TEXT NOT NULL,
  input_count     INTEGER DEFAULT 0,
  kept_count      INTEGER DEFAULT 0,
  probed_count    INTEGER DEFAULT 0,
  reachable_count INTEGER DEFAULT 0,
  warning_count   INTEGER DEFAULT 0
);

CREATE INDEX idx_reliability_tested ON reliability(last_tested);
CREATE INDEX idx_runs_started ON runs(started_at);

COMMIT;
"#
;
