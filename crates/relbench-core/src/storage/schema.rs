pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS runs (
  run_key TEXT PRIMARY KEY
    CHECK (length(run_key) = 12 AND run_key NOT GLOB '*[^ABCDEFGHJKMNPQRSTVWXYZ23456789]*'),
  created_at TEXT NOT NULL,
  provider TEXT NOT NULL,
  model TEXT NOT NULL,
  runner TEXT NOT NULL,
  data_source TEXT NOT NULL,
  temperature REAL NOT NULL,
  reasoning_enabled INTEGER NOT NULL,
  max_text_chars INTEGER,
  commit_every INTEGER NOT NULL,
  start_qrel INTEGER,
  end_qrel INTEGER,
  limit_qrels INTEGER,
  effective_start INTEGER NOT NULL,
  effective_end INTEGER NOT NULL,
  total_available INTEGER NOT NULL,
  processed_target INTEGER NOT NULL,
  retry_enabled INTEGER NOT NULL,
  retry_attempts INTEGER NOT NULL,
  retry_backoff_ms INTEGER NOT NULL,
  official INTEGER NOT NULL DEFAULT 0,
  user_notes TEXT,
  prompt_template TEXT NOT NULL,
  prompt_hash TEXT NOT NULL,
  git_commit TEXT,
  git_branch TEXT,
  git_dirty INTEGER,
  config_json TEXT NOT NULL,
  finished INTEGER NOT NULL DEFAULT 0,
  finished_at TEXT,
  invalid_pct REAL
);

CREATE TABLE IF NOT EXISTS predictions (
  run_key TEXT NOT NULL REFERENCES runs(run_key) ON DELETE CASCADE,
  idx INTEGER NOT NULL CHECK (idx >= 1),
  query_id TEXT NOT NULL,
  doc_id TEXT NOT NULL,
  gold_score INTEGER NOT NULL,
  predicted_score INTEGER CHECK (predicted_score IS NULL OR predicted_score BETWEEN 0 AND 3),
  predicted_reason TEXT,
  is_correct INTEGER CHECK ((predicted_score IS NULL) = (is_correct IS NULL)),
  elapsed_ms INTEGER NOT NULL,
  raw_json TEXT NOT NULL,
  created_at TEXT NOT NULL,
  PRIMARY KEY (run_key, idx)
);

CREATE TRIGGER IF NOT EXISTS predictions_append_only
BEFORE UPDATE ON predictions
BEGIN
  SELECT RAISE(ABORT, 'predictions are append-only');
END;

CREATE TRIGGER IF NOT EXISTS predictions_sequential_idx
BEFORE INSERT ON predictions
WHEN NEW.idx != (SELECT COALESCE(MAX(idx), 0) + 1 FROM predictions WHERE run_key = NEW.run_key)
BEGIN
  SELECT RAISE(ABORT, 'prediction idx must be gap-free and increasing');
END;

CREATE TRIGGER IF NOT EXISTS predictions_run_open
BEFORE INSERT ON predictions
WHEN (SELECT finished FROM runs WHERE run_key = NEW.run_key) = 1
BEGIN
  SELECT RAISE(ABORT, 'run is finished');
END;

CREATE TRIGGER IF NOT EXISTS runs_finished_immutable
BEFORE UPDATE ON runs
WHEN OLD.finished = 1
BEGIN
  SELECT RAISE(ABORT, 'finished runs are immutable');
END;
"#;
