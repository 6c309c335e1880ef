use super::run_key::allocate_run_key;
use crate::context::RunContext;
use crate::errors::StoreError;
use crate::model::{Provenance, RawResponse, RunSettings};
use crate::window::QrelWindow;
use anyhow::Context;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

pub const MAX_KEY_ATTEMPTS: u32 = 5;

/// Audit trail of runs and their predictions.
///
/// Every write is its own short transaction, so several runs (each with its
/// own `Store`) can share one database file.
#[derive(Clone)]
pub struct Store {
    pub conn: Arc<Mutex<Connection>>,
}

/// Everything recorded about a run when it starts.
#[derive(Debug, Clone)]
pub struct RunManifest {
    pub settings: RunSettings,
    pub model_label: String,
    pub runner: String,
    pub data_source: String,
    pub prompt_template: String,
    pub prompt_hash: String,
    pub window: QrelWindow,
    pub total_available: u64,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub idx: u64,
    pub query_id: String,
    pub doc_id: String,
    pub gold_score: i64,
    pub predicted_score: Option<u8>,
    pub predicted_reason: Option<String>,
    pub is_correct: Option<bool>,
    pub elapsed_ms: u64,
    pub raw: RawResponse,
}

#[derive(Debug, Clone)]
pub struct RunRecord {
    pub run_key: String,
    pub created_at: String,
    pub provider: String,
    pub model: String,
    pub official: bool,
    pub processed_target: u64,
    pub prompt_hash: String,
    pub git_commit: Option<String>,
    pub config: serde_json::Value,
    pub finished: bool,
    pub finished_at: Option<String>,
    pub invalid_pct: Option<f64>,
}

impl Store {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open audit db {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite db")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> anyhow::Result<Self> {
        // in-memory databases answer "memory" and stay that way
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |r| r.get(0))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(super::schema::DDL)?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    pub fn start_run(&self, ctx: &RunContext, manifest: &RunManifest) -> anyhow::Result<String> {
        self.start_run_with(ctx, manifest, allocate_run_key)
    }

    /// Inserts the run under a fresh key, drawing a new one from `keygen` on
    /// every primary-key collision.
    pub fn start_run_with(
        &self,
        ctx: &RunContext,
        manifest: &RunManifest,
        mut keygen: impl FnMut() -> String,
    ) -> anyhow::Result<String> {
        let config_json = serde_json::to_string(&manifest.settings)?;
        let created_at = now_rfc3339();
        let mut conn = self.lock()?;

        for attempt in 1..=MAX_KEY_ATTEMPTS {
            let key = keygen();
            let tx = conn.transaction()?;
            match insert_run(&tx, &key, &created_at, manifest, &config_json) {
                Ok(()) => {
                    tx.commit()?;
                    tracing::info!(
                        parent: ctx.span(),
                        event = "run_started",
                        run_key = %key,
                        model = %manifest.model_label,
                        processed_target = manifest.window.processed_target,
                        "run started"
                    );
                    return Ok(key);
                }
                Err(e) if is_primary_key_conflict(&e) => {
                    tracing::warn!(
                        parent: ctx.span(),
                        event = "run_key_collision",
                        attempt,
                        "run key already taken, drawing a new one"
                    );
                }
                Err(e) => return Err(anyhow::Error::new(e).context("failed to insert run")),
            }
        }

        Err(StoreError::KeyAllocationExhausted {
            attempts: MAX_KEY_ATTEMPTS,
        }
        .into())
    }

    pub fn insert_prediction(
        &self,
        ctx: &RunContext,
        run_key: &str,
        p: &Prediction,
    ) -> anyhow::Result<()> {
        self.insert_predictions(ctx, run_key, std::slice::from_ref(p))
    }

    /// Writes a batch of predictions in one short transaction. Either every
    /// row of the batch lands or none does.
    pub fn insert_predictions(
        &self,
        ctx: &RunContext,
        run_key: &str,
        batch: &[Prediction],
    ) -> anyhow::Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let created_at = now_rfc3339();
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO predictions(run_key, idx, query_id, doc_id, gold_score, predicted_score,
                                         predicted_reason, is_correct, elapsed_ms, raw_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for p in batch {
                stmt.execute(params![
                    run_key,
                    p.idx as i64,
                    p.query_id,
                    p.doc_id,
                    p.gold_score,
                    p.predicted_score,
                    p.predicted_reason,
                    p.is_correct,
                    p.elapsed_ms as i64,
                    serde_json::to_string(&p.raw)?,
                    created_at,
                ])
                .with_context(|| {
                    format!("failed to insert prediction {} for run {}", p.idx, run_key)
                })?;
            }
        }
        tx.commit()?;
        tracing::debug!(
            parent: ctx.span(),
            first_idx = batch[0].idx,
            rows = batch.len(),
            "predictions committed"
        );
        Ok(())
    }

    /// Computes the invalid-prediction percentage and marks the run
    /// finished. Returns the percentage.
    pub fn finalize_run(&self, ctx: &RunContext, run_key: &str) -> anyhow::Result<f64> {
        let conn = self.lock()?;

        let finished: Option<bool> = conn
            .query_row(
                "SELECT finished FROM runs WHERE run_key = ?1",
                params![run_key],
                |r| r.get(0),
            )
            .optional()?;
        match finished {
            None => {
                return Err(StoreError::UnknownRun {
                    run_key: run_key.to_string(),
                }
                .into())
            }
            Some(true) => {
                return Err(StoreError::AlreadyFinalized {
                    run_key: run_key.to_string(),
                }
                .into())
            }
            Some(false) => {}
        }

        let (total, invalid): (i64, Option<i64>) = conn.query_row(
            "SELECT COUNT(*), SUM(CASE WHEN predicted_score IS NULL THEN 1 ELSE 0 END)
             FROM predictions WHERE run_key = ?1",
            params![run_key],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        let invalid_pct = invalid_percentage(total, invalid.unwrap_or(0));

        let changed = conn.execute(
            "UPDATE runs SET finished = 1, finished_at = ?1, invalid_pct = ?2
             WHERE run_key = ?3 AND finished = 0",
            params![now_rfc3339(), invalid_pct, run_key],
        )?;
        if changed == 0 {
            return Err(StoreError::AlreadyFinalized {
                run_key: run_key.to_string(),
            }
            .into());
        }

        tracing::info!(
            parent: ctx.span(),
            event = "run_finalized",
            run_key = %run_key,
            predictions = total,
            invalid_pct,
            "run finalized"
        );
        Ok(invalid_pct)
    }

    pub fn get_run(&self, run_key: &str) -> anyhow::Result<Option<RunRecord>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT run_key, created_at, provider, model, official, processed_target,
                        prompt_hash, git_commit, config_json, finished, finished_at, invalid_pct
                 FROM runs WHERE run_key = ?1",
                params![run_key],
                |r| {
                    Ok((
                        RunRecord {
                            run_key: r.get(0)?,
                            created_at: r.get(1)?,
                            provider: r.get(2)?,
                            model: r.get(3)?,
                            official: r.get(4)?,
                            processed_target: r.get::<_, i64>(5)?.max(0) as u64,
                            prompt_hash: r.get(6)?,
                            git_commit: r.get(7)?,
                            config: serde_json::Value::Null,
                            finished: r.get(9)?,
                            finished_at: r.get(10)?,
                            invalid_pct: r.get(11)?,
                        },
                        r.get::<_, String>(8)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((mut rec, config_json)) => {
                rec.config = serde_json::from_str(&config_json)
                    .with_context(|| format!("corrupt config_json for run {}", run_key))?;
                Ok(Some(rec))
            }
            None => Ok(None),
        }
    }

    /// Predictions of a run in `idx` order.
    pub fn predictions(&self, run_key: &str) -> anyhow::Result<Vec<Prediction>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT idx, query_id, doc_id, gold_score, predicted_score, predicted_reason,
                    is_correct, elapsed_ms, raw_json
             FROM predictions WHERE run_key = ?1 ORDER BY idx",
        )?;
        let rows = stmt.query_map(params![run_key], |r| {
            Ok((
                Prediction {
                    idx: r.get::<_, i64>(0)? as u64,
                    query_id: r.get(1)?,
                    doc_id: r.get(2)?,
                    gold_score: r.get(3)?,
                    predicted_score: r.get(4)?,
                    predicted_reason: r.get(5)?,
                    is_correct: r.get(6)?,
                    elapsed_ms: r.get::<_, i64>(7)? as u64,
                    raw: RawResponse {
                        provider: String::new(),
                        payload: serde_json::Value::Null,
                        response_text: None,
                        error: None,
                        error_message: None,
                    },
                },
                r.get::<_, String>(8)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (mut p, raw_json) = row?;
            p.raw = serde_json::from_str(&raw_json)
                .with_context(|| format!("corrupt raw_json for prediction {}", p.idx))?;
            out.push(p);
        }
        Ok(out)
    }
}

fn insert_run(
    conn: &Connection,
    key: &str,
    created_at: &str,
    m: &RunManifest,
    config_json: &str,
) -> Result<(), rusqlite::Error> {
    let s = &m.settings;
    conn.execute(
        "INSERT INTO runs(run_key, created_at, provider, model, runner, data_source,
                          temperature, reasoning_enabled, max_text_chars, commit_every,
                          start_qrel, end_qrel, limit_qrels, effective_start, effective_end,
                          total_available, processed_target, retry_enabled, retry_attempts,
                          retry_backoff_ms, official, user_notes, prompt_template, prompt_hash,
                          git_commit, git_branch, git_dirty, config_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                 ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28)",
        params![
            key,
            created_at,
            s.provider.as_str(),
            m.model_label,
            m.runner,
            m.data_source,
            s.temperature as f64,
            s.reasoning_enabled,
            s.max_text_chars.map(|v| v as i64),
            s.commit_every,
            s.start_qrel,
            s.end_qrel,
            s.limit_qrels,
            m.window.start_1b as i64,
            m.window.end_1b as i64,
            m.total_available as i64,
            m.window.processed_target as i64,
            s.retry.enabled,
            s.retry.attempts,
            s.retry.backoff_ms as i64,
            s.official,
            s.user_notes,
            m.prompt_template,
            m.prompt_hash,
            m.provenance.git_commit,
            m.provenance.git_branch,
            m.provenance.git_dirty,
            config_json,
        ],
    )?;
    Ok(())
}

fn is_primary_key_conflict(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == ErrorCode::ConstraintViolation
                && err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

pub(crate) fn invalid_percentage(total: i64, invalid: i64) -> f64 {
    if total <= 0 {
        0.0
    } else {
        invalid as f64 * 100.0 / total as f64
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_percentage_guards_empty_runs() {
        assert_eq!(invalid_percentage(0, 0), 0.0);
        assert_eq!(invalid_percentage(10, 3), 30.0);
        assert_eq!(invalid_percentage(4, 4), 100.0);
    }
}
