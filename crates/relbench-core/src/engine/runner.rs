use crate::context::RunContext;
use crate::dataset::QrelSource;
use crate::judge::prompt::{build_prompt, choose_template, prompt_hash, truncate_chars};
use crate::judge::retry::call_with_retry;
use crate::model::{ProviderErrorKind, ProviderResult, Provenance, QrelRow, RunSettings};
use crate::providers::llm::JudgeClient;
use crate::report::RunSummary;
use crate::storage::{Prediction, RunManifest, Store};
use crate::window::{compute_window, ensure_official_guard, QrelWindow};
use std::sync::Arc;
use std::time::Instant;

/// Drives one run end to end: plan the window, register the run, judge every
/// row in order, write predictions in batches of `commit_every`, finalize.
pub struct Runner {
    pub store: Store,
    pub source: Arc<dyn QrelSource>,
    pub client: Arc<dyn JudgeClient>,
    pub runner_name: String,
    pub provenance: Provenance,
}

#[derive(Default)]
struct Tally {
    items: u64,
    valid: u64,
    correct: u64,
}

impl Runner {
    pub fn new(store: Store, source: Arc<dyn QrelSource>, client: Arc<dyn JudgeClient>) -> Self {
        Self {
            store,
            source,
            client,
            runner_name: format!("relbench/{}", env!("CARGO_PKG_VERSION")),
            provenance: Provenance::default(),
        }
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    pub async fn run_once(
        &self,
        ctx: &RunContext,
        cfg: &RunSettings,
    ) -> anyhow::Result<RunSummary> {
        let started = Instant::now();

        cfg.validate()?;
        let total = self.source.count()?;
        let window = compute_window(total, cfg.start_qrel, cfg.end_qrel, cfg.limit_qrels);
        ensure_official_guard(cfg.official, &window)?;
        tracing::info!(
            parent: ctx.span(),
            event = "window_planned",
            total,
            start = window.start_1b,
            end = window.end_1b,
            processed_target = window.processed_target,
            is_subset = window.is_subset,
            "window planned"
        );

        self.client.prepare(ctx).await?;

        let template = choose_template(cfg.reasoning_enabled);
        let manifest = RunManifest {
            settings: cfg.clone(),
            model_label: self.client.model_label(),
            runner: self.runner_name.clone(),
            data_source: self.source.describe(),
            prompt_template: template.to_string(),
            prompt_hash: prompt_hash(template),
            window,
            total_available: total,
            provenance: self.provenance.clone(),
        };
        let run_key = self.store.start_run(ctx, &manifest)?;
        let ctx = ctx.with_run_key(&run_key);

        let mut tally = Tally::default();
        if window.processed_target == 0 {
            tracing::info!(parent: ctx.span(), event = "empty_window", "nothing to judge");
        } else {
            let rows = self.source.fetch(window.offset(), window.processed_target)?;
            let judged = self
                .judge_rows(&ctx, cfg, &run_key, &window, template, rows, &mut tally)
                .await;
            if let Err(e) = judged {
                tracing::error!(parent: ctx.span(), event = "run_aborted", error = %e, "run aborted");
                return Err(e);
            }
        }

        let invalid_pct = self.store.finalize_run(&ctx, &run_key)?;

        Ok(RunSummary {
            run_key,
            model_label: manifest.model_label,
            items: tally.items,
            valid: tally.valid,
            correct: tally.correct,
            invalid_pct,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn judge_rows(
        &self,
        ctx: &RunContext,
        cfg: &RunSettings,
        run_key: &str,
        window: &QrelWindow,
        template: &str,
        rows: Vec<QrelRow>,
        tally: &mut Tally,
    ) -> anyhow::Result<()> {
        let batch_size = match cfg.commit_every {
            0 => rows.len().max(1),
            n => n as usize,
        };
        let mut pending: Vec<Prediction> = Vec::with_capacity(batch_size);

        for (i, row) in rows.into_iter().enumerate() {
            let idx = i as u64 + 1;
            let text = truncate_chars(&row.doc_text, cfg.max_text_chars);
            let prompt = build_prompt(template, &row.query_text, text);
            tracing::debug!(parent: ctx.span(), idx, prompt = %prompt, "prompt");

            let result = self.judge_isolated(ctx, cfg, prompt).await;
            tracing::debug!(parent: ctx.span(), idx, raw = ?result.raw, "raw response");

            let is_correct = result.score.map(|s| i64::from(s) == row.gold_score);
            tally.items += 1;
            if result.score.is_some() {
                tally.valid += 1;
            }
            if is_correct == Some(true) {
                tally.correct += 1;
            }

            let status = match is_correct {
                Some(true) => "HIT",
                Some(false) => "MISS",
                None => "N/A",
            };
            let agreement = if tally.valid == 0 {
                0.0
            } else {
                tally.correct as f64 * 100.0 / tally.valid as f64
            };
            tracing::info!(
                parent: ctx.span(),
                event = "item_judged",
                idx,
                of = window.processed_target,
                query_id = %row.query_id,
                doc_id = %row.doc_id,
                gold = row.gold_score,
                pred = ?result.score,
                status,
                elapsed_ms = result.elapsed_ms,
                agreement = %format!("{:.1}%", agreement),
                "[{}/{}] gold={} pred={} {}",
                idx,
                window.processed_target,
                row.gold_score,
                result.score.map_or_else(|| "-".to_string(), |s| s.to_string()),
                status
            );

            let prediction = Prediction {
                idx,
                query_id: row.query_id,
                doc_id: row.doc_id,
                gold_score: row.gold_score,
                predicted_score: result.score,
                predicted_reason: result.reason,
                is_correct,
                elapsed_ms: result.elapsed_ms,
                raw: result.raw,
            };

            // no transaction is held while the provider is being called
            pending.push(prediction);
            if pending.len() >= batch_size {
                self.store.insert_predictions(ctx, run_key, &pending)?;
                pending.clear();
            }
        }
        self.store.insert_predictions(ctx, run_key, &pending)?;
        Ok(())
    }

    /// Runs the retried provider call on its own task so that a fault inside
    /// the adapter becomes a recorded null prediction instead of ending the run.
    async fn judge_isolated(
        &self,
        ctx: &RunContext,
        cfg: &RunSettings,
        prompt: String,
    ) -> ProviderResult {
        let client = self.client.clone();
        let policy = cfg.retry.clone();
        let task_ctx = ctx.clone();
        let provider = self.client.provider_name();
        let started = Instant::now();

        let handle = tokio::spawn(async move {
            call_with_retry(&task_ctx, &policy, || {
                let client = client.clone();
                let prompt = prompt.clone();
                async move { client.judge_once(&prompt).await }
            })
            .await
        });

        match handle.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(
                    parent: ctx.span(),
                    event = "provider_boundary_fault",
                    provider,
                    error = %e,
                    "provider call faulted"
                );
                ProviderResult::failure(
                    provider,
                    ProviderErrorKind::BoundaryFault,
                    e.to_string(),
                    started.elapsed().as_millis() as u64,
                )
            }
        }
    }
}
