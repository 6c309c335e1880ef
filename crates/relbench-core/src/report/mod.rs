pub mod console;

use serde::Serialize;

/// Outcome of one finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_key: String,
    pub model_label: String,
    pub items: u64,
    pub valid: u64,
    pub correct: u64,
    pub invalid_pct: f64,
    pub elapsed_ms: u64,
}

impl RunSummary {
    /// Share of scored predictions that matched the gold label.
    pub fn agreement_pct(&self) -> f64 {
        if self.valid == 0 {
            0.0
        } else {
            self.correct as f64 * 100.0 / self.valid as f64
        }
    }
}
