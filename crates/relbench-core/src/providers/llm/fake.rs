use super::JudgeClient;
use crate::context::RunContext;
use crate::model::{ProviderErrorKind, ProviderResult};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

const PROVIDER: &str = "fake";

#[derive(Debug, Clone)]
pub enum FakeReply {
    Text { text: String, elapsed_ms: u64 },
    Timeout { elapsed_ms: u64 },
    /// Answers `text` after actually sleeping for `delay_ms`.
    Delayed { text: String, delay_ms: u64 },
    /// Simulates a provider that breaks the no-fault contract.
    Panic(String),
}

impl FakeReply {
    pub fn text(text: impl Into<String>) -> Self {
        FakeReply::Text {
            text: text.into(),
            elapsed_ms: 1,
        }
    }

    pub fn score(score: u8) -> Self {
        Self::text(format!(r#"{{"score": {}}}"#, score))
    }
}

/// In-process provider: replays a script, then a fixed reply forever.
pub struct FakeClient {
    script: Mutex<VecDeque<FakeReply>>,
    fallback: FakeReply,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    prepared_for: Mutex<Vec<String>>,
}

impl FakeClient {
    pub fn constant(text: &str) -> Self {
        Self::scripted(Vec::new(), FakeReply::text(text))
    }

    pub fn scripted(script: Vec<FakeReply>, fallback: FakeReply) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            prepared_for: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// Labels of the run contexts `prepare` was called with.
    pub fn prepared_for(&self) -> Vec<String> {
        self.prepared_for
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    fn next_reply(&self) -> FakeReply {
        self.script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl JudgeClient for FakeClient {
    async fn judge_once(&self, prompt: &str) -> ProviderResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut p) = self.prompts.lock() {
            p.push(prompt.to_string());
        }

        match self.next_reply() {
            FakeReply::Text { text, elapsed_ms } => ProviderResult::from_text(
                PROVIDER,
                serde_json::json!({ "scripted": true }),
                text,
                elapsed_ms,
            ),
            FakeReply::Timeout { elapsed_ms } => ProviderResult::failure(
                PROVIDER,
                ProviderErrorKind::Timeout,
                "scripted timeout",
                elapsed_ms,
            ),
            FakeReply::Delayed { text, delay_ms } => {
                tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                ProviderResult::from_text(
                    PROVIDER,
                    serde_json::json!({ "scripted": true }),
                    text,
                    delay_ms,
                )
            }
            FakeReply::Panic(msg) => panic!("{}", msg),
        }
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }

    fn model_label(&self) -> String {
        format!("{}:scripted", PROVIDER)
    }

    async fn prepare(&self, ctx: &RunContext) -> anyhow::Result<()> {
        tracing::debug!(parent: ctx.span(), "fake provider ready");
        if let Ok(mut p) = self.prepared_for.lock() {
            p.push(ctx.label().to_string());
        }
        Ok(())
    }
}
