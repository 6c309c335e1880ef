use super::{elapsed_ms, http_client, send_json, JudgeClient};
use crate::context::RunContext;
use crate::model::{ProviderErrorKind, ProviderResult, RunSettings};
use async_trait::async_trait;
use serde_json::json;
use std::time::Instant;
use tokio::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";
const PROVIDER: &str = "ollama";

pub struct OllamaClient {
    pub model: String,
    pub temperature: f32,
    pub base_url: String,
    pub client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(settings: &RunSettings) -> anyhow::Result<Self> {
        Ok(Self {
            model: settings.model.clone(),
            temperature: settings.temperature,
            base_url: settings
                .endpoint_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            client: http_client(settings)?,
        })
    }

    async fn has_model(&self) -> bool {
        let url = format!("{}/api/show", self.base_url);
        match self
            .client
            .post(url)
            .json(&json!({ "model": self.model }))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    async fn pull_model(&self) -> anyhow::Result<()> {
        let url = format!("{}/api/pull", self.base_url);
        let resp = self
            .client
            .post(url)
            .json(&json!({ "model": self.model, "stream": false }))
            .send()
            .await?;
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("ollama pull of '{}' failed: {}", self.model, body);
        }
        Ok(())
    }
}

#[async_trait]
impl JudgeClient for OllamaClient {
    async fn judge_once(&self, prompt: &str) -> ProviderResult {
        let t0 = Instant::now();
        let url = format!("{}/api/generate", self.base_url);
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "options": { "temperature": self.temperature },
            "stream": false,
        });

        let data = match send_json(PROVIDER, self.client.post(url).json(&body), t0).await {
            Ok(data) => data,
            Err(failure) => return failure,
        };

        let text = match data.get("response") {
            Some(serde_json::Value::String(text)) => Some(text.clone()),
            Some(serde_json::Value::Null) | None => Some(String::new()),
            Some(_) => None,
        };

        match text {
            Some(text) => ProviderResult::from_text(PROVIDER, data, text, elapsed_ms(t0)),
            None => {
                let mut failure = ProviderResult::failure(
                    PROVIDER,
                    ProviderErrorKind::MalformedResponse,
                    "'response' is not a string",
                    elapsed_ms(t0),
                );
                failure.raw.payload = data;
                failure
            }
        }
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }

    fn model_label(&self) -> String {
        format!("{}:{}", PROVIDER, self.model)
    }

    async fn prepare(&self, ctx: &RunContext) -> anyhow::Result<()> {
        if self.has_model().await {
            tracing::debug!(parent: ctx.span(), model = %self.model, "ollama model present");
            return Ok(());
        }
        tracing::info!(
            parent: ctx.span(),
            event = "ollama_pull",
            model = %self.model,
            "pulling Ollama model"
        );

        let mut last_err = None;
        for attempt in 1..=3 {
            match self.pull_model().await {
                Ok(()) if self.has_model().await => return Ok(()),
                Ok(()) => last_err = Some(anyhow::anyhow!("model still missing after pull")),
                Err(e) => last_err = Some(e),
            }
            tracing::warn!(
                parent: ctx.span(),
                event = "ollama_pull_retry",
                attempt,
                error = ?last_err,
                "ollama pull did not succeed"
            );
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        Err(last_err
            .unwrap_or_else(|| anyhow::anyhow!("unknown error"))
            .context(format!("ollama pull failed for model '{}'", self.model)))
    }
}
