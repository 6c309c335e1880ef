use crate::context::RunContext;
use crate::model::{ProviderErrorKind, ProviderKind, ProviderResult, RunSettings};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The provider boundary. One call, one prompt, one result.
///
/// Implementations must not fail: transport errors, timeouts and malformed
/// bodies are reported through `ProviderResult::raw.error` with a null score.
#[async_trait]
pub trait JudgeClient: Send + Sync {
    async fn judge_once(&self, prompt: &str) -> ProviderResult;
    fn provider_name(&self) -> &'static str;
    /// Identity recorded on the run, e.g. `ollama:llama3`.
    fn model_label(&self) -> String;
    /// One-time setup before the first call (model pulls, warmups).
    async fn prepare(&self, _ctx: &RunContext) -> anyhow::Result<()> {
        Ok(())
    }
}

pub mod fake;
pub mod hf_endpoint;
pub mod ollama;
pub mod openai;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub fn build_client(settings: &RunSettings) -> anyhow::Result<Arc<dyn JudgeClient>> {
    let client: Arc<dyn JudgeClient> = match settings.provider {
        ProviderKind::Ollama => Arc::new(ollama::OllamaClient::new(settings)?),
        ProviderKind::HfHub => Arc::new(openai::OpenAIClient::hf_hub(settings)?),
        ProviderKind::HfEndpoint => Arc::new(hf_endpoint::HfEndpointClient::new(settings)?),
        ProviderKind::OpenAi => Arc::new(openai::OpenAIClient::new(settings)?),
        ProviderKind::Fake => Arc::new(fake::FakeClient::constant(
            r#"{"score": 1, "reason": "fake provider"}"#,
        )),
    };
    Ok(client)
}

/// One HTTP session per run: fixed connect timeout, configurable read timeout.
pub(crate) fn http_client(settings: &RunSettings) -> anyhow::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().connect_timeout(CONNECT_TIMEOUT);
    if let Some(read) = settings.read_timeout() {
        builder = builder.timeout(read);
    }
    Ok(builder.build()?)
}

pub(crate) fn elapsed_ms(t0: Instant) -> u64 {
    t0.elapsed().as_millis() as u64
}

/// Maps a transport failure onto the typed marker in the raw record.
pub(crate) fn transport_failure(provider: &str, err: &reqwest::Error, t0: Instant) -> ProviderResult {
    let kind = if err.is_timeout() {
        ProviderErrorKind::Timeout
    } else if err.is_status() {
        ProviderErrorKind::HttpStatus
    } else if err.is_decode() {
        ProviderErrorKind::MalformedResponse
    } else {
        ProviderErrorKind::Transport
    };
    ProviderResult::failure(provider, kind, err.to_string(), elapsed_ms(t0))
}

/// Sends `req` and decodes a JSON body, or returns the failure result.
pub(crate) async fn send_json(
    provider: &str,
    req: reqwest::RequestBuilder,
    t0: Instant,
) -> Result<serde_json::Value, ProviderResult> {
    let resp = req
        .send()
        .await
        .map_err(|e| transport_failure(provider, &e, t0))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ProviderResult::failure(
            provider,
            ProviderErrorKind::HttpStatus,
            format!("{} {}", status.as_u16(), body),
            elapsed_ms(t0),
        ));
    }

    resp.json::<serde_json::Value>()
        .await
        .map_err(|e| transport_failure(provider, &e, t0))
}
