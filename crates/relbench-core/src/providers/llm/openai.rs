use super::{elapsed_ms, http_client, send_json, JudgeClient};
use crate::model::{ProviderErrorKind, ProviderResult, RunSettings};
use async_trait::async_trait;
use serde_json::json;
use std::time::Instant;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
/// OpenAI-compatible router in front of the Hugging Face inference providers.
pub const HF_ROUTER_BASE: &str = "https://router.huggingface.co/v1";

/// Any OpenAI-compatible chat completions endpoint. Also serves `hf_hub`,
/// which is the same protocol behind the Hugging Face router.
pub struct OpenAIClient {
    pub provider: &'static str,
    pub model: String,
    pub api_key: Option<String>,
    pub api_base: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub client: reqwest::Client,
}

impl OpenAIClient {
    pub fn new(settings: &RunSettings) -> anyhow::Result<Self> {
        Self::with_base(settings, "openai", DEFAULT_API_BASE)
    }

    pub fn hf_hub(settings: &RunSettings) -> anyhow::Result<Self> {
        if settings
            .api_token
            .as_deref()
            .map_or(true, |t| t.trim().is_empty())
        {
            anyhow::bail!("HF API token missing. Set api_token or HUGGINGFACE_API_TOKEN.");
        }
        Self::with_base(settings, "hf_hub", HF_ROUTER_BASE)
    }

    fn with_base(
        settings: &RunSettings,
        provider: &'static str,
        default_base: &str,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            provider,
            model: settings.model.clone(),
            api_key: settings.api_token.clone(),
            api_base: settings
                .endpoint_url
                .clone()
                .unwrap_or_else(|| default_base.to_string())
                .trim_end_matches('/')
                .to_string(),
            temperature: settings.temperature,
            max_tokens: settings.max_new_tokens,
            client: http_client(settings)?,
        })
    }
}

#[async_trait]
impl JudgeClient for OpenAIClient {
    async fn judge_once(&self, prompt: &str) -> ProviderResult {
        let t0 = Instant::now();
        let url = format!("{}/chat/completions", self.api_base);

        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let mut req = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let data = match send_json(self.provider, req, t0).await {
            Ok(data) => data,
            Err(failure) => return failure,
        };

        // choices[0].message.content
        let text = data
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        match text {
            Some(text) => ProviderResult::from_text(self.provider, data, text, elapsed_ms(t0)),
            None => {
                let mut failure = ProviderResult::failure(
                    self.provider,
                    ProviderErrorKind::MalformedResponse,
                    "response missing choices[0].message.content",
                    elapsed_ms(t0),
                );
                failure.raw.payload = data;
                failure
            }
        }
    }

    fn provider_name(&self) -> &'static str {
        self.provider
    }

    fn model_label(&self) -> String {
        format!("{}:{}", self.provider, self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProviderKind;

    #[test]
    fn hf_hub_uses_the_router_and_requires_a_token() {
        let settings = RunSettings {
            provider: ProviderKind::HfHub,
            model: "deepseek-ai/DeepSeek-R1-Distill-Qwen-32B".into(),
            ..RunSettings::default()
        };
        let err = OpenAIClient::hf_hub(&settings).err().unwrap();
        assert!(err.to_string().contains("HUGGINGFACE_API_TOKEN"));

        let with_token = RunSettings {
            api_token: Some("hf_abc".into()),
            ..settings
        };
        let client = OpenAIClient::hf_hub(&with_token).unwrap();
        assert_eq!(client.api_base, HF_ROUTER_BASE);
        assert_eq!(client.provider_name(), "hf_hub");
        assert_eq!(
            client.model_label(),
            "hf_hub:deepseek-ai/DeepSeek-R1-Distill-Qwen-32B"
        );
    }

    #[test]
    fn openai_keeps_its_own_base_and_label() {
        let settings = RunSettings {
            provider: ProviderKind::OpenAi,
            model: "gpt-4o-mini".into(),
            endpoint_url: Some("http://localhost:8000/v1/".into()),
            ..RunSettings::default()
        };
        let client = OpenAIClient::new(&settings).unwrap();
        assert_eq!(client.api_base, "http://localhost:8000/v1");
        assert_eq!(client.model_label(), "openai:gpt-4o-mini");
    }
}
