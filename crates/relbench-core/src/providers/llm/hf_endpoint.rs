use super::{elapsed_ms, http_client, send_json, JudgeClient};
use crate::model::{ProviderResult, RunSettings};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Instant;

const PROVIDER: &str = "hf_endpoint";

/// Hugging Face Inference Endpoint (text-generation task).
pub struct HfEndpointClient {
    pub endpoint_url: String,
    pub api_token: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_new_tokens: u32,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub repetition_penalty: Option<f32>,
    pub client: reqwest::Client,
}

impl HfEndpointClient {
    pub fn new(settings: &RunSettings) -> anyhow::Result<Self> {
        let endpoint_url = settings.endpoint_url.clone().ok_or_else(|| {
            anyhow::anyhow!("endpoint_url must be set when provider is 'hf_endpoint'")
        })?;
        Ok(Self {
            endpoint_url,
            api_token: settings.api_token.clone(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_new_tokens: settings.max_new_tokens,
            top_p: settings.top_p,
            top_k: settings.top_k,
            repetition_penalty: settings.repetition_penalty,
            client: http_client(settings)?,
        })
    }

    fn request_body(&self, prompt: &str) -> Value {
        let mut params = json!({
            "temperature": self.temperature,
            "max_new_tokens": self.max_new_tokens,
            "return_full_text": false,
        });
        if let Some(top_p) = self.top_p {
            params["top_p"] = json!(top_p);
        }
        if let Some(top_k) = self.top_k {
            params["top_k"] = json!(top_k);
        }
        if let Some(rp) = self.repetition_penalty {
            params["repetition_penalty"] = json!(rp);
        }
        json!({ "inputs": prompt, "parameters": params })
    }
}

/// Pulls generated text out of the handful of shapes endpoints return.
pub fn extract_text(body: &Value) -> String {
    let str_at = |v: &Value, key: &str| v.get(key).and_then(Value::as_str).map(str::to_string);

    if let Some(first) = body.as_array().and_then(|a| a.first()) {
        if let Some(t) = str_at(first, "generated_text").or_else(|| str_at(first, "text")) {
            return t;
        }
    }
    if body.is_object() {
        if let Some(t) = str_at(body, "generated_text").or_else(|| str_at(body, "output_text")) {
            return t;
        }
        if let Some(first) = body
            .get("outputs")
            .and_then(Value::as_array)
            .and_then(|a| a.first())
        {
            if let Some(t) = str_at(first, "content").or_else(|| str_at(first, "generated_text")) {
                return t;
            }
        }
    }
    String::new()
}

#[async_trait]
impl JudgeClient for HfEndpointClient {
    async fn judge_once(&self, prompt: &str) -> ProviderResult {
        let t0 = Instant::now();
        let mut req = self
            .client
            .post(&self.endpoint_url)
            .header("Accept", "application/json")
            .json(&self.request_body(prompt));
        if let Some(token) = &self.api_token {
            req = req.header("Authorization", format!("Bearer {}", token));
        }

        match send_json(PROVIDER, req, t0).await {
            Ok(data) => {
                let text = extract_text(&data);
                ProviderResult::from_text(PROVIDER, data, text, elapsed_ms(t0))
            }
            Err(failure) => failure,
        }
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }

    fn model_label(&self) -> String {
        format!("{}:{}", PROVIDER, self.endpoint_url)
    }
}
