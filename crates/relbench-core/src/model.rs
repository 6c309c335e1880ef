use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Everything one pipeline execution needs. Loaded from YAML and snapshotted
/// verbatim into the run record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSettings {
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default)]
    pub reasoning_enabled: bool,
    #[serde(default = "default_llm_timeout_ms")]
    pub llm_timeout_ms: Option<u64>,

    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default, skip_serializing)]
    pub api_token: Option<String>,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub top_k: Option<u32>,
    #[serde(default)]
    pub repetition_penalty: Option<f32>,

    #[serde(default)]
    pub max_text_chars: Option<usize>,
    #[serde(default = "default_commit_every")]
    pub commit_every: u32,
    #[serde(default)]
    pub start_qrel: Option<i64>,
    #[serde(default)]
    pub end_qrel: Option<i64>,
    #[serde(default)]
    pub limit_qrels: Option<i64>,
    #[serde(default)]
    pub official: bool,
    #[serde(default)]
    pub user_notes: Option<String>,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default = "default_data_db")]
    pub data_db: PathBuf,
    #[serde(default = "default_audit_db")]
    pub audit_db: PathBuf,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            model: default_model(),
            temperature: 0.0,
            reasoning_enabled: false,
            llm_timeout_ms: default_llm_timeout_ms(),
            endpoint_url: None,
            api_token: None,
            max_new_tokens: default_max_new_tokens(),
            top_p: None,
            top_k: None,
            repetition_penalty: None,
            max_text_chars: None,
            commit_every: default_commit_every(),
            start_qrel: None,
            end_qrel: None,
            limit_qrels: None,
            official: false,
            user_notes: None,
            retry: RetryPolicy::default(),
            data_db: default_data_db(),
            audit_db: default_audit_db(),
        }
    }
}

impl RunSettings {
    /// Read timeout for a single provider call. `None` means unbounded.
    pub fn read_timeout(&self) -> Option<std::time::Duration> {
        self.llm_timeout_ms
            .filter(|ms| *ms > 0)
            .map(std::time::Duration::from_millis)
    }
}

fn default_model() -> String {
    "deepseek-r1:14b".to_string()
}

fn default_llm_timeout_ms() -> Option<u64> {
    Some(120_000)
}

fn default_max_new_tokens() -> u32 {
    256
}

fn default_commit_every() -> u32 {
    5
}

fn default_data_db() -> PathBuf {
    PathBuf::from("data/qrels.db")
}

fn default_audit_db() -> PathBuf {
    PathBuf::from(".relbench/audit.db")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Ollama,
    HfHub,
    HfEndpoint,
    #[serde(rename = "openai")]
    OpenAi,
    Fake,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::HfHub => "hf_hub",
            ProviderKind::HfEndpoint => "hf_endpoint",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Fake => "fake",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            attempts: default_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_attempts() -> u32 {
    2
}

fn default_backoff_ms() -> u64 {
    50
}

/// One judged (query, document) pair from the dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrelRow {
    pub query_id: String,
    pub query_text: String,
    pub doc_id: String,
    pub doc_text: String,
    pub gold_score: i64,
}

/// Where the code that produced a run came from. Every field is best effort.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub git_commit: Option<String>,
    pub git_branch: Option<String>,
    pub git_dirty: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    Timeout,
    Transport,
    HttpStatus,
    MalformedResponse,
    BoundaryFault,
}

/// What a provider actually said, kept verbatim for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawResponse {
    pub provider: String,
    /// Provider-specific body, opaque to everything but the adapter.
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub response_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ProviderErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl RawResponse {
    pub fn is_timeout(&self) -> bool {
        self.error == Some(ProviderErrorKind::Timeout)
    }
}

/// Outcome of one provider call (or of a whole retry sequence).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResult {
    pub score: Option<u8>,
    pub reason: Option<String>,
    pub raw: RawResponse,
    pub elapsed_ms: u64,
}

impl ProviderResult {
    /// Builds a result from model text, running it through the response parser.
    pub fn from_text(
        provider: &str,
        payload: serde_json::Value,
        text: String,
        elapsed_ms: u64,
    ) -> Self {
        let (score, reason) = crate::judge::parse::parse_score_and_reason(&text);
        Self {
            score,
            reason,
            raw: RawResponse {
                provider: provider.to_string(),
                payload,
                response_text: Some(text),
                error: None,
                error_message: None,
            },
            elapsed_ms,
        }
    }

    pub fn failure(
        provider: &str,
        kind: ProviderErrorKind,
        message: impl Into<String>,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            score: None,
            reason: None,
            raw: RawResponse {
                provider: provider.to_string(),
                payload: serde_json::Value::Null,
                response_text: None,
                error: Some(kind),
                error_message: Some(message.into()),
            },
            elapsed_ms,
        }
    }

    pub fn classify(&self) -> Option<FailureClass> {
        if self.score.is_some() {
            None
        } else if self.raw.is_timeout() {
            Some(FailureClass::Timeout)
        } else {
            Some(FailureClass::NoPrediction)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Timeout,
    NoPrediction,
}
