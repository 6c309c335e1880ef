use crate::errors::{ConfigError, ValidationError};
use crate::model::{ProviderKind, RunSettings};
use std::collections::BTreeSet;
use std::path::Path;

pub const HF_TOKEN_ENV: &str = "HUGGINGFACE_API_TOKEN";
pub const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";

/// Loads a settings file holding either a single mapping or a sequence of
/// mappings (one per run of a sweep).
pub fn load_config(path: &Path) -> Result<Vec<RunSettings>, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read config {}: {}", path.display(), e)))?;
    parse_config(&raw).map_err(|e| ConfigError(format!("{} (file: {})", e.0, path.display())))
}

pub fn parse_config(raw: &str) -> Result<Vec<RunSettings>, ConfigError> {
    let doc: serde_yaml::Value = serde_yaml::from_str(raw)
        .map_err(|e| ConfigError(format!("failed to parse YAML: {}", e)))?;

    let entries = match doc {
        serde_yaml::Value::Sequence(items) => items,
        serde_yaml::Value::Mapping(_) => vec![doc],
        serde_yaml::Value::Null => {
            return Err(ConfigError("config is empty".into()));
        }
        _ => {
            return Err(ConfigError(
                "config must be a mapping or a sequence of mappings".into(),
            ))
        }
    };
    if entries.is_empty() {
        return Err(ConfigError("config has no runs".into()));
    }

    let mut out = Vec::with_capacity(entries.len());
    for (i, entry) in entries.into_iter().enumerate() {
        let mut ignored = BTreeSet::new();
        let mut settings: RunSettings = serde_ignored::deserialize(entry, |p| {
            ignored.insert(p.to_string());
        })
        .map_err(|e| ConfigError(format!("run #{}: invalid settings: {}", i + 1, e)))?;

        if !ignored.is_empty() {
            tracing::warn!(
                event = "config_unknown_fields",
                run = i + 1,
                fields = ?ignored,
                "ignored unknown config fields"
            );
        }

        apply_env_fallbacks(&mut settings, |k| std::env::var(k).ok());
        out.push(settings);
    }
    Ok(out)
}

/// Fills `api_token` from the environment when the file leaves it unset.
pub fn apply_env_fallbacks(settings: &mut RunSettings, env: impl Fn(&str) -> Option<String>) {
    if settings.api_token.is_some() {
        return;
    }
    let var = match settings.provider {
        ProviderKind::HfHub | ProviderKind::HfEndpoint => HF_TOKEN_ENV,
        ProviderKind::OpenAi => OPENAI_KEY_ENV,
        ProviderKind::Ollama | ProviderKind::Fake => return,
    };
    settings.api_token = env(var).filter(|v| !v.trim().is_empty());
}

impl RunSettings {
    /// Checks everything that can be rejected before touching any storage.
    pub fn validate(&self) -> Result<(), ValidationError> {
        crate::window::validate(self.start_qrel, self.end_qrel, self.limit_qrels)?;

        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(ValidationError(format!(
                "temperature must be a finite non-negative number (got {})",
                self.temperature
            )));
        }
        if self.model.trim().is_empty() {
            return Err(ValidationError("model must not be empty".into()));
        }
        if self.provider == ProviderKind::HfEndpoint
            && self
                .endpoint_url
                .as_deref()
                .map_or(true, |u| u.trim().is_empty())
        {
            return Err(ValidationError(
                "provider 'hf_endpoint' requires endpoint_url".into(),
            ));
        }
        if self.provider == ProviderKind::HfHub
            && self
                .api_token
                .as_deref()
                .map_or(true, |t| t.trim().is_empty())
        {
            return Err(ValidationError(format!(
                "provider 'hf_hub' requires api_token or {}",
                HF_TOKEN_ENV
            )));
        }
        Ok(())
    }
}

pub fn write_sample_config(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError(format!("failed to create {}: {}", parent.display(), e)))?;
    }
    std::fs::write(path, SAMPLE_CONFIG)
        .map_err(|e| ConfigError(format!("failed to write sample config: {}", e)))?;
    Ok(())
}

pub const SAMPLE_CONFIG: &str = r#"# relbench run settings. A sequence of these mappings is a sweep.
provider: ollama
model: deepseek-r1:14b
temperature: 0.0
reasoning_enabled: false
llm_timeout_ms: 120000
max_text_chars: 4000
commit_every: 5
# start_qrel: 1
# end_qrel: 500
limit_qrels: 100
official: false
user_notes: "smoke run"
retry:
  enabled: true
  attempts: 2
  backoff_ms: 50
data_db: data/qrels.db
audit_db: .relbench/audit.db
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn single_mapping_loads_one_run() -> anyhow::Result<()> {
        let mut f = tempfile::NamedTempFile::new()?;
        writeln!(f, "model: llama3\nlimit_qrels: 10\nretry:\n  attempts: 4")?;
        let runs = load_config(f.path())?;
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].model, "llama3");
        assert_eq!(runs[0].limit_qrels, Some(10));
        assert_eq!(runs[0].retry.attempts, 4);
        assert!(runs[0].retry.enabled);
        Ok(())
    }

    #[test]
    fn sequence_loads_a_sweep_in_order() -> anyhow::Result<()> {
        let runs = parse_config(
            "- model: a\n  temperature: 0.2\n- model: b\n  provider: fake\n  unknown_knob: 1\n",
        )?;
        let models: Vec<_> = runs.iter().map(|r| r.model.as_str()).collect();
        assert_eq!(models, vec!["a", "b"]);
        assert_eq!(runs[1].provider, ProviderKind::Fake);
        Ok(())
    }

    #[test]
    fn unreadable_or_malformed_config_is_a_config_error() {
        let err = load_config(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(err.0.contains("failed to read config"));

        assert!(parse_config("model: [unclosed").is_err());
        assert!(parse_config("").is_err());
        assert!(parse_config("[]").is_err());
        assert!(parse_config("42").is_err());
        assert!(parse_config("temperature: warm").is_err());
    }

    #[test]
    fn env_token_fills_only_missing_tokens() {
        let env = |k: &str| (k == HF_TOKEN_ENV).then(|| "hf_abc".to_string());

        let mut s = RunSettings {
            provider: ProviderKind::HfEndpoint,
            ..RunSettings::default()
        };
        apply_env_fallbacks(&mut s, env);
        assert_eq!(s.api_token.as_deref(), Some("hf_abc"));

        let mut explicit = RunSettings {
            provider: ProviderKind::HfEndpoint,
            api_token: Some("mine".into()),
            ..RunSettings::default()
        };
        apply_env_fallbacks(&mut explicit, env);
        assert_eq!(explicit.api_token.as_deref(), Some("mine"));

        let mut ollama = RunSettings::default();
        apply_env_fallbacks(&mut ollama, env);
        assert!(ollama.api_token.is_none());
    }

    #[test]
    fn validate_covers_window_and_provider_rules() {
        assert!(RunSettings::default().validate().is_ok());

        let bad_window = RunSettings {
            start_qrel: Some(5),
            end_qrel: Some(2),
            ..RunSettings::default()
        };
        assert!(bad_window.validate().is_err());

        let hf = RunSettings {
            provider: ProviderKind::HfEndpoint,
            ..RunSettings::default()
        };
        assert!(hf.validate().unwrap_err().0.contains("endpoint_url"));

        let hot = RunSettings {
            temperature: -0.5,
            ..RunSettings::default()
        };
        assert!(hot.validate().is_err());
    }

    #[test]
    fn hf_hub_needs_a_token_from_file_or_env() -> anyhow::Result<()> {
        let mut runs = parse_config("provider: hf_hub\nmodel: deepseek-ai/DeepSeek-R1\n")?;
        let mut hub = runs.remove(0);
        assert_eq!(hub.provider, ProviderKind::HfHub);

        hub.api_token = None;
        assert!(hub.validate().unwrap_err().0.contains(HF_TOKEN_ENV));

        apply_env_fallbacks(&mut hub, |k| (k == HF_TOKEN_ENV).then(|| "hf_xyz".to_string()));
        assert_eq!(hub.api_token.as_deref(), Some("hf_xyz"));
        assert!(hub.validate().is_ok());
        Ok(())
    }

    #[test]
    fn sample_config_parses() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("relbench.yaml");
        write_sample_config(&path)?;
        let runs = load_config(&path)?;
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].limit_qrels, Some(100));
        assert!(runs[0].validate().is_ok());
        Ok(())
    }
}
