use std::time::Duration;

use smartmodel_core::error::ClientError;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Connection settings for an OpenAI-compatible chat completions API.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Read configuration from environment variables.
    ///
    /// - `SMARTMODEL_API_KEY` (required)
    /// - `SMARTMODEL_MODEL` (optional, defaults to `gpt-4o-mini`)
    /// - `SMARTMODEL_BASE_URL` (optional, defaults to the OpenAI API)
    /// - `SMARTMODEL_TIMEOUT_SECS` (optional, defaults to 120)
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ClientError> {
        let api_key = lookup("SMARTMODEL_API_KEY").ok_or_else(|| {
            ClientError::Config("SMARTMODEL_API_KEY not set. Required for OpenAI requests.".into())
        })?;

        Ok(Self {
            api_key,
            model: lookup("SMARTMODEL_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            base_url: lookup("SMARTMODEL_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            timeout: parse_timeout("SMARTMODEL_TIMEOUT_SECS", lookup("SMARTMODEL_TIMEOUT_SECS"))?,
        })
    }
}

/// Connection settings for an Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub host: String,
    pub model: String,
    pub timeout: Duration,
}

impl OllamaConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            host: DEFAULT_OLLAMA_HOST.to_string(),
            model: model.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Read configuration from environment variables.
    ///
    /// - `OLLAMA_HOST` (optional, defaults to `http://localhost:11434`)
    /// - `OLLAMA_MODEL` (optional, defaults to `llama3`)
    /// - `SMARTMODEL_TIMEOUT_SECS` (optional, defaults to 120)
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ClientError> {
        Ok(Self {
            host: lookup("OLLAMA_HOST").unwrap_or_else(|| DEFAULT_OLLAMA_HOST.to_string()),
            model: lookup("OLLAMA_MODEL").unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string()),
            timeout: parse_timeout("SMARTMODEL_TIMEOUT_SECS", lookup("SMARTMODEL_TIMEOUT_SECS"))?,
        })
    }
}

fn parse_timeout(key: &str, raw: Option<String>) -> Result<Duration, ClientError> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_TIMEOUT);
    };
    let secs: u64 = raw.trim().parse().map_err(|_| {
        ClientError::Config(format!(
            "Invalid {key} '{raw}': must be a positive integer"
        ))
    })?;
    if secs == 0 {
        return Err(ClientError::Config(format!("{key} must be at least 1")));
    }
    Ok(Duration::from_secs(secs))
}
