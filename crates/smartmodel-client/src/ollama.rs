use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use smartmodel_core::error::ClientError;
use smartmodel_core::traits::{ModelClient, ResponseMode};

use crate::chat::{self, ChatMessage};
use crate::config::OllamaConfig;

/// Client for a local or remote Ollama server's `/api/chat` endpoint.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    host: String,
    model: String,
    timeout: Duration,
    system_prompt: String,
}

impl OllamaClient {
    pub fn new(model: &str) -> Result<Self, ClientError> {
        Self::from_config(OllamaConfig::new(model))
    }

    pub fn from_config(config: OllamaConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            host: config.host.trim_end_matches('/').to_string(),
            model: config.model,
            timeout: config.timeout,
            system_prompt: String::new(),
        })
    }

    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_config(OllamaConfig::from_env()?)
    }

    pub fn with_base_url(mut self, host: &str) -> Self {
        self.host = host.trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Result<Self, ClientError> {
        let rebuilt = Self::from_config(OllamaConfig {
            host: self.host,
            model: self.model,
            timeout,
        })?;
        Ok(rebuilt.with_system_prompt(self.system_prompt))
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn url(&self) -> String {
        format!("{}/api/chat", self.host)
    }

    fn request<'a>(&'a self, messages: &'a [ChatMessage], mode: ResponseMode) -> OllamaRequest<'a> {
        OllamaRequest {
            model: &self.model,
            messages,
            stream: false,
            format: match mode {
                ResponseMode::Json => Some("json"),
                ResponseMode::Text => None,
            },
        }
    }

    /// Send a full conversation and return the assistant's reply.
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        mode: ResponseMode,
    ) -> Result<String, ClientError> {
        let url = self.url();
        tracing::debug!(model = %self.model, %url, %mode, "Sending Ollama chat");

        let (status_code, body) = chat::post_json(
            &self.client,
            &url,
            None,
            &self.request(messages, mode),
            self.timeout.as_secs(),
        )
        .await?;
        read_reply(status_code, &body)
    }

    /// Blocking variant of [`chat`](Self::chat).
    pub fn chat_blocking(
        &self,
        messages: &[ChatMessage],
        mode: ResponseMode,
    ) -> Result<String, ClientError> {
        let url = self.url();
        tracing::debug!(model = %self.model, %url, %mode, "Sending blocking Ollama chat");

        let (status_code, body) =
            chat::post_json_blocking(&url, None, &self.request(messages, mode), self.timeout)?;
        read_reply(status_code, &body)
    }
}

impl ModelClient for OllamaClient {
    fn ask(&self, prompt: &str, mode: ResponseMode) -> Result<String, ClientError> {
        self.chat_blocking(&chat::prompt_messages(&self.system_prompt, prompt), mode)
    }

    async fn ask_async(&self, prompt: &str, mode: ResponseMode) -> Result<String, ClientError> {
        let messages = chat::prompt_messages(&self.system_prompt, prompt);
        self.chat(&messages, mode).await
    }
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: Option<OllamaMessage>,
}

#[derive(Deserialize)]
struct OllamaMessage {
    content: Option<String>,
}

fn read_reply(status_code: u16, body: &str) -> Result<String, ClientError> {
    if !(200..300).contains(&status_code) {
        return Err(chat::map_status(status_code, body));
    }

    let response: OllamaResponse = serde_json::from_str(body)
        .map_err(|e| ClientError::Transport(format!("Failed to parse Ollama reply: {}", e)))?;

    chat::non_empty(response.message.and_then(|m| m.content))
}
