use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use smartmodel_core::error::ClientError;
use smartmodel_core::traits::{ModelClient, ResponseMode};

use crate::chat::{self, ChatMessage};
use crate::config::OpenAiConfig;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a data extraction assistant. Respond ONLY with valid JSON matching the requested schema. Do not include explanations.";

/// OpenAI-compatible chat completions client.
///
/// Works with any OpenAI-compatible API, including:
/// - OpenAI directly (`https://api.openai.com/v1`)
/// - Gemini via compatibility layer (`https://generativelanguage.googleapis.com/v1beta/openai`)
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
    system_prompt: String,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl OpenAiClient {
    pub fn new(api_key: &str, model: &str) -> Result<Self, ClientError> {
        Self::from_config(OpenAiConfig::new(api_key, model))
    }

    pub fn from_config(config: OpenAiConfig) -> Result<Self, ClientError> {
        Self::build(&config.api_key, &config.model, &config.base_url, config.timeout)
    }

    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_config(OpenAiConfig::from_env()?)
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Result<Self, ClientError> {
        let system_prompt = self.system_prompt;
        let rebuilt = Self::build(&self.api_key, &self.model, &self.base_url, timeout)?;
        Ok(rebuilt.with_system_prompt(system_prompt))
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build(
        api_key: &str,
        model: &str,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            timeout,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        })
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn request<'a>(&'a self, messages: &'a [ChatMessage], mode: ResponseMode) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages,
            response_format: ResponseFormat {
                format_type: match mode {
                    ResponseMode::Json => "json_object",
                    ResponseMode::Text => "text",
                },
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
        tracing::debug!(model = %self.model, %url, %mode, messages = messages.len(), "Sending chat completion");

        let (status_code, body) = chat::post_json(
            &self.client,
            &url,
            Some(&self.api_key),
            &self.request(messages, mode),
            self.timeout.as_secs(),
        )
        .await?;
        read_completion(status_code, &body)
    }

    /// Blocking variant of [`chat`](Self::chat).
    pub fn chat_blocking(
        &self,
        messages: &[ChatMessage],
        mode: ResponseMode,
    ) -> Result<String, ClientError> {
        let url = self.url();
        tracing::debug!(model = %self.model, %url, %mode, messages = messages.len(), "Sending blocking chat completion");

        let (status_code, body) = chat::post_json_blocking(
            &url,
            Some(&self.api_key),
            &self.request(messages, mode),
            self.timeout,
        )?;
        read_completion(status_code, &body)
    }
}

impl ModelClient for OpenAiClient {
    fn ask(&self, prompt: &str, mode: ResponseMode) -> Result<String, ClientError> {
        self.chat_blocking(&chat::prompt_messages(&self.system_prompt, prompt), mode)
    }

    async fn ask_async(&self, prompt: &str, mode: ResponseMode) -> Result<String, ClientError> {
        let messages = chat::prompt_messages(&self.system_prompt, prompt);
        self.chat(&messages, mode).await
    }
}

// ---- OpenAI API types ----

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

fn read_completion(status_code: u16, body: &str) -> Result<String, ClientError> {
    if !(200..300).contains(&status_code) {
        return Err(chat::map_status(status_code, body));
    }

    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| ClientError::Transport(format!("Failed to parse completion: {}", e)))?;

    chat::non_empty(
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content),
    )
}
