//! Chat message types and HTTP error mapping shared by the providers.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use smartmodel_core::error::ClientError;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a chat exchange, in the `{role, content}` shape both
/// providers accept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// `[system?, user]` for a single-prompt exchange. A blank system prompt is omitted.
pub(crate) fn prompt_messages(system_prompt: &str, prompt: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(2);
    if !system_prompt.trim().is_empty() {
        messages.push(ChatMessage::system(system_prompt));
    }
    messages.push(ChatMessage::user(prompt));
    messages
}

/// Error bodies: OpenAI nests `{"error": {"message": ..}}`, Ollama sends `{"error": ".."}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ApiError {
    Nested { error: ApiErrorDetail },
    Flat { error: String },
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Map a transport-level reqwest failure.
pub(crate) fn map_send_error(e: &reqwest::Error, timeout_secs: u64) -> ClientError {
    if e.is_timeout() {
        ClientError::Timeout(timeout_secs)
    } else if e.is_connect() {
        ClientError::Network(format!("Connection failed: {}", e))
    } else {
        ClientError::Network(e.to_string())
    }
}

/// Map a non-success HTTP status and its body.
pub(crate) fn map_status(status_code: u16, body: &str) -> ClientError {
    let message = match serde_json::from_str::<ApiError>(body) {
        Ok(ApiError::Nested { error }) => error.message,
        Ok(ApiError::Flat { error }) => error,
        Err(_) => format!("HTTP {}: {}", status_code, body),
    };

    match status_code {
        401 | 403 => ClientError::Authentication(message),
        429 => ClientError::RateLimited,
        _ => ClientError::Provider {
            message,
            status_code,
        },
    }
}

/// POST a JSON body and return the status code with the raw response body.
pub(crate) async fn post_json<B: Serialize + Sync>(
    client: &reqwest::Client,
    url: &str,
    api_key: Option<&str>,
    body: &B,
    timeout_secs: u64,
) -> Result<(u16, String), ClientError> {
    let mut request = client.post(url).json(body);
    if let Some(key) = api_key {
        request = request.header("Authorization", format!("Bearer {}", key));
    }

    let response = request
        .send()
        .await
        .map_err(|e| map_send_error(&e, timeout_secs))?;
    let status_code = response.status().as_u16();
    let text = response
        .text()
        .await
        .map_err(|e| ClientError::Transport(format!("Failed to read response body: {}", e)))?;
    Ok((status_code, text))
}

/// Blocking twin of [`post_json`]. Must not be called from inside an async runtime.
pub(crate) fn post_json_blocking<B: Serialize>(
    url: &str,
    api_key: Option<&str>,
    body: &B,
    timeout: Duration,
) -> Result<(u16, String), ClientError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ClientError::Transport(e.to_string()))?;

    let mut request = client.post(url).json(body);
    if let Some(key) = api_key {
        request = request.header("Authorization", format!("Bearer {}", key));
    }

    let response = request
        .send()
        .map_err(|e| map_send_error(&e, timeout.as_secs()))?;
    let status_code = response.status().as_u16();
    let text = response
        .text()
        .map_err(|e| ClientError::Transport(format!("Failed to read response body: {}", e)))?;
    Ok((status_code, text))
}

/// Reject missing or whitespace-only model output.
pub(crate) fn non_empty(content: Option<String>) -> Result<String, ClientError> {
    match content {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(ClientError::EmptyResponse),
    }
}
