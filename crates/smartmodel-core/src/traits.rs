use std::fmt;
use std::future::Future;
use std::str::FromStr;

use crate::error::ClientError;

/// Hint forwarded to the model about the shape of the expected output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    /// Free-form text.
    Text,
    /// Ask the provider to emit a JSON object.
    #[default]
    Json,
}

impl ResponseMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseMode::Text => "text",
            ResponseMode::Json => "json",
        }
    }
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ResponseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(ResponseMode::Text),
            "json" => Ok(ResponseMode::Json),
            _ => Err(format!("Unknown response mode: {}", s)),
        }
    }
}

/// Handle to a language model that answers one prompt with raw text.
///
/// Each call is an independent request/response exchange; implementations
/// must not carry conversation state between calls. Failures are reported
/// as [`ClientError`], never as empty text.
// TODO(#2): Add a streaming variant once providers expose partial chunks uniformly
pub trait ModelClient: Send + Sync {
    /// Blocking call on the current thread.
    fn ask(&self, prompt: &str, mode: ResponseMode) -> Result<String, ClientError>;

    /// Suspends the calling task until the model answers.
    fn ask_async(
        &self,
        prompt: &str,
        mode: ResponseMode,
    ) -> impl Future<Output = Result<String, ClientError>> + Send;
}
