use std::fmt;

use thiserror::Error;

/// Failure reported by a model provider for a single `ask` exchange.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Network/connection error.
    #[error("Network error: {0}")]
    Network(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Credentials were rejected by the provider.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Provider answered with a non-success status.
    #[error("Provider error (HTTP {status_code}): {message}")]
    Provider { message: String, status_code: u16 },

    /// The response could not be decoded from the provider's wire format.
    #[error("Malformed transport: {0}")]
    Transport(String),

    /// The provider returned no content.
    #[error("Empty response from model")]
    EmptyResponse,

    /// The client was configured incorrectly.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Category of a single field-level violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// A required field is absent.
    Missing,
    /// A field holds a value of the wrong type.
    Mistyped,
    /// A field has the right type but breaks a refinement (range, length, pattern, enum).
    Constraint,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationKind::Missing => write!(f, "missing"),
            ViolationKind::Mistyped => write!(f, "mistyped"),
            ViolationKind::Constraint => write!(f, "constraint"),
        }
    }
}

/// One problem found while validating a payload against a schema.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FieldViolation {
    /// JSON pointer of the offending field (e.g. `/address/city`).
    pub path: String,
    pub kind: ViolationKind,
    pub message: String,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        write!(f, "{} ({}): {}", path, self.kind, self.message)
    }
}

/// Model output that does not fit the target schema.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The response contained no parsable JSON payload at all.
    #[error("Unparsable payload: {reason}")]
    Unparsable { reason: String },

    /// The payload parsed but one or more fields are wrong.
    #[error("{} field violation(s): {}", .0.len(), join_violations(.0))]
    Fields(Vec<FieldViolation>),
}

impl ValidationError {
    pub fn unparsable(reason: impl Into<String>) -> Self {
        ValidationError::Unparsable {
            reason: reason.into(),
        }
    }

    pub fn is_unparsable(&self) -> bool {
        matches!(self, ValidationError::Unparsable { .. })
    }

    /// Field violations, empty for unparsable payloads.
    pub fn violations(&self) -> &[FieldViolation] {
        match self {
            ValidationError::Unparsable { .. } => &[],
            ValidationError::Fields(v) => v,
        }
    }
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Why a single extraction attempt failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Terminal failure of an extraction: every allowed attempt failed.
#[derive(Error, Debug, Clone)]
#[error("Extraction failed after {attempts} attempt(s): {source}")]
pub struct ExhaustedRetriesError {
    /// Total number of model calls made.
    pub attempts: u32,
    /// Raw text of the last response received, if the last attempt got one.
    pub last_response: Option<String>,
    #[source]
    pub source: AttemptFailure,
}

impl ExhaustedRetriesError {
    pub fn last_failure(&self) -> &AttemptFailure {
        &self.source
    }
}

/// A schema declaration that cannot be turned into a validator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Field name must not be empty in schema '{0}'")]
    EmptyFieldName(String),

    #[error("Duplicate field '{field}' in schema '{schema}'")]
    DuplicateField { schema: String, field: String },

    #[error("Invalid JSON Schema for '{schema}': {message}")]
    Compile { schema: String, message: String },
}
