//! Prompt text sent to the model: schema-aware instructions plus the
//! caller's request, and corrective prompts for retries.

use crate::error::ValidationError;
use crate::schema::Schema;

/// Longest slice of a previous response echoed back in a corrective prompt.
pub const MAX_ECHOED_RESPONSE_CHARS: usize = 2000;

const BASE_INSTRUCTIONS: &str = "You are a data extraction assistant. Read the request below and return a JSON object that conforms to the target schema.

Follow these steps:
  1. Understand the request: identify every value it states or clearly implies.
  2. Generate JSON: produce one JSON object whose keys are the schema's field names.
  3. Ensure validity: respect each field's type and constraints exactly (integers are whole numbers, enums use one of the listed values).
  4. Optional fields: use null when the request gives no value for them; never invent values for required fields that contradict the request.
  5. Return only the JSON object, without explanations or Markdown.";

const PARSE_CORRECTION: &str = "Your previous response could not be read as a JSON object. Respond with a single JSON object only, matching the schema above.";

const FIELD_CORRECTION: &str = "Your previous response did not match the schema. Fix every listed error, keep the values that were correct, and return the corrected JSON object only.";

/// Instruction block describing the target schema.
pub fn instructions(schema: &Schema) -> String {
    let json_schema = serde_json::to_string_pretty(schema.json_schema())
        .unwrap_or_else(|_| schema.json_schema().to_string());

    let mut out = String::from(BASE_INSTRUCTIONS);
    out.push_str("\n\nTarget schema: ");
    out.push_str(schema.name());
    if let Some(desc) = schema.description() {
        out.push_str(" (");
        out.push_str(desc);
        out.push(')');
    }
    out.push_str("\nFields:\n");
    out.push_str(&schema.describe());
    out.push_str("\nJSON Schema:\n```json\n");
    out.push_str(&json_schema);
    out.push_str("\n```");
    out
}

/// Prompt for the first attempt: instructions followed by the request, unmodified.
pub fn initial_prompt(schema: &Schema, request: &str) -> String {
    format!("{}\n\nRequest:\n{}", instructions(schema), request)
}

/// Prompt for a retry after a validation failure.
///
/// Carries only the immediately preceding response and its error, so the
/// prompt length stays bounded regardless of how many attempts came before.
pub fn corrective_prompt(
    schema: &Schema,
    request: &str,
    previous_response: &str,
    error: &ValidationError,
) -> String {
    let mut out = initial_prompt(schema, request);

    out.push_str("\n\nPrevious response:\n");
    out.push_str(&truncate_chars(previous_response, MAX_ECHOED_RESPONSE_CHARS));

    out.push_str("\n\nError:\n");
    match error {
        ValidationError::Unparsable { reason } => {
            out.push_str(reason);
            out.push_str("\n\n");
            out.push_str(PARSE_CORRECTION);
        }
        ValidationError::Fields(violations) => {
            for violation in violations {
                out.push_str("  - ");
                out.push_str(&violation.to_string());
                out.push('\n');
            }
            out.push('\n');
            out.push_str(FIELD_CORRECTION);
        }
    }
    out
}

/// Truncate to at most `max` chars, never splitting a UTF-8 sequence.
fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}
