//! Test utilities: a scripted model client and sample schemas.
//!
//! Handwritten mocks for dependency injection in unit tests. The mock uses
//! `Arc<Mutex<_>>` for interior mutability, so clones share one script and
//! one call log.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::error::{ClientError, SchemaError};
use crate::schema::{Extractable, Field, Schema, SchemaDescriptor};
use crate::traits::{ModelClient, ResponseMode};

// ---------------------------------------------------------------------------
// MockClient
// ---------------------------------------------------------------------------

/// Model client that replays scripted responses and records every call.
#[derive(Clone, Default)]
pub struct MockClient {
    /// Queue of responses. Each call pops the first element.
    responses: Arc<Mutex<VecDeque<Result<String, ClientError>>>>,
    /// Returned once the queue is empty.
    fallback: Option<Result<String, ClientError>>,
    prompts: Arc<Mutex<Vec<String>>>,
    modes: Arc<Mutex<Vec<ResponseMode>>>,
}

impl MockClient {
    pub fn with_responses(responses: Vec<Result<String, ClientError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            ..Self::default()
        }
    }

    /// Answers every call with the same response.
    pub fn always(response: Result<String, ClientError>) -> Self {
        Self {
            fallback: Some(response),
            ..Self::default()
        }
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn modes(&self) -> Vec<ResponseMode> {
        self.modes.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn next(&self, prompt: &str, mode: ResponseMode) -> Result<String, ClientError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.modes.lock().unwrap().push(mode);

        let scripted = self.responses.lock().unwrap().pop_front();
        scripted
            .or_else(|| self.fallback.clone())
            .unwrap_or_else(|| Err(ClientError::Network("no scripted response left".into())))
    }
}

impl ModelClient for MockClient {
    fn ask(&self, prompt: &str, mode: ResponseMode) -> Result<String, ClientError> {
        self.next(prompt, mode)
    }

    async fn ask_async(&self, prompt: &str, mode: ResponseMode) -> Result<String, ClientError> {
        tokio::task::yield_now().await;
        self.next(prompt, mode)
    }
}

// ---------------------------------------------------------------------------
// Sample schemas
// ---------------------------------------------------------------------------

/// `{name: string, age: integer >= 0}`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Person {
    pub name: String,
    pub age: i64,
}

impl Extractable for Person {
    fn schema() -> Result<Schema, SchemaError> {
        Schema::builder("Person")
            .describe("A person mentioned in the text")
            .field(Field::string("name").describe("Given name"))
            .field(Field::integer("age").minimum(0.0))
            .build()
    }
}

pub fn person_schema() -> Schema {
    Person::schema().unwrap()
}

pub fn person_descriptor() -> SchemaDescriptor<Person> {
    SchemaDescriptor::of().unwrap()
}
