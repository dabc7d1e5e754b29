//! The retrying extraction loop.
//!
//! ```text
//! BuildingPrompt -> AwaitingResponse -> Validating -> Success
//!       ^                 |                 |
//!       |            ClientError     ValidationError
//!       |                 v                 v
//!       +------------ Retrying <------------+
//!                         |
//!                  (index == max_retries)
//!                         v
//!                     Exhausted
//! ```
//!
//! Attempts are strictly sequential. A validation failure feeds the raw
//! response and its error into the next prompt; a client failure retries
//! the same prompt. Client and validation failures consume the retry
//! budget identically. A corrective prompt echoes only the attempt right
//! before it; when a client failure follows, that same prompt is resent,
//! so it still carries the response from two attempts back. Every attempt
//! publishes exactly one [`ProgressEvent`] before the loop moves on.

use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::config::ExtractionConfig;
use crate::error::{AttemptFailure, ClientError, ExhaustedRetriesError};
use crate::events::{EventKind, EventStream, ProgressEvent};
use crate::prompts;
use crate::schema::SchemaDescriptor;
use crate::traits::ModelClient;

/// A successful extraction together with how it was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction<T> {
    pub value: T,
    /// Model calls made, including the successful one.
    pub attempts: u32,
    pub extraction_id: Uuid,
    /// Raw text of the response that validated.
    pub raw_response: String,
}

/// Runs prompt -> ask -> validate -> retry cycles against a [`ModelClient`].
#[derive(Debug, Clone)]
pub struct ExtractionLoop {
    config: ExtractionConfig,
    events: EventStream,
}

impl Default for ExtractionLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionLoop {
    /// Default configuration, publishing to [`EventStream::global`].
    pub fn new() -> Self {
        Self {
            config: ExtractionConfig::default(),
            events: EventStream::global().clone(),
        }
    }

    pub fn with_config(mut self, config: ExtractionConfig) -> Self {
        self.config = config;
        self
    }

    /// Publish to `events` instead of the global stream.
    pub fn with_events(mut self, events: EventStream) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn events(&self) -> &EventStream {
        &self.events
    }

    /// Blocking extraction on the calling thread.
    pub fn extract<C, T>(
        &self,
        prompt: &str,
        schema: &SchemaDescriptor<T>,
        client: &C,
    ) -> Result<T, ExhaustedRetriesError>
    where
        C: ModelClient,
        T: DeserializeOwned,
    {
        self.extract_with_report(prompt, schema, client)
            .map(|extraction| extraction.value)
    }

    /// Like [`ExtractionLoop::extract`], also reporting attempts and the raw response.
    pub fn extract_with_report<C, T>(
        &self,
        prompt: &str,
        schema: &SchemaDescriptor<T>,
        client: &C,
    ) -> Result<Extraction<T>, ExhaustedRetriesError>
    where
        C: ModelClient,
        T: DeserializeOwned,
    {
        let mut run = Run::start(&self.config, &self.events, schema, prompt);
        loop {
            let response = client.ask(run.prompt(), self.config.response_mode);
            let delay = match run.settle(response) {
                Step::Done(extraction) => return Ok(extraction),
                Step::Exhausted(error) => return Err(error),
                Step::Retry(delay) => delay,
            };
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
        }
    }

    /// Non-blocking extraction; suspends only while waiting on the model.
    pub async fn extract_async<C, T>(
        &self,
        prompt: &str,
        schema: &SchemaDescriptor<T>,
        client: &C,
    ) -> Result<T, ExhaustedRetriesError>
    where
        C: ModelClient,
        T: DeserializeOwned,
    {
        self.extract_async_with_report(prompt, schema, client)
            .await
            .map(|extraction| extraction.value)
    }

    /// Like [`ExtractionLoop::extract_async`], also reporting attempts and the raw response.
    pub async fn extract_async_with_report<C, T>(
        &self,
        prompt: &str,
        schema: &SchemaDescriptor<T>,
        client: &C,
    ) -> Result<Extraction<T>, ExhaustedRetriesError>
    where
        C: ModelClient,
        T: DeserializeOwned,
    {
        let mut run = Run::start(&self.config, &self.events, schema, prompt);
        loop {
            let response = client
                .ask_async(run.prompt(), self.config.response_mode)
                .await;
            let delay = match run.settle(response) {
                Step::Done(extraction) => return Ok(extraction),
                Step::Exhausted(error) => return Err(error),
                Step::Retry(delay) => delay,
            };
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// One round of the loop, folded into the next prompt or the final result.
struct Attempt<T> {
    index: u32,
    response: Option<String>,
    outcome: Result<T, AttemptFailure>,
}

enum Step<T> {
    Done(Extraction<T>),
    Retry(Duration),
    Exhausted(ExhaustedRetriesError),
}

/// State of a single extraction call.
struct Run<'a, T> {
    config: &'a ExtractionConfig,
    events: &'a EventStream,
    schema: &'a SchemaDescriptor<T>,
    request: &'a str,
    extraction_id: Uuid,
    index: u32,
    prompt: String,
}

impl<'a, T: DeserializeOwned> Run<'a, T> {
    fn start(
        config: &'a ExtractionConfig,
        events: &'a EventStream,
        schema: &'a SchemaDescriptor<T>,
        request: &'a str,
    ) -> Self {
        let extraction_id = Uuid::new_v4();
        tracing::info!(
            %extraction_id,
            schema = %schema.name(),
            max_retries = %config.max_retries,
            mode = %config.response_mode,
            "Starting extraction"
        );

        Self {
            config,
            events,
            schema,
            request,
            extraction_id,
            index: 0,
            prompt: prompts::initial_prompt(schema.schema(), request),
        }
    }

    fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Validate the response of the current attempt and decide what happens next.
    fn settle(&mut self, response: Result<String, ClientError>) -> Step<T> {
        let attempt = match response {
            Ok(raw) => {
                tracing::debug!(
                    extraction_id = %self.extraction_id,
                    attempt = %self.index,
                    prompt_chars = self.prompt.chars().count(),
                    response_chars = raw.chars().count(),
                    "Validating model response"
                );
                let outcome = self
                    .schema
                    .validate(&raw)
                    .map_err(AttemptFailure::Validation);
                Attempt {
                    index: self.index,
                    response: Some(raw),
                    outcome,
                }
            }
            Err(error) => Attempt {
                index: self.index,
                response: None,
                outcome: Err(AttemptFailure::Client(error)),
            },
        };

        let will_retry = attempt.index < self.config.max_retries;

        match attempt.outcome {
            Ok(value) => {
                let raw_response = attempt.response.unwrap_or_default();
                self.publish(
                    attempt.index,
                    EventKind::Success,
                    "Response validated".to_string(),
                    Some(raw_response.clone()),
                    false,
                );
                tracing::info!(
                    extraction_id = %self.extraction_id,
                    attempts = attempt.index + 1,
                    "Extraction complete"
                );
                Step::Done(Extraction {
                    value,
                    attempts: attempt.index + 1,
                    extraction_id: self.extraction_id,
                    raw_response,
                })
            }
            Err(failure) => {
                let kind = match &failure {
                    AttemptFailure::Client(_) => EventKind::ClientError,
                    AttemptFailure::Validation(_) => EventKind::ValidationFailed,
                };
                self.publish(
                    attempt.index,
                    kind,
                    failure.to_string(),
                    attempt.response.clone(),
                    will_retry,
                );

                if !will_retry {
                    tracing::error!(
                        extraction_id = %self.extraction_id,
                        attempts = attempt.index + 1,
                        error = %failure,
                        "Extraction exhausted its retries"
                    );
                    return Step::Exhausted(ExhaustedRetriesError {
                        attempts: attempt.index + 1,
                        last_response: attempt.response,
                        source: failure,
                    });
                }

                // A client failure carries nothing to correct, so the prompt is reused.
                if let (AttemptFailure::Validation(error), Some(raw)) =
                    (&failure, attempt.response.as_deref())
                {
                    self.prompt =
                        prompts::corrective_prompt(self.schema.schema(), self.request, raw, error);
                }
                self.index += 1;
                Step::Retry(self.config.backoff.delay_for_retry(self.index))
            }
        }
    }

    fn publish(
        &self,
        attempt: u32,
        kind: EventKind,
        message: String,
        payload: Option<String>,
        will_retry: bool,
    ) {
        let event = ProgressEvent {
            extraction_id: self.extraction_id,
            schema: self.schema.name().to_string(),
            attempt,
            kind,
            message,
            payload,
            will_retry,
            timestamp: Utc::now(),
        };
        event.trace();
        self.events.publish(event);
    }
}
