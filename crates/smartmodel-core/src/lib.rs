pub mod config;
pub mod error;
pub mod events;
pub mod extraction;
pub mod prompts;
pub mod schema;
pub mod traits;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use config::{Backoff, ExtractionConfig};
pub use error::{
    AttemptFailure, ClientError, ExhaustedRetriesError, FieldViolation, SchemaError,
    ValidationError, ViolationKind,
};
pub use events::{EventKind, EventStream, ProgressEvent, Subscription};
pub use extraction::{Extraction, ExtractionLoop};
pub use schema::{Extractable, Field, FieldType, Schema, SchemaBuilder, SchemaDescriptor};
pub use traits::{ModelClient, ResponseMode};
