/// Extract a typed `Person` from free text with retries and live progress.
///
/// Reads `SMARTMODEL_API_KEY` (and optionally `SMARTMODEL_MODEL`,
/// `SMARTMODEL_BASE_URL`) from the environment or a `.env` file. Falls back
/// to a local Ollama server when no API key is set.
///
/// Run with:
///   cargo run --example extract_person -- "My name is Ana, I am 30"
use serde::Deserialize;
use smartmodel_client::{OllamaClient, OpenAiClient};
use smartmodel_core::{
    EventStream, Extractable, ExtractionLoop, Field, ModelClient, Schema, SchemaDescriptor,
    SchemaError,
};
use tracing_subscriber::EnvFilter;

#[derive(Deserialize)]
struct Person {
    name: String,
    age: i64,
    occupation: Option<String>,
}

impl Extractable for Person {
    fn schema() -> Result<Schema, SchemaError> {
        Schema::builder("Person")
            .describe("A person mentioned in the text")
            .field(Field::string("name").min_length(1).describe("Full name"))
            .field(Field::integer("age").minimum(0.0).maximum(150.0))
            .field(Field::string("occupation").optional())
            .build()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let request = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "My name is Ana, I am 30 and I work as a nurse.".to_string());

    let mut progress = EventStream::global().subscribe();
    tokio::spawn(async move {
        while let Some(event) = progress.recv().await {
            println!(
                "[attempt {}] {:?}: {}",
                event.attempt, event.kind, event.message
            );
        }
    });

    let descriptor = SchemaDescriptor::<Person>::of()?;
    let extraction = ExtractionLoop::new();

    let person = if std::env::var("SMARTMODEL_API_KEY").is_ok() {
        run(&extraction, &request, &descriptor, &OpenAiClient::from_env()?).await?
    } else {
        run(&extraction, &request, &descriptor, &OllamaClient::from_env()?).await?
    };

    println!(
        "{} is {} ({})",
        person.name,
        person.age,
        person.occupation.as_deref().unwrap_or("occupation unknown")
    );
    Ok(())
}

async fn run<C: ModelClient>(
    extraction: &ExtractionLoop,
    request: &str,
    descriptor: &SchemaDescriptor<Person>,
    client: &C,
) -> anyhow::Result<Person> {
    Ok(extraction.extract_async(request, descriptor, client).await?)
}
