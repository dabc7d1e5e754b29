use smartmodel_core::{
    Backoff, EventStream, ExtractionConfig, ExtractionLoop, Field, FieldType, ProgressEvent,
    Schema, SchemaDescriptor, Subscription,
};

/// Route loop logs to the test harness. Set `RUST_LOG=smartmodel_core=debug` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Loop with no backoff publishing to its own isolated stream.
pub fn isolated_loop(max_retries: u32) -> (ExtractionLoop, EventStream) {
    init_tracing();
    let events = EventStream::new(256);
    let extraction = ExtractionLoop::new()
        .with_config(
            ExtractionConfig::default()
                .with_max_retries(max_retries)
                .with_backoff(Backoff::none()),
        )
        .with_events(events.clone());
    (extraction, events)
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct Contact {
    pub name: String,
    pub email: Option<String>,
    pub tags: Vec<String>,
    pub address: Address,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct Address {
    pub city: String,
    pub country: String,
}

pub fn contact_descriptor() -> SchemaDescriptor<Contact> {
    let address = Schema::builder("Address")
        .field(Field::string("city"))
        .field(Field::one_of("country", ["PT", "ES", "FR"]))
        .build()
        .unwrap();

    let contact = Schema::builder("Contact")
        .field(Field::string("name").min_length(1))
        .field(
            Field::string("email")
                .pattern("^[^@]+@[^@]+$")
                .optional(),
        )
        .field(Field::array("tags", FieldType::String))
        .field(Field::object("address", address))
        .build()
        .unwrap();

    SchemaDescriptor::new(contact)
}

pub fn drain(sub: &mut Subscription) -> Vec<ProgressEvent> {
    sub.drain()
}
