//! Schema descriptors: the declared target shape of extracted data.
//!
//! A [`Schema`] is declared once (usually at startup) through
//! [`SchemaBuilder`] and is immutable afterwards. Building it generates the
//! JSON Schema document and compiles the validator a single time; every
//! later [`Schema::validate_value`] call reuses that validator.
//!
//! [`SchemaDescriptor`] binds a schema to the Rust type a validated payload
//! deserializes into. Types can declare their own schema by implementing
//! [`Extractable`].

use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use jsonschema::error::ValidationErrorKind;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

use crate::error::{FieldViolation, SchemaError, ValidationError, ViolationKind};

/// Semantic type of a schema field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    /// A string restricted to the listed values.
    Enum(Vec<String>),
    Array(Box<FieldType>),
    /// A nested object with its own schema.
    Object(Schema),
}

impl FieldType {
    pub fn array_of(item: FieldType) -> Self {
        FieldType::Array(Box::new(item))
    }

    fn json_schema(&self) -> Value {
        match self {
            FieldType::String => json!({"type": "string"}),
            FieldType::Integer => json!({"type": "integer"}),
            FieldType::Number => json!({"type": "number"}),
            FieldType::Boolean => json!({"type": "boolean"}),
            FieldType::Enum(values) => json!({"type": "string", "enum": values}),
            FieldType::Array(item) => json!({"type": "array", "items": item.json_schema()}),
            FieldType::Object(schema) => schema.json_schema().clone(),
        }
    }

    fn label(&self) -> String {
        match self {
            FieldType::String => "string".to_string(),
            FieldType::Integer => "integer".to_string(),
            FieldType::Number => "number".to_string(),
            FieldType::Boolean => "boolean".to_string(),
            FieldType::Enum(values) => format!("one of [{}]", values.join(", ")),
            FieldType::Array(item) => format!("array of {}", item.label()),
            FieldType::Object(schema) => format!("object {}", schema.name()),
        }
    }

    fn is_collection(&self) -> bool {
        matches!(self, FieldType::Array(_))
    }
}

/// A named field with its type, optionality, and refinement constraints.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: String,
    field_type: FieldType,
    required: bool,
    description: Option<String>,
    minimum: Option<f64>,
    maximum: Option<f64>,
    min_length: Option<u64>,
    max_length: Option<u64>,
    pattern: Option<String>,
}

impl Field {
    /// A required field of the given type.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: true,
            description: None,
            minimum: None,
            maximum: None,
            min_length: None,
            max_length: None,
            pattern: None,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::String)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Integer)
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Number)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Boolean)
    }

    pub fn one_of<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            name,
            FieldType::Enum(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn array(name: impl Into<String>, item: FieldType) -> Self {
        Self::new(name, FieldType::array_of(item))
    }

    pub fn object(name: impl Into<String>, schema: Schema) -> Self {
        Self::new(name, FieldType::Object(schema))
    }

    /// Mark the field optional: it may be absent or `null`.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn minimum(mut self, min: f64) -> Self {
        self.minimum = Some(min);
        self
    }

    pub fn maximum(mut self, max: f64) -> Self {
        self.maximum = Some(max);
        self
    }

    /// Minimum length for strings, minimum item count for arrays.
    pub fn min_length(mut self, len: u64) -> Self {
        self.min_length = Some(len);
        self
    }

    /// Maximum length for strings, maximum item count for arrays.
    pub fn max_length(mut self, len: u64) -> Self {
        self.max_length = Some(len);
        self
    }

    /// Regular expression a string value must match.
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn json_schema(&self) -> Value {
        let mut schema = self.field_type.json_schema();
        let Some(obj) = schema.as_object_mut() else {
            return schema;
        };

        if let Some(min) = self.minimum {
            obj.insert("minimum".into(), json!(min));
        }
        if let Some(max) = self.maximum {
            obj.insert("maximum".into(), json!(max));
        }
        let (min_key, max_key) = if self.field_type.is_collection() {
            ("minItems", "maxItems")
        } else {
            ("minLength", "maxLength")
        };
        if let Some(len) = self.min_length {
            obj.insert(min_key.into(), json!(len));
        }
        if let Some(len) = self.max_length {
            obj.insert(max_key.into(), json!(len));
        }
        if let Some(pattern) = &self.pattern {
            obj.insert("pattern".into(), json!(pattern));
        }
        if let Some(desc) = &self.description {
            obj.insert("description".into(), json!(desc));
        }

        if !self.required {
            if let Some(Value::String(ty)) = obj.get("type").cloned() {
                obj.insert("type".into(), json!([ty, "null"]));
            }
            if let Some(Value::Array(values)) = obj.get_mut("enum") {
                values.push(Value::Null);
            }
        }

        schema
    }

    fn constraint_labels(&self) -> Vec<String> {
        let mut labels = Vec::new();
        if let Some(min) = self.minimum {
            labels.push(format!("min {min}"));
        }
        if let Some(max) = self.maximum {
            labels.push(format!("max {max}"));
        }
        if let Some(len) = self.min_length {
            labels.push(format!("min length {len}"));
        }
        if let Some(len) = self.max_length {
            labels.push(format!("max length {len}"));
        }
        if let Some(pattern) = &self.pattern {
            labels.push(format!("pattern {pattern}"));
        }
        labels
    }
}

struct SchemaInner {
    name: String,
    description: Option<String>,
    fields: Vec<Field>,
    document: Value,
    validator: jsonschema::Validator,
}

/// Immutable, cheaply cloneable schema with a precompiled validator.
#[derive(Clone)]
pub struct Schema {
    inner: Arc<SchemaInner>,
}

impl Schema {
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            description: None,
            fields: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn description(&self) -> Option<&str> {
        self.inner.description.as_deref()
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[Field] {
        &self.inner.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.inner.fields.iter().find(|f| f.name == name)
    }

    /// The generated JSON Schema document.
    pub fn json_schema(&self) -> &Value {
        &self.inner.document
    }

    /// Human-readable listing of every field, nested objects indented.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        self.describe_into(&mut out, 0);
        out
    }

    fn describe_into(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        for field in &self.inner.fields {
            let mut attrs = vec![
                field.field_type.label(),
                if field.required { "required" } else { "optional" }.to_string(),
            ];
            attrs.extend(field.constraint_labels());

            out.push_str(&format!("{indent}- {} ({})", field.name, attrs.join(", ")));
            if let Some(desc) = &field.description {
                out.push_str(": ");
                out.push_str(desc);
            }
            out.push('\n');

            if let FieldType::Object(nested) = &field.field_type {
                nested.describe_into(out, depth + 1);
            }
        }
    }

    /// Parse raw model output and validate it, collecting every violation.
    ///
    /// The body of a Markdown code fence is used when one is present. The
    /// payload is the first JSON value starting at the first `{`, so chatter
    /// before or after it is tolerated. Text without an object, or an object
    /// that is not valid JSON, is reported as [`ValidationError::Unparsable`].
    pub fn validate_value(&self, raw: &str) -> Result<Value, ValidationError> {
        let value = parse_payload(raw)?;

        let violations: Vec<FieldViolation> = self
            .inner
            .validator
            .iter_errors(&value)
            .map(|error| {
                let parent = error.instance_path.to_string();
                match &error.kind {
                    ValidationErrorKind::Required { property } => FieldViolation {
                        path: format!(
                            "{parent}/{}",
                            property.as_str().map_or_else(|| property.to_string(), str::to_string)
                        ),
                        kind: ViolationKind::Missing,
                        message: error.to_string(),
                    },
                    ValidationErrorKind::Type { .. } => FieldViolation {
                        path: parent,
                        kind: ViolationKind::Mistyped,
                        message: error.to_string(),
                    },
                    _ => FieldViolation {
                        path: parent,
                        kind: ViolationKind::Constraint,
                        message: error.to_string(),
                    },
                }
            })
            .collect();

        if violations.is_empty() {
            Ok(value)
        } else {
            Err(ValidationError::Fields(violations))
        }
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.inner.name)
            .field("fields", &self.inner.fields)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
            || (self.inner.name == other.inner.name && self.inner.fields == other.inner.fields)
    }
}

/// Collects fields and produces an immutable [`Schema`].
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    name: String,
    description: Option<String>,
    fields: Vec<Field>,
}

impl SchemaBuilder {
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Generate the JSON Schema document and compile the validator.
    pub fn build(self) -> Result<Schema, SchemaError> {
        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(SchemaError::EmptyFieldName(self.name));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField {
                    schema: self.name.clone(),
                    field: field.name.clone(),
                });
            }
        }

        let mut properties = Map::new();
        let mut required = Vec::new();
        for field in &self.fields {
            properties.insert(field.name.clone(), field.json_schema());
            if field.required {
                required.push(Value::String(field.name.clone()));
            }
        }

        let mut document = json!({
            "title": self.name,
            "type": "object",
            "properties": properties,
            "required": required,
        });
        if let (Some(desc), Some(obj)) = (&self.description, document.as_object_mut()) {
            obj.insert("description".into(), json!(desc));
        }

        let validator =
            jsonschema::Validator::new(&document).map_err(|e| SchemaError::Compile {
                schema: self.name.clone(),
                message: e.to_string(),
            })?;

        Ok(Schema {
            inner: Arc::new(SchemaInner {
                name: self.name,
                description: self.description,
                fields: self.fields,
                document,
                validator,
            }),
        })
    }
}

/// Parse the structured payload out of free-form model output.
fn parse_payload(raw: &str) -> Result<Value, ValidationError> {
    let text = strip_code_fence(raw.trim());
    if text.is_empty() {
        return Err(ValidationError::unparsable("empty response"));
    }
    let start = text
        .find('{')
        .ok_or_else(|| ValidationError::unparsable("no JSON object found in response"))?;

    // Anything after the first complete value is ignored.
    let mut values = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
    match values.next() {
        Some(Ok(value)) => Ok(value),
        Some(Err(e)) => Err(ValidationError::unparsable(format!("invalid JSON: {e}"))),
        None => Err(ValidationError::unparsable("no JSON object found in response")),
    }
}

/// Body of the first ```` ``` ```` fence, without its language tag line.
/// Text without a fence is returned unchanged.
fn strip_code_fence(text: &str) -> &str {
    let Some(open) = text.find("```") else {
        return text;
    };
    let after_open = &text[open + 3..];
    let Some(newline) = after_open.find('\n') else {
        return text;
    };
    let body = &after_open[newline + 1..];
    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

/// A type that declares the schema it is extracted with.
pub trait Extractable: DeserializeOwned {
    fn schema() -> Result<Schema, SchemaError>;
}

/// A [`Schema`] bound to the type validated payloads deserialize into.
///
/// `SchemaDescriptor<serde_json::Value>` is the untyped form.
pub struct SchemaDescriptor<T> {
    schema: Schema,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for SchemaDescriptor<T> {
    fn clone(&self) -> Self {
        Self {
            schema: self.schema.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for SchemaDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SchemaDescriptor").field(&self.schema).finish()
    }
}

impl<T: DeserializeOwned> SchemaDescriptor<T> {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            _marker: PhantomData,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    /// Parse, validate, and deserialize raw model output.
    ///
    /// Pure: the same input always yields the same result.
    pub fn validate(&self, raw: &str) -> Result<T, ValidationError> {
        let value = self.schema.validate_value(raw)?;
        serde_json::from_value(value).map_err(|e| {
            ValidationError::Fields(vec![FieldViolation {
                path: String::new(),
                kind: ViolationKind::Mistyped,
                message: format!("payload does not deserialize into the target type: {e}"),
            }])
        })
    }
}

impl<T: Extractable> SchemaDescriptor<T> {
    /// Descriptor for a type that declares its own schema.
    pub fn of() -> Result<Self, SchemaError> {
        Ok(Self::new(T::schema()?))
    }
}
