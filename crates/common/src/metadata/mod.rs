//! Metadata schemas and filter validation
//!
//! A [`MetadataSchema`] describes the shape of `document_metadata` for one
//! document type. It is never enforced on write; it exists so search filters
//! can be checked before they are compiled, and so callers can publish a
//! JSON schema of the filterable fields.

use crate::errors::{AppError, Result};
use crate::query::{FilterCondition, MetadataFilter};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

static NULL_TYPE: FieldType = FieldType::Null;

/// Type of one metadata field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    List(Box<FieldType>),
    Optional(Box<FieldType>),
    /// Alternatives in declaration order
    Union(Vec<FieldType>),
    Null,
    Nested(MetadataSchema),
    /// Any JSON value
    Unknown,
}

impl FieldType {
    pub fn list(inner: FieldType) -> Self {
        FieldType::List(Box::new(inner))
    }

    pub fn optional(inner: FieldType) -> Self {
        FieldType::Optional(Box::new(inner))
    }

    /// Nested schema, also when wrapped in Optional
    pub fn as_nested(&self) -> Option<&MetadataSchema> {
        match self {
            FieldType::Nested(schema) => Some(schema),
            FieldType::Optional(inner) => inner.as_nested(),
            _ => None,
        }
    }

    /// Collapse Optional and Union to their first non-null alternative
    pub fn resolve(&self) -> &FieldType {
        match self {
            FieldType::Optional(inner) => inner.resolve(),
            FieldType::Union(alternatives) => alternatives
                .iter()
                .find(|t| !matches!(t, FieldType::Null))
                .map(FieldType::resolve)
                .unwrap_or(&NULL_TYPE),
            other => other,
        }
    }

    /// Conditions a filter may use on a field of this type
    pub fn allowed_conditions(&self) -> &'static [FilterCondition] {
        use FilterCondition::*;
        match self.resolve() {
            FieldType::String | FieldType::Boolean => &[Eq, Exists],
            FieldType::Integer | FieldType::Float => &[Eq, Gt, Gte, Lt, Lte, Exists],
            FieldType::List(_) => &[Contains, In, Exists],
            _ => &[Eq, Exists],
        }
    }

    pub fn json_schema(&self) -> Value {
        match self {
            FieldType::String => json!({"type": "string"}),
            FieldType::Integer => json!({"type": "integer"}),
            FieldType::Float => json!({"type": "number"}),
            FieldType::Boolean => json!({"type": "boolean"}),
            FieldType::List(inner) => json!({"type": "array", "items": inner.json_schema()}),
            FieldType::Optional(inner) => {
                json!({"anyOf": [inner.json_schema(), {"type": "null"}]})
            }
            FieldType::Union(alternatives) => json!({
                "anyOf": alternatives.iter().map(FieldType::json_schema).collect::<Vec<_>>()
            }),
            FieldType::Null => json!({"type": "null"}),
            FieldType::Nested(schema) => schema.json_schema(),
            FieldType::Unknown => json!({}),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::String => write!(f, "str"),
            FieldType::Integer => write!(f, "int"),
            FieldType::Float => write!(f, "float"),
            FieldType::Boolean => write!(f, "bool"),
            FieldType::List(_) => write!(f, "list"),
            FieldType::Optional(inner) => write!(f, "Optional[{}]", inner),
            FieldType::Union(alternatives) => {
                let names: Vec<String> = alternatives.iter().map(|t| t.to_string()).collect();
                write!(f, "Union[{}]", names.join(", "))
            }
            FieldType::Null => write!(f, "NoneType"),
            FieldType::Nested(schema) => write!(f, "{}", schema.name()),
            FieldType::Unknown => write!(f, "Any"),
        }
    }
}

/// One named field of a schema
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaField {
    pub name: String,
    pub field_type: FieldType,
    pub description: Option<String>,
}

/// Ordered set of metadata fields
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataSchema {
    name: String,
    fields: Vec<SchemaField>,
}

impl MetadataSchema {
    /// Empty schema
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Schema with the `document_type` and `schema_version` base fields
    pub fn base(name: impl Into<String>) -> Self {
        Self::new(name)
            .field("document_type", FieldType::String)
            .field("schema_version", FieldType::String)
    }

    /// Add or replace a field
    pub fn field(self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.described_field(name, field_type, None::<String>)
    }

    pub fn described_field(
        mut self,
        name: impl Into<String>,
        field_type: FieldType,
        description: Option<impl Into<String>>,
    ) -> Self {
        let field = SchemaField {
            name: name.into(),
            field_type,
            description: description.map(Into::into),
        };
        match self.fields.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&FieldType> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| &f.field_type)
    }

    /// JSON schema object; Optional fields are not required
    pub fn json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for field in &self.fields {
            let mut property = field.field_type.json_schema();
            if let (Some(description), Some(object)) = (&field.description, property.as_object_mut()) {
                object.insert("description".to_string(), Value::String(description.clone()));
            }
            properties.insert(field.name.clone(), property);

            if !matches!(field.field_type, FieldType::Optional(_)) {
                required.push(Value::String(field.name.clone()));
            }
        }

        json!({
            "title": self.name,
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Typed metadata that knows its own schema
pub trait MetadataModel: Serialize {
    fn schema() -> MetadataSchema;

    /// Map form stored in `document_metadata`
    fn to_map(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(AppError::Contract {
                message: format!("metadata must serialize to an object, got {}", other),
            }),
        }
    }
}

/// Fields every document type carries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseDocumentMetadata {
    pub document_type: String,
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
}

fn default_schema_version() -> String {
    "1.0".to_string()
}

impl BaseDocumentMetadata {
    pub fn new(document_type: impl Into<String>) -> Self {
        Self {
            document_type: document_type.into(),
            schema_version: default_schema_version(),
        }
    }
}

impl MetadataModel for BaseDocumentMetadata {
    fn schema() -> MetadataSchema {
        MetadataSchema::base("BaseDocumentMetadata")
    }
}

/// Check a filter's path against the schema and its condition against the leaf type
pub fn validate_metadata_filter(filter: &MetadataFilter, schema: &MetadataSchema) -> Result<()> {
    let path = filter.field_name.as_str();
    let segments: Vec<&str> = path.split('.').collect();

    let mut current = schema;
    let mut leaf = None;

    for (i, segment) in segments.iter().enumerate() {
        let field_type = current.get(segment).ok_or_else(|| {
            AppError::invalid_field(path, format!("Field '{}' not found in metadata schema", path))
        })?;

        if i < segments.len() - 1 {
            current = field_type.as_nested().ok_or_else(|| {
                AppError::invalid_field(
                    path,
                    format!(
                        "Cannot navigate into non-model field '{}' in path '{}'",
                        segment, path
                    ),
                )
            })?;
        }
        leaf = Some(field_type);
    }

    match leaf {
        Some(field_type) => validate_condition_compatibility(field_type, filter.condition),
        None => Err(AppError::invalid_field(
            path,
            format!("Field '{}' not found in metadata schema", path),
        )),
    }
}

/// Validate every filter, stopping at the first failure
pub fn validate_metadata_filters(filters: &[MetadataFilter], schema: &MetadataSchema) -> Result<()> {
    filters
        .iter()
        .try_for_each(|filter| validate_metadata_filter(filter, schema))
}

pub fn validate_condition_compatibility(field_type: &FieldType, condition: FilterCondition) -> Result<()> {
    let resolved = field_type.resolve();
    if resolved.allowed_conditions().contains(&condition) {
        return Ok(());
    }
    Err(AppError::validation(format!(
        "Condition '{}' not valid for field type {}",
        condition, resolved
    )))
}
