//! Search query models
//!
//! A [`SearchQuery`] combines up to four criteria:
//! - `text` for semantic similarity
//! - `keywords` for case-insensitive substring matches
//! - `metadata_filters` over `document_metadata`
//! - `date_range` over the row timestamps
//!
//! At least one criterion must be present and `limit` must be positive.

use crate::errors::{AppError, Result};
use crate::metadata::MetadataSchema;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use validator::{Validate, ValidationError};

/// Comparison applied by a metadata filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FilterCondition {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Array at the path contains the value
    Contains,
    /// Value at the path is one of the given values
    In,
    /// Path is present
    Exists,
}

impl FilterCondition {
    pub const ALL: [FilterCondition; 8] = [
        FilterCondition::Eq,
        FilterCondition::Gt,
        FilterCondition::Gte,
        FilterCondition::Lt,
        FilterCondition::Lte,
        FilterCondition::Contains,
        FilterCondition::In,
        FilterCondition::Exists,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterCondition::Eq => "eq",
            FilterCondition::Gt => "gt",
            FilterCondition::Gte => "gte",
            FilterCondition::Lt => "lt",
            FilterCondition::Lte => "lte",
            FilterCondition::Contains => "contains",
            FilterCondition::In => "in",
            FilterCondition::Exists => "exists",
        }
    }
}

impl fmt::Display for FilterCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterCondition {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        FilterCondition::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| AppError::invalid_field("condition", format!("Unsupported condition: {}", s)))
    }
}

impl TryFrom<String> for FilterCondition {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<FilterCondition> for String {
    fn from(condition: FilterCondition) -> Self {
        condition.as_str().to_string()
    }
}

/// One predicate over `document_metadata`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilter {
    /// Dot path into the metadata, e.g. `publication_info.journal`
    pub field_name: String,
    pub condition: FilterCondition,
    /// Literal to compare against; its JSON type picks the SQL cast
    #[serde(default)]
    pub value: Value,
}

impl MetadataFilter {
    /// Build a filter from a condition string such as `"gte"`
    pub fn new(field_name: impl Into<String>, condition: &str, value: Value) -> Result<Self> {
        Ok(Self::with_condition(field_name, condition.parse()?, value))
    }

    pub fn with_condition(field_name: impl Into<String>, condition: FilterCondition, value: Value) -> Self {
        Self {
            field_name: field_name.into(),
            condition,
            value,
        }
    }

    /// Path segments; fails on empty segments such as `a..b`
    pub fn path(&self) -> Result<Vec<&str>> {
        let segments: Vec<&str> = self.field_name.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(AppError::invalid_field(
                "field_name",
                format!("Invalid metadata field path '{}'", self.field_name),
            ));
        }
        Ok(segments)
    }
}

/// Standardized search query. At least one criterion is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_criteria", skip_on_field_errors = false))]
pub struct SearchQuery {
    /// Text matched by vector distance
    #[serde(default)]
    pub text: Option<String>,

    /// Keywords matched as case-insensitive substrings of the content
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Filters that must all match
    #[serde(default)]
    pub metadata_filters: Vec<MetadataFilter>,

    /// Keeps rows whose created_at..updated_at span overlaps the window
    #[serde(default)]
    pub date_range: Option<(DateTime<Utc>, DateTime<Utc>)>,

    /// Maximum number of results to return
    #[validate(range(min = 1, message = "limit must be at least 1"))]
    pub limit: u64,
}

fn validate_criteria(query: &SearchQuery) -> std::result::Result<(), ValidationError> {
    if query.has_criterion() {
        return Ok(());
    }
    Err(ValidationError::new("missing_criterion")
        .with_message("At least one search criterion is required".into()))
}

impl SearchQuery {
    /// Query with no criteria yet
    pub fn new(limit: u64) -> Self {
        Self {
            text: None,
            keywords: Vec::new(),
            metadata_filters: Vec::new(),
            date_range: None,
            limit,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.metadata_filters.push(filter);
        self
    }

    pub fn with_date_range(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.date_range = Some((start, end));
        self
    }

    /// Text for semantic search; blank text is ignored
    pub fn semantic_text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.trim().is_empty())
    }

    /// Keywords with empty strings dropped
    pub fn effective_keywords(&self) -> impl Iterator<Item = &str> {
        self.keywords.iter().map(String::as_str).filter(|k| !k.is_empty())
    }

    pub fn has_criterion(&self) -> bool {
        self.semantic_text().is_some()
            || self.effective_keywords().next().is_some()
            || !self.metadata_filters.is_empty()
            || self.date_range.is_some()
    }

    /// Validate limit and criteria, converting to the crate error
    pub fn check(&self) -> Result<()> {
        self.validate().map_err(AppError::from)
    }

    /// JSON schema of the query, with the metadata schema attached to `metadata_filters`
    pub fn json_schema(metadata_schema: &MetadataSchema) -> Value {
        let conditions: Vec<&str> = FilterCondition::ALL.iter().map(|c| c.as_str()).collect();

        json!({
            "title": "SearchQuery",
            "description": "Standardized search query structure. At least 1 search criterion is required.",
            "type": "object",
            "properties": {
                "text": {
                    "anyOf": [{"type": "string"}, {"type": "null"}],
                    "description": "String to match against in a semantic search, i.e. using vector distance."
                },
                "keywords": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "List of keywords to exact-match in a keyword search."
                },
                "metadata_filters": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "field_name": {"type": "string"},
                            "condition": {"enum": conditions},
                            "value": {}
                        },
                        "required": ["field_name", "condition", "value"]
                    },
                    "description": "List of metadata filters that must be matched. Field paths and types are described by metadata_schema.",
                    "metadata_schema": metadata_schema.json_schema()
                },
                "date_range": {
                    "anyOf": [
                        {
                            "type": "array",
                            "prefixItems": [
                                {"type": "string", "format": "date-time"},
                                {"type": "string", "format": "date-time"}
                            ],
                            "minItems": 2,
                            "maxItems": 2
                        },
                        {"type": "null"}
                    ],
                    "description": "Retrieve/limit results based on created_at & updated_at timestamps"
                },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Maximum number of results to return."
                }
            },
            "required": ["limit"]
        })
    }
}
