//! Document entity: one row per corpus chunk
//!
//! The entity fixes the column set. The physical table (schema, name and
//! embedding width) comes from [`crate::db::DocumentTable`], so every document
//! type shares this model.

use chrono::Utc;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Partition tag, part of the (collection, corpus_id, chunk_index) key
    pub collection: Option<String>,

    pub corpus_id: Uuid,

    pub chunk_index: i32,

    #[sea_orm(column_type = "Text")]
    pub content: String,

    pub title: Option<String>,

    /// Corpus metadata merged with this chunk's own metadata
    #[sea_orm(column_type = "JsonBinary")]
    pub document_metadata: Json,

    pub origin_url: Option<String>,

    pub language: Option<String>,

    #[sea_orm(column_type = "Double", nullable)]
    pub score: Option<f64>,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub tags: Option<Json>,

    /// pgvector embedding stored as text for SeaORM compatibility
    /// Actual vector operations done via casts in the built statements
    #[sea_orm(column_type = "Text", nullable)]
    pub embedding: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,

    pub is_deleted: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// New chunk row with a fresh id, current timestamps and default props
    pub fn new(corpus_id: Uuid, chunk_index: i32, content: impl Into<String>, metadata: Json) -> Self {
        let now = Utc::now().fixed_offset();
        Self {
            id: Uuid::new_v4(),
            collection: None,
            corpus_id,
            chunk_index,
            content: content.into(),
            title: None,
            document_metadata: metadata,
            origin_url: None,
            language: Some(DocumentProps::DEFAULT_LANGUAGE.to_string()),
            score: None,
            tags: None,
            embedding: None,
            created_at: now,
            updated_at: now,
            is_deleted: false,
        }
    }

    /// Attach an embedding in pgvector text form
    pub fn with_embedding(mut self, embedding: &[f32]) -> Self {
        self.embedding = Some(vector_literal(embedding));
        self
    }

    /// Parse embedding from stored text format to Vec<f32>
    pub fn parse_embedding(&self) -> Option<Vec<f32>> {
        self.embedding.as_ref().and_then(|s| {
            // Format: "[1.0,2.0,3.0,...]"
            let inner = s.trim().trim_start_matches('[').trim_end_matches(']');
            if inner.trim().is_empty() {
                return Some(Vec::new());
            }
            inner
                .split(',')
                .map(|v| v.trim().parse::<f32>().ok())
                .collect()
        })
    }

    /// Metadata as a JSON object, None when the stored value is not an object
    pub fn metadata_map(&self) -> Option<&Map<String, Value>> {
        self.document_metadata.as_object()
    }
}

/// Render a vector in the text form pgvector accepts: `[0.1,0.2,0.3]`
pub fn vector_literal(embedding: &[f32]) -> String {
    format!(
        "[{}]",
        embedding
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(",")
    )
}

/// Optional descriptive attributes applied to every chunk of one insert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentProps {
    pub collection: Option<String>,
    pub title: Option<String>,
    pub origin_url: Option<String>,
    #[serde(default = "DocumentProps::default_language")]
    pub language: Option<String>,
    pub score: Option<f64>,
    pub tags: Option<Vec<String>>,
}

impl DocumentProps {
    pub const DEFAULT_LANGUAGE: &'static str = "en";

    fn default_language() -> Option<String> {
        Some(Self::DEFAULT_LANGUAGE.to_string())
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Copy these props onto a chunk row
    pub fn apply(&self, document: &mut Model) {
        document.collection = self.collection.clone();
        document.title = self.title.clone();
        document.origin_url = self.origin_url.clone();
        document.language = self.language.clone();
        document.score = self.score;
        document.tags = self
            .tags
            .as_ref()
            .map(|tags| Value::Array(tags.iter().cloned().map(Value::String).collect()));
    }
}

impl Default for DocumentProps {
    fn default() -> Self {
        Self {
            collection: None,
            title: None,
            origin_url: None,
            language: Self::default_language(),
            score: None,
            tags: None,
        }
    }
}
