//! pgvt Common Library
//!
//! Shared code for the pgvt crates including:
//! - Document entity, table descriptor and DDL
//! - Embedding provider abstraction
//! - Metadata schemas and filter validation
//! - Search query models
//! - Error types and handling
//! - Configuration management
//! - Tracing and metrics

pub mod config;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod metadata;
pub mod metrics;
pub mod query;
pub mod telemetry;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::models::{Document, DocumentColumn};
pub use db::models::document::DocumentProps;
pub use db::{DbPool, DocumentTable};
pub use embeddings::EmbeddingProvider;
pub use errors::{AppError, Result};
pub use metadata::{FieldType, MetadataSchema};
pub use query::{FilterCondition, MetadataFilter, SearchQuery};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
