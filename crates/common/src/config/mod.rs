//! Configuration management for pgvt services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with PGVT__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - A `.env` file picked up by dotenvy
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable prefix (`PGVT__DATABASE__URL`, ...)
pub const ENV_PREFIX: &str = "PGVT";

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Database configuration
    pub database: DatabaseConfig,

    /// Document table configuration
    #[serde(default)]
    pub documents: DocumentTableConfig,

    /// Embedding provider configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Corpus chunking configuration
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Search defaults
    #[serde(default)]
    pub search: SearchConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes)
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Log every statement through sqlx
    #[serde(default)]
    pub sqlx_logging: bool,
}

/// Where document rows live
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DocumentTableConfig {
    /// Postgres schema (None = search_path default)
    pub schema: Option<String>,

    /// Table name
    #[serde(default = "default_table_name")]
    pub table: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, hash, none
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for OpenAI-compatible endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension, also the `vector(N)` width of the document table
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Upper bound on time spent retrying one request, in seconds
    #[serde(default = "default_embedding_retry_budget")]
    pub max_retry_secs: u64,

    /// Batch size for embedding requests
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

/// Chunking strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingStrategyKind {
    Delimiter,
    Paragraph,
    Sentence,
    FixedWindow,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunking_strategy")]
    pub strategy: ChunkingStrategyKind,

    /// Delimiter for the delimiter strategy
    #[serde(default = "default_delimiter")]
    pub delimiter: String,

    /// Window capacity in characters for the fixed-window strategy
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Attach chunk_length and word_count to every chunk's metadata
    #[serde(default)]
    pub chunk_stats: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Limit used when a query does not set one
    #[serde(default = "default_search_limit")]
    pub default_limit: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error) or a full EnvFilter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Service name attached to log lines
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_max_connections() -> u32 { 10 }
fn default_min_connections() -> u32 { 1 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_table_name() -> String { "documents".to_string() }
fn default_embedding_provider() -> String { "openai".to_string() }
fn default_embedding_model() -> String { "text-embedding-3-small".to_string() }
fn default_embedding_dimension() -> usize { 1536 }
fn default_embedding_timeout() -> u64 { 30 }
fn default_embedding_retry_budget() -> u64 { 60 }
fn default_batch_size() -> usize { 100 }
fn default_chunking_strategy() -> ChunkingStrategyKind { ChunkingStrategyKind::Delimiter }
fn default_delimiter() -> String { "\n".to_string() }
fn default_window_size() -> usize { 1000 }
fn default_search_limit() -> u64 { 10 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { false }
fn default_service_name() -> String { "pgvt".to_string() }

impl Default for DocumentTableConfig {
    fn default() -> Self {
        Self {
            schema: None,
            table: default_table_name(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            max_retry_secs: default_embedding_retry_budget(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: default_chunking_strategy(),
            delimiter: default_delimiter(),
            window_size: default_window_size(),
            chunk_stats: false,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_search_limit(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            service_name: default_service_name(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `.env`, config files and environment
    pub fn load() -> Result<Self, ConfigError> {
        // A missing .env is normal outside local development
        let _ = dotenvy::dotenv();

        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("database.url", "postgres://localhost/pgvt")?
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // e.g., PGVT__EMBEDDING__DIMENSION=768
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific config file, still honouring environment overrides
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get the read database URL (falls back to primary)
    pub fn read_database_url(&self) -> &str {
        self.database.read_url.as_deref().unwrap_or(&self.database.url)
    }

    /// Get the embedding request timeout as Duration
    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_secs(self.embedding.timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgres://localhost/pgvt".to_string(),
                read_url: None,
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
                sqlx_logging: false,
            },
            documents: DocumentTableConfig::default(),
            embedding: EmbeddingConfig::default(),
            chunking: ChunkingConfig::default(),
            search: SearchConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.documents.table, "documents");
        assert_eq!(config.embedding.dimension, 1536);
        assert_eq!(config.chunking.strategy, ChunkingStrategyKind::Delimiter);
        assert_eq!(config.chunking.delimiter, "\n");
        assert_eq!(config.search.default_limit, 10);
    }

    #[test]
    fn test_read_database_fallback() {
        let mut config = AppConfig::default();
        assert_eq!(config.read_database_url(), "postgres://localhost/pgvt");

        config.database.read_url = Some("postgres://replica/pgvt".to_string());
        assert_eq!(config.read_database_url(), "postgres://replica/pgvt");
    }

    #[test]
    fn test_sections_fall_back_to_defaults() {
        let config: AppConfig = serde_json::from_value(serde_json::json!({
            "database": { "url": "postgres://db/app" },
            "chunking": { "strategy": "fixed_window", "window_size": 256 }
        }))
        .unwrap();

        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.chunking.strategy, ChunkingStrategyKind::FixedWindow);
        assert_eq!(config.chunking.window_size, 256);
        assert_eq!(config.embedding.provider, "openai");
        assert!(!config.observability.json_logging);
    }
}
