//! Error types for the pgvt crates
//!
//! Provides a single error enum with:
//! - Distinct variants for configuration misuse, contract violations,
//!   store failures and embedding failures
//! - Stable error codes for callers that branch on failure kind
//! - Integrity-violation detection on store errors

use sea_orm::{DbErr, SqlErr};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,

    // Contract errors (2xxx)
    ContractViolation,

    // Conflict errors (5xxx)
    IntegrityViolation,

    // Database errors (7xxx)
    DatabaseError,
    ConnectionError,

    // External service errors (8xxx)
    UpstreamError,
    EmbeddingError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,

            ErrorCode::ContractViolation => 2001,

            ErrorCode::IntegrityViolation => 5001,

            ErrorCode::DatabaseError => 7001,
            ErrorCode::ConnectionError => 7002,

            ErrorCode::UpstreamError => 8001,
            ErrorCode::EmbeddingError => 8002,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Caller misuse: bad arguments, unsupported filters, schema mismatches
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Data handed to an operation broke its contract (programmer error)
    #[error("Contract violation: {message}")]
    Contract { message: String },

    // Database errors are surfaced verbatim
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    // External service errors
    #[error("Embedding service error: {message}")]
    EmbeddingError { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Shorthand for a validation error without a field reference
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Validation error pointing at a specific field
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::Contract { .. } => ErrorCode::ContractViolation,
            AppError::Database(_) if self.is_integrity_violation() => {
                ErrorCode::IntegrityViolation
            }
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::EmbeddingError { .. } => ErrorCode::EmbeddingError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// True when the store rejected a write because of a unique or foreign key constraint.
    ///
    /// Callers use this to implement an explicit upsert-vs-reject policy on
    /// top of `insert_documents(.., update_if_exists = false)`.
    pub fn is_integrity_violation(&self) -> bool {
        match self {
            AppError::Database(err) => matches!(
                err.sql_err(),
                Some(SqlErr::UniqueConstraintViolation(_))
                    | Some(SqlErr::ForeignKeyConstraintViolation(_))
            ),
            _ => false,
        }
    }

    /// Errors the caller can fix by changing its input
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.code(),
            ErrorCode::ValidationError
                | ErrorCode::ContractViolation
                | ErrorCode::IntegrityViolation
        )
    }

    /// Errors caused by the store, upstream services or this process
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        // Struct-level failures are filed under "__all__"
        let field = err
            .field_errors()
            .keys()
            .map(|f| f.to_string())
            .find(|f| f != "__all__");
        AppError::Validation {
            message: err.to_string(),
            field,
        }
    }
}

impl From<sea_orm::sea_query::error::Error> for AppError {
    fn from(err: sea_orm::sea_query::error::Error) -> Self {
        AppError::Internal {
            message: format!("Failed to build statement: {}", err),
        }
    }
}
