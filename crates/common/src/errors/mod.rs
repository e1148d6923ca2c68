//! Error types for RagForge services
//!
//! Provides a single error enum for the retrieval core with:
//! - Distinct variants for input, retrieval, and upstream failures
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors
    ValidationError,
    InvalidFormat,

    // Retrieval errors
    CollectionNotFound,
    CollectionExists,
    DimensionMismatch,

    // Database errors
    DatabaseError,
    ConnectionError,

    // External service errors
    UpstreamError,
    UpstreamTimeout,
    EmbeddingError,

    // Internal errors
    InternalError,
    ConfigurationError,
    SerializationError,
}

/// Coarse failure class used for logging and retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Rejected before any remote call
    Input,
    /// Vector index could not serve the query
    Retrieval,
    /// Embedding or completion service failed
    Upstream,
    /// Everything else
    Internal,
}

impl ErrorClass {
    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Input => "input_error",
            ErrorClass::Retrieval => "retrieval_error",
            ErrorClass::Upstream => "upstream_error",
            ErrorClass::Internal => "internal_error",
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Input errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    // Retrieval errors
    #[error("Collection not found: {name}")]
    CollectionNotFound { name: String },

    #[error("Collection already exists: {name}")]
    CollectionExists { name: String },

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    // Upstream errors
    #[error("Embedding service error: {message}")]
    EmbeddingError { message: String },

    #[error("Upstream {service} error: {message}")]
    Upstream { service: String, message: String },

    #[error("Upstream {service} timed out after {timeout_ms}ms")]
    UpstreamTimeout { service: String, timeout_ms: u64 },

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Build a validation error for a named field
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            field: Some(field.to_string()),
        }
    }

    /// Map a transport failure from `service` into an upstream error,
    /// keeping timeouts distinguishable
    pub fn from_transport(service: &str, err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            AppError::UpstreamTimeout {
                service: service.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }
        } else {
            AppError::Upstream {
                service: service.to_string(),
                message: err.to_string(),
            }
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            AppError::CollectionNotFound { .. } => ErrorCode::CollectionNotFound,
            AppError::CollectionExists { .. } => ErrorCode::CollectionExists,
            AppError::DimensionMismatch { .. } => ErrorCode::DimensionMismatch,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::EmbeddingError { .. } => ErrorCode::EmbeddingError,
            AppError::Upstream { .. } => ErrorCode::UpstreamError,
            AppError::UpstreamTimeout { .. } => ErrorCode::UpstreamTimeout,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
        }
    }

    /// Get the failure class for this error
    pub fn class(&self) -> ErrorClass {
        match self {
            AppError::Validation { .. } | AppError::InvalidFormat { .. } => ErrorClass::Input,

            AppError::CollectionNotFound { .. }
            | AppError::CollectionExists { .. }
            | AppError::DimensionMismatch { .. }
            | AppError::Database(_)
            | AppError::DatabaseConnection { .. } => ErrorClass::Retrieval,

            AppError::EmbeddingError { .. }
            | AppError::Upstream { .. }
            | AppError::UpstreamTimeout { .. } => ErrorClass::Upstream,

            AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_) => ErrorClass::Internal,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } | AppError::InvalidFormat { .. } => {
                StatusCode::BAD_REQUEST
            }

            // 409 Conflict
            AppError::CollectionExists { .. } => StatusCode::CONFLICT,

            // 500 Internal Server Error
            AppError::CollectionNotFound { .. }
            | AppError::DimensionMismatch { .. }
            | AppError::Database(_)
            | AppError::DatabaseConnection { .. }
            | AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::EmbeddingError { .. } | AppError::Upstream { .. } => {
                StatusCode::BAD_GATEWAY
            }

            // 504 Gateway Timeout
            AppError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let field = match &self {
            AppError::Validation { field, .. } => field.clone(),
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                field,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}
