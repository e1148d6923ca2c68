//! Configuration management for RagForge services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml)
//! - Default values

use crate::errors::{AppError, Result};
use crate::index::DistanceMetric;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration (postgres vector index backend)
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Vector index configuration
    #[serde(default)]
    pub vector_index: VectorIndexConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Completion service configuration
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Retrieval defaults
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Offline ingestion paths and thresholds
    #[serde(default)]
    pub ingestion: IngestionConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL
    #[serde(default = "default_database_url")]
    pub url: String,

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
}

/// Which vector index implementation to run against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    /// PostgreSQL with the pgvector extension
    Postgres,
    /// Process-local index, lost on restart
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VectorIndexConfig {
    /// Backend: postgres, memory
    #[serde(default = "default_index_backend")]
    pub backend: IndexBackend,

    /// Collection queried by the retrieval core
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Vector dimensionality of the collection
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Distance metric used when creating collections
    #[serde(default)]
    pub metric: DistanceMetric,

    /// Documents per insert batch
    #[serde(default = "default_insert_batch_size")]
    pub batch_size: usize,

    /// Upper bound for a single nearest-neighbour query, in seconds
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai (any OpenAI-compatible server), mock
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL, `/embeddings` is appended
    #[serde(default = "default_embedding_api_base")]
    pub api_base: String,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Texts per embedding request
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,

    /// How long the offline job keeps retrying a failed batch, in seconds
    #[serde(default = "default_retry_window")]
    pub retry_window_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompletionConfig {
    /// Server base URL, `/v1/completions` is appended
    #[serde(default = "default_completion_base_url")]
    pub base_url: String,

    /// Model identifier sent with every request
    #[serde(default = "default_completion_model")]
    pub model: String,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature (0.0 selects greedy decoding)
    #[serde(default)]
    pub temperature: f32,

    /// Request timeout in seconds
    #[serde(default = "default_completion_timeout")]
    pub timeout_secs: u64,

    /// Fail on responses without choices instead of returning the raw body
    #[serde(default)]
    pub strict_responses: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Documents retrieved per question
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestionConfig {
    /// Source of the paragraphs dataset
    #[serde(default = "default_dataset_url")]
    pub dataset_url: String,

    /// Where the downloaded dataset is written
    #[serde(default = "default_raw_path")]
    pub raw_path: String,

    /// Where the cleaned dataset is written
    #[serde(default = "default_processed_path")]
    pub processed_path: String,

    /// Minimum cleaned text length in characters
    #[serde(default = "default_min_length")]
    pub min_length: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level or filter directive (debug, info, ragforge_common=debug)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Prometheus exporter port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for logs
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8000 }
fn default_request_timeout() -> u64 { 150 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_database_url() -> String { "postgres://localhost/ragforge".to_string() }
fn default_max_connections() -> u32 { 10 }
fn default_min_connections() -> u32 { 1 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_index_backend() -> IndexBackend { IndexBackend::Postgres }
fn default_collection() -> String { "ru_bq_collection".to_string() }
fn default_insert_batch_size() -> usize { 5000 }
fn default_query_timeout() -> u64 { 10 }
fn default_embedding_provider() -> String { "openai".to_string() }
fn default_embedding_api_base() -> String { "http://127.0.0.1:11434/v1".to_string() }
fn default_embedding_model() -> String { crate::DEFAULT_EMBEDDING_MODEL.to_string() }
fn default_embedding_dimension() -> usize { crate::DEFAULT_EMBEDDING_DIMENSION }
fn default_embedding_timeout() -> u64 { 30 }
fn default_embedding_batch_size() -> usize { 64 }
fn default_retry_window() -> u64 { 120 }
fn default_completion_base_url() -> String { "http://127.0.0.1:11434".to_string() }
fn default_completion_model() -> String { "deepseek-r1".to_string() }
fn default_max_tokens() -> u32 { 2048 }
fn default_completion_timeout() -> u64 { 90 }
fn default_top_k() -> usize { 10 }
fn default_dataset_url() -> String {
    "https://raw.githubusercontent.com/vladislavneon/RuBQ/refs/heads/master/RuBQ_2.0/RuBQ_2.0_paragraphs.json".to_string()
}
fn default_raw_path() -> String { "data/parsed_RuBQ_2.0_paragraphs.json".to_string() }
fn default_processed_path() -> String { "data/processed_RuBQ_2.0_paragraphs.json".to_string() }
fn default_min_length() -> usize { 10 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "ragforge".to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            backend: default_index_backend(),
            collection: default_collection(),
            dimension: default_embedding_dimension(),
            metric: DistanceMetric::default(),
            batch_size: default_insert_batch_size(),
            query_timeout_secs: default_query_timeout(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: default_embedding_api_base(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            batch_size: default_embedding_batch_size(),
            retry_window_secs: default_retry_window(),
        }
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: default_completion_base_url(),
            model: default_completion_model(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            timeout_secs: default_completion_timeout(),
            strict_responses: false,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: default_top_k() }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            dataset_url: default_dataset_url(),
            raw_path: default_raw_path(),
            processed_path: default_processed_path(),
            min_length: default_min_length(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> std::result::Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__COMPLETION__MODEL=qwen2.5
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific file
    pub fn from_file(path: &str) -> std::result::Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Reject settings the services cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.embedding.dimension != self.vector_index.dimension {
            return Err(AppError::Configuration {
                message: format!(
                    "embedding.dimension ({}) must match vector_index.dimension ({})",
                    self.embedding.dimension, self.vector_index.dimension
                ),
            });
        }
        if self.retrieval.top_k == 0 {
            return Err(AppError::Configuration {
                message: "retrieval.top_k must be positive".to_string(),
            });
        }
        if self.completion.temperature < 0.0 {
            return Err(AppError::Configuration {
                message: "completion.temperature must not be negative".to_string(),
            });
        }
        if self.vector_index.collection.trim().is_empty() {
            return Err(AppError::Configuration {
                message: "vector_index.collection must not be empty".to_string(),
            });
        }
        if self.vector_index.batch_size == 0 || self.embedding.batch_size == 0 {
            return Err(AppError::Configuration {
                message: "batch sizes must be positive".to_string(),
            });
        }
        let stages = self.embedding.timeout_secs
            + self.vector_index.query_timeout_secs
            + self.completion.timeout_secs;
        if self.server.request_timeout_secs <= stages {
            return Err(AppError::Configuration {
                message: format!(
                    "server.request_timeout_secs ({}) must exceed the summed stage timeouts ({})",
                    self.server.request_timeout_secs, stages
                ),
            });
        }
        Ok(())
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get the vector query timeout as Duration
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.vector_index.query_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.vector_index.collection, "ru_bq_collection");
        assert_eq!(config.embedding.dimension, 384);
        assert_eq!(config.completion.model, "deepseek-r1");
        assert_eq!(config.completion.max_tokens, 2048);
        assert_eq!(config.completion.temperature, 0.0);
        assert_eq!(config.retrieval.top_k, 10);
        assert!(!config.completion.strict_responses);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let mut config = AppConfig::default();
        config.embedding.dimension = 768;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, AppError::Configuration { .. }));
    }

    #[test]
    fn test_zero_top_k_rejected() {
        let mut config = AppConfig::default();
        config.retrieval.top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_request_timeout_must_cover_stage_timeouts() {
        let mut config = AppConfig::default();
        // 30s embed + 10s query + 90s completion
        config.server.request_timeout_secs = 130;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("request_timeout_secs (130)"));

        config.server.request_timeout_secs = 131;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_partial_overrides() {
        let path = std::env::temp_dir().join(format!(
            "ragforge-config-{}.toml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            r#"
[vector_index]
backend = "memory"
metric = "cosine"

[completion]
model = "qwen2.5"
strict_responses = true
"#,
        )
        .unwrap();

        let config = AppConfig::from_file(path.to_str().unwrap()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.vector_index.backend, IndexBackend::Memory);
        assert_eq!(config.vector_index.metric, DistanceMetric::Cosine);
        assert_eq!(config.completion.model, "qwen2.5");
        assert!(config.completion.strict_responses);
        // untouched sections keep their defaults
        assert_eq!(config.completion.max_tokens, 2048);
        assert_eq!(config.retrieval.top_k, 10);
    }
}
