//! RagForge Common Library
//!
//! Shared code for the RagForge services:
//! - Retrieval-and-answer core
//! - Vector index abstraction with pgvector and in-memory backends
//! - Embedding client abstraction
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod context;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod index;
pub mod metrics;

// Re-export commonly used types
pub use config::AppConfig;
pub use context::{QueryResponse, RetrievalOrchestrator};
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use index::VectorIndex;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model (Ollama name of all-MiniLM-L6-v2)
pub const DEFAULT_EMBEDDING_MODEL: &str = "all-minilm";

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;
