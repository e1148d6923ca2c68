//! Ingestion error types

use ragforge_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Download failed for {url}: {message}")]
    Download { url: String, message: String },

    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),

    #[error("Invalid record at position {position}: {message}")]
    InvalidRecord { position: usize, message: String },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    App(#[from] AppError),
}

pub type Result<T> = std::result::Result<T, IngestionError>;
