//! Vector index abstraction
//!
//! A vector index stores `(id, vector, document, metadata)` tuples in named
//! collections and answers top-k nearest-neighbor queries. Two backends:
//! - PostgreSQL with pgvector (`db::Repository`)
//! - In-memory brute force (`InMemoryIndex`), for tests and local runs

mod memory;

pub use memory::InMemoryIndex;

use crate::config::{AppConfig, IndexBackend};
use crate::db::{DbPool, Repository};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Metadata key holding the dataset uid of a document
pub const METADATA_UID: &str = "uid";

/// Metadata key holding the source page id of a document
pub const METADATA_SOURCE_PAGE_ID: &str = "ru_wiki_pageid";

/// String metadata attached to each stored document
pub type Metadata = BTreeMap<String, String>;

/// Distance metric of a collection. Smaller is more relevant for both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Squared Euclidean distance
    #[default]
    L2,
    /// One minus cosine similarity
    Cosine,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::L2 => "l2",
            DistanceMetric::Cosine => "cosine",
        }
    }

    /// Parse the stored representation
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "l2" => Ok(DistanceMetric::L2),
            "cosine" => Ok(DistanceMetric::Cosine),
            other => Err(AppError::InvalidFormat {
                message: format!("unknown distance metric: {}", other),
            }),
        }
    }

    /// Distance between two vectors of equal length
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::L2 => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum(),
            DistanceMetric::Cosine => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    return 1.0;
                }
                1.0 - dot / (norm_a * norm_b)
            }
        }
    }
}

/// An immutable corpus entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub source_page_id: String,
}

/// A document with its embedding, ready for insertion
#[derive(Debug, Clone)]
pub struct IndexRecord {
    pub document: Document,
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
}

impl IndexRecord {
    /// Build a record whose metadata carries the uid and source page id
    pub fn new(document: Document, embedding: Vec<f32>) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert(METADATA_UID.to_string(), document.id.clone());
        metadata.insert(
            METADATA_SOURCE_PAGE_ID.to_string(),
            document.source_page_id.clone(),
        );
        Self {
            document,
            embedding,
            metadata,
        }
    }
}

/// Raw answer of a nearest-neighbor query.
///
/// All four vectors are parallel, ordered by ascending distance and no
/// longer than the requested `k`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub ids: Vec<String>,
    pub documents: Vec<String>,
    pub metadatas: Vec<Metadata>,
    pub distances: Vec<f32>,
}

/// One ranked entry of a retrieval result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub document: Document,
    pub distance: f32,
    pub metadata: Metadata,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub(crate) fn push(&mut self, id: String, document: String, metadata: Metadata, distance: f32) {
        self.ids.push(id);
        self.documents.push(document);
        self.metadatas.push(metadata);
        self.distances.push(distance);
    }

    /// Zip the parallel vectors into ranked documents, nearest first
    pub fn into_ranked(self) -> Vec<RetrievedDocument> {
        self.ids
            .into_iter()
            .zip(self.documents)
            .zip(self.metadatas)
            .zip(self.distances)
            .map(|(((id, text), metadata), distance)| {
                let source_page_id = metadata
                    .get(METADATA_SOURCE_PAGE_ID)
                    .cloned()
                    .unwrap_or_default();
                RetrievedDocument {
                    document: Document {
                        id,
                        text,
                        source_page_id,
                    },
                    distance,
                    metadata,
                }
            })
            .collect()
    }
}

/// Nearest-neighbor service over named collections
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create an empty collection; fails if it already exists
    async fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<()>;

    /// Drop a collection and its documents, returning whether it existed
    async fn delete_collection(&self, name: &str) -> Result<bool>;

    /// Check whether a collection exists
    async fn collection_exists(&self, name: &str) -> Result<bool>;

    /// Insert or replace records, returning how many were written
    async fn add(&self, collection: &str, records: &[IndexRecord]) -> Result<usize>;

    /// Top-k nearest documents to `embedding`
    async fn query(&self, collection: &str, embedding: &[f32], k: usize) -> Result<QueryResult>;

    /// Number of documents in a collection
    async fn count(&self, collection: &str) -> Result<u64>;

    /// Check that the backend is reachable
    async fn ping(&self) -> Result<()>;

    /// Backend name for logs
    fn backend_name(&self) -> &'static str;
}

/// Fail unless a vector has the collection's dimensionality
pub fn ensure_dimension(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(AppError::DimensionMismatch { expected, actual });
    }
    Ok(())
}

/// Create the vector index selected by configuration
pub async fn create_index(config: &AppConfig) -> Result<Arc<dyn VectorIndex>> {
    match config.vector_index.backend {
        IndexBackend::Postgres => {
            let pool = DbPool::new(&config.database).await?;
            let repository = Repository::new(pool, config.query_timeout());
            repository.ensure_schema().await?;
            Ok(Arc::new(repository))
        }
        IndexBackend::Memory => {
            tracing::warn!("Using in-memory vector index, contents are lost on restart");
            Ok(Arc::new(InMemoryIndex::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_is_squared_euclidean() {
        let d = DistanceMetric::L2.distance(&[0.0, 0.0], &[3.0, 4.0]);
        assert!((d - 25.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_distance() {
        let same = DistanceMetric::Cosine.distance(&[1.0, 0.0], &[2.0, 0.0]);
        let orthogonal = DistanceMetric::Cosine.distance(&[1.0, 0.0], &[0.0, 1.0]);
        assert!(same.abs() < 1e-6);
        assert!((orthogonal - 1.0).abs() < 1e-6);
        assert_eq!(DistanceMetric::Cosine.distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }

    #[test]
    fn test_metric_parse() {
        assert_eq!(DistanceMetric::parse("l2").unwrap(), DistanceMetric::L2);
        assert_eq!(DistanceMetric::parse("cosine").unwrap(), DistanceMetric::Cosine);
        assert!(DistanceMetric::parse("ip").is_err());
    }

    #[test]
    fn test_into_ranked_keeps_order() {
        let mut result = QueryResult::default();
        let doc = |id: &str, text: &str, distance: f32| {
            let record = IndexRecord::new(
                Document {
                    id: id.to_string(),
                    text: text.to_string(),
                    source_page_id: format!("page-{}", id),
                },
                vec![],
            );
            (record.document.id, record.document.text, record.metadata, distance)
        };
        for (id, text, metadata, distance) in [doc("1", "near", 0.1), doc("2", "far", 0.4)] {
            result.push(id, text, metadata, distance);
        }

        let ranked = result.into_ranked();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].document.text, "near");
        assert_eq!(ranked[0].document.source_page_id, "page-1");
        assert_eq!(ranked[1].distance, 0.4);
    }
}
