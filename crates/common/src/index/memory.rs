//! In-memory vector index
//!
//! Brute-force search over every stored vector. Suitable for tests and small
//! local corpora.

use super::{ensure_dimension, DistanceMetric, IndexRecord, QueryResult, VectorIndex};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

struct Collection {
    dimension: usize,
    metric: DistanceMetric,
    /// Insertion order is the tie-breaker for equal distances
    records: Vec<IndexRecord>,
    positions: HashMap<String, usize>,
}

impl Collection {
    fn new(dimension: usize, metric: DistanceMetric) -> Self {
        Self {
            dimension,
            metric,
            records: Vec::new(),
            positions: HashMap::new(),
        }
    }

    fn upsert(&mut self, record: IndexRecord) {
        match self.positions.get(&record.document.id) {
            Some(&pos) => self.records[pos] = record,
            None => {
                self.positions
                    .insert(record.document.id.clone(), self.records.len());
                self.records.push(record);
            }
        }
    }
}

/// Process-local vector index
#[derive(Default)]
pub struct InMemoryIndex {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(name: &str) -> AppError {
    AppError::CollectionNotFound {
        name: name.to_string(),
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<()> {
        let mut collections = self.collections.write().await;
        if collections.contains_key(name) {
            return Err(AppError::CollectionExists {
                name: name.to_string(),
            });
        }
        collections.insert(name.to_string(), Collection::new(dimension, metric));
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        Ok(self.collections.write().await.remove(name).is_some())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.collections.read().await.contains_key(name))
    }

    async fn add(&self, collection: &str, records: &[IndexRecord]) -> Result<usize> {
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| not_found(collection))?;

        // Validate the whole batch before touching the collection
        for record in records {
            ensure_dimension(target.dimension, record.embedding.len())?;
        }
        for record in records {
            target.upsert(record.clone());
        }
        Ok(records.len())
    }

    async fn query(&self, collection: &str, embedding: &[f32], k: usize) -> Result<QueryResult> {
        let collections = self.collections.read().await;
        let target = collections
            .get(collection)
            .ok_or_else(|| not_found(collection))?;
        ensure_dimension(target.dimension, embedding.len())?;

        let mut scored: Vec<(f32, &IndexRecord)> = target
            .records
            .iter()
            .map(|r| (target.metric.distance(embedding, &r.embedding), r))
            .collect();
        // sort_by is stable, so equal distances keep insertion order
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut result = QueryResult::default();
        for (distance, record) in scored.into_iter().take(k) {
            result.push(
                record.document.id.clone(),
                record.document.text.clone(),
                record.metadata.clone(),
                distance,
            );
        }
        Ok(result)
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        let collections = self.collections.read().await;
        let target = collections
            .get(collection)
            .ok_or_else(|| not_found(collection))?;
        Ok(target.records.len() as u64)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Document;

    fn record(id: &str, text: &str, embedding: Vec<f32>) -> IndexRecord {
        IndexRecord::new(
            Document {
                id: id.to_string(),
                text: text.to_string(),
                source_page_id: "42".to_string(),
            },
            embedding,
        )
    }

    #[tokio::test]
    async fn test_query_orders_by_distance() {
        let index = InMemoryIndex::new();
        index.create_collection("c", 2, DistanceMetric::L2).await.unwrap();
        index
            .add(
                "c",
                &[
                    record("far", "far away", vec![5.0, 5.0]),
                    record("near", "close by", vec![1.0, 0.0]),
                    record("mid", "in between", vec![2.0, 2.0]),
                ],
            )
            .await
            .unwrap();

        let result = index.query("c", &[1.0, 0.0], 2).await.unwrap();
        assert_eq!(result.ids, vec!["near", "mid"]);
        assert_eq!(result.documents, vec!["close by", "in between"]);
        assert_eq!(result.distances[0], 0.0);
        assert_eq!(result.metadatas[1].get("uid").map(String::as_str), Some("mid"));
    }

    #[tokio::test]
    async fn test_fewer_documents_than_k() {
        let index = InMemoryIndex::new();
        index.create_collection("c", 1, DistanceMetric::L2).await.unwrap();
        index.add("c", &[record("a", "only", vec![0.5])]).await.unwrap();

        let result = index.query("c", &[0.0], 10).await.unwrap();
        assert_eq!(result.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_collection() {
        let index = InMemoryIndex::new();
        let err = index.query("missing", &[0.0], 3).await.unwrap_err();
        assert!(matches!(err, AppError::CollectionNotFound { .. }));
        assert!(!index.collection_exists("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_dimension_checked_on_insert_and_query() {
        let index = InMemoryIndex::new();
        index.create_collection("c", 3, DistanceMetric::Cosine).await.unwrap();

        let err = index.add("c", &[record("a", "x", vec![1.0])]).await.unwrap_err();
        assert!(matches!(err, AppError::DimensionMismatch { expected: 3, actual: 1 }));
        assert_eq!(index.count("c").await.unwrap(), 0);

        let err = index.query("c", &[1.0, 2.0], 1).await.unwrap_err();
        assert!(matches!(err, AppError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn test_upsert_and_recreate() {
        let index = InMemoryIndex::new();
        index.create_collection("c", 1, DistanceMetric::L2).await.unwrap();
        index.add("c", &[record("a", "old", vec![0.0])]).await.unwrap();
        index.add("c", &[record("a", "new", vec![0.0])]).await.unwrap();
        assert_eq!(index.count("c").await.unwrap(), 1);
        assert_eq!(index.query("c", &[0.0], 1).await.unwrap().documents, vec!["new"]);

        let err = index.create_collection("c", 1, DistanceMetric::L2).await.unwrap_err();
        assert!(matches!(err, AppError::CollectionExists { .. }));

        assert!(index.delete_collection("c").await.unwrap());
        assert!(!index.delete_collection("c").await.unwrap());
    }
}
