//! Indexing processor
//!
//! Embeds cleaned records and writes them into the vector index in batches.

use crate::dataset::DatasetRecord;
use crate::errors::Result;
use backoff::{future::retry, ExponentialBackoff};
use ragforge_common::{
    config::AppConfig,
    embeddings::Embedder,
    errors::{AppError, ErrorClass},
    index::{DistanceMetric, Document, IndexRecord, VectorIndex},
    metrics,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Batching, collection and retry settings
#[derive(Debug, Clone)]
pub struct IndexingSettings {
    pub collection: String,
    pub dimension: usize,
    pub metric: DistanceMetric,
    /// Documents per index insert
    pub insert_batch_size: usize,
    /// Texts per embedding request
    pub embed_batch_size: usize,
    /// Give up on a failing embedding request after this long
    pub retry_window: Duration,
    pub retry_initial_interval: Duration,
}

impl From<&AppConfig> for IndexingSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            collection: config.vector_index.collection.clone(),
            dimension: config.vector_index.dimension,
            metric: config.vector_index.metric,
            insert_batch_size: config.vector_index.batch_size,
            embed_batch_size: config.embedding.batch_size,
            retry_window: Duration::from_secs(config.embedding.retry_window_secs),
            retry_initial_interval: Duration::from_millis(500),
        }
    }
}

/// Outcome of an indexing run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexingReport {
    pub indexed: usize,
    pub batches: usize,
}

/// Writes the corpus into the vector index
pub struct IndexingProcessor {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    settings: IndexingSettings,
}

impl IndexingProcessor {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        settings: IndexingSettings,
    ) -> Self {
        Self {
            embedder,
            index,
            settings,
        }
    }

    /// Make sure the target collection exists, dropping it first when
    /// `recreate` is set
    #[instrument(skip(self), fields(collection = %self.settings.collection))]
    pub async fn prepare_collection(&self, recreate: bool) -> Result<()> {
        let name = &self.settings.collection;

        if recreate {
            if self.index.delete_collection(name).await? {
                warn!("Collection already existed, recreating");
            }
        } else if self.index.collection_exists(name).await? {
            info!("Using existing collection");
            return Ok(());
        }

        self.index
            .create_collection(name, self.settings.dimension, self.settings.metric)
            .await?;
        info!(
            dimension = self.settings.dimension,
            metric = self.settings.metric.as_str(),
            "Collection created"
        );
        Ok(())
    }

    /// Embed and insert every record, batch by batch
    #[instrument(skip(self, records), fields(collection = %self.settings.collection, records = records.len()))]
    pub async fn index_records(&self, records: &[DatasetRecord]) -> Result<IndexingReport> {
        let mut report = IndexingReport::default();
        if records.is_empty() {
            warn!("Nothing to index");
            return Ok(report);
        }

        let batch_size = self.settings.insert_batch_size.max(1);
        let total_batches = records.len().div_ceil(batch_size);

        for (i, batch) in records.chunks(batch_size).enumerate() {
            let start = i * batch_size;
            info!(
                "Adding batch {} of {} (records {} to {})",
                i + 1,
                total_batches,
                start,
                start + batch.len()
            );

            let embeddings = self.embed_batch(batch).await?;
            let index_records: Vec<IndexRecord> = batch
                .iter()
                .zip(embeddings)
                .map(|(record, embedding)| {
                    IndexRecord::new(
                        Document {
                            id: record.uid.clone(),
                            text: record.text.clone(),
                            source_page_id: record.ru_wiki_pageid.clone(),
                        },
                        embedding,
                    )
                })
                .collect();

            let written = self
                .index
                .add(&self.settings.collection, &index_records)
                .await?;
            metrics::record_indexed(&self.settings.collection, written);

            report.indexed += written;
            report.batches += 1;
        }

        let stored = self.index.count(&self.settings.collection).await?;
        info!(indexed = report.indexed, stored, "Indexing finished");
        Ok(report)
    }

    async fn embed_batch(&self, records: &[DatasetRecord]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(records.len());
        for chunk in records.chunks(self.settings.embed_batch_size.max(1)) {
            let texts: Vec<String> = chunk.iter().map(|r| r.text.clone()).collect();
            embeddings.extend(self.embed_with_retry(&texts).await?);
        }
        Ok(embeddings)
    }

    /// Upstream failures are retried with exponential backoff; anything else
    /// (e.g. a dimension mismatch) fails at once
    async fn embed_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let policy = ExponentialBackoff {
            initial_interval: self.settings.retry_initial_interval,
            max_elapsed_time: Some(self.settings.retry_window),
            ..ExponentialBackoff::default()
        };

        let embeddings = retry(policy, || async move {
            self.embedder.embed_batch(texts).await.map_err(|e| {
                if e.class() == ErrorClass::Upstream {
                    warn!(error = %e, texts = texts.len(), "Embedding failed, retrying");
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        })
        .await?;

        if embeddings.len() != texts.len() {
            return Err(AppError::EmbeddingError {
                message: format!("Expected {} embeddings, got {}", texts.len(), embeddings.len()),
            }
            .into());
        }
        debug!(texts = texts.len(), "Batch embedded");
        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::IngestionError;
    use async_trait::async_trait;
    use ragforge_common::embeddings::MockEmbedder;
    use ragforge_common::index::InMemoryIndex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DIMENSION: usize = 4;

    fn settings() -> IndexingSettings {
        IndexingSettings {
            collection: "test_collection".to_string(),
            dimension: DIMENSION,
            metric: DistanceMetric::L2,
            insert_batch_size: 2,
            embed_batch_size: 1,
            retry_window: Duration::from_secs(5),
            retry_initial_interval: Duration::from_millis(10),
        }
    }

    fn records(n: usize) -> Vec<DatasetRecord> {
        (0..n)
            .map(|i| DatasetRecord {
                uid: i.to_string(),
                ru_wiki_pageid: format!("{}", 1000 + i),
                text: format!("абзац номер {}", i),
            })
            .collect()
    }

    /// Fails with an upstream error a fixed number of times, then delegates
    struct FlakyEmbedder {
        failures_left: AtomicUsize,
        calls: AtomicUsize,
        inner: MockEmbedder,
    }

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        async fn embed(&self, text: &str) -> ragforge_common::Result<Vec<f32>> {
            self.inner.embed(text).await
        }

        async fn embed_batch(&self, texts: &[String]) -> ragforge_common::Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(AppError::Upstream {
                    service: "embedding".to_string(),
                    message: "connection refused".to_string(),
                });
            }
            self.inner.embed_batch(texts).await
        }

        fn model_name(&self) -> &str {
            "flaky"
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }
    }

    #[tokio::test]
    async fn test_indexes_in_batches() {
        let index = Arc::new(InMemoryIndex::new());
        let processor = IndexingProcessor::new(
            Arc::new(MockEmbedder::new(DIMENSION)),
            index.clone(),
            settings(),
        );

        processor.prepare_collection(false).await.unwrap();
        let report = processor.index_records(&records(5)).await.unwrap();

        assert_eq!(report, IndexingReport { indexed: 5, batches: 3 });
        assert_eq!(index.count("test_collection").await.unwrap(), 5);

        let query = MockEmbedder::new(DIMENSION).embed("абзац номер 3").await.unwrap();
        let result = index.query("test_collection", &query, 1).await.unwrap();
        assert_eq!(result.ids, vec!["3"]);
        assert_eq!(result.metadatas[0].get("uid").map(String::as_str), Some("3"));
        assert_eq!(
            result.metadatas[0].get("ru_wiki_pageid").map(String::as_str),
            Some("1003")
        );
    }

    #[tokio::test]
    async fn test_recreate_drops_existing_documents() {
        let index = Arc::new(InMemoryIndex::new());
        let processor = IndexingProcessor::new(
            Arc::new(MockEmbedder::new(DIMENSION)),
            index.clone(),
            settings(),
        );

        processor.prepare_collection(false).await.unwrap();
        processor.index_records(&records(3)).await.unwrap();

        // Reusing keeps documents
        processor.prepare_collection(false).await.unwrap();
        assert_eq!(index.count("test_collection").await.unwrap(), 3);

        processor.prepare_collection(true).await.unwrap();
        assert_eq!(index.count("test_collection").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_retries_transient_embedding_failures() {
        let embedder = Arc::new(FlakyEmbedder {
            failures_left: AtomicUsize::new(2),
            calls: AtomicUsize::new(0),
            inner: MockEmbedder::new(DIMENSION),
        });
        let index = Arc::new(InMemoryIndex::new());
        let processor = IndexingProcessor::new(embedder.clone(), index.clone(), settings());

        processor.prepare_collection(true).await.unwrap();
        let report = processor.index_records(&records(1)).await.unwrap();

        assert_eq!(report.indexed, 1);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_not_retried() {
        let embedder = Arc::new(FlakyEmbedder {
            failures_left: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            inner: MockEmbedder::new(DIMENSION + 1),
        });
        let index = Arc::new(InMemoryIndex::new());
        let processor = IndexingProcessor::new(embedder.clone(), index, settings());

        processor.prepare_collection(true).await.unwrap();
        let err = processor.index_records(&records(1)).await.unwrap_err();

        assert!(matches!(
            err,
            IngestionError::App(AppError::DimensionMismatch { .. })
        ));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let processor = IndexingProcessor::new(
            Arc::new(MockEmbedder::new(DIMENSION)),
            Arc::new(InMemoryIndex::new()),
            settings(),
        );
        let report = processor.index_records(&[]).await.unwrap();
        assert_eq!(report, IndexingReport::default());
    }
}
