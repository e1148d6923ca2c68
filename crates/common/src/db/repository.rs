//! pgvector-backed vector index
//!
//! Collections live in the `collections` table, documents and their vectors
//! in `documents`. Vector columns go through raw SQL with the `::vector`
//! cast; everything else uses the SeaORM entities.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use crate::index::{
    ensure_dimension, DistanceMetric, IndexRecord, Metadata, QueryResult, VectorIndex,
};
use async_trait::async_trait;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait, PaginatorTrait,
    QueryFilter, QueryResult as Row, Set, Statement, TransactionTrait,
};
use std::time::Duration;
use tracing::{debug, info};

const SCHEMA: &str = r#"
CREATE EXTENSION IF NOT EXISTS vector;

CREATE TABLE IF NOT EXISTS collections (
    name        TEXT PRIMARY KEY,
    dimension   INTEGER NOT NULL,
    metric      TEXT NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS documents (
    collection      TEXT NOT NULL REFERENCES collections(name) ON DELETE CASCADE,
    id              TEXT NOT NULL,
    text            TEXT NOT NULL,
    source_page_id  TEXT NOT NULL DEFAULT '',
    metadata        JSONB NOT NULL DEFAULT '{}'::jsonb,
    embedding       vector NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (collection, id)
);
"#;

/// Format a vector as a pgvector literal: "[1,2,3]"
pub(crate) fn to_vector_literal(embedding: &[f32]) -> String {
    format!(
        "[{}]",
        embedding
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(",")
    )
}

/// SQL expression for the distance reported to callers, and the one used for
/// ordering. Ordering on the bare operator keeps pgvector indexes usable.
fn distance_sql(metric: DistanceMetric) -> (&'static str, &'static str) {
    match metric {
        DistanceMetric::L2 => (
            "power(embedding <-> $1::vector, 2)::float8",
            "embedding <-> $1::vector",
        ),
        DistanceMetric::Cosine => (
            "(embedding <=> $1::vector)::float8",
            "embedding <=> $1::vector",
        ),
    }
}

/// Convert a requested neighbour count into a SQL `LIMIT`
fn query_limit(k: usize) -> Result<i64> {
    i64::try_from(k).map_err(|_| AppError::validation("top_k", format!("top_k {} is too large", k)))
}

/// Run a vector query, failing with `UpstreamTimeout` when it outlives `timeout`
async fn bounded_query<T, F>(timeout: Duration, query: F) -> Result<T>
where
    F: std::future::Future<Output = std::result::Result<T, sea_orm::DbErr>>,
{
    match tokio::time::timeout(timeout, query).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(AppError::UpstreamTimeout {
            service: "vector_index".to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

fn metadata_from_json(value: serde_json::Value) -> Metadata {
    match value {
        serde_json::Value::Object(map) => map
            .into_iter()
            .map(|(k, v)| {
                let v = match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, v)
            })
            .collect(),
        _ => Metadata::new(),
    }
}

/// PostgreSQL vector index
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
    query_timeout: Duration,
}

impl Repository {
    /// Create a new repository with the given connection pool. Nearest-neighbour
    /// queries slower than `query_timeout` fail with `UpstreamTimeout`.
    pub fn new(pool: DbPool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    fn conn(&self) -> &DatabaseConnection {
        self.pool.connection()
    }

    /// Create the pgvector extension and tables if they are missing
    pub async fn ensure_schema(&self) -> Result<()> {
        self.conn().execute_unprepared(SCHEMA).await?;
        debug!("Vector index schema ready");
        Ok(())
    }

    async fn find_collection(&self, name: &str) -> Result<Collection> {
        CollectionEntity::find_by_id(name.to_string())
            .one(self.conn())
            .await?
            .ok_or_else(|| AppError::CollectionNotFound {
                name: name.to_string(),
            })
    }
}

#[async_trait]
impl VectorIndex for Repository {
    async fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<()> {
        if self.collection_exists(name).await? {
            return Err(AppError::CollectionExists {
                name: name.to_string(),
            });
        }

        let collection = CollectionActiveModel {
            name: Set(name.to_string()),
            dimension: Set(dimension as i32),
            metric: Set(metric.as_str().to_string()),
            created_at: Set(chrono::Utc::now().into()),
        };
        CollectionEntity::insert(collection).exec(self.conn()).await?;

        info!(collection = name, dimension, metric = metric.as_str(), "Collection created");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        // Documents go with the collection through ON DELETE CASCADE
        let result = CollectionEntity::delete_by_id(name.to_string())
            .exec(self.conn())
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let found = CollectionEntity::find_by_id(name.to_string())
            .one(self.conn())
            .await?;
        Ok(found.is_some())
    }

    async fn add(&self, collection: &str, records: &[IndexRecord]) -> Result<usize> {
        let target = self.find_collection(collection).await?;
        for record in records {
            ensure_dimension(target.dimension(), record.embedding.len())?;
        }

        let txn = self.conn().begin().await?;
        for record in records {
            let metadata = serde_json::to_value(&record.metadata)?;
            let stmt = Statement::from_sql_and_values(
                DbBackend::Postgres,
                r#"
                INSERT INTO documents (collection, id, text, source_page_id, metadata, embedding)
                VALUES ($1, $2, $3, $4, $5, $6::vector)
                ON CONFLICT (collection, id) DO UPDATE SET
                    text = EXCLUDED.text,
                    source_page_id = EXCLUDED.source_page_id,
                    metadata = EXCLUDED.metadata,
                    embedding = EXCLUDED.embedding
                "#,
                vec![
                    collection.into(),
                    record.document.id.clone().into(),
                    record.document.text.clone().into(),
                    record.document.source_page_id.clone().into(),
                    metadata.into(),
                    to_vector_literal(&record.embedding).into(),
                ],
            );
            txn.execute(stmt).await?;
        }
        txn.commit().await?;

        Ok(records.len())
    }

    async fn query(&self, collection: &str, embedding: &[f32], k: usize) -> Result<QueryResult> {
        let limit = query_limit(k)?;
        let target = self.find_collection(collection).await?;
        ensure_dimension(target.dimension(), embedding.len())?;

        let (distance_expr, order_expr) = distance_sql(target.distance_metric()?);
        let sql = format!(
            r#"
            SELECT id, text, metadata, {distance} AS distance
            FROM documents
            WHERE collection = $2
            ORDER BY {order}
            LIMIT $3
            "#,
            distance = distance_expr,
            order = order_expr,
        );

        let statement = Statement::from_sql_and_values(
            DbBackend::Postgres,
            &sql,
            vec![
                to_vector_literal(embedding).into(),
                collection.into(),
                limit.into(),
            ],
        );
        let rows = bounded_query(self.query_timeout, self.conn().query_all(statement)).await?;

        let mut result = QueryResult::default();
        for row in rows {
            let (id, text, metadata, distance) = read_row(&row)?;
            result.push(id, text, metadata, distance);
        }

        debug!(collection, k, returned = result.len(), "Vector query complete");
        Ok(result)
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        self.find_collection(collection).await?;
        let count = DocumentEntity::find()
            .filter(DocumentColumn::Collection.eq(collection))
            .count(self.conn())
            .await?;
        Ok(count)
    }

    async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

fn read_row(row: &Row) -> Result<(String, String, Metadata, f32)> {
    let id: String = row.try_get("", "id")?;
    let text: String = row.try_get("", "text")?;
    let metadata: serde_json::Value = row.try_get("", "metadata")?;
    let distance: f64 = row.try_get("", "distance")?;
    Ok((id, text, metadata_from_json(metadata), distance as f32))
}
