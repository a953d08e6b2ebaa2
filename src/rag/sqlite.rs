//! SQLite-backed collection store.
//!
//! Both collections live in one database file. Vectors are stored as
//! little-endian `f32` blobs and searched with brute-force cosine similarity.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::store::{Collection, CollectionHit, CollectionRecord, RagStore};
use crate::core::errors::ApiError;

pub struct SqliteRagStore {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl SqliteRagStore {
    /// Opens (creating if needed) the store at `db_path` and ensures the schema.
    pub async fn open(db_path: PathBuf) -> Result<Self, ApiError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ApiError::Internal(format!(
                    "Cannot create store directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self { pool, db_path };
        store.init_schema().await?;
        tracing::debug!("Opened vector store at {}", store.db_path.display());
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rag_collections (
                name TEXT PRIMARY KEY,
                label TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rag_records (
                collection TEXT NOT NULL,
                record_id TEXT NOT NULL,
                content TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                embedding BLOB NOT NULL,
                degraded INTEGER NOT NULL DEFAULT 0,
                ingest_run TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (collection, record_id)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        for collection in Collection::ALL {
            sqlx::query("INSERT OR IGNORE INTO rag_collections (name, label) VALUES (?1, ?2)")
                .bind(collection.as_str())
                .bind(collection.label())
                .execute(&self.pool)
                .await
                .map_err(ApiError::internal)?;
        }

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        let denom = norm_a * norm_b;

        if denom <= f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }

    fn row_to_hit(row: &sqlx::sqlite::SqliteRow, score: f32) -> CollectionHit {
        let metadata_str: String = row.get("metadata");
        let metadata =
            serde_json::from_str::<BTreeMap<String, String>>(&metadata_str).unwrap_or_default();

        CollectionHit {
            id: row.get("record_id"),
            text: row.get("content"),
            metadata,
            score,
        }
    }
}

#[async_trait]
impl RagStore for SqliteRagStore {
    async fn upsert_batch(
        &self,
        collection: Collection,
        records: Vec<CollectionRecord>,
        ingest_run: &str,
    ) -> Result<usize, ApiError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        for record in &records {
            let blob = Self::serialize_embedding(&record.embedding);
            let degraded = record.embedding.iter().all(|v| *v == 0.0);
            let metadata_str = serde_json::to_string(&record.metadata).map_err(ApiError::internal)?;

            sqlx::query(
                "INSERT OR REPLACE INTO rag_records
                    (collection, record_id, content, metadata, embedding, degraded, ingest_run)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .bind(collection.as_str())
            .bind(&record.id)
            .bind(&record.text)
            .bind(&metadata_str)
            .bind(&blob)
            .bind(degraded)
            .bind(ingest_run)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(records.len())
    }

    async fn query(
        &self,
        collection: Collection,
        embedding: &[f32],
        top_n: usize,
    ) -> Result<Vec<CollectionHit>, ApiError> {
        if top_n == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT record_id, content, metadata, embedding
             FROM rag_records
             WHERE collection = ?1
             ORDER BY rowid",
        )
        .bind(collection.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let mut scored: Vec<CollectionHit> = rows
            .iter()
            .map(|row| {
                let embedding_bytes: Vec<u8> = row.get("embedding");
                let stored_emb = Self::deserialize_embedding(&embedding_bytes);
                let score = Self::cosine_similarity(embedding, &stored_emb);
                Self::row_to_hit(row, score)
            })
            .collect();

        // stable sort: equal scores keep insertion order
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_n);

        Ok(scored)
    }

    async fn count(&self, collection: Collection) -> Result<usize, ApiError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rag_records WHERE collection = ?1")
            .bind(collection.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(count as usize)
    }

    async fn count_degraded(&self, collection: Collection) -> Result<usize, ApiError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM rag_records WHERE collection = ?1 AND degraded = 1",
        )
        .bind(collection.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(count as usize)
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::debug!("Closed vector store at {}", self.db_path.display());
    }
}
