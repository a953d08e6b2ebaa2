//! RagStore trait: abstract interface for the persisted collections.
//!
//! The primary implementation is `SqliteRagStore` in the `sqlite` module.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

/// Named, independently searchable record sets. There is no cross-collection index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// Crawled pages and extracted PDFs.
    Web,
    /// Question/answer pairs.
    Faq,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Collection::Web, Collection::Faq];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Web => "web",
            Collection::Faq => "faq",
        }
    }

    /// Description stored alongside the collection.
    pub fn label(&self) -> &'static str {
        match self {
            Collection::Web => "web_and_pdfs",
            Collection::Faq => "qna_data",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record as written by ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionRecord {
    pub id: String,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
    pub embedding: Vec<f32>,
}

/// A record as returned by a similarity query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionHit {
    pub id: String,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
    /// Cosine similarity (higher = nearer).
    pub score: f32,
}

impl CollectionHit {
    /// Metadata value, treating empty strings as absent.
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// Abstract trait for collection storage backends.
///
/// One handle is opened per process and shared; callers release it with
/// `close` once no further reads or writes will be issued.
#[async_trait]
pub trait RagStore: Send + Sync {
    /// Insert or replace records, keyed by `(collection, id)`, in one transaction.
    async fn upsert_batch(
        &self,
        collection: Collection,
        records: Vec<CollectionRecord>,
        ingest_run: &str,
    ) -> Result<usize, ApiError>;

    /// Nearest records first, at most `top_n`.
    async fn query(
        &self,
        collection: Collection,
        embedding: &[f32],
        top_n: usize,
    ) -> Result<Vec<CollectionHit>, ApiError>;

    async fn count(&self, collection: Collection) -> Result<usize, ApiError>;

    /// Number of records whose stored vector is all zeros (failed embeddings).
    async fn count_degraded(&self, collection: Collection) -> Result<usize, ApiError>;

    async fn close(&self);
}
