//! Failure-isolating wrapper around an `EmbeddingProvider`.
//!
//! Every input gets exactly one vector, in input order. Texts are cut to
//! `MAX_EMBED_CHARS` characters before submission; a failed or malformed
//! provider result is replaced by the zero vector and logged.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};

use crate::llm::{EmbeddingProvider, EmbeddingTask, EMBEDDING_DIM};
pub use crate::llm::{truncate_chars, MAX_EMBED_CHARS};

/// Failure counter shared by every clone of one `Embedder`.
#[derive(Debug, Default)]
pub struct EmbedStats {
    degraded: AtomicUsize,
}

impl EmbedStats {
    /// Vectors substituted with zeros after a provider failure.
    pub fn degraded(&self) -> usize {
        self.degraded.load(Ordering::Relaxed)
    }
}

#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    concurrency: usize,
    stats: Arc<EmbedStats>,
}

impl Embedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            concurrency: 1,
            stats: Arc::new(EmbedStats::default()),
        }
    }

    /// Calls in flight at once; output order is unaffected.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn stats(&self) -> &EmbedStats {
        &self.stats
    }

    pub async fn embed(&self, texts: &[String], task: EmbeddingTask) -> Vec<Vec<f32>> {
        stream::iter(texts.iter())
            .map(|text| self.embed_isolated(text, task))
            .buffered(self.concurrency)
            .collect()
            .await
    }

    pub async fn embed_query(&self, text: &str) -> Vec<f32> {
        self.embed_isolated(text, EmbeddingTask::Query).await
    }

    async fn embed_isolated(&self, text: &str, task: EmbeddingTask) -> Vec<f32> {
        let payload = truncate_chars(text, MAX_EMBED_CHARS);

        let result = match self.provider.embed_one(payload, task).await {
            Ok(vector) if vector.len() == EMBEDDING_DIM => Ok(vector),
            Ok(vector) => Err(format!(
                "expected {} dimensions, got {}",
                EMBEDDING_DIM,
                vector.len()
            )),
            Err(err) => Err(err.to_string()),
        };

        match result {
            Ok(vector) => vector,
            Err(reason) => {
                self.stats.degraded.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    provider = self.provider.name(),
                    ?task,
                    "Embedding failed, substituting zero vector: {}",
                    reason
                );
                vec![0.0; EMBEDDING_DIM]
            }
        }
    }
}
