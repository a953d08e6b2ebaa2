//! Multi-collection retrieval.
//!
//! One question is embedded once, both collections are searched, and hits are
//! concatenated web-first then faq, each in the store's rank order. Scores are
//! never compared across collections.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::document::WEB_SOURCE_FALLBACK;
use super::embedder::Embedder;
use super::store::{Collection, CollectionHit, RagStore};
use crate::core::config::RagSettings;
use crate::core::errors::ApiError;

/// Configuration for retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Hits requested from each collection
    pub top_n: usize,
    /// Cap on merged evidence entries
    pub max_evidence: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_n: 5,
            max_evidence: 11,
        }
    }
}

impl From<&RagSettings> for RetrievalConfig {
    fn from(settings: &RagSettings) -> Self {
        Self {
            top_n: settings.retrieval.top_n,
            max_evidence: settings.retrieval.max_evidence,
        }
    }
}

/// One retrieved passage together with where it came from.
///
/// For web hits `source` is a locator; for faq hits it is the answer text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub text: String,
    pub source: String,
    pub collection: Collection,
}

impl Evidence {
    pub fn from_hit(collection: Collection, hit: CollectionHit) -> Self {
        let source = match collection {
            Collection::Web => hit.meta("url").unwrap_or(WEB_SOURCE_FALLBACK).to_string(),
            Collection::Faq => hit
                .meta("answer")
                .map(str::to_string)
                .unwrap_or_else(|| hit.text.clone()),
        };

        Self {
            text: hit.text,
            source,
            collection,
        }
    }
}

/// Ordered evidence; texts and sources are always the same length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSet {
    items: Vec<Evidence>,
}

impl EvidenceSet {
    pub fn new(items: Vec<Evidence>) -> Self {
        Self { items }
    }

    /// Merges per-collection hits web-first and keeps the first `max` entries.
    pub fn merge(web: Vec<CollectionHit>, faq: Vec<CollectionHit>, max: usize) -> Self {
        let items = web
            .into_iter()
            .map(|hit| Evidence::from_hit(Collection::Web, hit))
            .chain(faq.into_iter().map(|hit| Evidence::from_hit(Collection::Faq, hit)))
            .take(max)
            .collect();
        Self { items }
    }

    pub fn items(&self) -> &[Evidence] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn texts(&self) -> Vec<&str> {
        self.items.iter().map(|e| e.text.as_str()).collect()
    }

    pub fn sources(&self) -> Vec<&str> {
        self.items.iter().map(|e| e.source.as_str()).collect()
    }

    pub fn into_sources(self) -> Vec<String> {
        self.items.into_iter().map(|e| e.source).collect()
    }
}

#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn RagStore>,
    embedder: Embedder,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(store: Arc<dyn RagStore>, embedder: Embedder, config: RetrievalConfig) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    pub async fn retrieve(&self, question: &str) -> Result<EvidenceSet, ApiError> {
        self.retrieve_top(question, self.config.top_n).await
    }

    pub async fn retrieve_top(&self, question: &str, top_n: usize) -> Result<EvidenceSet, ApiError> {
        let query_vector = self.embedder.embed_query(question).await;

        let (web, faq) = tokio::try_join!(
            self.store.query(Collection::Web, &query_vector, top_n),
            self.store.query(Collection::Faq, &query_vector, top_n),
        )?;

        tracing::debug!(
            "Retrieved {} web and {} faq hits for question ({} chars)",
            web.len(),
            faq.len(),
            question.chars().count()
        );

        Ok(EvidenceSet::merge(web, faq, self.config.max_evidence))
    }
}
