//! Batched ingestion: filter → metadata → embed (INDEX) → upsert.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::document::Ingestible;
use super::embedder::Embedder;
use super::store::{Collection, CollectionRecord, RagStore};
use crate::core::config::RagSettings;
use crate::core::errors::ApiError;
use crate::llm::EmbeddingTask;

/// Configuration for the ingestion pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Items per embedding/write round trip
    pub batch_size: usize,
    /// Path fragment accepted in place of an absolute URL
    pub local_corpus_marker: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            local_corpus_marker: "campus-data".to_string(),
        }
    }
}

impl From<&RagSettings> for IngestConfig {
    fn from(settings: &RagSettings) -> Self {
        Self {
            batch_size: settings.ingest.batch_size.max(1),
            local_corpus_marker: settings.ingest.local_corpus_marker.clone(),
        }
    }
}

/// Outcome of one ingestion run over one collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestReport {
    pub run_id: String,
    pub collection: String,
    /// Items read from the input
    pub seen: usize,
    /// Records written to the store
    pub added: usize,
    /// Items dropped by validation
    pub skipped_invalid: usize,
    /// Exact repeats of an item already taken earlier in the run
    pub skipped_duplicates: usize,
    /// Batches with nothing left to write
    pub skipped_batches: usize,
    /// Records persisted with a zero vector
    pub degraded_embeddings: usize,
}

pub struct IngestPipeline {
    store: Arc<dyn RagStore>,
    embedder: Embedder,
    config: IngestConfig,
}

impl IngestPipeline {
    pub fn new(store: Arc<dyn RagStore>, embedder: Embedder, config: IngestConfig) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    /// Embeds and persists `items` into their collection, batch by batch.
    ///
    /// Invalid items are dropped without error, as are exact repeats of an
    /// item seen earlier in the same run. A store failure aborts the run;
    /// batches written before it stay written.
    pub async fn ingest<T: Ingestible>(&self, items: &[T]) -> Result<IngestReport, ApiError> {
        let collection: Collection = T::COLLECTION;
        let run_id = Utc::now().to_rfc3339();
        let mut report = IngestReport {
            run_id: run_id.clone(),
            collection: collection.to_string(),
            seen: items.len(),
            ..Default::default()
        };

        let batch_size = self.config.batch_size.max(1);
        let total_batches = items.len().div_ceil(batch_size);
        tracing::info!(
            "Ingesting {} items into '{}' ({} batches)",
            items.len(),
            collection,
            total_batches
        );

        let mut seen_ids: HashSet<String> = HashSet::new();

        for (batch_index, batch) in items.chunks(batch_size).enumerate() {
            let mut accepted: Vec<(&T, String)> = Vec::with_capacity(batch.len());
            for item in batch {
                if !item.is_valid(&self.config.local_corpus_marker) {
                    report.skipped_invalid += 1;
                    continue;
                }
                let id = item.record_id();
                if !seen_ids.insert(id.clone()) {
                    report.skipped_duplicates += 1;
                    tracing::debug!("Skipping repeated item {}", id);
                    continue;
                }
                accepted.push((item, id));
            }

            if accepted.is_empty() {
                report.skipped_batches += 1;
                tracing::debug!("Batch {} has nothing to write, skipping", batch_index + 1);
                continue;
            }

            let texts: Vec<String> = accepted.iter().map(|(item, _)| item.body()).collect();
            let degraded_before = self.embedder.stats().degraded();
            let embeddings = self.embedder.embed(&texts, EmbeddingTask::Index).await;
            report.degraded_embeddings += self.embedder.stats().degraded() - degraded_before;

            let records: Vec<CollectionRecord> = accepted
                .into_iter()
                .zip(texts)
                .zip(embeddings)
                .map(|(((item, id), text), embedding)| CollectionRecord {
                    id,
                    text,
                    metadata: item.metadata(),
                    embedding,
                })
                .collect();

            report.added += self.store.upsert_batch(collection, records, &run_id).await?;

            tracing::info!(
                "Batch {}/{}: {} documents added to '{}' so far",
                batch_index + 1,
                total_batches,
                report.added,
                collection
            );
        }

        if report.degraded_embeddings > 0 {
            tracing::warn!(
                "{} records in '{}' were stored with zero vectors after embedding failures",
                report.degraded_embeddings,
                collection
            );
        }
        tracing::info!(
            "Added {} documents to '{}' ({} invalid, {} repeated skipped)",
            report.added,
            collection,
            report.skipped_invalid,
            report.skipped_duplicates
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::EMBEDDING_DIM;
    use crate::rag::document::{QnaEntry, WebDocument};
    use crate::rag::embedder::fakes::RecordingEmbedder;
    use crate::rag::sqlite::SqliteRagStore;

    async fn pipeline(
        provider: Arc<RecordingEmbedder>,
    ) -> (tempfile::TempDir, Arc<SqliteRagStore>, IngestPipeline) {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(
            SqliteRagStore::open(tmp.path().join("vectorstore.db"))
                .await
                .unwrap(),
        );
        let pipeline = IngestPipeline::new(
            store.clone(),
            Embedder::new(provider),
            IngestConfig::default(),
        );
        (tmp, store, pipeline)
    }

    fn web(text: &str, url: &str) -> WebDocument {
        WebDocument {
            text: text.to_string(),
            url: url.to_string(),
            title: String::new(),
            doc_type: "html".to_string(),
        }
    }

    #[tokio::test]
    async fn invalid_documents_are_dropped_and_empty_batches_skipped() {
        let provider = Arc::new(RecordingEmbedder::default());
        let (_tmp, store, pipeline) = pipeline(provider.clone()).await;

        // first batch of ten is entirely invalid, second has one valid document
        let mut docs: Vec<WebDocument> = (0..10)
            .map(|i| web(&format!("page {}", i), "relative/page.html"))
            .collect();
        docs.push(web("", "https://example.edu/empty"));
        docs.push(web("Admissions 2024", "https://example.edu/admissions"));

        let report = pipeline.ingest(&docs).await.unwrap();

        assert_eq!(report.seen, 12);
        assert_eq!(report.added, 1);
        assert_eq!(report.skipped_invalid, 11);
        assert_eq!(report.skipped_batches, 1);
        assert_eq!(provider.call_count(), 1);
        assert_eq!(store.count(Collection::Web).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn one_embedding_failure_still_persists_all_five() {
        let provider = Arc::new(RecordingEmbedder::failing_on("BROKEN"));
        let (_tmp, store, pipeline) = pipeline(provider).await;

        let docs = vec![
            web("Library hours", "https://example.edu/library"),
            web("Hostel fees", "https://example.edu/hostel"),
            web("BROKEN page", "https://example.edu/broken"),
            web("Exam datesheet 2023", "campus-data/pdfs/datesheet.pdf"),
            web("Placement report", "https://example.edu/placements"),
        ];

        let report = pipeline.ingest(&docs).await.unwrap();

        assert_eq!(report.added, 5);
        assert_eq!(report.degraded_embeddings, 1);
        assert_eq!(store.count(Collection::Web).await.unwrap(), 5);
        assert_eq!(store.count_degraded(Collection::Web).await.unwrap(), 1);

        let zero = vec![0.0; EMBEDDING_DIM];
        let hits = store.query(Collection::Web, &zero, 10).await.unwrap();
        assert_eq!(hits.len(), 5);
    }

    #[tokio::test]
    async fn documents_differing_only_in_title_are_both_kept() {
        let provider = Arc::new(RecordingEmbedder::default());
        let (_tmp, store, pipeline) = pipeline(provider).await;

        let first = web("Fee structure 2024", "https://example.edu/fees");
        let retitled = WebDocument {
            title: "Hostel fees".to_string(),
            ..first.clone()
        };
        let retyped = WebDocument {
            doc_type: "pdf".to_string(),
            ..first.clone()
        };

        let docs = vec![first, retitled, retyped];
        let report = pipeline.ingest(&docs).await.unwrap();

        assert_eq!(report.added, 3);
        assert_eq!(report.skipped_duplicates, 0);
        assert_eq!(store.count(Collection::Web).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn exact_repeats_within_a_run_are_counted_once() {
        let provider = Arc::new(RecordingEmbedder::default());
        let (_tmp, store, pipeline) = pipeline(provider.clone()).await;

        let doc = web("Library hours", "https://example.edu/library");
        let mut docs = vec![doc.clone(); 11];
        docs.push(web("Canteen menu", "https://example.edu/canteen"));

        let report = pipeline.ingest(&docs).await.unwrap();

        assert_eq!(report.added, 2);
        assert_eq!(report.skipped_duplicates, 10);
        assert_eq!(report.skipped_batches, 0);
        assert_eq!(provider.call_count(), 2);
        assert_eq!(
            store.count(Collection::Web).await.unwrap(),
            report.added
        );
    }

    #[tokio::test]
    async fn year_metadata_is_per_document() {
        let provider = Arc::new(RecordingEmbedder::default());
        let (_tmp, store, pipeline) = pipeline(provider).await;

        let docs = vec![
            web("Cutoff list 2022", "https://example.edu/a"),
            web("Canteen menu", "https://example.edu/b"),
        ];
        pipeline.ingest(&docs).await.unwrap();

        let needle = crate::rag::embedder::fakes::vector_for("Canteen menu");
        let hits = store.query(Collection::Web, &needle, 2).await.unwrap();
        let canteen = hits.iter().find(|h| h.text == "Canteen menu").unwrap();
        let cutoff = hits.iter().find(|h| h.text == "Cutoff list 2022").unwrap();
        assert_eq!(canteen.metadata["year"], "");
        assert_eq!(cutoff.metadata["year"], "2022");
    }

    #[tokio::test]
    async fn faq_entries_use_q_and_a_body_and_reingest_upserts() {
        let provider = Arc::new(RecordingEmbedder::default());
        let (_tmp, store, pipeline) = pipeline(provider.clone()).await;

        let entries = vec![
            QnaEntry {
                question: "Is there a library?".to_string(),
                answer: "Yes, open 9 to 5.".to_string(),
                sheet: None,
            },
            QnaEntry {
                question: "  ".to_string(),
                answer: "orphan".to_string(),
                sheet: None,
            },
        ];

        let first = pipeline.ingest(&entries).await.unwrap();
        let second = pipeline.ingest(&entries).await.unwrap();

        assert_eq!(first.added, 1);
        assert_eq!(second.added, 1);
        assert_eq!(store.count(Collection::Faq).await.unwrap(), 1);
        let calls = provider.calls.lock().unwrap();
        assert_eq!(calls[0].0, "Q: Is there a library?; A: Yes, open 9 to 5.");
        assert_eq!(calls[0].1, EmbeddingTask::Index);
    }
}
