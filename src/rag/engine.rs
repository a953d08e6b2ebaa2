//! Question answering: retrieve evidence, assemble the prompt, generate.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::prompt::PromptTemplate;
use super::retrieval::Retriever;
use crate::core::errors::ApiError;
use crate::llm::GenerationProvider;

pub const MISSING_QUERY: &str = "Missing query";

/// Reply to one question. `sources` lines up index-for-index with the
/// evidence the answer was generated from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagAnswer {
    pub query: String,
    pub answer: String,
    pub sources: Vec<String>,
}

#[derive(Clone)]
pub struct RagEngine {
    retriever: Retriever,
    template: PromptTemplate,
    generator: Arc<dyn GenerationProvider>,
}

impl RagEngine {
    pub fn new(
        retriever: Retriever,
        template: PromptTemplate,
        generator: Arc<dyn GenerationProvider>,
    ) -> Self {
        Self {
            retriever,
            template,
            generator,
        }
    }

    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    /// Answers `question` from the stored corpus.
    ///
    /// A blank question is rejected before any provider or store call.
    /// Retrieval never fails on provider trouble; generation failures and
    /// store failures propagate.
    pub async fn answer(&self, question: &str) -> Result<RagAnswer, ApiError> {
        if question.trim().is_empty() {
            return Err(ApiError::BadRequest(MISSING_QUERY.to_string()));
        }

        let evidence = self.retriever.retrieve(question).await?;
        let prompt = self.template.build_prompt(question, &evidence);

        tracing::info!(
            template = %self.template.version,
            evidence = evidence.len(),
            "Generating answer with {}",
            self.generator.name()
        );

        let answer = self.generator.generate(&prompt).await?;

        Ok(RagAnswer {
            query: question.to_string(),
            answer,
            sources: evidence.into_sources(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::llm::test_support::RecordingGenerator;
    use crate::llm::EMBEDDING_DIM;
    use crate::rag::embedder::fakes::RecordingEmbedder;
    use crate::rag::embedder::Embedder;
    use crate::rag::retrieval::RetrievalConfig;
    use crate::rag::sqlite::SqliteRagStore;
    use crate::rag::store::{Collection, CollectionRecord, RagStore};

    struct Harness {
        _tmp: tempfile::TempDir,
        store: Arc<SqliteRagStore>,
        embedder: Arc<RecordingEmbedder>,
        generator: Arc<RecordingGenerator>,
        engine: RagEngine,
    }

    async fn harness(generator: RecordingGenerator) -> Harness {
        harness_with(RecordingEmbedder::default(), generator).await
    }

    async fn harness_with(embedder: RecordingEmbedder, generator: RecordingGenerator) -> Harness {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(
            SqliteRagStore::open(tmp.path().join("vectorstore.db"))
                .await
                .unwrap(),
        );
        let embedder = Arc::new(embedder);
        let generator = Arc::new(generator);
        let engine = RagEngine::new(
            Retriever::new(
                store.clone(),
                Embedder::new(embedder.clone()),
                RetrievalConfig::default(),
            ),
            PromptTemplate::builtin("Campus Assist", "the university", 2025),
            generator.clone(),
        );
        Harness {
            _tmp: tmp,
            store,
            embedder,
            generator,
            engine,
        }
    }

    fn web_record(id: &str, text: &str, url: &str) -> CollectionRecord {
        let mut embedding = vec![0.0; EMBEDDING_DIM];
        embedding[0] = 1.0;
        CollectionRecord {
            id: id.to_string(),
            text: text.to_string(),
            metadata: BTreeMap::from([("url".to_string(), url.to_string())]),
            embedding,
        }
    }

    #[tokio::test]
    async fn blank_question_is_rejected_without_calls() {
        let h = harness(RecordingGenerator::default()).await;

        for question in ["", "   ", "\n\t"] {
            let err = h.engine.answer(question).await.unwrap_err();
            assert!(matches!(err, ApiError::BadRequest(ref m) if m == MISSING_QUERY));
        }

        assert_eq!(h.embedder.call_count(), 0);
        assert_eq!(h.generator.call_count(), 0);
    }

    #[tokio::test]
    async fn answer_carries_aligned_sources() {
        let h = harness(RecordingGenerator::default()).await;
        h.store
            .upsert_batch(
                Collection::Web,
                vec![web_record(
                    "w1",
                    "Admission cutoff 2023: rank 5100",
                    "https://x.edu/cutoff-2023",
                )],
                "run",
            )
            .await
            .unwrap();

        let reply = h
            .engine
            .answer("What was the 2023 admission cutoff?")
            .await
            .unwrap();

        assert_eq!(reply.query, "What was the 2023 admission cutoff?");
        assert_eq!(reply.answer, "Generated answer.");
        assert_eq!(reply.sources, vec!["https://x.edu/cutoff-2023"]);

        let prompts = h.generator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("This question names 2023"));
        assert!(prompts[0].contains("Admission cutoff 2023: rank 5100"));
    }

    #[tokio::test]
    async fn empty_corpus_still_generates() {
        let h = harness(RecordingGenerator::default()).await;

        let reply = h.engine.answer("Where is the library?").await.unwrap();

        assert!(reply.sources.is_empty());
        assert_eq!(h.generator.call_count(), 1);
        assert!(h.generator.prompts.lock().unwrap()[0].contains("Context:\n\n\n---\n\n\n\n"));
    }

    #[tokio::test]
    async fn query_embedding_failure_still_answers_from_zero_vector() {
        let h = harness_with(
            RecordingEmbedder::failing_on("OUTAGE"),
            RecordingGenerator::default(),
        )
        .await;
        h.store
            .upsert_batch(
                Collection::Web,
                vec![web_record("w1", "Exam datesheet", "https://x.edu/exams")],
                "run",
            )
            .await
            .unwrap();

        let reply = h.engine.answer("OUTAGE: when are exams?").await.unwrap();

        assert_eq!(h.embedder.call_count(), 1);
        assert_eq!(
            h.embedder.calls.lock().unwrap()[0].1,
            crate::llm::EmbeddingTask::Query
        );
        assert_eq!(h.generator.call_count(), 1);
        assert_eq!(reply.answer, "Generated answer.");
        assert_eq!(reply.sources, vec!["https://x.edu/exams"]);
    }

    #[tokio::test]
    async fn generation_failure_propagates() {
        let h = harness(RecordingGenerator::failing()).await;

        let err = h.engine.answer("Hostel fees?").await.unwrap_err();

        assert!(matches!(err, ApiError::Upstream(_)));
        assert_eq!(err.status(), axum::http::StatusCode::BAD_GATEWAY);
    }
}
