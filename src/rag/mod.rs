//! Retrieval-augmented answering over two persisted collections.
//!
//! - `IngestPipeline`: validates, embeds and stores web documents and FAQ entries
//! - `Retriever`: searches both collections and merges the evidence
//! - `RagEngine`: turns a question into a grounded answer

pub mod document;
pub mod embedder;
pub mod engine;
pub mod ingest;
pub mod prompt;
pub mod retrieval;
pub mod sqlite;
pub mod store;

pub use document::{load_qna_entries, load_web_documents, Ingestible, QnaEntry, WebDocument};
pub use embedder::Embedder;
pub use engine::{RagAnswer, RagEngine};
pub use ingest::{IngestConfig, IngestPipeline, IngestReport};
pub use prompt::PromptTemplate;
pub use retrieval::{EvidenceSet, RetrievalConfig, Retriever};
pub use sqlite::SqliteRagStore;
pub use store::{Collection, RagStore};
