use async_trait::async_trait;

use crate::core::errors::ApiError;

/// Length of every vector produced or stored by this crate.
pub const EMBEDDING_DIM: usize = 768;

/// Ceiling on the text a provider may submit for one embedding, in characters,
/// including any task prefix the provider adds.
pub const MAX_EMBED_CHARS: usize = 6000;

/// Longest prefix of `text` holding at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Which side of retrieval a text is embedded for.
///
/// Providers may return different vectors for the same text in the two modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingTask {
    /// Corpus records written during ingestion.
    Index,
    /// User questions at query time.
    Query,
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// return the provider name (e.g. "gemini", "openai_compatible")
    fn name(&self) -> &str;

    /// embed a single text; one call, no retry
    async fn embed_one(&self, text: &str, task: EmbeddingTask) -> Result<Vec<f32>, ApiError>;
}

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn name(&self) -> &str;

    /// single non-streaming completion for a fully assembled prompt
    async fn generate(&self, prompt: &str) -> Result<String, ApiError>;
}
