//! Typed view over the merged YAML configuration.
//!
//! Every section is optional; missing keys fall back to the defaults below.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::ApiError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagSettings {
    pub server: ServerSettings,
    pub llm: LlmSettings,
    pub embedding: EmbeddingSettings,
    pub generation: GenerationSettings,
    pub ingest: IngestSettings,
    pub retrieval: RetrievalSettings,
    pub assistant: AssistantSettings,
    pub prompt: PromptSettings,
}

impl RagSettings {
    pub fn from_value(config: &Value) -> Result<Self, ApiError> {
        serde_json::from_value(config.clone())
            .map_err(|e| ApiError::BadRequest(format!("Invalid config: {}", e)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// `["*"]` allows any origin.
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_allowed_origins: vec!["*".to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Gemini,
    OpenaiCompatible,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub provider: ProviderKind,
    /// Overrides the provider's public endpoint.
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub embedding_model: String,
    pub generation_model: String,
    pub temperature: Option<f64>,
    pub max_output_tokens: Option<u32>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Gemini,
            base_url: None,
            api_key: None,
            embedding_model: "text-embedding-004".to_string(),
            generation_model: "gemini-2.0-flash".to_string(),
            temperature: None,
            max_output_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Number of provider calls in flight per batch; 1 keeps them sequential.
    pub concurrency: usize,
    pub timeout_secs: u64,
    /// Task prefixes for OpenAI-compatible servers, which have no task type field.
    pub document_prefix: String,
    pub query_prefix: String,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            concurrency: 1,
            timeout_secs: 30,
            document_prefix: "search_document: ".to_string(),
            query_prefix: "search_query: ".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub timeout_secs: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self { timeout_secs: 120 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    pub batch_size: usize,
    /// Path fragment identifying documents that live in the local corpus.
    pub local_corpus_marker: String,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            local_corpus_marker: "campus-data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_n: usize,
    pub max_evidence: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_n: 5,
            max_evidence: 11,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantSettings {
    pub name: String,
    pub institution_name: String,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            name: "Campus Assist".to_string(),
            institution_name: "the university".to_string(),
        }
    }
}

/// Overrides for individual prompt fragments; unset fields keep the built-in text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptSettings {
    pub version: Option<String>,
    pub persona: Option<String>,
    pub tone: Option<String>,
    pub temporal_policy: Option<String>,
    pub source_guidelines: Option<String>,
    pub structure_outline: Option<String>,
    pub limitations: Option<String>,
    /// Upper bound for "most recent year" reasoning; defaults to the current year.
    pub reference_year: Option<i32>,
}
