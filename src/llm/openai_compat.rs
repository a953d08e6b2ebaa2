use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::provider::{
    truncate_chars, EmbeddingProvider, EmbeddingTask, GenerationProvider, MAX_EMBED_CHARS,
};
use super::types::ChatMessage;
use crate::core::errors::ApiError;

/// Any server exposing `/v1/embeddings` and `/v1/chat/completions`
/// (LM Studio, llama.cpp server, Ollama's OpenAI shim).
#[derive(Clone)]
pub struct OpenAiCompatProvider {
    base_url: String,
    api_key: Option<String>,
    embedding_model: String,
    generation_model: String,
    document_prefix: String,
    query_prefix: String,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    embed_timeout: Duration,
    generate_timeout: Duration,
    client: Client,
}

impl OpenAiCompatProvider {
    pub fn new(base_url: String, embedding_model: String, generation_model: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
            embedding_model,
            generation_model,
            document_prefix: String::new(),
            query_prefix: String::new(),
            temperature: None,
            max_tokens: None,
            embed_timeout: Duration::from_secs(30),
            generate_timeout: Duration::from_secs(120),
            client: Client::new(),
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.trim().is_empty());
        self
    }

    /// Prefixes prepended per task, e.g. `search_document: ` for nomic-embed models.
    pub fn with_task_prefixes(mut self, document: String, query: String) -> Self {
        self.document_prefix = document;
        self.query_prefix = query;
        self
    }

    pub fn with_sampling(mut self, temperature: Option<f64>, max_tokens: Option<u32>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeouts(mut self, embed: Duration, generate: Duration) -> Self {
        self.embed_timeout = embed;
        self.generate_timeout = generate;
        self
    }

    fn post(&self, path: &str, timeout: Duration) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.post(url).timeout(timeout);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Task prefix plus text, cut so the whole input stays within `MAX_EMBED_CHARS`.
    fn prefixed(&self, text: &str, task: EmbeddingTask) -> String {
        let prefix = match task {
            EmbeddingTask::Index => &self.document_prefix,
            EmbeddingTask::Query => &self.query_prefix,
        };
        let budget = MAX_EMBED_CHARS.saturating_sub(prefix.chars().count());
        format!("{}{}", prefix, truncate_chars(text, budget))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai_compatible"
    }

    async fn embed_one(&self, text: &str, task: EmbeddingTask) -> Result<Vec<f32>, ApiError> {
        let body = json!({
            "model": self.embedding_model,
            "input": [self.prefixed(text, task)],
        });

        let res = self
            .post("/v1/embeddings", self.embed_timeout)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::upstream)?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Upstream(format!("Embedding endpoint error: {}", text)));
        }

        let payload: Value = res.json().await.map_err(ApiError::upstream)?;

        payload["data"][0]["embedding"]
            .as_array()
            .map(|vals| {
                vals.iter()
                    .filter_map(|v| v.as_f64().map(|f| f as f32))
                    .collect()
            })
            .ok_or_else(|| ApiError::Upstream("Embedding response had no data".to_string()))
    }
}

#[async_trait]
impl GenerationProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai_compatible"
    }

    async fn generate(&self, prompt: &str) -> Result<String, ApiError> {
        let mut body = json!({
            "model": self.generation_model,
            "messages": [ChatMessage::user(prompt)],
            "stream": false,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = self.temperature { obj.insert("temperature".to_string(), json!(t)); }
            if let Some(t) = self.max_tokens { obj.insert("max_tokens".to_string(), json!(t)); }
        }

        let res = self
            .post("/v1/chat/completions", self.generate_timeout)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::upstream)?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Upstream(format!("Chat completion error: {}", text)));
        }

        let payload: Value = res.json().await.map_err(ApiError::upstream)?;

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| ApiError::Upstream("Chat completion had no content".to_string()))
    }
}
