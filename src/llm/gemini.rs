use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::provider::{EmbeddingProvider, EmbeddingTask, GenerationProvider};
use super::types::{
    GeminiContent, GeminiEmbedRequest, GeminiEmbedResponse, GeminiGenerateRequest,
    GeminiGenerateResponse, GeminiGenerationConfig,
};
use crate::core::errors::ApiError;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Google Generative Language API (`embedContent` / `generateContent`).
#[derive(Clone)]
pub struct GeminiProvider {
    base_url: String,
    api_key: String,
    embedding_model: String,
    generation_model: String,
    generation_config: GeminiGenerationConfig,
    embed_timeout: Duration,
    generate_timeout: Duration,
    client: Client,
}

impl GeminiProvider {
    pub fn new(
        base_url: Option<String>,
        api_key: String,
        embedding_model: String,
        generation_model: String,
    ) -> Self {
        let base_url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            embedding_model: strip_models_prefix(&embedding_model),
            generation_model: strip_models_prefix(&generation_model),
            generation_config: GeminiGenerationConfig::default(),
            embed_timeout: Duration::from_secs(30),
            generate_timeout: Duration::from_secs(120),
            client: Client::new(),
        }
    }

    pub fn with_timeouts(mut self, embed: Duration, generate: Duration) -> Self {
        self.embed_timeout = embed;
        self.generate_timeout = generate;
        self
    }

    pub fn with_generation_config(mut self, temperature: Option<f64>, max_output_tokens: Option<u32>) -> Self {
        self.generation_config = GeminiGenerationConfig {
            temperature,
            max_output_tokens,
        };
        self
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/v1beta/models/{}:{}", self.base_url, model, method)
    }
}

fn strip_models_prefix(model: &str) -> String {
    model.trim().trim_start_matches("models/").to_string()
}

fn task_type(task: EmbeddingTask) -> &'static str {
    match task {
        EmbeddingTask::Index => "RETRIEVAL_DOCUMENT",
        EmbeddingTask::Query => "RETRIEVAL_QUERY",
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn embed_one(&self, text: &str, task: EmbeddingTask) -> Result<Vec<f32>, ApiError> {
        let url = self.model_url(&self.embedding_model, "embedContent");
        let body = GeminiEmbedRequest {
            model: format!("models/{}", self.embedding_model),
            content: GeminiContent::text(text),
            task_type: task_type(task),
        };

        let res = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .timeout(self.embed_timeout)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::upstream)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Upstream(format!(
                "Gemini embed error ({}): {}",
                status, text
            )));
        }

        let payload: GeminiEmbedResponse = res.json().await.map_err(ApiError::upstream)?;
        Ok(payload.embedding.values)
    }
}

#[async_trait]
impl GenerationProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, prompt: &str) -> Result<String, ApiError> {
        let url = self.model_url(&self.generation_model, "generateContent");
        let body = GeminiGenerateRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                ..GeminiContent::text(prompt)
            }],
            generation_config: self.generation_config.clone(),
        };

        let res = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .timeout(self.generate_timeout)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::upstream)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Upstream(format!(
                "Gemini generate error ({}): {}",
                status, text
            )));
        }

        let payload: GeminiGenerateResponse = res.json().await.map_err(ApiError::upstream)?;
        payload
            .text()
            .ok_or_else(|| ApiError::Upstream("Gemini returned no candidate text".to_string()))
    }
}
