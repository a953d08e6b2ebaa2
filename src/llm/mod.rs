pub mod gemini;
pub mod openai_compat;
pub mod provider;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

pub use gemini::GeminiProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use provider::{
    truncate_chars, EmbeddingProvider, EmbeddingTask, GenerationProvider, EMBEDDING_DIM,
    MAX_EMBED_CHARS,
};

use crate::core::config::{ProviderKind, RagSettings};
use crate::core::errors::ApiError;

/// The two model capabilities the engine depends on.
#[derive(Clone)]
pub struct Providers {
    pub embedding: Arc<dyn EmbeddingProvider>,
    pub generation: Arc<dyn GenerationProvider>,
}

/// Builds the configured provider; both capabilities share one client.
pub fn build_providers(settings: &RagSettings) -> Result<Providers, ApiError> {
    let llm = &settings.llm;
    let embed_timeout = Duration::from_secs(settings.embedding.timeout_secs);
    let generate_timeout = Duration::from_secs(settings.generation.timeout_secs);

    match llm.provider {
        ProviderKind::Gemini => {
            let api_key = llm
                .api_key
                .clone()
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| {
                    ApiError::BadRequest(
                        "Gemini provider requires llm.api_key or GOOGLE_API_KEY".to_string(),
                    )
                })?;

            let provider = Arc::new(
                GeminiProvider::new(
                    llm.base_url.clone(),
                    api_key,
                    llm.embedding_model.clone(),
                    llm.generation_model.clone(),
                )
                .with_timeouts(embed_timeout, generate_timeout)
                .with_generation_config(llm.temperature, llm.max_output_tokens),
            );

            Ok(Providers {
                embedding: provider.clone(),
                generation: provider,
            })
        }
        ProviderKind::OpenaiCompatible => {
            let base_url = llm.base_url.clone().ok_or_else(|| {
                ApiError::BadRequest(
                    "openai_compatible provider requires llm.base_url".to_string(),
                )
            })?;

            let provider = Arc::new(
                OpenAiCompatProvider::new(
                    base_url,
                    llm.embedding_model.clone(),
                    llm.generation_model.clone(),
                )
                .with_api_key(llm.api_key.clone())
                .with_task_prefixes(
                    settings.embedding.document_prefix.clone(),
                    settings.embedding.query_prefix.clone(),
                )
                .with_sampling(llm.temperature, llm.max_output_tokens)
                .with_timeouts(embed_timeout, generate_timeout),
            );

            Ok(Providers {
                embedding: provider.clone(),
                generation: provider,
            })
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::Router;
    use tokio::net::TcpListener;

    use super::GenerationProvider;
    use crate::core::errors::ApiError;

    /// Echoes a canned reply and records every prompt it receives.
    #[derive(Default)]
    pub struct RecordingGenerator {
        pub prompts: Mutex<Vec<String>>,
        pub fail: bool,
    }

    impl RecordingGenerator {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        pub fn call_count(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl GenerationProvider for RecordingGenerator {
        fn name(&self) -> &str {
            "recording"
        }

        async fn generate(&self, prompt: &str) -> Result<String, ApiError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if self.fail {
                return Err(ApiError::Upstream("model unavailable".to_string()));
            }
            Ok("Generated answer.".to_string())
        }
    }

    /// Serves `router` on an ephemeral local port and returns its base URL.
    pub async fn spawn_fake_server(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{}", addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn gemini_without_key_is_rejected() {
        let settings = RagSettings::from_value(&json!({})).unwrap();
        let err = build_providers(&settings).err().unwrap();
        assert!(err.to_string().contains("GOOGLE_API_KEY"));
    }

    #[test]
    fn openai_compatible_needs_base_url() {
        let settings =
            RagSettings::from_value(&json!({ "llm": { "provider": "openai_compatible" } })).unwrap();
        assert!(build_providers(&settings).is_err());

        let settings = RagSettings::from_value(&json!({
            "llm": { "provider": "openai_compatible", "base_url": "http://localhost:1234" }
        }))
        .unwrap();
        let providers = build_providers(&settings).unwrap();
        assert_eq!(providers.embedding.name(), "openai_compatible");
        assert_eq!(providers.generation.name(), "openai_compatible");
    }
}
