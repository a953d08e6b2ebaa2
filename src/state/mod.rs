use std::sync::Arc;

use crate::core::config::{AppPaths, ConfigService, RagSettings};
use crate::llm::{build_providers, Providers};
use crate::rag::{
    Embedder, IngestConfig, IngestPipeline, PromptTemplate, RagEngine, RagStore, RetrievalConfig,
    Retriever, SqliteRagStore,
};

pub mod error;

use error::InitializationError;

/// Application state shared by the HTTP handlers and the CLI commands.
///
/// Holds the one store handle for the process; whoever created the state
/// calls `shutdown` when done with it.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: ConfigService,
    pub settings: RagSettings,
    pub store: Arc<dyn RagStore>,
    pub providers: Providers,
    pub engine: RagEngine,
}

impl AppState {
    /// Loads configuration, opens the store and builds the providers.
    pub async fn initialize(paths: Arc<AppPaths>) -> Result<Arc<Self>, InitializationError> {
        let config = ConfigService::new(paths.clone());
        let raw = config
            .load_config()
            .map_err(|e| InitializationError::Config(e.into()))?;
        tracing::debug!(
            "Loaded config from {}: {}",
            config.config_path().display(),
            config.redact_sensitive_values(&raw)
        );
        let settings =
            RagSettings::from_value(&raw).map_err(|e| InitializationError::Config(e.into()))?;

        let providers =
            build_providers(&settings).map_err(|e| InitializationError::Providers(e.into()))?;

        let store: Arc<dyn RagStore> = Arc::new(
            SqliteRagStore::open(paths.store_path.clone())
                .await
                .map_err(|e| InitializationError::Store(e.into()))?,
        );

        tracing::info!(
            provider = providers.generation.name(),
            "Opened vector store at {}",
            paths.store_path.display()
        );

        Ok(Arc::new(Self::from_parts(
            paths, config, settings, store, providers,
        )))
    }

    /// Wires the engine from already-built parts.
    pub fn from_parts(
        paths: Arc<AppPaths>,
        config: ConfigService,
        settings: RagSettings,
        store: Arc<dyn RagStore>,
        providers: Providers,
    ) -> Self {
        let retriever = Retriever::new(
            store.clone(),
            Embedder::new(providers.embedding.clone()),
            RetrievalConfig::from(&settings),
        );
        let engine = RagEngine::new(
            retriever,
            PromptTemplate::from_settings(&settings),
            providers.generation.clone(),
        );

        Self {
            paths,
            config,
            settings,
            store,
            providers,
            engine,
        }
    }

    pub fn ingest_pipeline(&self) -> IngestPipeline {
        let embedder = Embedder::new(self.providers.embedding.clone())
            .with_concurrency(self.settings.embedding.concurrency);
        IngestPipeline::new(
            self.store.clone(),
            embedder,
            IngestConfig::from(&self.settings),
        )
    }

    /// Releases the store. No reads or writes may follow.
    pub async fn shutdown(&self) {
        self.store.close().await;
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::test_state;
    use crate::rag::{Collection, WebDocument};

    #[tokio::test]
    async fn ingest_pipeline_writes_through_shared_store() {
        let t = test_state().await;
        let docs = vec![WebDocument {
            text: "Convocation is in March".to_string(),
            url: "https://x.edu/convocation".to_string(),
            title: "Convocation".to_string(),
            doc_type: "html".to_string(),
        }];

        let report = t.state.ingest_pipeline().ingest(&docs).await.unwrap();

        assert_eq!(report.added, 1);
        assert_eq!(t.state.store.count(Collection::Web).await.unwrap(), 1);
        assert_eq!(t.embedder.call_count(), 1);
    }

    #[tokio::test]
    async fn engine_uses_configured_assistant_name() {
        let t = test_state().await;
        assert_eq!(t.state.engine.template().assistant_name, "Campus Assist");
    }
}
