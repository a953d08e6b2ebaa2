use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to load configuration: {0}")]
    Config(#[source] anyhow::Error),

    #[error("Failed to open vector store: {0}")]
    Store(#[source] anyhow::Error),

    #[error("Failed to initialize model providers: {0}")]
    Providers(#[source] anyhow::Error),
}
