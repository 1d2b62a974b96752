use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to load configuration: {0}")]
    Config(#[source] anyhow::Error),

    #[error("Failed to initialize identity resolver: {0}")]
    Identity(#[source] anyhow::Error),

    #[error("Failed to open relational store: {0}")]
    Relational(#[source] anyhow::Error),

    #[error("Failed to initialize vector index: {0}")]
    VectorIndex(#[source] anyhow::Error),

    #[error("Failed to initialize language model: {0}")]
    Llm(#[source] anyhow::Error),
}
