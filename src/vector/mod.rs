//! Vector index abstraction and its backends.

pub mod embedding;
pub mod math;
pub mod memory;
pub mod sqlite;
pub mod store;
#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;
use std::time::Duration;

use crate::core::config::settings::{EmbeddingProvider, Settings, VectorBackend};
use crate::core::config::AppPaths;
use crate::core::errors::ApiError;

pub use embedding::{Embedder, HashEmbedder, OpenAiEmbedder};
pub use memory::MemoryVectorIndex;
pub use sqlite::SqliteVectorIndex;
pub use store::{ChunkPayload, IndexedChunk, MetadataFilter, ScoredChunk, VectorIndex};

pub fn build_embedder(settings: &Settings) -> Result<Arc<dyn Embedder>, ApiError> {
    let embedding = &settings.embedding;
    match embedding.provider {
        EmbeddingProvider::Hash => {
            tracing::warn!(
                "Using feature-hash embeddings: retrieval matches shared words only. \
                 Set embedding.provider to openai for semantic search"
            );
            Ok(Arc::new(HashEmbedder::new(embedding.dimensions)))
        }
        EmbeddingProvider::Openai => {
            let base_url = embedding
                .base_url
                .clone()
                .unwrap_or_else(|| settings.llm.base_url.clone());
            let api_key = embedding
                .api_key
                .clone()
                .or_else(|| settings.llm.api_key.clone());
            let embedder = OpenAiEmbedder::new(
                &base_url,
                api_key,
                embedding.model.clone(),
                Duration::from_secs(settings.llm.timeout_secs),
            )?;
            Ok(Arc::new(embedder))
        }
    }
}

pub async fn build_index(
    settings: &Settings,
    paths: &AppPaths,
    embedder: Arc<dyn Embedder>,
) -> Result<Arc<dyn VectorIndex>, ApiError> {
    match settings.vector.backend {
        VectorBackend::Sqlite => {
            let index = SqliteVectorIndex::open(&paths.vector_db_path, embedder).await?;
            tracing::info!("Vector index ready at {}", index.db_path().display());
            Ok(Arc::new(index))
        }
        VectorBackend::Memory => {
            tracing::warn!("Using in-memory vector index; entries are lost on restart");
            Ok(Arc::new(MemoryVectorIndex::new(embedder)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_build_the_offline_hash_embedder() {
        let embedder = build_embedder(&Settings::default()).unwrap();
        assert_eq!(embedder.model_name(), "feature-hash");
    }

    #[test]
    fn openai_provider_uses_the_configured_embedding_model() {
        let mut settings = Settings::default();
        settings.embedding.provider = EmbeddingProvider::Openai;
        let embedder = build_embedder(&settings).unwrap();
        assert_eq!(embedder.model_name(), "text-embedding-3-small");
    }
}
