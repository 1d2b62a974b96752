use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::embedding::Embedder;
use super::math::{cosine_similarity, sort_descending};
use super::store::{
    refuse_unfiltered_delete, ChunkPayload, IndexedChunk, MetadataFilter, ScoredChunk, VectorIndex,
};
use crate::core::errors::ApiError;

struct Entry {
    chunk: IndexedChunk,
    embedding: Vec<f32>,
}

/// Process-local index. Nothing survives a restart; `persist` is a no-op.
pub struct MemoryVectorIndex {
    embedder: Arc<dyn Embedder>,
    entries: RwLock<Vec<Entry>>,
}

impl MemoryVectorIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            entries: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn add(&self, chunks: Vec<ChunkPayload>) -> Result<Vec<String>, ApiError> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(ApiError::Index(format!(
                "Embedder returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let mut entries = self.entries.write().await;
        let mut ids = Vec::with_capacity(chunks.len());
        for (payload, embedding) in chunks.into_iter().zip(embeddings) {
            let id = Uuid::new_v4().to_string();
            entries.push(Entry {
                chunk: IndexedChunk {
                    id: id.clone(),
                    text: payload.text,
                    metadata: payload.metadata,
                },
                embedding,
            });
            ids.push(id);
        }
        Ok(ids)
    }

    async fn similarity_search_with_scores(
        &self,
        query: &str,
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredChunk>, ApiError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query_embedding = self.embedder.embed_one(query).await?;
        let entries = self.entries.read().await;

        let mut scored: Vec<(IndexedChunk, f32)> = entries
            .iter()
            .filter(|entry| filter.matches(&entry.chunk.metadata))
            .map(|entry| {
                (
                    entry.chunk.clone(),
                    cosine_similarity(&query_embedding, &entry.embedding),
                )
            })
            .collect();

        sort_descending(&mut scored);
        scored.truncate(k);
        Ok(scored
            .into_iter()
            .map(|(chunk, score)| ScoredChunk { chunk, score })
            .collect())
    }

    async fn delete(&self, filter: &MetadataFilter) -> Result<u64, ApiError> {
        refuse_unfiltered_delete(filter)?;
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|entry| !filter.matches(&entry.chunk.metadata));
        Ok((before - entries.len()) as u64)
    }

    async fn persist(&self) -> Result<(), ApiError> {
        Ok(())
    }

    async fn count(&self, filter: &MetadataFilter) -> Result<u64, ApiError> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|entry| filter.matches(&entry.chunk.metadata))
            .count() as u64)
    }
}
