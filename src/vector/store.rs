//! VectorIndex trait: the similarity-search store over chunk embeddings.
//!
//! Entries are keyed by a UUID embedding id and correlated to relational rows
//! only through their metadata (`domain_id`, `doc_id`, `user_id`, `source`).

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::errors::ApiError;
use crate::core::tenancy::TenantScope;

/// Text plus metadata handed to [`VectorIndex::add`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub text: String,
    pub metadata: Map<String, Value>,
}

/// A stored entry as returned by searches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub id: String,
    pub text: String,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: IndexedChunk,
    /// Cosine similarity, higher is closer.
    pub score: f32,
}

/// Conjunction of equality matches on metadata keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    terms: BTreeMap<String, Value>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.terms.insert(key.into(), value.into());
        self
    }

    /// `{domain_id}` for a tenant, unfiltered for global scope.
    pub fn for_scope(scope: TenantScope) -> Self {
        match scope {
            TenantScope::Global => Self::new(),
            TenantScope::Tenant(domain_id) => Self::new().eq("domain_id", domain_id),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.terms.iter()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.terms.get(key)
    }

    pub fn matches(&self, metadata: &Map<String, Value>) -> bool {
        self.terms.iter().all(|(key, expected)| match metadata.get(key) {
            Some(actual) => values_equal(actual, expected),
            None => expected.is_null(),
        })
    }
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => a.as_f64() == b.as_f64(),
        },
        _ => actual == expected,
    }
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Embeds and stores every payload, returning the new embedding ids in order.
    async fn add(&self, chunks: Vec<ChunkPayload>) -> Result<Vec<String>, ApiError>;

    async fn similarity_search_with_scores(
        &self,
        query: &str,
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredChunk>, ApiError>;

    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<IndexedChunk>, ApiError> {
        let scored = self.similarity_search_with_scores(query, k, filter).await?;
        Ok(scored.into_iter().map(|hit| hit.chunk).collect())
    }

    /// Deletes every entry matching `filter`. An empty filter is refused.
    async fn delete(&self, filter: &MetadataFilter) -> Result<u64, ApiError>;

    /// Flushes pending writes to durable storage.
    async fn persist(&self) -> Result<(), ApiError>;

    async fn count(&self, filter: &MetadataFilter) -> Result<u64, ApiError>;
}

pub(crate) fn refuse_unfiltered_delete(filter: &MetadataFilter) -> Result<(), ApiError> {
    if filter.is_empty() {
        return Err(ApiError::Index(
            "Refusing to delete vector entries without a filter".to_string(),
        ));
    }
    Ok(())
}
