//! Scriptable index wrapper for inducing failures in tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::embedding::HashEmbedder;
use super::memory::MemoryVectorIndex;
use super::store::{ChunkPayload, MetadataFilter, ScoredChunk, VectorIndex};
use crate::core::errors::ApiError;

#[derive(Default)]
pub struct Failures {
    pub add: AtomicBool,
    pub persist: AtomicBool,
    pub search: AtomicBool,
    pub delete: AtomicBool,
}

pub struct ScriptedIndex {
    inner: MemoryVectorIndex,
    pub failures: Failures,
    deletes: Mutex<Vec<MetadataFilter>>,
    searches: Mutex<usize>,
    persist_budget: Mutex<Option<usize>>,
}

impl ScriptedIndex {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryVectorIndex::new(Arc::new(HashEmbedder::new(128))),
            failures: Failures::default(),
            deletes: Mutex::new(Vec::new()),
            searches: Mutex::new(0),
            persist_budget: Mutex::new(None),
        })
    }

    pub fn fail(flag: &AtomicBool, on: bool) {
        flag.store(on, Ordering::SeqCst);
    }

    /// Lets `successes` persists through, then fails every later one.
    pub fn fail_persist_after(&self, successes: usize) {
        *self.persist_budget.lock().unwrap() = Some(successes);
    }

    pub fn delete_calls(&self) -> Vec<MetadataFilter> {
        self.deletes.lock().unwrap().clone()
    }

    pub fn search_calls(&self) -> usize {
        *self.searches.lock().unwrap()
    }
}

fn induced(what: &str) -> ApiError {
    ApiError::Index(format!("induced {} failure", what))
}

#[async_trait]
impl VectorIndex for ScriptedIndex {
    async fn add(&self, chunks: Vec<ChunkPayload>) -> Result<Vec<String>, ApiError> {
        if self.failures.add.load(Ordering::SeqCst) {
            return Err(induced("add"));
        }
        self.inner.add(chunks).await
    }

    async fn similarity_search_with_scores(
        &self,
        query: &str,
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredChunk>, ApiError> {
        *self.searches.lock().unwrap() += 1;
        if self.failures.search.load(Ordering::SeqCst) {
            return Err(induced("search"));
        }
        self.inner.similarity_search_with_scores(query, k, filter).await
    }

    async fn delete(&self, filter: &MetadataFilter) -> Result<u64, ApiError> {
        self.deletes.lock().unwrap().push(filter.clone());
        if self.failures.delete.load(Ordering::SeqCst) {
            return Err(induced("delete"));
        }
        self.inner.delete(filter).await
    }

    async fn persist(&self) -> Result<(), ApiError> {
        if self.failures.persist.load(Ordering::SeqCst) {
            return Err(induced("persist"));
        }
        if let Some(remaining) = self.persist_budget.lock().unwrap().as_mut() {
            if *remaining == 0 {
                return Err(induced("persist"));
            }
            *remaining -= 1;
        }
        self.inner.persist().await
    }

    async fn count(&self, filter: &MetadataFilter) -> Result<u64, ApiError> {
        self.inner.count(filter).await
    }
}
