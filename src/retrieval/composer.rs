use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use super::context::{build_context, extract_sources, ContextBudget, SourceCitation};
use super::language::{detect_language, localized_not_found, Language, NOT_FOUND_ANSWER};
use super::prompt::{stub_answer, SYSTEM_INSTRUCTIONS};
use crate::core::config::settings::RetrievalSettings;
use crate::core::errors::ApiError;
use crate::core::tenancy::TenantScope;
use crate::llm::LanguageModel;
use crate::vector::{IndexedChunk, MetadataFilter, ScoredChunk, VectorIndex};

#[derive(Debug, Clone, Serialize)]
pub struct ComposedAnswer {
    pub answer: String,
    pub sources: Vec<SourceCitation>,
    pub language: Option<Language>,
    /// True only when the answer text came from the language model.
    pub used_model: bool,
}

impl ComposedAnswer {
    pub fn not_found(language: Option<Language>) -> Self {
        Self {
            answer: localized_not_found(language).to_string(),
            sources: Vec::new(),
            language,
            used_model: false,
        }
    }
}

/// Retrieves scoped chunks and turns them into an answer with citations.
#[derive(Clone)]
pub struct AnswerComposer {
    index: Arc<dyn VectorIndex>,
    model: Option<Arc<dyn LanguageModel>>,
    settings: RetrievalSettings,
}

impl AnswerComposer {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        model: Option<Arc<dyn LanguageModel>>,
        settings: RetrievalSettings,
    ) -> Self {
        Self {
            index,
            model,
            settings,
        }
    }

    pub fn model_name(&self) -> Option<&str> {
        self.model.as_ref().map(|model| model.model_name())
    }

    pub fn default_k(&self) -> usize {
        self.settings.default_k
    }

    pub fn validate_k(&self, k: usize) -> Result<usize, ApiError> {
        if k == 0 || k > self.settings.max_k {
            return Err(ApiError::Validation(format!(
                "k must be between 1 and {}",
                self.settings.max_k
            )));
        }
        Ok(k)
    }

    /// Never fails on store or model errors; only bad input is rejected.
    pub async fn answer(
        &self,
        query: &str,
        k: usize,
        scope: TenantScope,
    ) -> Result<ComposedAnswer, ApiError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ApiError::Validation("Empty message".to_string()));
        }
        let k = self.validate_k(k)?;
        let language = detect_language(query);

        let hits: Vec<IndexedChunk> = match self
            .index
            .similarity_search(query, k, &MetadataFilter::for_scope(scope))
            .await
        {
            Ok(hits) => hits,
            Err(err) => {
                warn!("Vector search failed, answering without context: {}", err);
                Vec::new()
            }
        };

        if !hits.iter().any(|hit| !hit.text.trim().is_empty()) {
            debug!("No usable chunks for query in {:?}", scope);
            return Ok(ComposedAnswer::not_found(language));
        }

        let context = build_context(
            &hits,
            ContextBudget {
                max_chars: self.settings.context_max_chars,
                chunk_max_chars: self.settings.chunk_max_chars,
            },
        );

        let (mut answer, used_model) = match &self.model {
            None => (stub_answer(&context, query), false),
            Some(model) => match model.complete(SYSTEM_INSTRUCTIONS, &context, query).await {
                Ok(text) if text.trim().is_empty() => (NOT_FOUND_ANSWER.to_string(), true),
                Ok(text) => (text.trim().to_string(), true),
                Err(err) => {
                    warn!("Language model call failed, using stub answer: {}", err);
                    (stub_answer(&context, query), false)
                }
            },
        };
        if answer == NOT_FOUND_ANSWER {
            answer = localized_not_found(language).to_string();
        }

        Ok(ComposedAnswer {
            answer,
            sources: extract_sources(&hits, self.settings.snippet_chars),
            language,
            used_model,
        })
    }

    pub async fn probe(
        &self,
        query: &str,
        k: usize,
        scope: TenantScope,
    ) -> Result<Vec<IndexedChunk>, ApiError> {
        let k = self.validate_k(k)?;
        self.index
            .similarity_search(query, k, &MetadataFilter::for_scope(scope))
            .await
    }

    pub async fn probe_with_scores(
        &self,
        query: &str,
        k: usize,
        scope: TenantScope,
    ) -> Result<Vec<ScoredChunk>, ApiError> {
        let k = self.validate_k(k)?;
        self.index
            .similarity_search_with_scores(query, k, &MetadataFilter::for_scope(scope))
            .await
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::FakeModel;
    use super::*;
    use crate::vector::testing::ScriptedIndex;
    use crate::vector::ChunkPayload;
    use serde_json::json;

    fn payload(text: &str, domain_id: i64, source: &str) -> ChunkPayload {
        ChunkPayload {
            text: text.to_string(),
            metadata: json!({ "domain_id": domain_id, "doc_id": 1, "source": source })
                .as_object()
                .cloned()
                .unwrap(),
        }
    }

    async fn seeded_index() -> Arc<ScriptedIndex> {
        let index = ScriptedIndex::new();
        index
            .add(vec![
                payload("Employees receive twenty vacation days per year.", 1, "handbook.txt"),
                payload("Vacation days roll over for one year.", 1, "handbook.txt"),
                payload("Contractors receive no vacation days.", 2, "secret.txt"),
            ])
            .await
            .unwrap();
        index
    }

    fn composer(index: Arc<ScriptedIndex>, model: Option<Arc<FakeModel>>) -> AnswerComposer {
        AnswerComposer::new(
            index,
            model.map(|m| m as Arc<dyn LanguageModel>),
            RetrievalSettings::default(),
        )
    }

    #[tokio::test]
    async fn tenant_scope_filters_every_hit() {
        let index = seeded_index().await;
        let composer = composer(index, None);
        for k in 1..=5 {
            let hits = composer
                .probe("vacation days", k, TenantScope::Tenant(1))
                .await
                .unwrap();
            assert!(hits.len() <= 2);
            assert!(hits.iter().all(|h| h.metadata["domain_id"] == json!(1)));
        }
        let global = composer
            .probe_with_scores("vacation days", 5, TenantScope::Global)
            .await
            .unwrap();
        assert_eq!(global.len(), 3);
    }

    #[tokio::test]
    async fn model_answer_is_returned_with_deduplicated_sources() {
        let index = seeded_index().await;
        let model = FakeModel::replying("Twenty days.");
        let composer = composer(index, Some(model.clone()));

        let answer = composer
            .answer("How many vacation days do I get?", 5, TenantScope::Tenant(1))
            .await
            .unwrap();

        assert_eq!(answer.answer, "Twenty days.");
        assert!(answer.used_model);
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].source_file, "handbook.txt");
        let calls = model.calls.lock().unwrap();
        assert!(calls[0].0.starts_with("[Source 1: handbook.txt]\n"));
        assert!(!calls[0].0.contains("Contractors"));
    }

    #[tokio::test]
    async fn empty_tenant_answers_not_found_without_calling_the_model() {
        let index = seeded_index().await;
        let model = FakeModel::replying("should not be used");
        let composer = composer(index, Some(model.clone()));

        let answer = composer
            .answer("What is the vacation policy?", 5, TenantScope::Tenant(3))
            .await
            .unwrap();

        assert_eq!(answer.answer, NOT_FOUND_ANSWER);
        assert!(answer.sources.is_empty());
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn model_failure_falls_back_to_stub() {
        let index = seeded_index().await;
        let composer = composer(index, Some(FakeModel::failing()));

        let answer = composer
            .answer("vacation days", 3, TenantScope::Tenant(1))
            .await
            .unwrap();

        assert_eq!(answer.answer, "Based on the provided documents: vacation days");
        assert!(!answer.used_model);
        assert!(!answer.sources.is_empty());
    }

    #[tokio::test]
    async fn not_found_replies_are_localized() {
        let index = seeded_index().await;
        let localized = composer(index, Some(FakeModel::replying(NOT_FOUND_ANSWER)));

        let answer = localized
            .answer(
                "Wie viele Urlaubstage bekommen die neuen Mitarbeiter jedes Jahr in unserem Unternehmen?",
                3,
                TenantScope::Tenant(1),
            )
            .await
            .unwrap();

        assert_eq!(answer.language, Some(Language::De));
        assert_eq!(answer.answer, Language::De.not_found());

        let blank = composer(seeded_index().await, Some(FakeModel::replying("  ")));
        let answer = blank
            .answer("What are the vacation days?", 3, TenantScope::Tenant(1))
            .await
            .unwrap();
        assert_eq!(answer.answer, NOT_FOUND_ANSWER);
    }

    #[tokio::test]
    async fn index_errors_are_absorbed_as_no_hits() {
        let index = seeded_index().await;
        ScriptedIndex::fail(&index.failures.search, true);
        let composer = composer(index.clone(), None);

        let answer = composer
            .answer("vacation days", 3, TenantScope::Tenant(1))
            .await
            .unwrap();
        assert_eq!(answer.answer, NOT_FOUND_ANSWER);

        assert!(matches!(
            composer.probe("vacation", 3, TenantScope::Tenant(1)).await,
            Err(ApiError::Index(_))
        ));
    }

    #[tokio::test]
    async fn bad_input_is_rejected_before_search() {
        let index = seeded_index().await;
        let composer = composer(index.clone(), None);

        assert!(matches!(
            composer.answer("   ", 5, TenantScope::Tenant(1)).await,
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            composer.answer("q", 0, TenantScope::Tenant(1)).await,
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            composer.answer("q", 51, TenantScope::Tenant(1)).await,
            Err(ApiError::Validation(_))
        ));
        assert_eq!(index.search_calls(), 0);
    }
}
