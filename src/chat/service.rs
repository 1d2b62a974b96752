use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::session::{SessionManager, TurnRecord};
use crate::core::errors::ApiError;
use crate::core::security::Principal;
use crate::core::tenancy::search_scope;
use crate::retrieval::language::greeting_response;
use crate::retrieval::{is_greeting, AnswerComposer, Language, SourceCitation};

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub k: Option<usize>,
    #[serde(default)]
    pub session_id: Option<i64>,
    /// Super admins may aim a query at one domain; others may only name their own.
    #[serde(default)]
    pub domain_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub answer: String,
    pub sources: Vec<SourceCitation>,
    pub language: Option<Language>,
    pub greeting: bool,
    pub used_model: bool,
    pub session_id: Option<i64>,
    pub message_id: Option<i64>,
    pub persisted: bool,
}

/// validate → resolve session → greet or retrieve → record the turn
#[derive(Clone)]
pub struct ChatService {
    composer: AnswerComposer,
    sessions: SessionManager,
}

impl ChatService {
    pub fn new(composer: AnswerComposer, sessions: SessionManager) -> Self {
        Self { composer, sessions }
    }

    pub fn composer(&self) -> &AnswerComposer {
        &self.composer
    }

    pub async fn chat(
        &self,
        principal: &Principal,
        request: ChatRequest,
        now: DateTime<Utc>,
    ) -> Result<ChatReply, ApiError> {
        let question = request.message.trim();
        if question.is_empty() {
            return Err(ApiError::Validation("Empty message".to_string()));
        }
        let k = self
            .composer
            .validate_k(request.k.unwrap_or_else(|| self.composer.default_k()))?;
        let scope = search_scope(principal, request.domain_id)?;

        let handle = self
            .sessions
            .resolve(principal, scope, request.session_id, now)
            .await;

        let (answer, sources, language, greeting, used_model) = match is_greeting(question) {
            Some(language) => (
                greeting_response(Some(language)).to_string(),
                Vec::new(),
                Some(language),
                true,
                false,
            ),
            None => {
                let composed = self.composer.answer(question, k, scope).await?;
                (
                    composed.answer,
                    composed.sources,
                    composed.language,
                    false,
                    composed.used_model,
                )
            }
        };

        let record = self
            .sessions
            .record_turn(&handle, principal, question, &answer)
            .await;
        let (session_id, message_id) = match &record {
            TurnRecord::Persisted {
                session_id,
                message_id,
            } => (Some(*session_id), Some(*message_id)),
            TurnRecord::Unpersisted { .. } => (handle.session_id(), None),
        };
        info!(
            "Chat turn for {} in {:?}: greeting={}, sources={}, persisted={}",
            principal.username,
            scope,
            greeting,
            sources.len(),
            record.is_persisted()
        );

        Ok(ChatReply {
            answer,
            sources,
            language,
            greeting,
            used_model,
            session_id,
            message_id,
            persisted: record.is_persisted(),
        })
    }
}
