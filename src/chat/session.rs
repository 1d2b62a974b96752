//! Session continuity for chat turns.
//!
//! Persistence failures never reach the caller: they are logged and the
//! turn is reported as unpersisted.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{error, info};

use crate::core::errors::ApiError;
use crate::core::security::Principal;
use crate::core::tenancy::TenantScope;
use crate::relational::{parse_timestamp, ChatSession, RelationalStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionHandle {
    Persisted(ChatSession),
    Unpersisted { reason: String },
}

impl SessionHandle {
    pub fn session_id(&self) -> Option<i64> {
        match self {
            SessionHandle::Persisted(session) => Some(session.id),
            SessionHandle::Unpersisted { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TurnRecord {
    Persisted { session_id: i64, message_id: i64 },
    Unpersisted { reason: String },
}

impl TurnRecord {
    pub fn is_persisted(&self) -> bool {
        matches!(self, TurnRecord::Persisted { .. })
    }
}

#[derive(Clone)]
pub struct SessionManager {
    relational: RelationalStore,
    recency_window: Duration,
}

impl SessionManager {
    pub fn new(relational: RelationalStore, recency_window_hours: i64) -> Self {
        Self {
            relational,
            recency_window: Duration::hours(recency_window_hours.max(0)),
        }
    }

    /// Reuses the requested session, else a recent one, else creates one.
    pub async fn resolve(
        &self,
        principal: &Principal,
        scope: TenantScope,
        requested_session_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> SessionHandle {
        let Some(user_id) = principal.user_id else {
            return SessionHandle::Unpersisted {
                reason: "caller has no user account".to_string(),
            };
        };
        match self
            .try_resolve(user_id, scope.domain_id(), requested_session_id, now)
            .await
        {
            Ok(session) => SessionHandle::Persisted(session),
            Err(err) => {
                error!(
                    "Session resolution for user {} failed, turn will not be saved: {}",
                    user_id, err
                );
                SessionHandle::Unpersisted {
                    reason: err.to_string(),
                }
            }
        }
    }

    async fn try_resolve(
        &self,
        user_id: i64,
        domain_id: Option<i64>,
        requested_session_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<ChatSession, ApiError> {
        if let Some(requested) = requested_session_id {
            let scope = domain_id.map_or(TenantScope::Global, TenantScope::Tenant);
            if let Some(session) = self.relational.get_session(requested, scope).await? {
                if session.user_id == user_id && session.domain_id == domain_id {
                    return Ok(session);
                }
            }
        }

        if let Some(latest) = self.relational.latest_session(user_id, domain_id).await? {
            let recent = parse_timestamp(&latest.created_at)
                .map(|created| now - created <= self.recency_window)
                .unwrap_or(false);
            if recent {
                return Ok(latest);
            }
        }

        let session = self
            .relational
            .create_session(user_id, domain_id, now)
            .await?;
        info!(
            "Created chat session {} for user {} (domain {:?})",
            session.id, user_id, domain_id
        );
        Ok(session)
    }

    /// Appends exactly one message to the resolved session.
    pub async fn record_turn(
        &self,
        handle: &SessionHandle,
        principal: &Principal,
        question: &str,
        answer: &str,
    ) -> TurnRecord {
        let session = match handle {
            SessionHandle::Persisted(session) => session,
            SessionHandle::Unpersisted { reason } => {
                return TurnRecord::Unpersisted {
                    reason: reason.clone(),
                }
            }
        };
        let user_id = principal.user_id.unwrap_or(session.user_id);
        match self
            .relational
            .append_message(session.id, user_id, question, answer)
            .await
        {
            Ok(message) => TurnRecord::Persisted {
                session_id: session.id,
                message_id: message.id,
            },
            Err(err) => {
                error!(
                    "Saving chat turn to session {} failed: {}",
                    session.id, err
                );
                TurnRecord::Unpersisted {
                    reason: err.to_string(),
                }
            }
        }
    }
}
