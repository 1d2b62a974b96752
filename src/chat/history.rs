use chrono::{DateTime, Duration, Utc};

use crate::core::errors::ApiError;
use crate::core::security::{Principal, Role};
use crate::core::tenancy::TenantScope;
use crate::relational::{ChatAnalytics, ChatMessage, MessageHit, RelationalStore, SessionSummary};

pub const DEFAULT_SESSION_LIMIT: i64 = 50;
pub const DEFAULT_SEARCH_LIMIT: i64 = 20;
pub const DEFAULT_ANALYTICS_DAYS: i64 = 30;

/// Tenant-scoped reads and deletes over persisted chat history.
#[derive(Clone)]
pub struct ChatHistory {
    relational: RelationalStore,
}

fn is_manager(principal: &Principal) -> bool {
    matches!(principal.role, Role::Admin | Role::SuperAdmin)
}

/// Whose history a request targets. Only admins may name another user.
fn target_user(principal: &Principal, requested: Option<i64>) -> Result<i64, ApiError> {
    match requested {
        Some(user_id) if Some(user_id) != principal.user_id => {
            if is_manager(principal) {
                Ok(user_id)
            } else {
                Err(ApiError::Access(
                    "Only admins may read another user's history".to_string(),
                ))
            }
        }
        Some(user_id) => Ok(user_id),
        None => principal
            .user_id
            .ok_or_else(|| ApiError::Validation("user_id is required".to_string())),
    }
}

fn check_range(name: &str, value: i64, min: i64, max: i64) -> Result<i64, ApiError> {
    if value < min || value > max {
        return Err(ApiError::Validation(format!(
            "{} must be between {} and {}",
            name, min, max
        )));
    }
    Ok(value)
}

impl ChatHistory {
    pub fn new(relational: RelationalStore) -> Self {
        Self { relational }
    }

    pub async fn list_sessions(
        &self,
        principal: &Principal,
        user_id: Option<i64>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<SessionSummary>, ApiError> {
        let limit = check_range("limit", limit.unwrap_or(DEFAULT_SESSION_LIMIT), 1, 100)?;
        let offset = check_range("offset", offset.unwrap_or(0), 0, i64::MAX)?;
        let scope = TenantScope::for_principal(principal)?;
        let user_id = target_user(principal, user_id)?;
        self.relational
            .list_sessions(user_id, scope, limit, offset)
            .await
    }

    pub async fn session_messages(
        &self,
        principal: &Principal,
        session_id: i64,
    ) -> Result<Vec<ChatMessage>, ApiError> {
        let scope = TenantScope::for_principal(principal)?;
        let session = self
            .relational
            .get_session(session_id, scope)
            .await?
            .ok_or_else(|| ApiError::NotFound("Session not found".to_string()))?;
        if Some(session.user_id) != principal.user_id && !is_manager(principal) {
            return Err(ApiError::Access(
                "Can only read your own sessions".to_string(),
            ));
        }
        let messages = self.relational.list_messages(session.id).await?;
        if messages.is_empty() {
            return Err(ApiError::NotFound(
                "Session not found or no messages".to_string(),
            ));
        }
        Ok(messages)
    }

    pub async fn delete_session(
        &self,
        principal: &Principal,
        session_id: i64,
    ) -> Result<(), ApiError> {
        let scope = TenantScope::for_principal(principal)?;
        let session = self
            .relational
            .get_session(session_id, scope)
            .await?
            .ok_or_else(|| ApiError::NotFound("Session not found".to_string()))?;
        if Some(session.user_id) != principal.user_id && !is_manager(principal) {
            return Err(ApiError::Access(
                "Can only delete your own sessions".to_string(),
            ));
        }
        self.relational.delete_session(session.id).await?;
        tracing::info!(
            "Chat session {} deleted by {}",
            session.id,
            principal.username
        );
        Ok(())
    }

    pub async fn search(
        &self,
        principal: &Principal,
        needle: &str,
        user_id: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Vec<MessageHit>, ApiError> {
        let needle = needle.trim();
        if needle.is_empty() {
            return Err(ApiError::Validation("Search term is required".to_string()));
        }
        let limit = check_range("limit", limit.unwrap_or(DEFAULT_SEARCH_LIMIT), 1, 100)?;
        let scope = TenantScope::for_principal(principal)?;
        let user_id = target_user(principal, user_id)?;
        self.relational
            .search_messages(user_id, scope, needle, limit)
            .await
    }

    pub async fn analytics(
        &self,
        principal: &Principal,
        days: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<ChatAnalytics, ApiError> {
        let days = check_range("days", days.unwrap_or(DEFAULT_ANALYTICS_DAYS), 1, 365)?;
        let scope = TenantScope::for_principal(principal)?;
        let user_id = target_user(principal, None)?;
        self.relational
            .chat_analytics(user_id, scope, now - Duration::days(days))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tenancy::fixtures;
    use crate::relational::test_support::seeded;

    #[tokio::test]
    async fn sessions_and_messages_are_owner_or_admin_only() {
        let seed = seeded().await;
        let history = ChatHistory::new(seed.store.clone());
        let session = seed
            .store
            .create_session(seed.user_a.id, Some(seed.domain_a.id), Utc::now())
            .await
            .unwrap();
        seed.store
            .append_message(session.id, seed.user_a.id, "vacation?", "20 days")
            .await
            .unwrap();

        let owner = fixtures::user(seed.user_a.id, seed.domain_a.id);
        assert_eq!(
            history.session_messages(&owner, session.id).await.unwrap().len(),
            1
        );
        let listed = history
            .list_sessions(&owner, None, None, None)
            .await
            .unwrap();
        assert_eq!(listed[0].message_count, 1);

        let other_tenant = fixtures::user(seed.user_b.id, seed.domain_b.id);
        assert!(matches!(
            history.session_messages(&other_tenant, session.id).await,
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(
            history.list_sessions(&other_tenant, Some(seed.user_a.id), None, None).await,
            Err(ApiError::Access(_))
        ));

        let admin = fixtures::admin(seed.admin_a.id, seed.domain_a.id);
        let as_admin = history
            .list_sessions(&admin, Some(seed.user_a.id), Some(10), Some(0))
            .await
            .unwrap();
        assert_eq!(as_admin.len(), 1);
        assert!(matches!(
            history.list_sessions(&admin, None, Some(101), None).await,
            Err(ApiError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn delete_requires_owner_or_admin() {
        let seed = seeded().await;
        let history = ChatHistory::new(seed.store.clone());
        let session = seed
            .store
            .create_session(seed.admin_a.id, Some(seed.domain_a.id), Utc::now())
            .await
            .unwrap();

        let user = fixtures::user(seed.user_a.id, seed.domain_a.id);
        assert!(matches!(
            history.delete_session(&user, session.id).await,
            Err(ApiError::Access(_))
        ));
        let admin = fixtures::admin(seed.admin_a.id, seed.domain_a.id);
        history.delete_session(&admin, session.id).await.unwrap();
        assert!(matches!(
            history.delete_session(&admin, session.id).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn search_and_analytics_cover_own_messages() {
        let seed = seeded().await;
        let history = ChatHistory::new(seed.store.clone());
        let session = seed
            .store
            .create_session(seed.user_a.id, Some(seed.domain_a.id), Utc::now())
            .await
            .unwrap();
        for (q, a) in [
            ("Vacation days?", "Twenty"),
            ("Parking?", "Level 2"),
            ("Sick leave?", "Ten days"),
        ] {
            seed.store
                .append_message(session.id, seed.user_a.id, q, a)
                .await
                .unwrap();
        }
        let user = fixtures::user(seed.user_a.id, seed.domain_a.id);

        let hits = history.search(&user, "days", None, None).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(matches!(
            history.search(&user, "  ", None, None).await,
            Err(ApiError::Validation(_))
        ));

        let stats = history.analytics(&user, None, Utc::now()).await.unwrap();
        assert_eq!(stats.total_sessions, 1);
        assert_eq!(stats.total_messages, 3);
        assert_eq!(stats.average_messages_per_session, 3.0);
        assert!(matches!(
            history.analytics(&user, Some(0), Utc::now()).await,
            Err(ApiError::Validation(_))
        ));
    }
}
