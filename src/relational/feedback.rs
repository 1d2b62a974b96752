use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{now_timestamp, scope_clause, RelationalStore};
use crate::core::errors::ApiError;
use crate::core::tenancy::TenantScope;

#[derive(Debug, Clone, Serialize)]
pub struct Feedback {
    pub id: i64,
    pub user_id: i64,
    pub username: Option<String>,
    pub domain_id: i64,
    pub content: String,
    pub rating: i64,
    pub question: String,
    pub created_at: String,
}

const FEEDBACK_SELECT: &str = "\
    SELECT f.id, f.user_id, u.username, f.domain_id, f.content, f.rating, f.question, f.created_at
    FROM feedback f
    LEFT JOIN users u ON u.id = f.user_id";

impl RelationalStore {
    pub async fn create_feedback(
        &self,
        user_id: i64,
        domain_id: i64,
        content: &str,
        rating: i64,
        question: &str,
    ) -> Result<i64, ApiError> {
        sqlx::query_scalar(
            "INSERT INTO feedback (user_id, domain_id, content, rating, question, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             RETURNING id",
        )
        .bind(user_id)
        .bind(domain_id)
        .bind(content)
        .bind(rating)
        .bind(question)
        .bind(now_timestamp())
        .fetch_one(&self.pool)
        .await
        .map_err(ApiError::persistence)
    }

    pub async fn list_feedback_for_user(&self, user_id: i64) -> Result<Vec<Feedback>, ApiError> {
        let sql = format!("{} WHERE f.user_id = ? ORDER BY f.id DESC", FEEDBACK_SELECT);
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::persistence)?;
        rows.into_iter()
            .map(feedback_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(ApiError::persistence)
    }

    pub async fn list_feedback(&self, scope: TenantScope) -> Result<Vec<Feedback>, ApiError> {
        let sql = format!(
            "{} WHERE 1 = 1{} ORDER BY f.id DESC",
            FEEDBACK_SELECT,
            scope_clause(scope, "f.domain_id")
        );
        let mut query = sqlx::query(&sql);
        if let Some(domain_id) = scope.domain_id() {
            query = query.bind(domain_id);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::persistence)?;
        rows.into_iter()
            .map(feedback_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(ApiError::persistence)
    }
}

fn feedback_from_row(row: SqliteRow) -> Result<Feedback, sqlx::Error> {
    Ok(Feedback {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        username: row.try_get("username")?,
        domain_id: row.try_get("domain_id")?,
        content: row.try_get("content")?,
        rating: row.try_get("rating")?,
        question: row.try_get("question")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relational::test_support::seeded;

    #[tokio::test]
    async fn feedback_is_listed_per_user_and_per_domain() {
        let seeded = seeded().await;
        let store = &seeded.store;
        store
            .create_feedback(seeded.user_a.id, seeded.domain_a.id, "helpful", 5, "q1")
            .await
            .unwrap();
        store
            .create_feedback(seeded.user_b.id, seeded.domain_b.id, "meh", 2, "q2")
            .await
            .unwrap();

        let mine = store.list_feedback_for_user(seeded.user_a.id).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].username.as_deref(), Some("user-a"));

        let domain_b = store
            .list_feedback(TenantScope::Tenant(seeded.domain_b.id))
            .await
            .unwrap();
        assert_eq!(domain_b.len(), 1);
        assert_eq!(domain_b[0].rating, 2);

        assert_eq!(store.list_feedback(TenantScope::Global).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn rating_outside_range_is_rejected_by_the_store() {
        let seeded = seeded().await;
        let result = seeded
            .store
            .create_feedback(seeded.user_a.id, seeded.domain_a.id, "x", 9, "q")
            .await;
        assert!(matches!(result, Err(ApiError::Persistence(_))));
    }
}
