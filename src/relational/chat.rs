use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{format_timestamp, now_timestamp, scope_clause, RelationalStore};
use crate::core::errors::ApiError;
use crate::core::tenancy::TenantScope;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatSession {
    pub id: i64,
    pub user_id: i64,
    pub domain_id: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub id: i64,
    pub session_id: i64,
    pub user_id: i64,
    pub question: String,
    pub answer: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    #[serde(flatten)]
    pub session: ChatSession,
    pub message_count: i64,
    pub last_message_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageHit {
    #[serde(flatten)]
    pub message: ChatMessage,
    pub session_created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HourActivity {
    pub hour: i64,
    pub messages: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatAnalytics {
    pub total_sessions: i64,
    pub total_messages: i64,
    pub average_messages_per_session: f64,
    pub most_active_hours: Vec<HourActivity>,
}

const SESSION_COLUMNS: &str = "id, user_id, domain_id, created_at";

impl RelationalStore {
    pub async fn create_session(
        &self,
        user_id: i64,
        domain_id: Option<i64>,
        created_at: DateTime<Utc>,
    ) -> Result<ChatSession, ApiError> {
        let sql = format!(
            "INSERT INTO chat_sessions (user_id, domain_id, created_at) VALUES (?1, ?2, ?3) RETURNING {}",
            SESSION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(domain_id)
            .bind(format_timestamp(created_at))
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::persistence)?;
        session_from_row(&row).map_err(ApiError::persistence)
    }

    pub async fn get_session(
        &self,
        id: i64,
        scope: TenantScope,
    ) -> Result<Option<ChatSession>, ApiError> {
        let sql = format!(
            "SELECT {} FROM chat_sessions WHERE id = ?{}",
            SESSION_COLUMNS,
            scope_clause(scope, "domain_id")
        );
        let mut query = sqlx::query(&sql).bind(id);
        if let Some(domain_id) = scope.domain_id() {
            query = query.bind(domain_id);
        }
        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::persistence)?;
        row.as_ref()
            .map(session_from_row)
            .transpose()
            .map_err(ApiError::persistence)
    }

    /// Most recently created session of `user_id` in exactly `domain_id`
    /// (`None` matches only global-scope sessions).
    pub async fn latest_session(
        &self,
        user_id: i64,
        domain_id: Option<i64>,
    ) -> Result<Option<ChatSession>, ApiError> {
        let sql = format!(
            "SELECT {} FROM chat_sessions
             WHERE user_id = ?1 AND domain_id IS ?2
             ORDER BY created_at DESC, id DESC
             LIMIT 1",
            SESSION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(domain_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::persistence)?;
        row.as_ref()
            .map(session_from_row)
            .transpose()
            .map_err(ApiError::persistence)
    }

    /// Append-only: there is no update path for messages.
    pub async fn append_message(
        &self,
        session_id: i64,
        user_id: i64,
        question: &str,
        answer: &str,
    ) -> Result<ChatMessage, ApiError> {
        let row = sqlx::query(
            "INSERT INTO chat_messages (session_id, user_id, question, answer, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             RETURNING id, session_id, user_id, question, answer, created_at",
        )
        .bind(session_id)
        .bind(user_id)
        .bind(question)
        .bind(answer)
        .bind(now_timestamp())
        .fetch_one(&self.pool)
        .await
        .map_err(ApiError::persistence)?;
        message_from_row(&row).map_err(ApiError::persistence)
    }

    pub async fn list_messages(&self, session_id: i64) -> Result<Vec<ChatMessage>, ApiError> {
        let rows = sqlx::query(
            "SELECT id, session_id, user_id, question, answer, created_at
             FROM chat_messages WHERE session_id = ?1 ORDER BY id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::persistence)?;
        rows.iter()
            .map(message_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(ApiError::persistence)
    }

    pub async fn list_sessions(
        &self,
        user_id: i64,
        scope: TenantScope,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SessionSummary>, ApiError> {
        let sql = format!(
            "SELECT s.id, s.user_id, s.domain_id, s.created_at,
                    (SELECT COUNT(*) FROM chat_messages m WHERE m.session_id = s.id) AS message_count,
                    (SELECT MAX(m.created_at) FROM chat_messages m WHERE m.session_id = s.id) AS last_message_at
             FROM chat_sessions s
             WHERE s.user_id = ?{}
             ORDER BY s.created_at DESC, s.id DESC
             LIMIT ? OFFSET ?",
            scope_clause(scope, "s.domain_id")
        );
        let mut query = sqlx::query(&sql).bind(user_id);
        if let Some(domain_id) = scope.domain_id() {
            query = query.bind(domain_id);
        }
        let rows = query
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::persistence)?;
        rows.iter()
            .map(|row| {
                Ok(SessionSummary {
                    session: session_from_row(row)?,
                    message_count: row.try_get("message_count")?,
                    last_message_at: row.try_get("last_message_at")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(ApiError::persistence)
    }

    pub async fn delete_session(&self, id: i64) -> Result<bool, ApiError> {
        let result = sqlx::query("DELETE FROM chat_sessions WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::persistence)?;
        Ok(result.rows_affected() > 0)
    }

    /// Case-insensitive substring match over question and answer text.
    pub async fn search_messages(
        &self,
        user_id: i64,
        scope: TenantScope,
        needle: &str,
        limit: i64,
    ) -> Result<Vec<MessageHit>, ApiError> {
        let sql = format!(
            "SELECT m.id, m.session_id, m.user_id, m.question, m.answer, m.created_at,
                    s.created_at AS session_created_at
             FROM chat_messages m
             JOIN chat_sessions s ON s.id = m.session_id
             WHERE m.user_id = ?
               AND (m.question LIKE ? ESCAPE '\\' OR m.answer LIKE ? ESCAPE '\\'){}
             ORDER BY m.created_at DESC, m.id DESC
             LIMIT ?",
            scope_clause(scope, "s.domain_id")
        );
        let pattern = format!("%{}%", escape_like(needle));
        let mut query = sqlx::query(&sql)
            .bind(user_id)
            .bind(&pattern)
            .bind(&pattern);
        if let Some(domain_id) = scope.domain_id() {
            query = query.bind(domain_id);
        }
        let rows = query
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::persistence)?;
        rows.iter()
            .map(|row| {
                Ok(MessageHit {
                    message: message_from_row(row)?,
                    session_created_at: row.try_get("session_created_at")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(ApiError::persistence)
    }

    pub async fn chat_analytics(
        &self,
        user_id: i64,
        scope: TenantScope,
        since: DateTime<Utc>,
    ) -> Result<ChatAnalytics, ApiError> {
        let since = format_timestamp(since);
        let clause = scope_clause(scope, "s.domain_id");

        let totals_sql = format!(
            "SELECT COUNT(DISTINCT s.id) AS sessions, COUNT(m.id) AS messages
             FROM chat_sessions s
             LEFT JOIN chat_messages m ON m.session_id = s.id
             WHERE s.user_id = ? AND s.created_at >= ?{}",
            clause
        );
        let mut totals = sqlx::query(&totals_sql).bind(user_id).bind(&since);
        if let Some(domain_id) = scope.domain_id() {
            totals = totals.bind(domain_id);
        }
        let row = totals
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::persistence)?;
        let total_sessions: i64 = row.try_get("sessions").map_err(ApiError::persistence)?;
        let total_messages: i64 = row.try_get("messages").map_err(ApiError::persistence)?;

        let hours_sql = format!(
            "SELECT CAST(substr(m.created_at, 12, 2) AS INTEGER) AS hour, COUNT(*) AS messages
             FROM chat_messages m
             JOIN chat_sessions s ON s.id = m.session_id
             WHERE s.user_id = ? AND s.created_at >= ?{}
             GROUP BY hour
             ORDER BY messages DESC, hour ASC
             LIMIT 5",
            clause
        );
        let mut hours = sqlx::query(&hours_sql).bind(user_id).bind(&since);
        if let Some(domain_id) = scope.domain_id() {
            hours = hours.bind(domain_id);
        }
        let most_active_hours = hours
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::persistence)?
            .iter()
            .map(|row| {
                Ok(HourActivity {
                    hour: row.try_get("hour")?,
                    messages: row.try_get("messages")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(ApiError::persistence)?;

        let average = if total_sessions > 0 {
            ((total_messages as f64 / total_sessions as f64) * 100.0).round() / 100.0
        } else {
            0.0
        };

        Ok(ChatAnalytics {
            total_sessions,
            total_messages,
            average_messages_per_session: average,
            most_active_hours,
        })
    }
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn session_from_row(row: &SqliteRow) -> Result<ChatSession, sqlx::Error> {
    Ok(ChatSession {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        domain_id: row.try_get("domain_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn message_from_row(row: &SqliteRow) -> Result<ChatMessage, sqlx::Error> {
    Ok(ChatMessage {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        user_id: row.try_get("user_id")?,
        question: row.try_get("question")?,
        answer: row.try_get("answer")?,
        created_at: row.try_get("created_at")?,
    })
}
