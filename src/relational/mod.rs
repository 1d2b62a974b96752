//! Authoritative relational store: domains, users, documents, chunks,
//! feedback and chat history in one SQLite database.

mod chat;
mod chunks;
mod documents;
mod domains;
mod feedback;
mod schema;
mod users;

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;

use crate::core::errors::ApiError;
use crate::core::tenancy::TenantScope;

pub use chat::{ChatAnalytics, ChatMessage, ChatSession, HourActivity, MessageHit, SessionSummary};
pub use chunks::{Chunk, NewChunk};
pub use documents::{Document, DocumentSummary};
pub use domains::Domain;
pub use feedback::Feedback;
pub use users::{NewUser, User};

#[derive(Debug, Clone)]
pub struct RelationalStore {
    db_path: PathBuf,
    pool: SqlitePool,
}

impl RelationalStore {
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self, ApiError> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let connect_options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(connect_options)
            .await
            .map_err(ApiError::persistence)?;

        schema::migrate(&pool).await?;
        tracing::info!("Relational store ready at {}", db_path.display());

        Ok(Self { db_path, pool })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Closes every pooled connection; later queries fail with a persistence error.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// RFC 3339 with microseconds, so lexical order equals chronological order.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

/// `AND <column> = ?` for tenant scopes, nothing for global scope.
fn scope_clause(scope: TenantScope, column: &str) -> String {
    match scope {
        TenantScope::Global => String::new(),
        TenantScope::Tenant(_) => format!(" AND {} = ?", column),
    }
}

fn map_unique_violation(err: sqlx::Error, what: &str) -> ApiError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return ApiError::Conflict(format!("{} already exists", what));
        }
    }
    ApiError::persistence(err)
}
