use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{map_unique_violation, now_timestamp, scope_clause, RelationalStore};
use crate::core::errors::ApiError;
use crate::core::security::Role;
use crate::core::tenancy::TenantScope;

const USER_COLUMNS: &str = "id, username, email, password_hash, role, domain_id, created_at, updated_at";

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub role: Role,
    pub domain_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub domain_id: Option<i64>,
}

impl RelationalStore {
    pub async fn create_user(&self, user: NewUser) -> Result<User, ApiError> {
        if user.role != Role::SuperAdmin && user.domain_id.is_none() {
            return Err(ApiError::Validation(
                "Only super admins may exist without a domain".to_string(),
            ));
        }
        let now = now_timestamp();
        let sql = format!(
            "INSERT INTO users (username, email, password_hash, role, domain_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             RETURNING {}",
            USER_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(user.username.trim())
            .bind(user.email.trim())
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .bind(user.domain_id)
            .bind(&now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, "Username or email"))?;
        user_from_row(row).map_err(ApiError::persistence)
    }

    pub async fn get_user(&self, id: i64, scope: TenantScope) -> Result<Option<User>, ApiError> {
        let sql = format!(
            "SELECT {} FROM users WHERE id = ?{}",
            USER_COLUMNS,
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
        row.map(user_from_row)
            .transpose()
            .map_err(ApiError::persistence)
    }

    pub async fn list_users(&self, scope: TenantScope) -> Result<Vec<User>, ApiError> {
        let sql = format!(
            "SELECT {} FROM users WHERE 1 = 1{} ORDER BY id ASC",
            USER_COLUMNS,
            scope_clause(scope, "domain_id")
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
            .map(user_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(ApiError::persistence)
    }

    pub async fn update_user_role(
        &self,
        id: i64,
        role: Role,
        scope: TenantScope,
    ) -> Result<bool, ApiError> {
        let sql = format!(
            "UPDATE users SET role = ?, updated_at = ? WHERE id = ?{}",
            scope_clause(scope, "domain_id")
        );
        let mut query = sqlx::query(&sql)
            .bind(role.as_str())
            .bind(now_timestamp())
            .bind(id);
        if let Some(domain_id) = scope.domain_id() {
            query = query.bind(domain_id);
        }
        let result = query
            .execute(&self.pool)
            .await
            .map_err(ApiError::persistence)?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn update_user_email(
        &self,
        id: i64,
        email: &str,
        scope: TenantScope,
    ) -> Result<bool, ApiError> {
        let sql = format!(
            "UPDATE users SET email = ?, updated_at = ? WHERE id = ?{}",
            scope_clause(scope, "domain_id")
        );
        let mut query = sqlx::query(&sql)
            .bind(email.trim())
            .bind(now_timestamp())
            .bind(id);
        if let Some(domain_id) = scope.domain_id() {
            query = query.bind(domain_id);
        }
        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, "Email"))?;
        Ok(result.rows_affected() > 0)
    }

    /// Cascades to the user's documents, chunks, feedback and chat history.
    pub async fn delete_user_rows(&self, id: i64) -> Result<bool, ApiError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::persistence)?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count_users_with_role(&self, role: Role) -> Result<i64, ApiError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = ?1")
            .bind(role.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::persistence)
    }
}

fn user_from_row(row: SqliteRow) -> Result<User, sqlx::Error> {
    let raw_role: String = row.try_get("role")?;
    let role = raw_role
        .parse::<Role>()
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role,
        domain_id: row.try_get("domain_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
