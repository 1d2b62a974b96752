use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{map_unique_violation, now_timestamp, RelationalStore};
use crate::core::errors::ApiError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Domain {
    pub id: i64,
    pub name: String,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl RelationalStore {
    pub async fn create_domain(&self, name: &str) -> Result<Domain, ApiError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ApiError::Validation("Domain name cannot be empty".to_string()));
        }
        let now = now_timestamp();
        let row = sqlx::query(
            "INSERT INTO domains (name, active, created_at, updated_at) VALUES (?1, 1, ?2, ?2)
             RETURNING id, name, active, created_at, updated_at",
        )
        .bind(name)
        .bind(&now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "Domain"))?;
        domain_from_row(row).map_err(ApiError::persistence)
    }

    pub async fn get_domain(&self, id: i64) -> Result<Option<Domain>, ApiError> {
        let row = sqlx::query(
            "SELECT id, name, active, created_at, updated_at FROM domains WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(ApiError::persistence)?;
        row.map(domain_from_row)
            .transpose()
            .map_err(ApiError::persistence)
    }

    pub async fn list_domains(&self) -> Result<Vec<Domain>, ApiError> {
        let rows = sqlx::query(
            "SELECT id, name, active, created_at, updated_at FROM domains ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::persistence)?;
        rows.into_iter()
            .map(domain_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(ApiError::persistence)
    }

    pub async fn set_domain_active(&self, id: i64, active: bool) -> Result<bool, ApiError> {
        let result = sqlx::query("UPDATE domains SET active = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(active)
            .bind(now_timestamp())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::persistence)?;
        Ok(result.rows_affected() > 0)
    }

    /// Cascades to every row the domain owns.
    pub async fn delete_domain_rows(&self, id: i64) -> Result<bool, ApiError> {
        let result = sqlx::query("DELETE FROM domains WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::persistence)?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count_domains(&self) -> Result<i64, ApiError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM domains")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::persistence)
    }
}

fn domain_from_row(row: SqliteRow) -> Result<Domain, sqlx::Error> {
    Ok(Domain {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        active: row.try_get("active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use crate::core::errors::ApiError;
    use crate::relational::test_support::open_temp;

    #[tokio::test]
    async fn domain_names_are_unique_and_trimmed() {
        let (store, _dir) = open_temp().await;
        let created = store.create_domain("  legal ").await.unwrap();
        assert_eq!(created.name, "legal");
        assert!(created.active);

        assert!(matches!(
            store.create_domain("legal").await,
            Err(ApiError::Conflict(_))
        ));
        assert!(matches!(
            store.create_domain("   ").await,
            Err(ApiError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn activation_toggles_and_reports_missing_rows() {
        let (store, _dir) = open_temp().await;
        let domain = store.create_domain("hr").await.unwrap();

        assert!(store.set_domain_active(domain.id, false).await.unwrap());
        let reloaded = store.get_domain(domain.id).await.unwrap().unwrap();
        assert!(!reloaded.active);

        assert!(!store.set_domain_active(9_999, true).await.unwrap());
        assert_eq!(store.count_domains().await.unwrap(), 1);
    }
}
