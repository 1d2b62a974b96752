use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{now_timestamp, scope_clause, RelationalStore};
use crate::core::errors::ApiError;
use crate::core::tenancy::TenantScope;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    pub id: i64,
    pub name: String,
    pub user_id: i64,
    pub domain_id: i64,
    pub active: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    #[serde(flatten)]
    pub document: Document,
    pub chunk_count: i64,
}

impl RelationalStore {
    pub async fn create_document(
        &self,
        name: &str,
        user_id: i64,
        domain_id: i64,
    ) -> Result<Document, ApiError> {
        let row = sqlx::query(
            "INSERT INTO docs (name, user_id, domain_id, active, created_at) VALUES (?1, ?2, ?3, 1, ?4)
             RETURNING id, name, user_id, domain_id, active, created_at",
        )
        .bind(name)
        .bind(user_id)
        .bind(domain_id)
        .bind(now_timestamp())
        .fetch_one(&self.pool)
        .await
        .map_err(ApiError::persistence)?;
        document_from_row(&row).map_err(ApiError::persistence)
    }

    pub async fn get_document(
        &self,
        id: i64,
        scope: TenantScope,
    ) -> Result<Option<Document>, ApiError> {
        let sql = format!(
            "SELECT id, name, user_id, domain_id, active, created_at FROM docs WHERE id = ?{}",
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
            .map(document_from_row)
            .transpose()
            .map_err(ApiError::persistence)
    }

    pub async fn list_documents(
        &self,
        scope: TenantScope,
    ) -> Result<Vec<DocumentSummary>, ApiError> {
        let sql = format!(
            "SELECT d.id, d.name, d.user_id, d.domain_id, d.active, d.created_at,
                    (SELECT COUNT(*) FROM chunks c WHERE c.doc_id = d.id) AS chunk_count
             FROM docs d
             WHERE 1 = 1{}
             ORDER BY d.id ASC",
            scope_clause(scope, "d.domain_id")
        );
        let mut query = sqlx::query(&sql);
        if let Some(domain_id) = scope.domain_id() {
            query = query.bind(domain_id);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::persistence)?;
        rows.iter()
            .map(|row| {
                Ok(DocumentSummary {
                    document: document_from_row(row)?,
                    chunk_count: row.try_get("chunk_count")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(ApiError::persistence)
    }

    pub async fn set_document_active(
        &self,
        id: i64,
        active: bool,
        scope: TenantScope,
    ) -> Result<bool, ApiError> {
        let sql = format!(
            "UPDATE docs SET active = ? WHERE id = ?{}",
            scope_clause(scope, "domain_id")
        );
        let mut query = sqlx::query(&sql).bind(active).bind(id);
        if let Some(domain_id) = scope.domain_id() {
            query = query.bind(domain_id);
        }
        let result = query
            .execute(&self.pool)
            .await
            .map_err(ApiError::persistence)?;
        Ok(result.rows_affected() > 0)
    }

    /// Removes a document's chunk rows and the document row in one transaction.
    /// Returns the number of chunk rows removed.
    pub async fn delete_document_rows(&self, doc_id: i64, domain_id: i64) -> Result<u64, ApiError> {
        let mut tx = self.pool.begin().await.map_err(ApiError::persistence)?;
        let chunks = sqlx::query("DELETE FROM chunks WHERE doc_id = ?1 AND domain_id = ?2")
            .bind(doc_id)
            .bind(domain_id)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::persistence)?;
        sqlx::query("DELETE FROM docs WHERE id = ?1 AND domain_id = ?2")
            .bind(doc_id)
            .bind(domain_id)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::persistence)?;
        tx.commit().await.map_err(ApiError::persistence)?;
        Ok(chunks.rows_affected())
    }

    pub async fn count_documents(&self, scope: TenantScope) -> Result<i64, ApiError> {
        let sql = format!(
            "SELECT COUNT(*) FROM docs WHERE 1 = 1{}",
            scope_clause(scope, "domain_id")
        );
        let mut query = sqlx::query_scalar(&sql);
        if let Some(domain_id) = scope.domain_id() {
            query = query.bind(domain_id);
        }
        query
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::persistence)
    }
}

fn document_from_row(row: &SqliteRow) -> Result<Document, sqlx::Error> {
    Ok(Document {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        user_id: row.try_get("user_id")?,
        domain_id: row.try_get("domain_id")?,
        active: row.try_get("active")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relational::test_support::seeded;

    #[tokio::test]
    async fn documents_are_scoped_to_their_domain() {
        let seeded = seeded().await;
        let store = &seeded.store;
        let doc = store
            .create_document("handbook.txt", seeded.admin_a.id, seeded.domain_a.id)
            .await
            .unwrap();

        assert!(store
            .get_document(doc.id, TenantScope::Tenant(seeded.domain_b.id))
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            store
                .get_document(doc.id, TenantScope::Tenant(seeded.domain_a.id))
                .await
                .unwrap(),
            Some(doc.clone())
        );
        assert!(!store
            .set_document_active(doc.id, false, TenantScope::Tenant(seeded.domain_b.id))
            .await
            .unwrap());
        assert!(store
            .set_document_active(doc.id, false, TenantScope::Global)
            .await
            .unwrap());

        let listed = store
            .list_documents(TenantScope::Tenant(seeded.domain_a.id))
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert!(!listed[0].document.active);
        assert_eq!(listed[0].chunk_count, 0);
        assert_eq!(
            store
                .count_documents(TenantScope::Tenant(seeded.domain_b.id))
                .await
                .unwrap(),
            0
        );
    }
}
