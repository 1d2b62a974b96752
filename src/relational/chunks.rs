use serde::Serialize;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{now_timestamp, scope_clause, Document, RelationalStore};
use crate::core::errors::ApiError;
use crate::core::tenancy::TenantScope;

#[derive(Debug, Clone, Serialize)]
pub struct Chunk {
    pub id: i64,
    pub content: String,
    pub meta_data: Value,
    pub user_id: i64,
    pub domain_id: i64,
    pub doc_id: i64,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewChunk {
    pub content: String,
    pub meta_data: Value,
}

impl RelationalStore {
    /// Inserts chunk rows for `doc`, one transaction per batch of `batch_size`.
    ///
    /// Returns the created ids in input order. A failing batch rolls back on its
    /// own; earlier batches stay committed.
    pub async fn insert_chunks(
        &self,
        doc: &Document,
        chunks: &[NewChunk],
        batch_size: usize,
    ) -> Result<Vec<i64>, ApiError> {
        let batch_size = batch_size.max(1);
        let mut ids = Vec::with_capacity(chunks.len());
        let total_batches = chunks.len().div_ceil(batch_size);

        for (index, batch) in chunks.chunks(batch_size).enumerate() {
            let mut tx = self.pool.begin().await.map_err(ApiError::persistence)?;
            let now = now_timestamp();
            for chunk in batch {
                let meta = serde_json::to_string(&chunk.meta_data).map_err(ApiError::internal)?;
                let id: i64 = sqlx::query_scalar(
                    "INSERT INTO chunks (content, meta_data, user_id, domain_id, doc_id, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                     RETURNING id",
                )
                .bind(&chunk.content)
                .bind(meta)
                .bind(doc.user_id)
                .bind(doc.domain_id)
                .bind(doc.id)
                .bind(&now)
                .fetch_one(&mut *tx)
                .await
                .map_err(ApiError::persistence)?;
                ids.push(id);
            }
            tx.commit().await.map_err(ApiError::persistence)?;
            tracing::info!(
                "Saved chunk batch {}/{} for document {} ({} rows)",
                index + 1,
                total_batches,
                doc.id,
                batch.len()
            );
        }

        Ok(ids)
    }

    pub async fn list_chunks(
        &self,
        doc_id: i64,
        scope: TenantScope,
    ) -> Result<Vec<Chunk>, ApiError> {
        let sql = format!(
            "SELECT id, content, meta_data, user_id, domain_id, doc_id, created_at
             FROM chunks WHERE doc_id = ?{} ORDER BY id ASC",
            scope_clause(scope, "domain_id")
        );
        let mut query = sqlx::query(&sql).bind(doc_id);
        if let Some(domain_id) = scope.domain_id() {
            query = query.bind(domain_id);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::persistence)?;
        rows.into_iter()
            .map(chunk_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(ApiError::persistence)
    }

    pub async fn count_chunks(&self, doc_id: i64, domain_id: i64) -> Result<i64, ApiError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE doc_id = ?1 AND domain_id = ?2")
            .bind(doc_id)
            .bind(domain_id)
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::persistence)
    }

    pub async fn delete_chunks_for_document(
        &self,
        doc_id: i64,
        domain_id: i64,
    ) -> Result<u64, ApiError> {
        let result = sqlx::query("DELETE FROM chunks WHERE doc_id = ?1 AND domain_id = ?2")
            .bind(doc_id)
            .bind(domain_id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::persistence)?;
        Ok(result.rows_affected())
    }
}

fn chunk_from_row(row: SqliteRow) -> Result<Chunk, sqlx::Error> {
    let raw_meta: Option<String> = row.try_get("meta_data")?;
    let meta_data = raw_meta
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or(Value::Object(serde_json::Map::new()));
    Ok(Chunk {
        id: row.try_get("id")?,
        content: row.try_get("content")?,
        meta_data,
        user_id: row.try_get("user_id")?,
        domain_id: row.try_get("domain_id")?,
        doc_id: row.try_get("doc_id")?,
        created_at: row.try_get("created_at")?,
    })
}
