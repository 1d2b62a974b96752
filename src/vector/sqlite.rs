//! SQLite-backed vector index.
//!
//! Metadata lives as JSON text next to a little-endian f32 embedding blob.
//! Filters become `json_extract` predicates; ranking is brute-force cosine.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{Arguments, Row, SqlitePool};
use uuid::Uuid;

use super::embedding::Embedder;
use super::math::{cosine_similarity, deserialize_embedding, serialize_embedding, sort_descending};
use super::store::{
    refuse_unfiltered_delete, ChunkPayload, IndexedChunk, MetadataFilter, ScoredChunk, VectorIndex,
};
use crate::core::errors::ApiError;
use crate::relational::now_timestamp;

pub struct SqliteVectorIndex {
    pool: SqlitePool,
    db_path: PathBuf,
    embedder: Arc<dyn Embedder>,
}

impl SqliteVectorIndex {
    pub async fn open(
        db_path: impl AsRef<Path>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, ApiError> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::index)?;

        let index = Self {
            pool,
            db_path,
            embedder,
        };
        index.init_schema().await?;
        Ok(index)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS vector_entries (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::index)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_vector_domain_doc ON vector_entries(
                json_extract(metadata, '$.domain_id'),
                json_extract(metadata, '$.doc_id')
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::index)?;

        Ok(())
    }

    fn row_to_chunk(row: &SqliteRow) -> Result<IndexedChunk, ApiError> {
        let metadata_str: String = row.try_get("metadata").map_err(ApiError::index)?;
        let metadata = match serde_json::from_str::<Value>(&metadata_str) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        Ok(IndexedChunk {
            id: row.try_get("id").map_err(ApiError::index)?,
            text: row.try_get("content").map_err(ApiError::index)?,
            metadata,
        })
    }
}

/// Renders `filter` as a `WHERE` clause over `metadata` with bound arguments.
fn filter_clause<'q>(filter: &MetadataFilter) -> Result<(String, SqliteArguments<'q>), ApiError> {
    let mut clauses = Vec::new();
    let mut args = SqliteArguments::default();

    for (key, value) in filter.terms() {
        let path = format!("$.\"{}\"", key.replace('"', ""));
        let bound = match value {
            Value::Null => {
                clauses.push("json_extract(metadata, ?) IS NULL".to_string());
                args.add(path).map_err(ApiError::index)?;
                continue;
            }
            Value::Bool(flag) => Value::from(i64::from(*flag)),
            other => other.clone(),
        };
        clauses.push("json_extract(metadata, ?) = ?".to_string());
        args.add(path).map_err(ApiError::index)?;
        match bound {
            Value::Number(number) => {
                if let Some(int) = number.as_i64() {
                    args.add(int).map_err(ApiError::index)?;
                } else {
                    args.add(number.as_f64().unwrap_or_default())
                        .map_err(ApiError::index)?;
                }
            }
            Value::String(text) => args.add(text).map_err(ApiError::index)?,
            other => {
                return Err(ApiError::Validation(format!(
                    "Unsupported filter value for '{}': {}",
                    key, other
                )))
            }
        }
    }

    let sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    Ok((sql, args))
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn add(&self, chunks: Vec<ChunkPayload>) -> Result<Vec<String>, ApiError> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(ApiError::Index(format!(
                "Embedder returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let mut tx = self.pool.begin().await.map_err(ApiError::index)?;
        let now = now_timestamp();
        let mut ids = Vec::with_capacity(chunks.len());

        for (chunk, embedding) in chunks.iter().zip(embeddings.iter()) {
            let id = Uuid::new_v4().to_string();
            let metadata_str =
                serde_json::to_string(&chunk.metadata).map_err(ApiError::internal)?;
            sqlx::query(
                "INSERT INTO vector_entries (id, content, metadata, embedding, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(&id)
            .bind(&chunk.text)
            .bind(&metadata_str)
            .bind(serialize_embedding(embedding))
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::index)?;
            ids.push(id);
        }

        tx.commit().await.map_err(ApiError::index)?;
        Ok(ids)
    }

    async fn similarity_search_with_scores(
        &self,
        query: &str,
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredChunk>, ApiError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query_embedding = self.embedder.embed_one(query).await?;

        let (clause, args) = filter_clause(filter)?;
        let sql = format!(
            "SELECT id, content, metadata, embedding FROM vector_entries{} ORDER BY rowid ASC",
            clause
        );
        let rows = sqlx::query_with(&sql, args)
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::index)?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in &rows {
            let embedding_bytes: Vec<u8> = row.try_get("embedding").map_err(ApiError::index)?;
            let stored = deserialize_embedding(&embedding_bytes);
            let score = cosine_similarity(&query_embedding, &stored);
            scored.push((Self::row_to_chunk(row)?, score));
        }

        sort_descending(&mut scored);
        scored.truncate(k);
        Ok(scored
            .into_iter()
            .map(|(chunk, score)| ScoredChunk { chunk, score })
            .collect())
    }

    async fn delete(&self, filter: &MetadataFilter) -> Result<u64, ApiError> {
        refuse_unfiltered_delete(filter)?;
        let (clause, args) = filter_clause(filter)?;
        let sql = format!("DELETE FROM vector_entries{}", clause);
        let result = sqlx::query_with(&sql, args)
            .execute(&self.pool)
            .await
            .map_err(ApiError::index)?;
        Ok(result.rows_affected())
    }

    async fn persist(&self) -> Result<(), ApiError> {
        sqlx::query("PRAGMA wal_checkpoint(PASSIVE)")
            .execute(&self.pool)
            .await
            .map_err(ApiError::index)?;
        Ok(())
    }

    async fn count(&self, filter: &MetadataFilter) -> Result<u64, ApiError> {
        let (clause, args) = filter_clause(filter)?;
        let sql = format!("SELECT COUNT(*) FROM vector_entries{}", clause);
        let count: i64 = sqlx::query_scalar_with(&sql, args)
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::index)?;
        Ok(count.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::embedding::HashEmbedder;
    use serde_json::json;

    async fn test_index() -> (SqliteVectorIndex, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let index = SqliteVectorIndex::open(
            dir.path().join("vectors.db"),
            Arc::new(HashEmbedder::new(128)),
        )
        .await
        .unwrap();
        (index, dir)
    }

    fn payload(text: &str, domain_id: i64, doc_id: i64) -> ChunkPayload {
        ChunkPayload {
            text: text.to_string(),
            metadata: json!({ "domain_id": domain_id, "doc_id": doc_id, "source": "doc.txt" })
                .as_object()
                .cloned()
                .unwrap(),
        }
    }

    #[tokio::test]
    async fn add_search_and_count_with_filters() {
        let (index, _dir) = test_index().await;
        let ids = index
            .add(vec![
                payload("vacation policy twenty days", 1, 7),
                payload("expense reports are due monthly", 1, 8),
                payload("vacation policy thirty days", 2, 9),
            ])
            .await
            .unwrap();
        index.persist().await.unwrap();
        assert_eq!(ids.len(), 3);

        let tenant_one = MetadataFilter::new().eq("domain_id", 1);
        let hits = index
            .similarity_search_with_scores("vacation policy", 10, &tenant_one)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.chunk.metadata["domain_id"] == json!(1)));
        assert_eq!(hits[0].chunk.metadata["doc_id"], json!(7));
        assert!(hits[0].score >= hits[1].score);

        assert_eq!(index.count(&tenant_one).await.unwrap(), 2);
        assert_eq!(index.count(&MetadataFilter::new()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn delete_by_filter_only_touches_matches() {
        let (index, _dir) = test_index().await;
        index
            .add(vec![payload("a", 1, 7), payload("b", 1, 7), payload("c", 1, 8)])
            .await
            .unwrap();

        let removed = index
            .delete(&MetadataFilter::new().eq("doc_id", 7).eq("domain_id", 1))
            .await
            .unwrap();

        assert_eq!(removed, 2);
        assert_eq!(index.count(&MetadataFilter::new()).await.unwrap(), 1);
        assert!(matches!(
            index.delete(&MetadataFilter::new()).await,
            Err(ApiError::Index(_))
        ));
    }

    #[tokio::test]
    async fn string_and_missing_keys_filter_correctly() {
        let (index, _dir) = test_index().await;
        index.add(vec![payload("alpha", 1, 1)]).await.unwrap();

        let by_source = MetadataFilter::new().eq("source", "doc.txt");
        assert_eq!(index.count(&by_source).await.unwrap(), 1);

        let absent = MetadataFilter::new().eq("page", Value::Null);
        assert_eq!(index.count(&absent).await.unwrap(), 1);

        let hits = index
            .similarity_search("alpha", 0, &MetadataFilter::new())
            .await
            .unwrap();
        assert!(hits.is_empty());
    }
}
