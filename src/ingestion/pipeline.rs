use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use super::loader::{DocumentLoader, LoadedChunk};
use crate::core::config::settings::IngestionSettings;
use crate::core::errors::ApiError;
use crate::core::security::{Principal, Role};
use crate::core::tenancy::require_role;
use crate::relational::{Document, NewChunk, RelationalStore};
use crate::vector::{ChunkPayload, MetadataFilter, VectorIndex};

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub doc_id: i64,
    pub domain_id: i64,
    pub user_id: i64,
    pub chunk_ids: Vec<i64>,
    pub chunks: usize,
}

/// Writes a document to both stores: relational rows first, then vectors.
pub struct IngestionPipeline {
    relational: RelationalStore,
    index: Arc<dyn VectorIndex>,
    loader: Arc<dyn DocumentLoader>,
    settings: IngestionSettings,
}

impl IngestionPipeline {
    pub fn new(
        relational: RelationalStore,
        index: Arc<dyn VectorIndex>,
        loader: Arc<dyn DocumentLoader>,
        settings: IngestionSettings,
    ) -> Self {
        Self {
            relational,
            index,
            loader,
            settings,
        }
    }

    /// All-or-nothing ingestion of several uploads. Every file is parsed
    /// before the first write; a later store failure rolls back the
    /// documents this batch already wrote.
    pub async fn ingest_batch(
        &self,
        principal: &Principal,
        files: &[(PathBuf, String)],
    ) -> Result<Vec<IngestReport>, ApiError> {
        uploader(principal)?;
        let mut loaded = Vec::with_capacity(files.len());
        for (path, display_name) in files {
            let chunks = self.load_file(path, display_name).await?;
            loaded.push((display_name.as_str(), chunks));
        }

        let mut reports: Vec<IngestReport> = Vec::with_capacity(loaded.len());
        for (display_name, chunks) in loaded {
            match self.ingest(principal, display_name, chunks).await {
                Ok(report) => reports.push(report),
                Err(err) => {
                    error!("Ingesting '{}' failed: {}", display_name, err);
                    for report in reports.iter().rev() {
                        self.compensate(report.doc_id, report.domain_id).await;
                    }
                    return Err(err);
                }
            }
        }
        Ok(reports)
    }

    async fn load_file(
        &self,
        path: &Path,
        display_name: &str,
    ) -> Result<Vec<LoadedChunk>, ApiError> {
        let supported = Path::new(display_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.loader.supports(ext))
            .unwrap_or(false);
        if !supported {
            return Err(ApiError::Validation(format!(
                "Unsupported document type: {}",
                display_name
            )));
        }

        let chunks = self.loader.load(path).await.map_err(|err| match err {
            ApiError::Validation(message) => {
                ApiError::Validation(format!("Cannot load {}: {}", display_name, message))
            }
            other => other,
        })?;
        info!("Loaded {} chunk(s) from '{}'", chunks.len(), display_name);
        Ok(chunks)
    }

    pub async fn ingest(
        &self,
        principal: &Principal,
        name: &str,
        chunks: Vec<LoadedChunk>,
    ) -> Result<IngestReport, ApiError> {
        let (user_id, domain_id) = uploader(principal)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ApiError::Validation("Document name is required".to_string()));
        }

        let doc = self
            .relational
            .create_document(name, user_id, domain_id)
            .await?;

        let stamped: Vec<Map<String, Value>> = chunks
            .iter()
            .map(|chunk| stamp_metadata(&chunk.metadata, &doc))
            .collect();

        let rows: Vec<NewChunk> = chunks
            .iter()
            .zip(&stamped)
            .map(|(chunk, metadata)| NewChunk {
                content: chunk.text.clone(),
                meta_data: Value::Object(metadata.clone()),
            })
            .collect();
        let chunk_ids = match self
            .relational
            .insert_chunks(&doc, &rows, self.settings.batch_size)
            .await
        {
            Ok(ids) => ids,
            Err(err) => {
                error!("Persisting chunks for document {} failed: {}", doc.id, err);
                if self.settings.compensate_on_index_failure {
                    self.compensate(doc.id, doc.domain_id).await;
                }
                return Err(err);
            }
        };

        let payloads: Vec<ChunkPayload> = chunks
            .into_iter()
            .zip(stamped)
            .map(|(chunk, metadata)| ChunkPayload {
                text: chunk.text,
                metadata,
            })
            .collect();
        if let Err(err) = self.index_chunks(payloads).await {
            error!("Indexing document {} failed: {}", doc.id, err);
            if self.settings.compensate_on_index_failure {
                self.compensate(doc.id, doc.domain_id).await;
            } else {
                warn!(
                    "Leaving {} chunk row(s) of document {} without vectors",
                    chunk_ids.len(),
                    doc.id
                );
            }
            return Err(match err {
                ApiError::Index(message) => ApiError::Index(message),
                other => ApiError::index(other),
            });
        }

        info!(
            "Ingested '{}' as document {} ({} chunk(s), domain {})",
            doc.name,
            doc.id,
            chunk_ids.len(),
            doc.domain_id
        );
        Ok(IngestReport {
            doc_id: doc.id,
            domain_id: doc.domain_id,
            user_id: doc.user_id,
            chunks: chunk_ids.len(),
            chunk_ids,
        })
    }

    async fn index_chunks(&self, payloads: Vec<ChunkPayload>) -> Result<(), ApiError> {
        if payloads.is_empty() {
            return Ok(());
        }
        self.index.add(payloads).await?;
        self.index.persist().await
    }

    /// Best effort: drop the document's vectors, then its rows.
    async fn compensate(&self, doc_id: i64, domain_id: i64) {
        let filter = MetadataFilter::new()
            .eq("domain_id", domain_id)
            .eq("doc_id", doc_id);
        if let Err(err) = self.index.delete(&filter).await {
            warn!(
                "Compensating vector delete for document {} failed: {}",
                doc_id, err
            );
        }
        match self.relational.delete_document_rows(doc_id, domain_id).await {
            Ok(removed) => info!(
                "Rolled back document {} and {} chunk row(s)",
                doc_id, removed
            ),
            Err(err) => error!(
                "Compensating delete for document {} failed, reconciliation will repair it: {}",
                doc_id, err
            ),
        }
    }
}

fn uploader(principal: &Principal) -> Result<(i64, i64), ApiError> {
    require_role(principal, &[Role::Admin])?;
    match (principal.user_id, principal.domain_id) {
        (Some(user_id), Some(domain_id)) => Ok((user_id, domain_id)),
        _ => Err(ApiError::Access(
            "Uploads require an admin account assigned to a domain".to_string(),
        )),
    }
}

/// Adds the correlation stamp. `source` carries a 1-based page when the
/// loader reported an integer page.
pub fn stamp_metadata(metadata: &Map<String, Value>, doc: &Document) -> Map<String, Value> {
    let mut stamped = metadata.clone();
    let source = match metadata.get("page").and_then(Value::as_i64) {
        Some(page) => format!("{}#page={}", doc.name, page + 1),
        None => doc.name.clone(),
    };
    stamped.insert("domain_id".to_string(), Value::from(doc.domain_id));
    stamped.insert("doc_id".to_string(), Value::from(doc.id));
    stamped.insert("user_id".to_string(), Value::from(doc.user_id));
    stamped.insert("source".to_string(), Value::String(source));
    stamped
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::core::tenancy::{fixtures, TenantScope};
    use crate::ingestion::loader::FileDocumentLoader;
    use crate::relational::test_support::{seeded, Seeded};
    use crate::vector::testing::ScriptedIndex;

    fn chunk(text: &str) -> LoadedChunk {
        LoadedChunk {
            text: text.to_string(),
            metadata: Map::new(),
        }
    }

    fn pipeline(seed: &Seeded, index: Arc<ScriptedIndex>, compensate: bool) -> IngestionPipeline {
        IngestionPipeline::new(
            seed.store.clone(),
            index,
            Arc::new(FileDocumentLoader::default()),
            IngestionSettings {
                batch_size: 2,
                compensate_on_index_failure: compensate,
                ..IngestionSettings::default()
            },
        )
    }

    #[tokio::test]
    async fn three_chunks_land_in_both_stores_for_the_tenant() {
        let seed = seeded().await;
        let index = ScriptedIndex::new();
        let pipeline = pipeline(&seed, index.clone(), true);
        let admin = fixtures::admin(seed.admin_a.id, seed.domain_a.id);

        let report = pipeline
            .ingest(
                &admin,
                "handbook.txt",
                vec![chunk("one"), chunk("two"), chunk("three")],
            )
            .await
            .unwrap();

        assert_eq!(report.chunks, 3);
        assert_eq!(report.chunk_ids.len(), 3);
        let scope = TenantScope::Tenant(seed.domain_a.id);
        assert_eq!(seed.store.list_documents(scope).await.unwrap().len(), 1);
        let rows = seed.store.list_chunks(report.doc_id, scope).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|row| row.domain_id == seed.domain_a.id));
        assert!(rows
            .iter()
            .all(|row| row.meta_data["source"] == json!("handbook.txt")));

        let filter = MetadataFilter::new().eq("domain_id", seed.domain_a.id);
        assert_eq!(index.count(&filter).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn index_failure_rolls_back_rows_when_compensating() {
        let seed = seeded().await;
        let index = ScriptedIndex::new();
        ScriptedIndex::fail(&index.failures.persist, true);
        let pipeline = pipeline(&seed, index.clone(), true);
        let admin = fixtures::admin(seed.admin_a.id, seed.domain_a.id);

        let err = pipeline
            .ingest(&admin, "doc.txt", vec![chunk("a"), chunk("b"), chunk("c")])
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Index(_)));
        let scope = TenantScope::Tenant(seed.domain_a.id);
        assert!(seed.store.list_documents(scope).await.unwrap().is_empty());
        assert_eq!(index.count(&MetadataFilter::new()).await.unwrap(), 0);
        let deletes = index.delete_calls();
        assert_eq!(deletes.len(), 1);
        assert_eq!(deletes[0].get("domain_id"), Some(&json!(seed.domain_a.id)));
    }

    #[tokio::test]
    async fn index_failure_leaves_rows_without_compensation() {
        let seed = seeded().await;
        let index = ScriptedIndex::new();
        ScriptedIndex::fail(&index.failures.add, true);
        let pipeline = pipeline(&seed, index.clone(), false);
        let admin = fixtures::admin(seed.admin_a.id, seed.domain_a.id);

        let err = pipeline
            .ingest(&admin, "doc.txt", vec![chunk("a"), chunk("b")])
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Index(_)));
        let docs = seed
            .store
            .list_documents(TenantScope::Tenant(seed.domain_a.id))
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].chunk_count, 2);
        assert!(index.delete_calls().is_empty());
    }

    #[tokio::test]
    async fn only_domain_admins_may_ingest() {
        let seed = seeded().await;
        let index = ScriptedIndex::new();
        let pipeline = pipeline(&seed, index.clone(), true);

        let user = fixtures::user(seed.user_a.id, seed.domain_a.id);
        assert!(matches!(
            pipeline.ingest(&user, "doc.txt", vec![chunk("a")]).await,
            Err(ApiError::Access(_))
        ));
        let root = fixtures::super_admin(None);
        assert!(matches!(
            pipeline.ingest(&root, "doc.txt", vec![chunk("a")]).await,
            Err(ApiError::Access(_))
        ));
        assert_eq!(
            seed.store.count_documents(TenantScope::Global).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn unsupported_files_fail_before_any_store_is_touched() {
        let seed = seeded().await;
        let index = ScriptedIndex::new();
        let pipeline = pipeline(&seed, index.clone(), true);
        let admin = fixtures::admin(seed.admin_a.id, seed.domain_a.id);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tool.exe");
        tokio::fs::write(&path, b"MZ").await.unwrap();

        let err = pipeline
            .ingest_batch(&admin, &[(path, "tool.exe".to_string())])
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert_eq!(
            seed.store.count_documents(TenantScope::Global).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn files_are_loaded_split_and_stamped() {
        let seed = seeded().await;
        let index = ScriptedIndex::new();
        let pipeline = pipeline(&seed, index.clone(), true);
        let admin = fixtures::admin(seed.admin_a.id, seed.domain_a.id);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload-1.txt");
        tokio::fs::write(&path, "Remote work is allowed two days a week.")
            .await
            .unwrap();

        let reports = pipeline
            .ingest_batch(&admin, &[(path, "remote.txt".to_string())])
            .await
            .unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].chunks, 1);
        let hits = index
            .similarity_search(
                "remote work",
                5,
                &MetadataFilter::new().eq("doc_id", reports[0].doc_id),
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata["source"], json!("remote.txt"));
        assert_eq!(hits[0].metadata["user_id"], json!(seed.admin_a.id));
        assert!(hits[0].metadata.contains_key("start_index"));
    }

    #[tokio::test]
    async fn unparseable_file_in_a_batch_writes_nothing() {
        let seed = seeded().await;
        let index = ScriptedIndex::new();
        let pipeline = pipeline(&seed, index.clone(), true);
        let admin = fixtures::admin(seed.admin_a.id, seed.domain_a.id);
        let dir = tempfile::tempdir().unwrap();
        let text = dir.path().join("a.txt");
        let pdf = dir.path().join("b.pdf");
        tokio::fs::write(&text, "Badges are collected at reception.")
            .await
            .unwrap();
        tokio::fs::write(&pdf, b"%PDF-1.4 broken").await.unwrap();

        let err = pipeline
            .ingest_batch(
                &admin,
                &[(text, "a.txt".to_string()), (pdf, "b.pdf".to_string())],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Validation(_)));
        assert_eq!(
            seed.store.count_documents(TenantScope::Global).await.unwrap(),
            0
        );
        assert_eq!(index.count(&MetadataFilter::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn store_failure_mid_batch_rolls_back_earlier_documents() {
        let seed = seeded().await;
        let index = ScriptedIndex::new();
        index.fail_persist_after(1);
        let pipeline = pipeline(&seed, index.clone(), true);
        let admin = fixtures::admin(seed.admin_a.id, seed.domain_a.id);
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.txt");
        let second = dir.path().join("second.md");
        tokio::fs::write(&first, "Lockers are assigned on the first day.")
            .await
            .unwrap();
        tokio::fs::write(&second, "Lunch is served from noon.")
            .await
            .unwrap();

        let err = pipeline
            .ingest_batch(
                &admin,
                &[
                    (first, "first.txt".to_string()),
                    (second, "second.md".to_string()),
                ],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Index(_)));
        assert!(seed
            .store
            .list_documents(TenantScope::Tenant(seed.domain_a.id))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(index.count(&MetadataFilter::new()).await.unwrap(), 0);
        assert_eq!(index.delete_calls().len(), 2);
    }

    #[test]
    fn page_numbers_become_one_based_sources() {
        let doc = Document {
            id: 7,
            name: "manual.pdf".to_string(),
            user_id: 3,
            domain_id: 1,
            active: true,
            created_at: String::new(),
        };
        let mut meta = Map::new();
        meta.insert("page".to_string(), json!(0));
        let stamped = stamp_metadata(&meta, &doc);
        assert_eq!(stamped["source"], json!("manual.pdf#page=1"));
        assert_eq!(stamped["doc_id"], json!(7));

        meta.insert("page".to_string(), json!("ii"));
        assert_eq!(stamp_metadata(&meta, &doc)["source"], json!("manual.pdf"));
    }
}
