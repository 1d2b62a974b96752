//! Document lifecycle across both stores.
//!
//! Every destructive operation removes vector entries before relational
//! rows. A vector failure aborts with nothing relational touched; a
//! relational failure after the vectors are gone leaves orphan rows that
//! [`DocumentService::reconcile`] removes later.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::core::errors::ApiError;
use crate::core::security::{Principal, Role};
use crate::core::tenancy::{require_role, TenantScope};
use crate::relational::{Chunk, Document, DocumentSummary, RelationalStore};
use crate::vector::{MetadataFilter, VectorIndex};

#[derive(Debug, Clone, Serialize)]
pub struct DeletionReport {
    pub doc_id: i64,
    pub domain_id: i64,
    pub vectors_removed: u64,
    pub chunks_removed: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub documents_checked: usize,
    /// Documents whose chunk rows had no vector entries at all.
    pub orphaned_documents: Vec<i64>,
    pub chunk_rows_removed: u64,
    /// Documents with some but not all vectors present. Reported only.
    pub partial_documents: Vec<i64>,
}

#[derive(Clone)]
pub struct DocumentService {
    relational: RelationalStore,
    index: Arc<dyn VectorIndex>,
}

const MANAGERS: [Role; 2] = [Role::Admin, Role::SuperAdmin];

impl DocumentService {
    pub fn new(relational: RelationalStore, index: Arc<dyn VectorIndex>) -> Self {
        Self { relational, index }
    }

    pub async fn list_documents(
        &self,
        principal: &Principal,
    ) -> Result<Vec<DocumentSummary>, ApiError> {
        require_role(principal, &MANAGERS)?;
        let scope = TenantScope::for_principal(principal)?;
        self.relational.list_documents(scope).await
    }

    pub async fn list_chunks(
        &self,
        principal: &Principal,
        doc_id: i64,
    ) -> Result<Vec<Chunk>, ApiError> {
        let (doc, scope) = self.scoped_document(principal, doc_id).await?;
        self.relational.list_chunks(doc.id, scope).await
    }

    pub async fn set_document_active(
        &self,
        principal: &Principal,
        doc_id: i64,
        active: bool,
    ) -> Result<Document, ApiError> {
        let (doc, scope) = self.scoped_document(principal, doc_id).await?;
        self.relational
            .set_document_active(doc.id, active, scope)
            .await?;
        info!(
            "Document {} {} by {}",
            doc.id,
            if active { "activated" } else { "deactivated" },
            principal.username
        );
        Ok(Document { active, ..doc })
    }

    pub async fn delete_document(
        &self,
        principal: &Principal,
        doc_id: i64,
    ) -> Result<DeletionReport, ApiError> {
        let (doc, _) = self.scoped_document(principal, doc_id).await?;

        let filter = MetadataFilter::new()
            .eq("doc_id", doc.id)
            .eq("domain_id", doc.domain_id);
        let vectors_removed = self.index.delete(&filter).await.map_err(|err| {
            warn!("Vector delete for document {} failed: {}", doc.id, err);
            as_index_error(err)
        })?;
        if let Err(err) = self.index.persist().await {
            warn!("Persisting vector index after deleting document {} failed: {}", doc.id, err);
        }

        let chunks_removed = self
            .relational
            .delete_document_rows(doc.id, doc.domain_id)
            .await?;

        info!(
            "Deleted document {} (domain {}): {} vector(s), {} chunk row(s)",
            doc.id, doc.domain_id, vectors_removed, chunks_removed
        );
        Ok(DeletionReport {
            doc_id: doc.id,
            domain_id: doc.domain_id,
            vectors_removed,
            chunks_removed,
        })
    }

    /// Super admin only. Vectors for the whole domain go first.
    pub async fn delete_domain(
        &self,
        principal: &Principal,
        domain_id: i64,
    ) -> Result<u64, ApiError> {
        require_role(principal, &[Role::SuperAdmin])?;
        self.relational
            .get_domain(domain_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Domain not found".to_string()))?;

        let removed = self
            .index
            .delete(&MetadataFilter::new().eq("domain_id", domain_id))
            .await
            .map_err(as_index_error)?;
        if let Err(err) = self.index.persist().await {
            warn!("Persisting vector index after deleting domain {} failed: {}", domain_id, err);
        }
        self.relational.delete_domain_rows(domain_id).await?;
        info!("Deleted domain {} and {} vector(s)", domain_id, removed);
        Ok(removed)
    }

    pub async fn delete_user(&self, principal: &Principal, user_id: i64) -> Result<u64, ApiError> {
        require_role(principal, &MANAGERS)?;
        if principal.user_id == Some(user_id) {
            return Err(ApiError::Validation(
                "Accounts cannot delete themselves".to_string(),
            ));
        }
        let scope = TenantScope::for_principal(principal)?;
        let user = self
            .relational
            .get_user(user_id, scope)
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

        let mut removed = 0;
        if let Some(domain_id) = user.domain_id {
            let filter = MetadataFilter::new()
                .eq("domain_id", domain_id)
                .eq("user_id", user.id);
            removed = self.index.delete(&filter).await.map_err(as_index_error)?;
            if let Err(err) = self.index.persist().await {
                warn!("Persisting vector index after deleting user {} failed: {}", user.id, err);
            }
        }
        self.relational.delete_user_rows(user.id).await?;
        info!(
            "Deleted user {} ({}) and {} vector(s)",
            user.id, user.username, removed
        );
        Ok(removed)
    }

    pub async fn reconcile(&self, principal: &Principal) -> Result<ReconcileReport, ApiError> {
        require_role(principal, &MANAGERS)?;
        let scope = TenantScope::for_principal(principal)?;
        self.reconcile_scope(scope).await
    }

    /// Removes chunk rows whose document has no vector entries left.
    pub async fn reconcile_scope(&self, scope: TenantScope) -> Result<ReconcileReport, ApiError> {
        let mut report = ReconcileReport::default();
        for summary in self.relational.list_documents(scope).await? {
            let doc = &summary.document;
            report.documents_checked += 1;
            if summary.chunk_count == 0 {
                continue;
            }
            let filter = MetadataFilter::new()
                .eq("domain_id", doc.domain_id)
                .eq("doc_id", doc.id);
            let vectors = self.index.count(&filter).await.map_err(as_index_error)?;
            if vectors == 0 {
                let removed = self
                    .relational
                    .delete_chunks_for_document(doc.id, doc.domain_id)
                    .await?;
                warn!(
                    "Removed {} orphaned chunk row(s) of document {} (domain {})",
                    removed, doc.id, doc.domain_id
                );
                report.orphaned_documents.push(doc.id);
                report.chunk_rows_removed += removed;
            } else if (vectors as i64) < summary.chunk_count {
                warn!(
                    "Document {} has {} chunk row(s) but only {} vector(s)",
                    doc.id, summary.chunk_count, vectors
                );
                report.partial_documents.push(doc.id);
            }
        }
        info!(
            "Reconciled {} document(s): {} orphaned, {} row(s) removed",
            report.documents_checked,
            report.orphaned_documents.len(),
            report.chunk_rows_removed
        );
        Ok(report)
    }

    async fn scoped_document(
        &self,
        principal: &Principal,
        doc_id: i64,
    ) -> Result<(Document, TenantScope), ApiError> {
        require_role(principal, &MANAGERS)?;
        let scope = TenantScope::for_principal(principal)?;
        let doc = self
            .relational
            .get_document(doc_id, scope)
            .await?
            .ok_or_else(|| ApiError::NotFound("Document not found".to_string()))?;
        Ok((doc, scope))
    }
}

fn as_index_error(err: ApiError) -> ApiError {
    match err {
        ApiError::Index(message) => ApiError::Index(message),
        other => ApiError::index(other),
    }
}
