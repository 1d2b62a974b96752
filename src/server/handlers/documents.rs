use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::principal;
use crate::core::errors::ApiError;
use crate::core::security::Role;
use crate::core::tenancy::require_role;
use crate::ingestion::loader::{extension_of, ACCEPTED_EXTENSIONS};
use crate::ingestion::{is_accepted_upload, IngestReport};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChunkParams {
    pub doc_id: i64,
}

struct StagedUpload {
    filename: String,
    path: PathBuf,
}

/// Accepts one or more `files` parts. Every file is staged under the upload
/// directory, then the batch is ingested as a whole: either every file is
/// saved or none is. Staged copies are removed either way.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let principal = principal(&state, &headers).await?;
    require_role(&principal, &[Role::Admin])?;

    let mut staged = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("Failed to read multipart field: {}", e)))?
    {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        if !is_accepted_upload(&filename) {
            discard(&staged).await;
            let suffix = extension_of(&filename).unwrap_or_default();
            return Err(ApiError::UnsupportedMedia(format!(
                "Unsupported file type: .{}. Allowed: {:?}",
                suffix, ACCEPTED_EXTENSIONS
            )));
        }
        let data = match field.bytes().await {
            Ok(data) => data,
            Err(e) => {
                discard(&staged).await;
                return Err(ApiError::Validation(format!(
                    "Failed to read {}: {}",
                    filename, e
                )));
            }
        };

        let suffix = extension_of(&filename).unwrap_or_default();
        let path = state
            .paths
            .upload_dir
            .join(format!("{}.{}", Uuid::new_v4(), suffix));
        if let Err(e) = tokio::fs::write(&path, &data).await {
            discard(&staged).await;
            return Err(ApiError::internal(e));
        }
        tracing::info!("Staged upload '{}' ({} bytes)", filename, data.len());
        staged.push(StagedUpload { filename, path });
    }

    if staged.is_empty() {
        return Err(ApiError::Validation("No files uploaded".to_string()));
    }

    let files: Vec<(PathBuf, String)> = staged
        .iter()
        .map(|upload| (upload.path.clone(), upload.filename.clone()))
        .collect();
    let outcome = state.ingestion.ingest_batch(&principal, &files).await;
    discard(&staged).await;
    let reports: Vec<IngestReport> = outcome.map_err(|err| {
        tracing::error!("Upload of {} file(s) rejected: {}", staged.len(), err);
        err
    })?;

    let total_chunks: usize = reports.iter().map(|r| r.chunks).sum();
    let files: Vec<Value> = staged
        .iter()
        .zip(&reports)
        .map(|(upload, report)| {
            json!({
                "filename": upload.filename,
                "chunks": report.chunks,
                "domain_id": report.domain_id,
                "doc_id": report.doc_id,
                "admin_id": report.user_id,
            })
        })
        .collect();
    Ok(Json(json!({
        "message": format!(
            "Saved {} document(s) and {} chunk(s)",
            reports.len(),
            total_chunks
        ),
        "files": files,
    })))
}

async fn discard(staged: &[StagedUpload]) {
    for upload in staged {
        if let Err(e) = tokio::fs::remove_file(&upload.path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove staged upload {}: {}", upload.path.display(), e);
            }
        }
    }
}

pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let principal = principal(&state, &headers).await?;
    let docs = state.documents.list_documents(&principal).await?;
    Ok(Json(json!({ "docs": docs })))
}

pub async fn list_chunks(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<ChunkParams>,
) -> Result<Json<Value>, ApiError> {
    let principal = principal(&state, &headers).await?;
    let chunks = state.documents.list_chunks(&principal, params.doc_id).await?;
    Ok(Json(json!({ "doc_id": params.doc_id, "chunks": chunks })))
}

pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(doc_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let principal = principal(&state, &headers).await?;
    let report = state.documents.delete_document(&principal, doc_id).await?;
    Ok(Json(json!({
        "message": format!("Document {} deleted", report.doc_id),
        "report": report,
    })))
}

pub async fn activate_document(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(doc_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    set_document_active(&state, &headers, doc_id, true).await
}

pub async fn deactivate_document(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(doc_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    set_document_active(&state, &headers, doc_id, false).await
}

async fn set_document_active(
    state: &AppState,
    headers: &HeaderMap,
    doc_id: i64,
    active: bool,
) -> Result<Json<Value>, ApiError> {
    let principal = principal(state, headers).await?;
    let doc = state
        .documents
        .set_document_active(&principal, doc_id, active)
        .await?;
    let verb = if active { "activated" } else { "deactivated" };
    Ok(Json(json!({
        "message": format!("Document {} {}", doc.id, verb),
        "doc_id": doc.id,
        "active": doc.active,
    })))
}

pub async fn reconcile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let principal = principal(&state, &headers).await?;
    let report = state.documents.reconcile(&principal).await?;
    Ok(Json(json!(report)))
}
