use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use super::principal;
use crate::chat::{ChatReply, ChatRequest};
use crate::core::errors::ApiError;
use crate::core::security::Role;
use crate::core::tenancy::{require_role, search_scope};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ProbeParams {
    pub q: String,
    #[serde(default)]
    pub k: Option<usize>,
    #[serde(default)]
    pub domain_id: Option<i64>,
}

pub async fn chat_query(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatReply>, ApiError> {
    let principal = principal(&state, &headers).await?;
    let reply = state.chat.chat(&principal, payload, Utc::now()).await?;
    Ok(Json(reply))
}

pub async fn probe(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<ProbeParams>,
) -> Result<Json<Value>, ApiError> {
    let principal = principal(&state, &headers).await?;
    require_role(&principal, &[Role::Admin, Role::SuperAdmin])?;
    let scope = search_scope(&principal, params.domain_id)?;
    let composer = state.chat.composer();
    let k = params.k.unwrap_or_else(|| composer.default_k());
    let hits = composer.probe(&params.q, k, scope).await?;
    let results: Vec<Value> = hits
        .into_iter()
        .map(|hit| json!({ "content": hit.text, "metadata": hit.metadata }))
        .collect();
    Ok(Json(json!({ "query": params.q, "results": results })))
}

pub async fn probe_scores(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<ProbeParams>,
) -> Result<Json<Value>, ApiError> {
    let principal = principal(&state, &headers).await?;
    require_role(&principal, &[Role::Admin, Role::SuperAdmin])?;
    let scope = search_scope(&principal, params.domain_id)?;
    let composer = state.chat.composer();
    let k = params.k.unwrap_or_else(|| composer.default_k());
    let hits = composer.probe_with_scores(&params.q, k, scope).await?;
    let results: Vec<Value> = hits
        .into_iter()
        .map(|hit| {
            json!({
                "content": hit.chunk.text,
                "metadata": hit.chunk.metadata,
                "score": hit.score,
            })
        })
        .collect();
    Ok(Json(json!({ "query": params.q, "results": results })))
}
