use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use super::principal;
use crate::core::errors::ApiError;
use crate::relational::ChatAnalytics;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SessionParams {
    pub user_id: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
    pub user_id: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalyticsParams {
    pub days: Option<i64>,
}

pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<SessionParams>,
) -> Result<Json<Value>, ApiError> {
    let principal = principal(&state, &headers).await?;
    let sessions = state
        .history
        .list_sessions(&principal, params.user_id, params.limit, params.offset)
        .await?;
    Ok(Json(json!({ "sessions": sessions })))
}

pub async fn session_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let principal = principal(&state, &headers).await?;
    let messages = state
        .history
        .session_messages(&principal, session_id)
        .await?;
    Ok(Json(json!({ "session_id": session_id, "messages": messages })))
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let principal = principal(&state, &headers).await?;
    state.history.delete_session(&principal, session_id).await?;
    Ok(Json(json!({ "message": "Session deleted successfully" })))
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<SearchParams>,
) -> Result<Json<Value>, ApiError> {
    let principal = principal(&state, &headers).await?;
    let hits = state
        .history
        .search(&principal, &params.q, params.user_id, params.limit)
        .await?;
    Ok(Json(json!({ "query": params.q, "results": hits })))
}

pub async fn analytics(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<AnalyticsParams>,
) -> Result<Json<ChatAnalytics>, ApiError> {
    let principal = principal(&state, &headers).await?;
    let analytics = state
        .history
        .analytics(&principal, params.days, Utc::now())
        .await?;
    Ok(Json(analytics))
}
