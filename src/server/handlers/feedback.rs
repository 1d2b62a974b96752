use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::{json, Value};

use super::principal;
use crate::admin::NewFeedback;
use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn post_feedback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<NewFeedback>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let principal = principal(&state, &headers).await?;
    let id = state.admin.post_feedback(&principal, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Feedback submitted", "id": id })),
    ))
}

pub async fn list_feedback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let principal = principal(&state, &headers).await?;
    let feedback = state.admin.list_feedback(&principal).await?;
    Ok(Json(json!({ "feedback": feedback })))
}
