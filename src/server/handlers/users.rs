use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::principal;
use crate::admin::CreateAccount;
use crate::core::errors::ApiError;
use crate::core::security::Role;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RoleUpdate {
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailUpdate {
    pub email: String,
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateAccount>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let principal = principal(&state, &headers).await?;
    let user = state.admin.create_user(&principal, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User created successfully", "user": user })),
    ))
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let principal = principal(&state, &headers).await?;
    let users = state.admin.list_users(&principal).await?;
    Ok(Json(json!({ "users": users })))
}

pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let principal = principal(&state, &headers).await?;
    let vectors_removed = state.admin.delete_user(&principal, user_id).await?;
    Ok(Json(json!({
        "message": "User deleted successfully",
        "vectors_removed": vectors_removed,
    })))
}

pub async fn update_role(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<i64>,
    Json(payload): Json<RoleUpdate>,
) -> Result<Json<Value>, ApiError> {
    let principal = principal(&state, &headers).await?;
    let role: Role = payload
        .role
        .parse()
        .map_err(|_| ApiError::Validation("Invalid role".to_string()))?;
    let user = state
        .admin
        .update_user_role(&principal, user_id, role)
        .await?;
    Ok(Json(json!({ "message": "User role updated successfully", "user": user })))
}

pub async fn update_email(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<i64>,
    Json(payload): Json<EmailUpdate>,
) -> Result<Json<Value>, ApiError> {
    let principal = principal(&state, &headers).await?;
    let user = state
        .admin
        .update_user_email(&principal, user_id, &payload.email)
        .await?;
    Ok(Json(json!({ "message": "User email updated successfully", "user": user })))
}
