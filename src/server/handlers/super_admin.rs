use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::principal;
use crate::admin::{CreateAccount, SystemStats};
use crate::core::errors::ApiError;
use crate::core::security::Role;
use crate::core::tenancy::require_role;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateDomain {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateAdmin {
    pub domain_id: i64,
    #[serde(flatten)]
    pub account: CreateAccount,
}

pub async fn create_domain(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateDomain>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let principal = principal(&state, &headers).await?;
    let domain = state.admin.create_domain(&principal, &payload.name).await?;
    Ok((StatusCode::CREATED, Json(json!(domain))))
}

pub async fn list_domains(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let principal = principal(&state, &headers).await?;
    let domains = state.admin.list_domains(&principal).await?;
    Ok(Json(json!({ "domains": domains })))
}

pub async fn delete_domain(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(domain_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let principal = principal(&state, &headers).await?;
    let vectors_removed = state.admin.delete_domain(&principal, domain_id).await?;
    Ok(Json(json!({
        "message": format!("Domain {} deleted", domain_id),
        "vectors_removed": vectors_removed,
    })))
}

pub async fn activate_domain(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(domain_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    set_domain_active(&state, &headers, domain_id, true).await
}

pub async fn deactivate_domain(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(domain_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    set_domain_active(&state, &headers, domain_id, false).await
}

async fn set_domain_active(
    state: &AppState,
    headers: &HeaderMap,
    domain_id: i64,
    active: bool,
) -> Result<Json<Value>, ApiError> {
    let principal = principal(state, headers).await?;
    let domain = state
        .admin
        .set_domain_active(&principal, domain_id, active)
        .await?;
    let verb = if active { "activated" } else { "deactivated" };
    Ok(Json(json!({
        "message": format!("Domain {} {}", domain.name, verb),
        "domain": domain,
    })))
}

pub async fn create_admin(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateAdmin>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let principal = principal(&state, &headers).await?;
    let admin = state
        .admin
        .create_admin(&principal, payload.domain_id, payload.account)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Admin created successfully", "user": admin })),
    ))
}

pub async fn stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SystemStats>, ApiError> {
    let principal = principal(&state, &headers).await?;
    Ok(Json(state.admin.stats(&principal).await?))
}

/// Effective configuration with secrets redacted.
pub async fn get_config(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let principal = principal(&state, &headers).await?;
    require_role(&principal, &[Role::SuperAdmin])?;
    let config = state.config.load_config()?;
    Ok(Json(state.config.redact_sensitive_values(&config)))
}
