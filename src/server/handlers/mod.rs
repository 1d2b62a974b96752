use axum::http::HeaderMap;

use crate::core::errors::ApiError;
use crate::core::security::{require_principal, Principal};
use crate::state::AppState;

pub mod chat;
pub mod documents;
pub mod feedback;
pub mod health;
pub mod history;
pub mod super_admin;
pub mod users;

/// Resolves the bearer token on a request into the acting principal.
pub(crate) async fn principal(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Principal, ApiError> {
    require_principal(headers, state.identity.as_ref()).await
}
