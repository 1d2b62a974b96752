use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{delete, get, patch, post, put};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::server::handlers::{chat, documents, feedback, health, history, super_admin, users};
use crate::state::AppState;

/// Creates the application router with all routes and middleware.
///
/// Every `/api` route resolves the caller from the bearer token itself; the
/// router only adds CORS, request tracing and the upload body limit.
pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = build_cors_layer(&state.settings.server.cors_allowed_origins);
    let upload_limit = state.settings.ingestion.max_upload_bytes;

    Router::new()
        .route("/health", get(health::health))
        .route("/api/chat/query", post(chat::chat_query))
        .route("/api/probe", get(chat::probe))
        .route("/api/probe/scores", get(chat::probe_scores))
        .route(
            "/api/admin/upload",
            post(documents::upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/admin/docs", get(documents::list_documents))
        .route("/api/admin/docs/:doc_id", delete(documents::delete_document))
        .route(
            "/api/admin/docs/:doc_id/activate",
            patch(documents::activate_document),
        )
        .route(
            "/api/admin/docs/:doc_id/deactivate",
            patch(documents::deactivate_document),
        )
        .route("/api/admin/chunks", get(documents::list_chunks))
        .route("/api/admin/reconcile", post(documents::reconcile))
        .route(
            "/api/admin/users",
            get(users::list_users).post(users::create_user),
        )
        .route("/api/admin/users/:user_id", delete(users::delete_user))
        .route("/api/admin/users/:user_id/role", put(users::update_role))
        .route("/api/admin/users/:user_id/email", put(users::update_email))
        .route(
            "/api/super-admin/domains",
            get(super_admin::list_domains).post(super_admin::create_domain),
        )
        .route(
            "/api/super-admin/domains/:domain_id",
            delete(super_admin::delete_domain),
        )
        .route(
            "/api/super-admin/domains/:domain_id/activate",
            patch(super_admin::activate_domain),
        )
        .route(
            "/api/super-admin/domains/:domain_id/deactivate",
            patch(super_admin::deactivate_domain),
        )
        .route("/api/super-admin/admins", post(super_admin::create_admin))
        .route("/api/super-admin/stats", get(super_admin::stats))
        .route("/api/super-admin/config", get(super_admin::get_config))
        .route("/api/chat-history/sessions", get(history::list_sessions))
        .route(
            "/api/chat-history/sessions/:session_id",
            delete(history::delete_session),
        )
        .route(
            "/api/chat-history/sessions/:session_id/messages",
            get(history::session_messages),
        )
        .route("/api/chat-history/search", get(history::search))
        .route("/api/chat-history/analytics", get(history::analytics))
        .route(
            "/api/feedback",
            get(feedback::list_feedback).post(feedback::post_feedback),
        )
        .with_state(state)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer(configured: &[String]) -> CorsLayer {
    let mut origins = resolve_allowed_origins(configured);
    if origins.is_empty() {
        origins = default_local_origins();
    }
    let allowed = origins
        .into_iter()
        .filter_map(|origin| HeaderValue::from_str(&origin).ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::ACCEPT, header::AUTHORIZATION, header::CONTENT_TYPE])
}

fn resolve_allowed_origins(configured: &[String]) -> Vec<String> {
    configured
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(|item| item.to_string())
        .collect()
}

fn default_local_origins() -> Vec<String> {
    vec![
        "http://localhost".to_string(),
        "http://localhost:3000".to_string(),
        "http://localhost:5173".to_string(),
        "http://127.0.0.1".to_string(),
        "http://127.0.0.1:3000".to_string(),
        "http://127.0.0.1:5173".to_string(),
        "http://127.0.0.1:8000".to_string(),
    ]
}
