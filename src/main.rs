use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;

use domain_rag_backend::core::config::AppPaths;
use domain_rag_backend::core::logging;
use domain_rag_backend::core::tenancy::TenantScope;
use domain_rag_backend::server::router::router;
use domain_rag_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let paths = Arc::new(AppPaths::new());
    logging::init(&paths);
    let state = AppState::initialize(paths).await?;

    spawn_reconciliation(state.clone());

    let bind_addr = format!(
        "{}:{}",
        state.settings.server.host, state.settings.server.port
    );
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;
    tracing::info!("Listening on {}", addr);

    let app = router(state.clone());
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

/// Periodic global reconciliation; disabled when the interval is zero.
fn spawn_reconciliation(state: Arc<AppState>) {
    let interval_secs = state.settings.ingestion.reconcile_interval_secs;
    if interval_secs == 0 {
        return;
    }
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match state.documents.reconcile_scope(TenantScope::Global).await {
                Ok(report) if report.chunk_rows_removed > 0 => tracing::info!(
                    "Reconciliation removed {} orphaned chunk row(s) from {} document(s)",
                    report.chunk_rows_removed,
                    report.orphaned_documents.len()
                ),
                Ok(_) => tracing::debug!("Reconciliation found nothing to repair"),
                Err(err) => tracing::warn!("Reconciliation pass failed: {}", err),
            }
        }
    });
}
