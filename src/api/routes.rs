//! HTTP route definitions and server setup.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::executions;
use crate::config::Config;
use crate::dashboard::Dashboard;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub dashboard: Dashboard,
}

/// Build the view server's router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(executions::health))
        .route("/api/executions", get(executions::list_executions))
        .route("/api/executions/watch", post(executions::watch_execution))
        .route(
            "/api/executions/:id",
            get(executions::get_execution).delete(executions::release_execution),
        )
        .route("/api/executions/:id/stream", get(executions::stream_execution))
        .route("/api/executions/:id/cancel", post(executions::cancel_execution))
        .route(
            "/api/executions/:id/resubscribe",
            post(executions::resubscribe_execution),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the view server. `initial` names executions to watch right away,
/// as `(agent_id, execution_id)` pairs.
pub async fn serve(config: Config, initial: Vec<(String, String)>) -> anyhow::Result<()> {
    let dashboard = Dashboard::from_config(&config, CancellationToken::new());
    match dashboard.registry() {
        Some(registry) => tracing::info!("Push channel: {}", registry.channel_name()),
        None => tracing::info!("Push channel disabled, polling only"),
    }

    for (agent_id, execution_id) in initial {
        dashboard.watch(&agent_id, &execution_id).await;
        tracing::info!(agent_id = %agent_id, execution_id = %execution_id, "Watching execution");
    }

    let state = Arc::new(AppState {
        config: config.clone(),
        dashboard,
    });
    let app = router(Arc::clone(&state));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    let shutdown_state = Arc::clone(&state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal(shutdown_state).await;
        })
        .await?;

    Ok(())
}

async fn shutdown_signal(state: Arc<AppState>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, stopping sessions...");
    state.dashboard.shutdown_all().await;
    tracing::info!("Graceful shutdown complete");
}
