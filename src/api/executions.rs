//! Execution endpoints: start, inspect, stream, cancel and release sessions.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::Stream;
use tracing::{debug, warn};

use super::routes::AppState;
use super::types::{CancelResponse, HealthResponse, WatchRequest};
use crate::session::{ExecutionView, SessionHandle};

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let registry = state.dashboard.registry();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        api_url: state.config.api_url.clone(),
        poll_interval_ms: state.config.poll_interval_ms,
        event_stream: registry.is_some(),
        channel: registry.map(|r| r.channel_name().to_string()),
        sessions: state.dashboard.sessions().await.len(),
        subscribed_agents: registry.map(|r| r.subscribed_agents()).unwrap_or_default(),
    })
}

/// List the current view of every session.
pub async fn list_executions(State(state): State<Arc<AppState>>) -> Json<Vec<ExecutionView>> {
    let views = state
        .dashboard
        .sessions()
        .await
        .iter()
        .map(SessionHandle::view)
        .collect();
    Json(views)
}

/// Start (or reuse) the session for an execution.
pub async fn watch_execution(
    State(state): State<Arc<AppState>>,
    Json(req): Json<WatchRequest>,
) -> Result<Json<ExecutionView>, (StatusCode, String)> {
    let agent_id = req.agent_id.trim();
    let execution_id = req.execution_id.trim();
    if agent_id.is_empty() || execution_id.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "agent_id and execution_id are required".to_string(),
        ));
    }
    let handle = state.dashboard.watch(agent_id, execution_id).await;
    Ok(Json(handle.view()))
}

pub async fn get_execution(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ExecutionView>, (StatusCode, String)> {
    let handle = find(&state, &id).await?;
    Ok(Json(handle.view()))
}

/// Stream view updates via SSE. The current view is sent first; the stream
/// ends after the session closes.
pub async fn stream_execution(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)> {
    let handle = find(&state, &id).await?;
    let mut rx = handle.subscribe();

    let stream = async_stream::stream! {
        let initial = rx.borrow_and_update().clone();
        if let Some(event) = view_event("view", &initial) {
            yield Ok(event);
        }

        while rx.changed().await.is_ok() {
            let view = rx.borrow_and_update().clone();
            if let Some(event) = view_event("view", &view) {
                yield Ok(event);
            }
        }

        debug!(execution_id = %id, "View stream closed");
        let last = rx.borrow().clone();
        if let Some(event) = view_event("closed", &last) {
            yield Ok(event);
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    ))
}

/// Ask the session to cancel its execution.
pub async fn cancel_execution(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<CancelResponse>), (StatusCode, String)> {
    let handle = find(&state, &id).await?;
    handle
        .cancel()
        .await
        .map_err(|e| (StatusCode::GONE, e.to_string()))?;
    Ok((
        StatusCode::ACCEPTED,
        Json(CancelResponse {
            execution_id: id,
            cancel_requested: true,
        }),
    ))
}

/// Reopen the push subscription after a dropped connection.
pub async fn resubscribe_execution(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ExecutionView>, (StatusCode, String)> {
    let handle = find(&state, &id).await?;
    handle
        .resubscribe()
        .await
        .map_err(|e| (StatusCode::GONE, e.to_string()))?;
    Ok(Json(handle.view()))
}

/// Tear down the session watching an execution.
pub async fn release_execution(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> StatusCode {
    if state.dashboard.release(&id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn find(state: &AppState, execution_id: &str) -> Result<SessionHandle, (StatusCode, String)> {
    state.dashboard.get(execution_id).await.ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            format!("No session for execution {}", execution_id),
        )
    })
}

fn view_event(name: &str, view: &ExecutionView) -> Option<Event> {
    match Event::default().event(name).json_data(view) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("Failed to encode view event: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::dashboard::Dashboard;
    use crate::error::TransportError;
    use crate::execution::ExecutionSnapshot;
    use crate::session::{LogCompletionSink, ReconcilerSettings, SessionContext};
    use crate::transport::{CancelAck, ExecutionApi};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct RunningApi {
        cancels: AtomicUsize,
    }

    #[async_trait]
    impl ExecutionApi for RunningApi {
        async fn fetch_snapshot(&self, _execution_id: &str) -> Result<ExecutionSnapshot, TransportError> {
            Ok(ExecutionSnapshot {
                status: Some("running".to_string()),
                ..Default::default()
            })
        }

        async fn cancel(&self, _execution_id: &str) -> Result<CancelAck, TransportError> {
            self.cancels.fetch_add(1, Ordering::SeqCst);
            Ok(CancelAck {
                accepted: true,
                message: None,
            })
        }
    }

    fn state(api: Arc<RunningApi>) -> Arc<AppState> {
        let ctx = SessionContext {
            registry: None,
            api,
            sink: Arc::new(LogCompletionSink),
            settings: ReconcilerSettings::default(),
        };
        Arc::new(AppState {
            config: Config::new("http://127.0.0.1:9"),
            dashboard: Dashboard::new(ctx, CancellationToken::new()),
        })
    }

    fn watch_request(agent_id: &str, execution_id: &str) -> Json<WatchRequest> {
        Json(WatchRequest {
            agent_id: agent_id.to_string(),
            execution_id: execution_id.to_string(),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn watch_then_get_returns_view() {
        let state = state(Arc::default());
        let Json(view) = watch_execution(State(state.clone()), watch_request("agent-1", "exec-1"))
            .await
            .unwrap();
        assert_eq!(view.execution.id, "exec-1");

        let Json(fetched) = get_execution(State(state.clone()), Path("exec-1".to_string()))
            .await
            .unwrap();
        assert_eq!(fetched.session_id, view.session_id);

        let Json(all) = list_executions(State(state.clone())).await;
        assert_eq!(all.len(), 1);

        let Json(health) = health(State(state)).await;
        assert_eq!(health.sessions, 1);
        assert_eq!(health.api_url, "http://127.0.0.1:9");
        assert_eq!(health.poll_interval_ms, 2000);
        assert!(!health.event_stream);
        assert!(health.subscribed_agents.is_empty());
    }

    #[tokio::test]
    async fn watch_rejects_blank_ids() {
        let state = state(Arc::default());
        let err = watch_execution(State(state), watch_request("  ", "exec-1"))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_execution_is_not_found() {
        let state = state(Arc::default());
        let err = get_execution(State(state.clone()), Path("missing".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);

        let err = cancel_execution(State(state.clone()), Path("missing".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);

        assert_eq!(
            release_execution(State(state), Path("missing".to_string())).await,
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_reaches_the_server_once() {
        let api = Arc::new(RunningApi::default());
        let state = state(api.clone());
        watch_execution(State(state.clone()), watch_request("agent-1", "exec-1"))
            .await
            .unwrap();

        let (status, Json(body)) = cancel_execution(State(state.clone()), Path("exec-1".to_string()))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(body.cancel_requested);
        cancel_execution(State(state.clone()), Path("exec-1".to_string()))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(api.cancels.load(Ordering::SeqCst), 1);
        let Json(view) = get_execution(State(state), Path("exec-1".to_string()))
            .await
            .unwrap();
        assert!(view.cancel_requested);
    }

    #[tokio::test(start_paused = true)]
    async fn release_removes_session() {
        let state = state(Arc::default());
        watch_execution(State(state.clone()), watch_request("agent-1", "exec-1"))
            .await
            .unwrap();
        assert_eq!(
            release_execution(State(state.clone()), Path("exec-1".to_string())).await,
            StatusCode::NO_CONTENT
        );
        let Json(all) = list_executions(State(state)).await;
        assert!(all.is_empty());
    }
}
