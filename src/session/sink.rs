//! Downstream consumers of finished executions.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

use crate::execution::Execution;

/// Receives each execution once: after it reached a terminal status and its
/// log has been fully paced out.
#[async_trait]
pub trait CompletionSink: Send + Sync {
    async fn execution_finished(&self, execution: Execution);
}

/// Logs the finished execution.
#[derive(Debug, Clone, Default)]
pub struct LogCompletionSink;

#[async_trait]
impl CompletionSink for LogCompletionSink {
    async fn execution_finished(&self, execution: Execution) {
        info!(
            execution_id = %execution.id,
            status = %execution.status,
            tools = execution.completed_tools.len(),
            response_chars = execution.response_text.chars().count(),
            "Execution finished"
        );
    }
}

/// POSTs the finished execution as JSON to a webhook.
#[derive(Clone)]
pub struct WebhookCompletionSink {
    url: String,
    client: reqwest::Client,
    token: Option<String>,
}

impl WebhookCompletionSink {
    pub fn new(url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
            token,
        }
    }
}

#[async_trait]
impl CompletionSink for WebhookCompletionSink {
    async fn execution_finished(&self, execution: Execution) {
        let mut request = self
            .client
            .post(&self.url)
            .timeout(Duration::from_secs(30))
            .json(&execution);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        match request.send().await {
            Ok(resp) if resp.status().is_success() => {
                info!(execution_id = %execution.id, "Delivered completion webhook");
            }
            Ok(resp) => {
                warn!(
                    execution_id = %execution.id,
                    "Completion webhook returned {}",
                    resp.status()
                );
            }
            Err(e) => {
                warn!(execution_id = %execution.id, "Completion webhook failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::ExecutionStatus;
    use axum::{extract::State, http::header::AUTHORIZATION, http::HeaderMap, routing::post, Json, Router};
    use serde_json::Value;
    use tokio::sync::mpsc;

    type Delivery = (Option<String>, Value);

    async fn receive(
        State(tx): State<mpsc::UnboundedSender<Delivery>>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> &'static str {
        let auth = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let _ = tx.send((auth, body));
        "ok"
    }

    async fn hook_server() -> (String, mpsc::UnboundedReceiver<Delivery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let app = Router::new().route("/hook", post(receive)).with_state(tx);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (format!("http://{}/hook", addr), rx)
    }

    fn finished_execution() -> Execution {
        let mut execution = Execution::new("exec-1", Some("agent-1".to_string()));
        execution.status = ExecutionStatus::Success;
        execution.response_text = "Hello".to_string();
        execution
    }

    #[tokio::test]
    async fn webhook_posts_execution_with_its_own_token() {
        let (url, mut rx) = hook_server().await;
        let sink = WebhookCompletionSink::new(url, Some("hook-secret".to_string()));

        sink.execution_finished(finished_execution()).await;

        let (auth, body) = rx.recv().await.unwrap();
        assert_eq!(auth.as_deref(), Some("Bearer hook-secret"));
        assert_eq!(body["id"], "exec-1");
        assert_eq!(body["status"], "success");
        assert_eq!(body["response_text"], "Hello");
    }

    #[tokio::test]
    async fn webhook_without_token_sends_no_authorization() {
        let (url, mut rx) = hook_server().await;
        let sink = WebhookCompletionSink::new(url, None);

        sink.execution_finished(finished_execution()).await;

        let (auth, body) = rx.recv().await.unwrap();
        assert_eq!(auth, None);
        assert_eq!(body["agent_id"], "agent-1");
    }
}
