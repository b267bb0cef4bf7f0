//! Dashboard: the set of live reconciler sessions.
//!
//! Each agent has at most one live session. Watching a new execution of an
//! agent tears the previous session down, which releases its push
//! subscription; the agent's connection itself is shared through the
//! [`ConnectionRegistry`] and survives the hand-over.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::session::{
    spawn_session, CompletionSink, LogCompletionSink, ReconcilerSettings, SessionContext,
    SessionHandle, WebhookCompletionSink,
};
use crate::transport::{ConnectionRegistry, RestExecutionApi, SseEventChannel};

pub struct Dashboard {
    ctx: SessionContext,
    /// Keyed by agent id.
    sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,
    shutdown: CancellationToken,
}

impl Dashboard {
    pub fn new(ctx: SessionContext, shutdown: CancellationToken) -> Self {
        Self {
            ctx,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            shutdown,
        }
    }

    /// Wire up the SSE channel, REST client and completion sink from config.
    pub fn from_config(config: &Config, shutdown: CancellationToken) -> Self {
        let registry = config.event_stream_enabled.then(|| {
            Arc::new(ConnectionRegistry::new(Arc::new(SseEventChannel::new(
                config.events_url.clone(),
                config.api_token.clone(),
            ))))
        });
        let sink: Arc<dyn CompletionSink> = match &config.completion_webhook_url {
            Some(url) => Arc::new(WebhookCompletionSink::new(
                url.clone(),
                config.completion_webhook_token.clone(),
            )),
            None => Arc::new(LogCompletionSink),
        };
        let ctx = SessionContext {
            registry,
            api: Arc::new(RestExecutionApi::new(
                config.api_url.clone(),
                config.api_token.clone(),
            )),
            sink,
            settings: ReconcilerSettings::from(config),
        };
        Self::new(ctx, shutdown)
    }

    pub fn registry(&self) -> Option<&Arc<ConnectionRegistry>> {
        self.ctx.registry.as_ref()
    }

    /// Session for `execution_id`, starting one if needed. Any live session
    /// for another execution of the same agent is shut down first.
    pub async fn watch(&self, agent_id: &str, execution_id: &str) -> SessionHandle {
        if let Some(existing) = self.sessions.read().await.get(agent_id) {
            if existing.execution_id() == execution_id && !existing.is_closed() {
                return existing.clone();
            }
        }

        let mut sessions = self.sessions.write().await;
        if let Some(existing) = sessions.get(agent_id) {
            if existing.execution_id() == execution_id && !existing.is_closed() {
                return existing.clone();
            }
        }
        if let Some(previous) = sessions.remove(agent_id) {
            info!(
                agent_id = %agent_id,
                previous = %previous.execution_id(),
                next = %execution_id,
                "Replacing session for new execution"
            );
            let _ = previous.shutdown().await;
        }

        let handle = spawn_session(
            &self.ctx,
            agent_id,
            execution_id,
            self.shutdown.child_token(),
        );
        sessions.insert(agent_id.to_string(), handle.clone());
        handle
    }

    pub async fn get(&self, execution_id: &str) -> Option<SessionHandle> {
        self.sessions
            .read()
            .await
            .values()
            .find(|handle| handle.execution_id() == execution_id)
            .cloned()
    }

    /// All sessions, ordered by agent id.
    pub async fn sessions(&self) -> Vec<SessionHandle> {
        let mut handles: Vec<SessionHandle> = self.sessions.read().await.values().cloned().collect();
        handles.sort_by(|a, b| a.agent_id().cmp(b.agent_id()));
        handles
    }

    /// Tear down the session watching `execution_id`. Returns false if none.
    pub async fn release(&self, execution_id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        let Some(agent_id) = sessions
            .iter()
            .find(|(_, handle)| handle.execution_id() == execution_id)
            .map(|(agent_id, _)| agent_id.clone())
        else {
            return false;
        };
        if let Some(handle) = sessions.remove(&agent_id) {
            let _ = handle.shutdown().await;
            info!(execution_id = %execution_id, "Released session");
        }
        true
    }

    /// Stop every session and drop every push connection.
    pub async fn shutdown_all(&self) {
        self.shutdown.cancel();
        let mut sessions = self.sessions.write().await;
        let count = sessions.len();
        sessions.clear();
        if let Some(registry) = &self.ctx.registry {
            registry.shutdown();
        }
        info!("Shut down {} sessions", count);
    }
}
