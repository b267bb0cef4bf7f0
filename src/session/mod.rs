//! Per-execution reconciler sessions.
//!
//! A session is a tokio actor that owns one [`ConversationMessageState`]
//! and feeds it from three independent sources: the agent's push
//! subscription, a snapshot poller, and the log pacer's timer. Every source
//! is one arm of a single `select!` and every arm applies exactly one
//! `reduce` step, so no mutation spans an `.await`.
//!
//! Callers interact through a cloneable [`SessionHandle`]; state is
//! published as [`ExecutionView`] values over a `watch` channel.
//!
//! [`ConversationMessageState`]: crate::reducer::ConversationMessageState

mod actor;
mod sink;

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::execution::{Execution, ToolCallRecord};
use crate::reducer::Phase;
use crate::transport::{ConnectionRegistry, ExecutionApi};

pub use sink::{CompletionSink, LogCompletionSink, WebhookCompletionSink};

/// Timing and size knobs a session needs.
#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub poll_interval: Duration,
    pub log_pace: Duration,
    pub log_max_lines: usize,
    /// How long completed tools stay visible after the execution ends.
    pub tool_grace: Duration,
    /// How long a cancelled session waits for a confirming event.
    pub cancel_confirm_timeout: Duration,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(2000),
            log_pace: Duration::from_millis(45),
            log_max_lines: 200,
            tool_grace: Duration::from_millis(4000),
            cancel_confirm_timeout: Duration::from_secs(30),
        }
    }
}

/// Collaborators shared by every session.
#[derive(Clone)]
pub struct SessionContext {
    /// `None` runs poll-only.
    pub registry: Option<Arc<ConnectionRegistry>>,
    pub api: Arc<dyn ExecutionApi>,
    pub sink: Arc<dyn CompletionSink>,
    pub settings: ReconcilerSettings,
}

/// Everything a viewer of one execution needs, as of the last step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionView {
    pub session_id: Uuid,
    pub execution: Execution,
    pub phase: Phase,
    pub is_running: bool,
    pub cancel_requested: bool,
    pub response_streaming: bool,
    pub reasoning_streaming: bool,
    /// Tools started but never completed, including stuck ones.
    pub active_tools: Vec<ToolCallRecord>,
    /// False once the post-terminal grace period for completed tools elapsed.
    pub tools_visible: bool,
    pub status_message: Option<String>,
    /// The push failure if there is one, else the poll failure.
    pub transport_error: Option<String>,
    /// Cleared only when the push channel reconnects.
    pub stream_error: Option<String>,
    /// Cleared by the next successful snapshot.
    pub poll_error: Option<String>,
    /// Log lines revealed so far by the pacer.
    pub log_lines: Vec<String>,
    pub printed_count: usize,
    pub total_lines: usize,
    pub subscribed: bool,
    pub polling: bool,
    /// Set once the completion sink has been handed the execution.
    pub finished: bool,
}

impl ExecutionView {
    /// View of a session that has not processed anything yet.
    pub(crate) fn pending(session_id: Uuid, execution_id: &str, agent_id: &str) -> Self {
        Self {
            session_id,
            execution: Execution::new(execution_id, Some(agent_id.to_string())),
            phase: Phase::Idle,
            is_running: false,
            cancel_requested: false,
            response_streaming: false,
            reasoning_streaming: false,
            active_tools: Vec::new(),
            tools_visible: true,
            status_message: None,
            transport_error: None,
            stream_error: None,
            poll_error: None,
            log_lines: Vec::new(),
            printed_count: 0,
            total_lines: 0,
            subscribed: false,
            polling: false,
            finished: false,
        }
    }
}

#[derive(Debug)]
pub(crate) enum SessionCommand {
    Cancel,
    Resubscribe,
    Shutdown,
}

/// The session task has stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("session is closed")]
pub struct SessionClosed;

/// Cloneable handle on a running session.
#[derive(Clone)]
pub struct SessionHandle {
    id: Uuid,
    execution_id: String,
    agent_id: String,
    commands: mpsc::Sender<SessionCommand>,
    view: watch::Receiver<ExecutionView>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Latest published view.
    pub fn view(&self) -> ExecutionView {
        self.view.borrow().clone()
    }

    /// Receiver notified on every view change.
    pub fn subscribe(&self) -> watch::Receiver<ExecutionView> {
        self.view.clone()
    }

    /// Request cancellation. The running indicator clears immediately; the
    /// server call runs in the background.
    pub async fn cancel(&self) -> Result<(), SessionClosed> {
        self.send(SessionCommand::Cancel).await
    }

    /// Re-attach the push subscription after a disconnect.
    pub async fn resubscribe(&self) -> Result<(), SessionClosed> {
        self.send(SessionCommand::Resubscribe).await
    }

    /// Tear the session down, releasing its subscription and poller.
    pub async fn shutdown(&self) -> Result<(), SessionClosed> {
        self.send(SessionCommand::Shutdown).await
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    async fn send(&self, command: SessionCommand) -> Result<(), SessionClosed> {
        self.commands.send(command).await.map_err(|_| SessionClosed)
    }
}

/// Start a session reconciling `execution_id` of `agent_id`.
///
/// The session subscribes to the agent's events (unless running poll-only),
/// starts polling, and runs until shut down through its handle, until every
/// handle is dropped, or until `shutdown` is cancelled.
pub fn spawn_session(
    ctx: &SessionContext,
    agent_id: impl Into<String>,
    execution_id: impl Into<String>,
    shutdown: CancellationToken,
) -> SessionHandle {
    let agent_id = agent_id.into();
    let execution_id = execution_id.into();
    let id = Uuid::new_v4();
    let (cmd_tx, cmd_rx) = mpsc::channel(16);

    let (actor, view_rx) = actor::SessionActor::new(
        id,
        ctx.clone(),
        agent_id.clone(),
        execution_id.clone(),
        cmd_rx,
        shutdown,
    );
    tokio::spawn(actor.run());

    SessionHandle {
        id,
        execution_id,
        agent_id,
        commands: cmd_tx,
        view: view_rx,
    }
}
