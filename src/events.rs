use serde::Serialize;
use serde_json::Value;

use crate::execution::{ExecutionStatus, StreamChannel, StreamId};

/// Canonical execution events, independent of how the wire spelled them.
///
/// Every variant names the execution it applies to; a reconciler drops
/// events addressed to any other execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    /// Execution began running.
    Started { execution_id: String },
    /// Coarse progress update; `status` is never terminal here.
    StatusChanged {
        execution_id: String,
        status: Option<ExecutionStatus>,
        message: Option<String>,
    },
    /// A tool/action invocation began.
    ToolStarted {
        execution_id: String,
        tool_id: Option<String>,
        tool_type: String,
        params: Option<Value>,
    },
    /// A tool/action invocation finished.
    ToolCompleted {
        execution_id: String,
        tool_id: Option<String>,
        tool_type: String,
        success: bool,
        result: Option<Value>,
        duration_ms: Option<u64>,
        /// Some servers echo the invocation params on completion.
        params: Option<Value>,
    },
    /// Fragment of streamed response or reasoning text.
    TextDelta {
        execution_id: String,
        stream_id: StreamId,
        channel: StreamChannel,
        delta: String,
    },
    /// Line proxied from the worker's log.
    LogLine { execution_id: String, line: String },
    /// Execution reached a terminal status.
    Completed {
        execution_id: String,
        final_status: ExecutionStatus,
        error: Option<String>,
    },
}

impl ExecutionEvent {
    pub fn execution_id(&self) -> &str {
        match self {
            ExecutionEvent::Started { execution_id }
            | ExecutionEvent::StatusChanged { execution_id, .. }
            | ExecutionEvent::ToolStarted { execution_id, .. }
            | ExecutionEvent::ToolCompleted { execution_id, .. }
            | ExecutionEvent::TextDelta { execution_id, .. }
            | ExecutionEvent::LogLine { execution_id, .. }
            | ExecutionEvent::Completed { execution_id, .. } => execution_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionEvent::Started { .. } => "started",
            ExecutionEvent::StatusChanged { .. } => "status_changed",
            ExecutionEvent::ToolStarted { .. } => "tool_started",
            ExecutionEvent::ToolCompleted { .. } => "tool_completed",
            ExecutionEvent::TextDelta { .. } => "text_delta",
            ExecutionEvent::LogLine { .. } => "log_line",
            ExecutionEvent::Completed { .. } => "completed",
        }
    }
}
