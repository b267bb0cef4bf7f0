//! Execution data model shared by the normalizer, reducer and transports.
//!
//! An [`Execution`] is one run of an agent. The reconciler never owns the
//! authoritative copy; it assembles this view from socket deltas and poll
//! snapshots ([`ExecutionSnapshot`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::normalizer::wire::{self, ActionPayload, Fields};

/// Placeholder shown when an execution fails without reporting why.
pub const GENERIC_FAILURE_MESSAGE: &str = "Execution failed without an error message";

/// Lifecycle status of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    #[default]
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    /// Success, failed and cancelled are terminal: nothing may change afterwards.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Success | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }

    fn rank(self) -> u8 {
        match self {
            ExecutionStatus::Pending => 0,
            ExecutionStatus::Running => 1,
            _ => 2,
        }
    }

    /// Merge `next` into `self` without ever moving backwards.
    ///
    /// A terminal status is absorbing; between non-terminal values the
    /// greater one (`pending < running < terminal`) wins.
    pub fn advance(self, next: ExecutionStatus) -> ExecutionStatus {
        if self.is_terminal() || next.rank() < self.rank() {
            self
        } else {
            next
        }
    }

    /// Parse the status spellings used by the execution API and event stream.
    pub fn parse(raw: &str) -> Option<ExecutionStatus> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" | "queued" | "created" => Some(ExecutionStatus::Pending),
            "running" | "in_progress" | "started" | "active" => Some(ExecutionStatus::Running),
            "success" | "succeeded" | "completed" | "complete" | "done" => {
                Some(ExecutionStatus::Success)
            }
            "failed" | "failure" | "error" | "errored" => Some(ExecutionStatus::Failed),
            "cancelled" | "canceled" | "aborted" | "stopped" => Some(ExecutionStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Which accumulator a text delta feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamChannel {
    Response,
    Reasoning,
}

impl std::fmt::Display for StreamChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Response => write!(f, "response"),
            Self::Reasoning => write!(f, "reasoning"),
        }
    }
}

/// Identity of a text stream: one per channel per execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct StreamId {
    pub channel: StreamChannel,
    pub execution_id: String,
}

impl StreamId {
    pub fn new(channel: StreamChannel, execution_id: impl Into<String>) -> Self {
        Self {
            channel,
            execution_id: execution_id.into(),
        }
    }
}

/// Identity of a tool invocation.
///
/// Wire events that lack a stable id are matched by tool type and the order
/// in which invocations of that type were first sighted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolKey {
    Id { id: String },
    Ordinal { tool_type: String, ordinal: usize },
}

impl std::fmt::Display for ToolKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolKey::Id { id } => write!(f, "{}", id),
            ToolKey::Ordinal { tool_type, ordinal } => write!(f, "{}#{}", tool_type, ordinal),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolState {
    Running,
    Success,
    Failed,
}

/// One tool invocation. Records in the completed list are never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallRecord {
    pub key: ToolKey,
    pub tool_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    pub state: ToolState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl ToolCallRecord {
    /// One-line summary used for the terminal log.
    pub fn log_line(&self) -> String {
        let verb = match self.state {
            ToolState::Running => "running",
            ToolState::Success => "completed",
            ToolState::Failed => "failed",
        };
        match self.duration_ms {
            Some(ms) => format!("[tool] {} ({}) {} in {}ms", self.tool_type, self.key, verb, ms),
            None => format!("[tool] {} ({}) {}", self.tool_type, self.key, verb),
        }
    }
}

/// Read-only view of an execution as reconciled so far.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Execution {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub status: ExecutionStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub response_text: String,
    pub reasoning_text: String,
    pub completed_tools: Vec<ToolCallRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Execution {
    /// An execution nothing is known about yet.
    pub fn new(id: impl Into<String>, agent_id: Option<String>) -> Self {
        Self {
            id: id.into(),
            agent_id,
            status: ExecutionStatus::Pending,
            created_at: None,
            started_at: None,
            finished_at: None,
            response_text: String::new(),
            reasoning_text: String::new(),
            completed_tools: Vec::new(),
            error: None,
        }
    }
}

/// Full point-in-time description of an execution, as returned by polling.
///
/// Field names follow the execution API (`aiResponse`, `outputPayload`,
/// `actionsExecuted`); snake_case spellings are accepted too. Actions are
/// kept raw so one malformed entry cannot poison the whole snapshot.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecutionSnapshot {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(
        default,
        rename = "executionId",
        alias = "execution_id",
        deserialize_with = "lenient_string"
    )]
    pub execution_id: Option<String>,
    #[serde(
        default,
        rename = "agentId",
        alias = "agent_id",
        deserialize_with = "lenient_string"
    )]
    pub agent_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: Option<String>,
    #[serde(
        default,
        rename = "aiResponse",
        alias = "ai_response",
        deserialize_with = "lenient_string"
    )]
    pub ai_response: Option<String>,
    #[serde(default, rename = "outputPayload", alias = "output_payload")]
    pub output_payload: Option<Value>,
    #[serde(
        default,
        rename = "actionsExecuted",
        alias = "actions_executed",
        deserialize_with = "null_as_default"
    )]
    pub actions_executed: Vec<Value>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(
        default,
        rename = "createdAt",
        alias = "created_at",
        deserialize_with = "lenient_string"
    )]
    pub created_at: Option<String>,
    #[serde(
        default,
        rename = "startedAt",
        alias = "started_at",
        deserialize_with = "lenient_string"
    )]
    pub started_at: Option<String>,
    #[serde(
        default,
        rename = "finishedAt",
        alias = "finished_at",
        alias = "completedAt",
        deserialize_with = "lenient_string"
    )]
    pub finished_at: Option<String>,
}

/// `null` reads as the type's default instead of failing the whole snapshot.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Strings pass through, numbers and booleans are stringified, anything
/// else (null, objects, arrays) reads as absent.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

impl ExecutionSnapshot {
    /// Id of the execution this snapshot describes, if the API echoed it.
    pub fn subject_id(&self) -> Option<&str> {
        self.execution_id.as_deref().or(self.id.as_deref())
    }

    pub fn status(&self) -> Option<ExecutionStatus> {
        self.status.as_deref().and_then(ExecutionStatus::parse)
    }

    /// Final response text: `aiResponse`, else a text field of `outputPayload`.
    pub fn final_response(&self) -> Option<String> {
        if let Some(text) = self.ai_response.as_deref().filter(|s| !s.is_empty()) {
            return Some(text.to_string());
        }
        match self.output_payload.as_ref()? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Object(map) => {
                Fields::new(map).string(&["response", "aiResponse", "text", "content"])
            }
            _ => None,
        }
    }

    pub fn final_reasoning(&self) -> Option<String> {
        match self.output_payload.as_ref()? {
            Value::Object(map) => {
                Fields::new(map).string(&["reasoning", "reasoningText", "thinking"])
            }
            _ => None,
        }
    }

    pub fn error_text(&self) -> Option<String> {
        match self.error.as_ref()? {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Object(map) => Fields::new(map).string(&["message", "error", "detail"]),
            _ => None,
        }
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.created_at.as_deref())
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.started_at.as_deref())
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.finished_at.as_deref())
    }

    /// Tool records carried by the snapshot, keyed the same way socket events are.
    ///
    /// Actions without an id get an ordinal among id-less actions of the same
    /// type, in list order.
    pub fn tool_records(&self) -> Vec<ToolCallRecord> {
        let mut ordinals: HashMap<String, usize> = HashMap::new();
        self.actions_executed
            .iter()
            .filter_map(|raw| wire::decode_payload(raw))
            .filter_map(|map| ActionPayload::from_fields(&Fields::new(&map)))
            .map(|action| {
                let key = match action.tool_id.clone() {
                    Some(id) => ToolKey::Id { id },
                    None => {
                        let slot = ordinals.entry(action.tool_type.clone()).or_insert(0);
                        let ordinal = *slot;
                        *slot += 1;
                        ToolKey::Ordinal {
                            tool_type: action.tool_type.clone(),
                            ordinal,
                        }
                    }
                };
                ToolCallRecord {
                    key,
                    tool_type: action.tool_type,
                    params: action.params,
                    state: action.state,
                    result: action.result,
                    duration_ms: action.duration_ms,
                }
            })
            .collect()
    }
}

fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw?.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
