//! Wire payload access with fixed field precedence.
//!
//! The event stream and the execution API have renamed fields over time
//! (`executionId` vs `execution_id`, `result` vs `functionResponse.response`
//! vs `output`, ...). Each logical value is read through an ordered key list;
//! the first key holding a usable value wins.

use serde_json::{Map, Value};

use crate::execution::ToolState;

pub const EXECUTION_ID_KEYS: &[&str] = &["executionId", "execution_id", "runId"];
pub const TOOL_ID_KEYS: &[&str] = &["toolId", "actionId", "toolCallId", "tool_call_id", "id"];
pub const TOOL_TYPE_KEYS: &[&str] = &["toolType", "actionType", "tool", "name", "type"];
pub const PARAMS_KEYS: &[&str] = &["params", "parameters", "input", "args"];
pub const DURATION_KEYS: &[&str] = &["durationMs", "duration_ms", "duration"];
pub const DELTA_KEYS: &[&str] = &["delta", "text", "content"];
pub const LOG_LINE_KEYS: &[&str] = &["line", "message", "data"];
pub const STATUS_KEYS: &[&str] = &["status", "finalStatus", "final_status", "state"];
pub const MESSAGE_KEYS: &[&str] = &["message", "statusMessage", "detail"];
pub const ERROR_KEYS: &[&str] = &["error", "errorMessage", "error_message"];
pub const SUBTYPE_KEYS: &[&str] = &["type", "subType", "subtype", "eventType"];
pub const CHANNEL_KEYS: &[&str] = &["channel", "stream"];
pub const DELTA_TAG_KEYS: &[&str] = &["deltaType", "delta_type", "type"];

/// Turn a raw payload into a JSON object.
///
/// Some emitters double-encode the payload as a JSON string; those are
/// parsed once more. Anything that is not (or does not contain) an object
/// yields `None`.
pub fn decode_payload(raw: &Value) -> Option<Map<String, Value>> {
    match raw {
        Value::Object(map) => Some(map.clone()),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        },
        _ => None,
    }
}

/// Ordered-precedence reader over a payload object.
#[derive(Clone, Copy)]
pub struct Fields<'a> {
    map: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    pub fn new(map: &'a Map<String, Value>) -> Self {
        Self { map }
    }

    /// First non-empty string among `keys`. Numeric ids are stringified.
    pub fn string(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| match self.map.get(*key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    /// First non-null value among `keys`.
    pub fn value(&self, keys: &[&str]) -> Option<&'a Value> {
        keys.iter()
            .find_map(|key| self.map.get(*key).filter(|v| !v.is_null()))
    }

    pub fn u64(&self, keys: &[&str]) -> Option<u64> {
        keys.iter().find_map(|key| match self.map.get(*key)? {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }

    pub fn bool(&self, keys: &[&str]) -> Option<bool> {
        keys.iter()
            .find_map(|key| self.map.get(*key).and_then(|v| v.as_bool()))
    }

    pub fn nested(&self, key: &str) -> Option<Fields<'a>> {
        self.map.get(key)?.as_object().map(Fields::new)
    }

    pub fn has(&self, keys: &[&str]) -> bool {
        self.value(keys).is_some()
    }
}

/// Tool invocation fields shared by action events and snapshot actions.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionPayload {
    pub tool_id: Option<String>,
    pub tool_type: String,
    pub params: Option<Value>,
    pub state: ToolState,
    pub result: Option<Value>,
    pub duration_ms: Option<u64>,
}

impl ActionPayload {
    /// Read an action. Requires at least a tool type or a tool id.
    pub fn from_fields(fields: &Fields<'_>) -> Option<Self> {
        let tool_id = fields.string(TOOL_ID_KEYS);
        let tool_type = fields
            .string(TOOL_TYPE_KEYS)
            .or_else(|| tool_id.as_ref().map(|_| "unknown".to_string()))?;

        Some(Self {
            tool_id,
            tool_type,
            params: fields.value(PARAMS_KEYS).map(decode_params),
            state: tool_state(fields),
            result: tool_result(fields),
            duration_ms: fields.u64(DURATION_KEYS),
        })
    }

    pub fn success(&self) -> bool {
        self.state != ToolState::Failed
    }
}

/// Tool result precedence: explicit `result`, then the nested
/// `functionResponse.response` wrapper, then generic `output`.
pub fn tool_result(fields: &Fields<'_>) -> Option<Value> {
    if let Some(result) = fields.value(&["result"]) {
        return Some(result.clone());
    }
    let wrapped = fields
        .nested("functionResponse")
        .or_else(|| fields.nested("function_response"))
        .and_then(|wrapper| wrapper.value(&["response"]).cloned());
    if wrapped.is_some() {
        return wrapped;
    }
    fields.value(&["output"]).cloned()
}

/// Success precedence: explicit `success` flag, then the `status` string,
/// then presence of an error field. Defaults to success.
fn tool_state(fields: &Fields<'_>) -> ToolState {
    if let Some(success) = fields.bool(&["success"]) {
        return if success {
            ToolState::Success
        } else {
            ToolState::Failed
        };
    }
    if let Some(status) = fields.string(&["status", "state"]) {
        match status.trim().to_ascii_lowercase().as_str() {
            "running" | "pending" | "in_progress" | "started" => return ToolState::Running,
            "success" | "succeeded" | "completed" | "complete" | "ok" | "done" => {
                return ToolState::Success
            }
            "failed" | "failure" | "error" | "errored" => return ToolState::Failed,
            _ => {}
        }
    }
    if fields.has(ERROR_KEYS) {
        return ToolState::Failed;
    }
    ToolState::Success
}

/// Params may arrive as a string holding JSON that is still being streamed.
/// Complete JSON is parsed; partial JSON is kept verbatim as a string.
fn decode_params(raw: &Value) -> Value {
    match raw {
        Value::String(text) => {
            let trimmed = text.trim_start();
            if trimmed.starts_with('{') || trimmed.starts_with('[') {
                serde_json::from_str(trimmed).unwrap_or_else(|_| raw.clone())
            } else {
                raw.clone()
            }
        }
        other => other.clone(),
    }
}
