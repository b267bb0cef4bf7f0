//! Maps named wire events onto the canonical [`ExecutionEvent`] union.
//!
//! Malformed or unrecognized events are dropped (logged at debug level),
//! never surfaced as errors.

pub mod wire;

use serde_json::Value;
use tracing::debug;

use crate::events::ExecutionEvent;
use crate::execution::{ExecutionStatus, StreamChannel, StreamId};
use crate::util::truncate_for_log;
use wire::{ActionPayload, Fields};

pub const EXECUTION_STARTED: &str = "execution-started";
pub const EXECUTION_STATUS: &str = "execution-status";
pub const ACTION_STARTED: &str = "action-started";
pub const ACTION_COMPLETED: &str = "action-completed";
pub const EXECUTION_COMPLETED: &str = "execution-completed";
pub const EXECUTION_EVENT: &str = "execution-event";
pub const RESPONSE_TEXT_DELTA: &str = "response-text-delta";
pub const REASONING_TEXT_DELTA: &str = "reasoning-text-delta";
pub const TEXT_DELTA: &str = "text-delta";

/// Normalize one named wire event. Returns `None` for anything unusable.
pub fn normalize(event_name: &str, payload: &Value) -> Option<ExecutionEvent> {
    let Some(map) = wire::decode_payload(payload) else {
        debug!(
            "Dropping {} event with non-object payload: {}",
            event_name,
            truncate_for_log(&payload.to_string(), 200)
        );
        return None;
    };
    let fields = Fields::new(&map);
    let Some(execution_id) = fields.string(wire::EXECUTION_ID_KEYS) else {
        debug!("Dropping {} event without execution id", event_name);
        return None;
    };

    let event = match event_name {
        EXECUTION_STARTED => Some(ExecutionEvent::Started { execution_id }),
        EXECUTION_STATUS => status_event(execution_id, &fields),
        ACTION_STARTED => tool_started(execution_id, &fields),
        ACTION_COMPLETED => tool_completed(execution_id, &fields),
        EXECUTION_COMPLETED => Some(completed(execution_id, &fields, ExecutionStatus::Success)),
        EXECUTION_EVENT => generic_event(execution_id, &fields),
        RESPONSE_TEXT_DELTA | REASONING_TEXT_DELTA | TEXT_DELTA => {
            text_delta(event_name, execution_id, &fields)
        }
        other => {
            debug!("Dropping unrecognized event {:?}", other);
            None
        }
    };

    if event.is_none() {
        debug!(
            "Dropping malformed {} event: {}",
            event_name,
            truncate_for_log(&payload.to_string(), 200)
        );
    }
    event
}

/// `execution-event` carries a sub-type tag selecting the logical event.
fn generic_event(execution_id: String, fields: &Fields<'_>) -> Option<ExecutionEvent> {
    let subtype = fields.string(wire::SUBTYPE_KEYS)?;
    match subtype.to_ascii_lowercase().as_str() {
        "log" | "log_line" | "log-line" | "stdout" | "stderr" => {
            let line = fields.string(wire::LOG_LINE_KEYS)?;
            Some(ExecutionEvent::LogLine { execution_id, line })
        }
        "status" | "status_changed" | "status-changed" => status_event(execution_id, fields),
        "started" => Some(ExecutionEvent::Started { execution_id }),
        "completed" | "finished" => {
            Some(completed(execution_id, fields, ExecutionStatus::Success))
        }
        _ => None,
    }
}

/// A status event that reports a terminal status is a completion.
fn status_event(execution_id: String, fields: &Fields<'_>) -> Option<ExecutionEvent> {
    let status = fields
        .string(wire::STATUS_KEYS)
        .and_then(|raw| ExecutionStatus::parse(&raw));
    if let Some(status) = status.filter(|s| s.is_terminal()) {
        return Some(completed(execution_id, fields, status));
    }
    let message = fields.string(wire::MESSAGE_KEYS);
    if status.is_none() && message.is_none() {
        return None;
    }
    Some(ExecutionEvent::StatusChanged {
        execution_id,
        status,
        message,
    })
}

fn completed(
    execution_id: String,
    fields: &Fields<'_>,
    default_status: ExecutionStatus,
) -> ExecutionEvent {
    let parsed = fields
        .string(wire::STATUS_KEYS)
        .and_then(|raw| ExecutionStatus::parse(&raw))
        .filter(|s| s.is_terminal());
    let final_status = match parsed {
        Some(status) => status,
        None if fields.bool(&["success"]) == Some(false) => ExecutionStatus::Failed,
        None if fields.string(wire::ERROR_KEYS).is_some() => ExecutionStatus::Failed,
        None => default_status,
    };
    ExecutionEvent::Completed {
        execution_id,
        final_status,
        error: fields.string(wire::ERROR_KEYS),
    }
}

fn tool_started(execution_id: String, fields: &Fields<'_>) -> Option<ExecutionEvent> {
    let action = ActionPayload::from_fields(fields)?;
    Some(ExecutionEvent::ToolStarted {
        execution_id,
        tool_id: action.tool_id,
        tool_type: action.tool_type,
        params: action.params,
    })
}

fn tool_completed(execution_id: String, fields: &Fields<'_>) -> Option<ExecutionEvent> {
    let action = ActionPayload::from_fields(fields)?;
    let success = action.success();
    Some(ExecutionEvent::ToolCompleted {
        execution_id,
        tool_id: action.tool_id,
        tool_type: action.tool_type,
        success,
        result: action.result,
        duration_ms: action.duration_ms,
        params: action.params,
    })
}

fn text_delta(
    event_name: &str,
    execution_id: String,
    fields: &Fields<'_>,
) -> Option<ExecutionEvent> {
    let delta = match fields.value(wire::DELTA_KEYS)? {
        Value::String(s) if !s.is_empty() => s.clone(),
        _ => return None,
    };
    let channel = resolve_channel(event_name, fields);
    Some(ExecutionEvent::TextDelta {
        stream_id: StreamId::new(channel, execution_id.clone()),
        execution_id,
        channel,
        delta,
    })
}

/// Decide which accumulator a delta feeds, using only explicit discriminants:
/// the payload's `channel` field, then the event name, then a delta type tag.
/// Defaults to the response channel.
pub fn resolve_channel(event_name: &str, fields: &Fields<'_>) -> StreamChannel {
    if let Some(channel) = fields
        .string(wire::CHANNEL_KEYS)
        .and_then(|raw| channel_from_tag(&raw))
    {
        return channel;
    }
    match event_name {
        REASONING_TEXT_DELTA => return StreamChannel::Reasoning,
        RESPONSE_TEXT_DELTA => return StreamChannel::Response,
        _ => {}
    }
    fields
        .string(wire::DELTA_TAG_KEYS)
        .and_then(|raw| channel_from_tag(&raw))
        .unwrap_or(StreamChannel::Response)
}

fn channel_from_tag(raw: &str) -> Option<StreamChannel> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "reasoning" | "reasoning_delta" | "reasoning-delta" | "thinking" | "thinking_delta" => {
            Some(StreamChannel::Reasoning)
        }
        "response" | "response_delta" | "text" | "text_delta" | "output" => {
            Some(StreamChannel::Response)
        }
        _ => None,
    }
}
