//! Message reducer: folds canonical events and poll snapshots for one
//! execution into a single [`ConversationMessageState`].
//!
//! `reduce` is the only way to mutate the state. It is total over
//! [`ReducerInput`]; anything it cannot use is dropped (and logged at debug).
//! Side effects the caller must perform are returned as [`Effect`]s.
//!
//! ```text
//! Idle --Attach--> AwaitingFirstEvent --Started/content--> Streaming
//!                         |                                    |
//!                         +------ terminal event/snapshot -----+--> Finalizing
//!                                                                      |
//!                                                           LogsDrained v
//!                                                                   Terminal
//! ```

pub mod text;
pub mod tools;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::events::ExecutionEvent;
use crate::execution::{
    Execution, ExecutionSnapshot, ExecutionStatus, StreamChannel, GENERIC_FAILURE_MESSAGE,
};

pub use text::{StreamState, TextStream};
pub use tools::{ToolCompletion, ToolTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    AwaitingFirstEvent,
    Streaming,
    /// Terminal status observed; waiting for the log pacer to catch up.
    Finalizing,
    Terminal,
}

impl Phase {
    /// Finalizing or Terminal: execution content is frozen.
    pub fn is_settled(self) -> bool {
        matches!(self, Phase::Finalizing | Phase::Terminal)
    }
}

/// The update source a transport failure or recovery belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportSource {
    /// The agent's push subscription.
    Stream,
    /// Snapshot polling.
    Poll,
}

/// Everything the reducer can be fed.
#[derive(Debug, Clone)]
pub enum ReducerInput {
    Attach {
        execution_id: String,
        agent_id: Option<String>,
    },
    Event(ExecutionEvent),
    Snapshot(ExecutionSnapshot),
    CancelRequested,
    TransportFailed {
        source: TransportSource,
        message: String,
    },
    /// Only clears the error of the same source.
    TransportRecovered(TransportSource),
    /// The log pacer has printed every available line.
    LogsDrained,
}

/// Work the owner of the state must carry out after a step.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    StopPolling,
    Log(String),
    TerminalReached(ExecutionStatus),
    /// Terminal status reached and logs fully paced. Emitted once.
    Finished,
}

/// Reconciled state of one execution.
#[derive(Debug, Clone, Default)]
pub struct ConversationMessageState {
    phase: Phase,
    execution_id: Option<String>,
    agent_id: Option<String>,
    status: ExecutionStatus,
    created_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    error: Option<String>,
    response: TextStream,
    reasoning: TextStream,
    tools: ToolTracker,
    cancel_requested: bool,
    stream_error: Option<String>,
    poll_error: Option<String>,
    status_message: Option<String>,
}

impl ConversationMessageState {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn execution_id(&self) -> Option<&str> {
        self.execution_id.as_deref()
    }

    pub fn agent_id(&self) -> Option<&str> {
        self.agent_id.as_deref()
    }

    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    pub fn response(&self) -> &TextStream {
        &self.response
    }

    pub fn reasoning(&self) -> &TextStream {
        &self.reasoning
    }

    pub fn tools(&self) -> &ToolTracker {
        &self.tools
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested
    }

    /// The push failure if there is one, else the poll failure.
    pub fn transport_error(&self) -> Option<&str> {
        self.stream_error.as_deref().or(self.poll_error.as_deref())
    }

    pub fn stream_error(&self) -> Option<&str> {
        self.stream_error.as_deref()
    }

    pub fn poll_error(&self) -> Option<&str> {
        self.poll_error.as_deref()
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    /// Whether the "running" indicator should be shown. A user cancel clears
    /// it optimistically before the server confirms.
    pub fn is_running(&self) -> bool {
        matches!(self.phase, Phase::AwaitingFirstEvent | Phase::Streaming)
            && !self.status.is_terminal()
            && !self.cancel_requested
    }

    /// Read-only execution view. `None` until attached.
    pub fn execution(&self) -> Option<Execution> {
        let id = self.execution_id.clone()?;
        Some(Execution {
            id,
            agent_id: self.agent_id.clone(),
            status: self.status,
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            response_text: self.response.text().to_string(),
            reasoning_text: self.reasoning.text().to_string(),
            completed_tools: self.tools.completed().to_vec(),
            error: self.error.clone(),
        })
    }

    fn stream_mut(&mut self, channel: StreamChannel) -> &mut TextStream {
        match channel {
            StreamChannel::Response => &mut self.response,
            StreamChannel::Reasoning => &mut self.reasoning,
        }
    }

    fn error_slot(&mut self, source: TransportSource) -> &mut Option<String> {
        match source {
            TransportSource::Stream => &mut self.stream_error,
            TransportSource::Poll => &mut self.poll_error,
        }
    }

    fn mark_streaming(&mut self, now: DateTime<Utc>) {
        if self.phase == Phase::AwaitingFirstEvent {
            self.phase = Phase::Streaming;
        }
        self.status = self.status.advance(ExecutionStatus::Running);
        self.started_at.get_or_insert(now);
    }

    fn finalize(
        &mut self,
        final_status: ExecutionStatus,
        error: Option<String>,
        now: DateTime<Utc>,
        effects: &mut Vec<Effect>,
    ) {
        self.status = self.status.advance(final_status);
        self.finished_at.get_or_insert(now);
        if self.error.is_none() {
            self.error = error.filter(|e| !e.trim().is_empty());
        }
        if self.status == ExecutionStatus::Failed && self.error.is_none() {
            self.error = Some(GENERIC_FAILURE_MESSAGE.to_string());
        }
        self.response.close();
        self.reasoning.close();
        self.phase = Phase::Finalizing;

        info!(
            execution_id = %self.execution_id.as_deref().unwrap_or_default(),
            status = %self.status,
            "Execution reached terminal status"
        );
        effects.push(Effect::StopPolling);
        effects.push(Effect::Log(format!("Execution finished: {}", self.status)));
        if let Some(error) = &self.error {
            effects.push(Effect::Log(format!("Error: {}", error)));
        }
        effects.push(Effect::TerminalReached(self.status));
    }
}

/// Apply one input. `now` stamps locally observed transitions.
pub fn reduce(
    state: &mut ConversationMessageState,
    input: ReducerInput,
    now: DateTime<Utc>,
) -> Vec<Effect> {
    let mut effects = Vec::new();
    match input {
        ReducerInput::Attach {
            execution_id,
            agent_id,
        } => {
            if state.phase != Phase::Idle {
                debug!(
                    "Ignoring attach to {}: already attached to {:?}",
                    execution_id, state.execution_id
                );
                return effects;
            }
            effects.push(Effect::Log(format!("Connecting to execution {}", execution_id)));
            state.execution_id = Some(execution_id);
            state.agent_id = agent_id;
            state.phase = Phase::AwaitingFirstEvent;
        }
        ReducerInput::Event(event) => apply_event(state, event, now, &mut effects),
        ReducerInput::Snapshot(snapshot) => apply_snapshot(state, snapshot, now, &mut effects),
        ReducerInput::CancelRequested => {
            if state.phase == Phase::Idle || state.phase.is_settled() || state.cancel_requested {
                return effects;
            }
            state.cancel_requested = true;
            effects.push(Effect::StopPolling);
            effects.push(Effect::Log("Cancellation requested".to_string()));
        }
        ReducerInput::TransportFailed { source, message } => {
            if state.phase == Phase::Idle || state.phase.is_settled() {
                return effects;
            }
            let slot = state.error_slot(source);
            if slot.as_deref() != Some(message.as_str()) {
                effects.push(Effect::Log(format!("Connection error: {}", message)));
                *slot = Some(message);
            }
        }
        ReducerInput::TransportRecovered(source) => {
            *state.error_slot(source) = None;
        }
        ReducerInput::LogsDrained => {
            if state.phase == Phase::Finalizing {
                state.phase = Phase::Terminal;
                effects.push(Effect::Finished);
            }
        }
    }
    effects
}

fn apply_event(
    state: &mut ConversationMessageState,
    event: ExecutionEvent,
    now: DateTime<Utc>,
    effects: &mut Vec<Effect>,
) {
    if state.execution_id.as_deref() != Some(event.execution_id()) {
        debug!(
            "Ignoring {} event for execution {}",
            event.kind(),
            event.execution_id()
        );
        return;
    }
    if state.phase.is_settled() {
        debug!("Dropping late {} event after terminal status", event.kind());
        return;
    }

    match event {
        ExecutionEvent::Started { .. } => {
            let first = state.phase == Phase::AwaitingFirstEvent;
            state.mark_streaming(now);
            if first {
                effects.push(Effect::Log("Execution started".to_string()));
            }
        }
        ExecutionEvent::StatusChanged {
            status, message, ..
        } => {
            if let Some(status) = status {
                state.status = state.status.advance(status);
            }
            if state.status == ExecutionStatus::Running {
                state.mark_streaming(now);
            }
            if let Some(message) = message.filter(|m| !m.trim().is_empty()) {
                effects.push(Effect::Log(message.clone()));
                state.status_message = Some(message);
            }
        }
        ExecutionEvent::ToolStarted {
            tool_id,
            tool_type,
            params,
            ..
        } => {
            state.mark_streaming(now);
            if state.tools.start(tool_id.as_deref(), &tool_type, params) {
                effects.push(Effect::Log(format!("[tool] {} started", tool_type)));
            }
        }
        ExecutionEvent::ToolCompleted {
            tool_id,
            tool_type,
            success,
            result,
            duration_ms,
            params,
            ..
        } => {
            state.mark_streaming(now);
            let completion = ToolCompletion {
                tool_id,
                tool_type,
                success,
                result,
                duration_ms,
                params,
            };
            if let Some(record) = state.tools.complete(completion) {
                effects.push(Effect::Log(record.log_line()));
            }
        }
        ExecutionEvent::TextDelta { channel, delta, .. } => {
            state.mark_streaming(now);
            if !state.stream_mut(channel).append(&delta) {
                debug!("Ignoring {} delta on closed stream", channel);
            }
        }
        ExecutionEvent::LogLine { line, .. } => {
            state.mark_streaming(now);
            effects.push(Effect::Log(line));
        }
        ExecutionEvent::Completed {
            final_status,
            error,
            ..
        } => state.finalize(final_status, error, now, effects),
    }
}

fn apply_snapshot(
    state: &mut ConversationMessageState,
    snapshot: ExecutionSnapshot,
    now: DateTime<Utc>,
    effects: &mut Vec<Effect>,
) {
    let Some(current) = state.execution_id.as_deref() else {
        return;
    };
    if let Some(subject) = snapshot.subject_id() {
        if subject != current {
            debug!("Ignoring snapshot for execution {}", subject);
            return;
        }
    }
    if state.phase.is_settled() {
        debug!("Dropping snapshot after terminal status");
        return;
    }

    state.poll_error = None;
    if state.agent_id.is_none() {
        state.agent_id = snapshot.agent_id.clone();
    }
    if state.created_at.is_none() {
        state.created_at = snapshot.created_at();
    }
    if state.started_at.is_none() {
        state.started_at = snapshot.started_at();
    }
    if state.finished_at.is_none() {
        state.finished_at = snapshot.finished_at();
    }

    if let Some(full) = snapshot.final_response() {
        if state.response.offer_full(&full) {
            debug!("Response replaced from snapshot ({} bytes)", full.len());
        }
    }
    if let Some(full) = snapshot.final_reasoning() {
        state.reasoning.offer_full(&full);
    }
    for record in state.tools.absorb_snapshot(snapshot.tool_records()) {
        effects.push(Effect::Log(record.log_line()));
    }

    match snapshot.status() {
        Some(status) if status.is_terminal() => {
            state.finalize(status, snapshot.error_text(), now, effects);
        }
        Some(status) => {
            state.status = state.status.advance(status);
            if state.status == ExecutionStatus::Running {
                state.mark_streaming(now);
            }
        }
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{StreamId, ToolKey, ToolState};
    use serde_json::json;

    const EXEC: &str = "exec-1";

    fn attached() -> ConversationMessageState {
        let mut state = ConversationMessageState::default();
        reduce(
            &mut state,
            ReducerInput::Attach {
                execution_id: EXEC.to_string(),
                agent_id: Some("agent-1".to_string()),
            },
            Utc::now(),
        );
        state
    }

    fn apply(state: &mut ConversationMessageState, event: ExecutionEvent) -> Vec<Effect> {
        reduce(state, ReducerInput::Event(event), Utc::now())
    }

    fn snapshot(state: &mut ConversationMessageState, value: serde_json::Value) -> Vec<Effect> {
        let snapshot: ExecutionSnapshot = serde_json::from_value(value).unwrap();
        reduce(state, ReducerInput::Snapshot(snapshot), Utc::now())
    }

    fn started() -> ExecutionEvent {
        ExecutionEvent::Started {
            execution_id: EXEC.to_string(),
        }
    }

    fn delta(channel: StreamChannel, text: &str) -> ExecutionEvent {
        ExecutionEvent::TextDelta {
            execution_id: EXEC.to_string(),
            stream_id: StreamId::new(channel, EXEC),
            channel,
            delta: text.to_string(),
        }
    }

    fn tool_started(id: &str, tool_type: &str) -> ExecutionEvent {
        ExecutionEvent::ToolStarted {
            execution_id: EXEC.to_string(),
            tool_id: Some(id.to_string()),
            tool_type: tool_type.to_string(),
            params: Some(json!({"q": "rust"})),
        }
    }

    fn tool_completed(id: &str, tool_type: &str, success: bool) -> ExecutionEvent {
        ExecutionEvent::ToolCompleted {
            execution_id: EXEC.to_string(),
            tool_id: Some(id.to_string()),
            tool_type: tool_type.to_string(),
            success,
            result: Some(json!({"hits": 3})),
            duration_ms: Some(120),
            params: None,
        }
    }

    fn completed(status: ExecutionStatus, error: Option<&str>) -> ExecutionEvent {
        ExecutionEvent::Completed {
            execution_id: EXEC.to_string(),
            final_status: status,
            error: error.map(|e| e.to_string()),
        }
    }

    #[test]
    fn attach_moves_to_awaiting_first_event() {
        let state = attached();
        assert_eq!(state.phase(), Phase::AwaitingFirstEvent);
        assert!(state.is_running());
        assert_eq!(state.execution().unwrap().status, ExecutionStatus::Pending);
    }

    #[test]
    fn full_event_sequence_produces_final_state() {
        let mut state = attached();
        for event in [
            started(),
            tool_started("t1", "search"),
            delta(StreamChannel::Response, "Hel"),
            delta(StreamChannel::Response, "lo"),
            tool_completed("t1", "search", true),
        ] {
            apply(&mut state, event);
        }
        assert_eq!(state.phase(), Phase::Streaming);
        assert!(state.response().is_streaming());

        let effects = apply(&mut state, completed(ExecutionStatus::Success, None));
        assert!(effects.contains(&Effect::StopPolling));
        assert!(effects.contains(&Effect::TerminalReached(ExecutionStatus::Success)));

        let execution = state.execution().unwrap();
        assert_eq!(execution.response_text, "Hello");
        assert_eq!(execution.status, ExecutionStatus::Success);
        assert_eq!(execution.completed_tools.len(), 1);
        assert_eq!(
            execution.completed_tools[0].key,
            ToolKey::Id { id: "t1".to_string() }
        );
        assert!(state.tools().active().is_empty());
        assert!(!state.response().is_streaming());
        assert!(execution.finished_at.is_some());
    }

    #[test]
    fn snapshot_replaces_shorter_accumulator_once() {
        let mut state = attached();
        apply(&mut state, started());
        apply(&mut state, delta(StreamChannel::Response, "Full"));

        snapshot(&mut state, json!({"status": "running", "aiResponse": "Full answer"}));
        assert_eq!(state.response().text(), "Full answer");
        assert_eq!(state.response().state(), StreamState::Closed);

        apply(&mut state, delta(StreamChannel::Response, " answer"));
        snapshot(&mut state, json!({"status": "running", "aiResponse": "Full answer"}));
        assert_eq!(state.response().text(), "Full answer");
    }

    #[test]
    fn snapshot_never_truncates_live_content() {
        let mut state = attached();
        apply(&mut state, delta(StreamChannel::Response, "streamed so far"));
        apply(&mut state, delta(StreamChannel::Reasoning, "thinking hard"));

        snapshot(
            &mut state,
            json!({"status": "running", "aiResponse": "", "outputPayload": {"reasoning": "thin"}}),
        );
        snapshot(&mut state, json!({"status": "pending", "aiResponse": "stream"}));

        assert_eq!(state.response().text(), "streamed so far");
        assert_eq!(state.reasoning().text(), "thinking hard");
        assert_eq!(state.status(), ExecutionStatus::Running);
    }

    #[test]
    fn response_length_is_monotone_across_mixed_inputs() {
        let mut state = attached();
        let mut last = 0;
        let inputs: Vec<ReducerInput> = vec![
            ReducerInput::Event(delta(StreamChannel::Response, "ab")),
            ReducerInput::Snapshot(serde_json::from_value(json!({"aiResponse": "a"})).unwrap()),
            ReducerInput::Event(delta(StreamChannel::Response, "cd")),
            ReducerInput::Snapshot(
                serde_json::from_value(json!({"aiResponse": "abcdef"})).unwrap(),
            ),
            ReducerInput::Event(delta(StreamChannel::Response, "zz")),
            ReducerInput::Snapshot(serde_json::from_value(json!({"aiResponse": ""})).unwrap()),
            ReducerInput::Event(completed(ExecutionStatus::Success, None)),
            ReducerInput::Snapshot(
                serde_json::from_value(json!({"status": "failed", "aiResponse": "a much longer text"}))
                    .unwrap(),
            ),
        ];
        for input in inputs {
            reduce(&mut state, input, Utc::now());
            let len = state.response().text().len();
            assert!(len >= last);
            last = len;
        }
        assert_eq!(state.response().text(), "abcdef");
        assert_eq!(state.status(), ExecutionStatus::Success);
    }

    #[test]
    fn terminal_state_is_immutable() {
        let mut state = attached();
        apply(&mut state, delta(StreamChannel::Response, "done"));
        apply(&mut state, completed(ExecutionStatus::Cancelled, None));
        let frozen = state.execution().unwrap();

        apply(&mut state, delta(StreamChannel::Response, " more"));
        apply(&mut state, tool_completed("t9", "search", true));
        apply(&mut state, completed(ExecutionStatus::Success, None));
        snapshot(&mut state, json!({"status": "success", "aiResponse": "something else entirely"}));

        assert_eq!(state.execution().unwrap(), frozen);
    }

    #[test]
    fn events_for_other_executions_are_ignored() {
        let mut state = attached();
        let effects = apply(
            &mut state,
            ExecutionEvent::Completed {
                execution_id: "exec-2".to_string(),
                final_status: ExecutionStatus::Failed,
                error: None,
            },
        );
        assert!(effects.is_empty());
        snapshot(&mut state, json!({"id": "exec-2", "status": "success", "aiResponse": "x"}));
        assert_eq!(state.status(), ExecutionStatus::Pending);
        assert_eq!(state.response().text(), "");
    }

    #[test]
    fn failure_without_error_text_gets_placeholder() {
        let mut state = attached();
        let effects = apply(&mut state, completed(ExecutionStatus::Failed, Some("   ")));
        assert_eq!(state.error(), Some(GENERIC_FAILURE_MESSAGE));
        assert!(effects.contains(&Effect::Log(format!("Error: {}", GENERIC_FAILURE_MESSAGE))));
    }

    #[test]
    fn terminal_snapshot_merges_content_then_finalizes() {
        let mut state = attached();
        let effects = snapshot(
            &mut state,
            json!({
                "status": "failed",
                "error": {"message": "rate limited"},
                "actionsExecuted": [{"actionId": "a1", "actionType": "fetch", "success": false}]
            }),
        );
        assert_eq!(state.phase(), Phase::Finalizing);
        assert_eq!(state.error(), Some("rate limited"));
        assert_eq!(state.tools().completed()[0].state, ToolState::Failed);
        assert!(effects.contains(&Effect::TerminalReached(ExecutionStatus::Failed)));
    }

    #[test]
    fn terminal_without_content_still_finalizes() {
        let mut state = attached();
        reduce(&mut state, ReducerInput::LogsDrained, Utc::now());
        assert_eq!(state.phase(), Phase::AwaitingFirstEvent);

        let effects = apply(&mut state, completed(ExecutionStatus::Success, None));
        assert!(!effects.contains(&Effect::Finished));
        assert_eq!(state.phase(), Phase::Finalizing);
        let effects = reduce(&mut state, ReducerInput::LogsDrained, Utc::now());
        assert_eq!(effects, vec![Effect::Finished]);
        assert_eq!(state.phase(), Phase::Terminal);
        assert!(reduce(&mut state, ReducerInput::LogsDrained, Utc::now()).is_empty());
    }

    #[test]
    fn stuck_tool_stays_active_after_terminal() {
        let mut state = attached();
        apply(&mut state, tool_started("t1", "long_job"));
        apply(&mut state, completed(ExecutionStatus::Success, None));
        assert_eq!(state.tools().active().len(), 1);
        assert_eq!(state.tools().active()[0].state, ToolState::Running);
    }

    #[test]
    fn duplicate_tool_events_are_idempotent() {
        let mut once = attached();
        apply(&mut once, tool_started("t1", "github_issue"));
        apply(&mut once, tool_completed("t1", "github_issue", true));

        let mut twice = attached();
        apply(&mut twice, tool_started("t1", "github_issue"));
        apply(&mut twice, tool_started("t1", "github_issue"));
        assert_eq!(twice.tools().active().len(), 1);
        apply(&mut twice, tool_completed("t1", "github_issue", true));
        apply(&mut twice, tool_completed("t1", "github_issue", false));

        assert_eq!(once.tools().completed(), twice.tools().completed());
        assert!(twice.tools().active().is_empty());
    }

    #[test]
    fn cancel_clears_running_indicator_and_stops_polling() {
        let mut state = attached();
        apply(&mut state, started());
        let effects = reduce(&mut state, ReducerInput::CancelRequested, Utc::now());
        assert!(effects.contains(&Effect::StopPolling));
        assert!(!state.is_running());
        assert!(reduce(&mut state, ReducerInput::CancelRequested, Utc::now()).is_empty());

        apply(&mut state, completed(ExecutionStatus::Cancelled, None));
        assert_eq!(state.status(), ExecutionStatus::Cancelled);
    }

    fn failed(source: TransportSource, message: &str) -> ReducerInput {
        ReducerInput::TransportFailed {
            source,
            message: message.to_string(),
        }
    }

    #[test]
    fn transport_error_is_reported_once_and_keeps_content() {
        let mut state = attached();
        apply(&mut state, delta(StreamChannel::Response, "kept"));
        let first = reduce(&mut state, failed(TransportSource::Poll, "timeout"), Utc::now());
        let second = reduce(&mut state, failed(TransportSource::Poll, "timeout"), Utc::now());
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(state.transport_error(), Some("timeout"));
        assert_eq!(state.response().text(), "kept");

        snapshot(&mut state, json!({"status": "running"}));
        assert_eq!(state.transport_error(), None);
    }

    #[test]
    fn stream_error_survives_successful_polls() {
        let mut state = attached();
        reduce(&mut state, failed(TransportSource::Stream, "socket closed"), Utc::now());
        reduce(&mut state, failed(TransportSource::Poll, "timeout"), Utc::now());
        assert_eq!(state.transport_error(), Some("socket closed"));

        snapshot(&mut state, json!({"status": "running"}));
        assert_eq!(state.poll_error(), None);
        assert_eq!(state.stream_error(), Some("socket closed"));
        assert_eq!(state.transport_error(), Some("socket closed"));

        reduce(
            &mut state,
            ReducerInput::TransportRecovered(TransportSource::Poll),
            Utc::now(),
        );
        assert_eq!(state.stream_error(), Some("socket closed"));

        reduce(
            &mut state,
            ReducerInput::TransportRecovered(TransportSource::Stream),
            Utc::now(),
        );
        assert_eq!(state.transport_error(), None);
    }

    #[test]
    fn status_message_is_logged_and_status_never_regresses() {
        let mut state = attached();
        apply(&mut state, started());
        let effects = apply(
            &mut state,
            ExecutionEvent::StatusChanged {
                execution_id: EXEC.to_string(),
                status: Some(ExecutionStatus::Pending),
                message: Some("Cloning repository".to_string()),
            },
        );
        assert_eq!(effects, vec![Effect::Log("Cloning repository".to_string())]);
        assert_eq!(state.status(), ExecutionStatus::Running);
        assert_eq!(state.status_message(), Some("Cloning repository"));
    }
}
