//! Tool-call lifecycle tracking.
//!
//! Tolerates three orderings: completed-before-started (the record is
//! synthesized), started-without-completion (stays active forever), and
//! duplicate started/completed deliveries (idempotent).

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::execution::{ToolCallRecord, ToolKey, ToolState};

/// Outcome reported for one tool invocation.
#[derive(Debug, Clone)]
pub struct ToolCompletion {
    pub tool_id: Option<String>,
    pub tool_type: String,
    pub success: bool,
    pub result: Option<Value>,
    pub duration_ms: Option<u64>,
    pub params: Option<Value>,
}

/// Active and completed tool invocations of one execution.
///
/// Idempotence holds for events that carry a tool id. Id-less events are
/// keyed by `(tool_type, ordinal)`, so a resent id-less start or completion
/// cannot be told apart from a new call of the same type: it takes the next
/// ordinal and is tracked as a separate invocation.
#[derive(Debug, Clone, Default)]
pub struct ToolTracker {
    /// Running invocations, in order of first sighting.
    active: Vec<ToolCallRecord>,
    /// Settled invocations, in order of settlement. Never mutated.
    completed: Vec<ToolCallRecord>,
    settled: HashSet<ToolKey>,
    started_ordinals: HashMap<String, usize>,
    completed_ordinals: HashMap<String, usize>,
}

impl ToolTracker {
    pub fn active(&self) -> &[ToolCallRecord] {
        &self.active
    }

    pub fn completed(&self) -> &[ToolCallRecord] {
        &self.completed
    }

    /// Register a started invocation. Returns false for duplicates and for
    /// keys that already settled.
    pub fn start(&mut self, tool_id: Option<&str>, tool_type: &str, params: Option<Value>) -> bool {
        let key = match tool_id {
            Some(id) => ToolKey::Id { id: id.to_string() },
            None => next_ordinal(&mut self.started_ordinals, tool_type),
        };
        if self.settled.contains(&key) || self.active.iter().any(|r| r.key == key) {
            debug!("Ignoring duplicate start for tool {}", key);
            return false;
        }
        self.active.push(ToolCallRecord {
            key,
            tool_type: tool_type.to_string(),
            params,
            state: ToolState::Running,
            result: None,
            duration_ms: None,
        });
        true
    }

    /// Settle an invocation, synthesizing the record if its start was never
    /// seen. Returns the new completed record, or `None` if the key had
    /// already settled.
    pub fn complete(&mut self, completion: ToolCompletion) -> Option<ToolCallRecord> {
        let key = match completion.tool_id.as_deref() {
            Some(id) => ToolKey::Id { id: id.to_string() },
            None => next_ordinal(&mut self.completed_ordinals, &completion.tool_type),
        };
        let state = if completion.success {
            ToolState::Success
        } else {
            ToolState::Failed
        };
        self.settle(ToolCallRecord {
            key,
            tool_type: completion.tool_type,
            params: completion.params,
            state,
            result: completion.result,
            duration_ms: completion.duration_ms,
        })
    }

    /// Merge tool records from a snapshot. Only adds information: settled
    /// keys are skipped, running records are registered if unseen.
    /// Returns the records that settled because of this snapshot.
    pub fn absorb_snapshot(&mut self, records: Vec<ToolCallRecord>) -> Vec<ToolCallRecord> {
        let mut newly_settled = Vec::new();
        for record in records {
            if self.settled.contains(&record.key) {
                continue;
            }
            if record.state == ToolState::Running {
                if !self.active.iter().any(|r| r.key == record.key) {
                    self.active.push(record);
                }
                continue;
            }
            if let Some(settled) = self.settle(record) {
                newly_settled.push(settled);
            }
        }
        newly_settled
    }

    /// The settled record is built from the completion alone, so delivery
    /// order of start and completion cannot change its content.
    fn settle(&mut self, record: ToolCallRecord) -> Option<ToolCallRecord> {
        if self.settled.contains(&record.key) {
            debug!("Ignoring duplicate completion for tool {}", record.key);
            return None;
        }
        self.active.retain(|r| r.key != record.key);
        self.settled.insert(record.key.clone());
        self.completed.push(record.clone());
        Some(record)
    }
}

fn next_ordinal(counters: &mut HashMap<String, usize>, tool_type: &str) -> ToolKey {
    let slot = counters.entry(tool_type.to_string()).or_insert(0);
    let ordinal = *slot;
    *slot += 1;
    ToolKey::Ordinal {
        tool_type: tool_type.to_string(),
        ordinal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn completion(id: Option<&str>, tool_type: &str, success: bool) -> ToolCompletion {
        ToolCompletion {
            tool_id: id.map(|s| s.to_string()),
            tool_type: tool_type.to_string(),
            success,
            result: Some(json!("ok")),
            duration_ms: Some(10),
            params: None,
        }
    }

    #[test]
    fn duplicate_start_keeps_one_active_entry() {
        let mut tracker = ToolTracker::default();
        assert!(tracker.start(Some("t1"), "github_issue", None));
        assert!(!tracker.start(Some("t1"), "github_issue", None));
        assert_eq!(tracker.active().len(), 1);
    }

    #[test]
    fn completion_moves_record_out_of_active() {
        let mut tracker = ToolTracker::default();
        tracker.start(Some("t1"), "search", Some(json!({"q": "rust"})));
        assert_eq!(tracker.active()[0].params, Some(json!({"q": "rust"})));
        let record = tracker.complete(completion(Some("t1"), "search", true)).unwrap();
        assert_eq!(record.state, ToolState::Success);
        assert!(tracker.active().is_empty());
        assert_eq!(tracker.completed().len(), 1);
    }

    #[test]
    fn completion_without_start_is_synthesized() {
        let mut tracker = ToolTracker::default();
        let record = tracker.complete(completion(Some("t9"), "search", false)).unwrap();
        assert_eq!(record.state, ToolState::Failed);
        assert_eq!(tracker.completed().len(), 1);
    }

    #[test]
    fn late_start_after_completion_is_ignored() {
        let mut tracker = ToolTracker::default();
        tracker.complete(completion(Some("t1"), "search", true));
        assert!(!tracker.start(Some("t1"), "search", None));
        assert!(tracker.active().is_empty());
    }

    #[test]
    fn completion_order_does_not_change_record() {
        let mut forward = ToolTracker::default();
        forward.start(Some("t1"), "search", Some(json!({"q": "a"})));
        let a = forward.complete(completion(Some("t1"), "search", true)).unwrap();

        let mut reversed = ToolTracker::default();
        let b = reversed.complete(completion(Some("t1"), "search", true)).unwrap();
        reversed.start(Some("t1"), "search", Some(json!({"q": "a"})));

        assert_eq!(a, b);
        assert_eq!(forward.completed(), reversed.completed());
        assert!(reversed.active().is_empty());
    }

    #[test]
    fn second_completion_is_ignored() {
        let mut tracker = ToolTracker::default();
        tracker.start(Some("t1"), "search", None);
        assert!(tracker.complete(completion(Some("t1"), "search", true)).is_some());
        assert!(tracker.complete(completion(Some("t1"), "search", false)).is_none());
        assert_eq!(tracker.completed()[0].state, ToolState::Success);
    }

    #[test]
    fn idless_events_match_by_type_and_order() {
        let mut tracker = ToolTracker::default();
        tracker.start(None, "search", Some(json!(1)));
        tracker.start(None, "search", Some(json!(2)));
        tracker.start(None, "fetch", None);
        tracker.complete(completion(None, "search", true)).unwrap();
        assert_eq!(tracker.active().len(), 2);
        assert_eq!(tracker.active()[0].params, Some(json!(2)));
        let second = tracker.complete(completion(None, "search", true)).unwrap();
        assert_eq!(
            second.key,
            ToolKey::Ordinal { tool_type: "search".to_string(), ordinal: 1 }
        );
        assert_eq!(tracker.active()[0].tool_type, "fetch");
    }

    #[test]
    fn resent_idless_events_count_as_new_calls() {
        let mut tracker = ToolTracker::default();
        assert!(tracker.start(None, "search", None));
        assert!(tracker.start(None, "search", None));
        assert_eq!(tracker.active().len(), 2);

        tracker.complete(completion(None, "search", true)).unwrap();
        tracker.complete(completion(None, "search", true)).unwrap();
        let third = tracker.complete(completion(None, "search", true)).unwrap();
        assert_eq!(
            third.key,
            ToolKey::Ordinal { tool_type: "search".to_string(), ordinal: 2 }
        );
        assert!(tracker.active().is_empty());
        assert_eq!(tracker.completed().len(), 3);

        // The same resend with an id is absorbed.
        assert!(tracker.start(Some("t1"), "search", None));
        assert!(!tracker.start(Some("t1"), "search", None));
        assert!(tracker.complete(completion(Some("t1"), "search", true)).is_some());
        assert!(tracker.complete(completion(Some("t1"), "search", true)).is_none());
        assert_eq!(tracker.completed().len(), 4);
    }

    #[test]
    fn snapshot_settles_active_and_skips_known() {
        let mut tracker = ToolTracker::default();
        tracker.start(Some("t1"), "search", None);
        tracker.complete(completion(Some("t0"), "fetch", true));

        let snapshot = vec![
            ToolCallRecord {
                key: ToolKey::Id { id: "t0".to_string() },
                tool_type: "fetch".to_string(),
                params: None,
                state: ToolState::Failed,
                result: None,
                duration_ms: None,
            },
            ToolCallRecord {
                key: ToolKey::Id { id: "t1".to_string() },
                tool_type: "search".to_string(),
                params: None,
                state: ToolState::Success,
                result: Some(json!("hits")),
                duration_ms: Some(5),
            },
            ToolCallRecord {
                key: ToolKey::Id { id: "t2".to_string() },
                tool_type: "search".to_string(),
                params: None,
                state: ToolState::Running,
                result: None,
                duration_ms: None,
            },
        ];
        let settled = tracker.absorb_snapshot(snapshot);
        assert_eq!(settled.len(), 1);
        assert_eq!(settled[0].key, ToolKey::Id { id: "t1".to_string() });
        assert_eq!(tracker.completed()[0].state, ToolState::Success);
        assert_eq!(tracker.active().len(), 1);
        assert_eq!(tracker.active()[0].key, ToolKey::Id { id: "t2".to_string() });
    }
}
