//! Turn assembler: converts the event stream into `Turn` snapshots.
//!
//! Identity rule: a turn is identified by its root agent (`turn-<agentId>`);
//! events carrying a non-null `parentAgentId` are ignored at turn level
//! (still persisted as raw events by `SessionStore`). Orphaned `tool:end`/
//! `tool:error` results (arriving before their `tool:start`) are buffered
//! per turn and flushed on the next matching `tool:start`; any still
//! buffered when `agent:end` arrives are discarded.

use std::collections::HashMap;

use tracing::warn;

use super::event::{Event, EventType};
use super::turn::{Step, ToolUseStatus, Turn, TurnStatus};

/// Maps a `status:change` event's raw status string to the fixed public
/// label it synthesizes as a thinking step, if any.
fn public_status_label(status: Option<&str>) -> Option<&'static str> {
    match status {
        Some("thinking") => Some("Thinking..."),
        Some("executing") => Some("Executing..."),
        _ => None,
    }
}

/// Apply one buffered terminal tool event to `turn`, returning whether a
/// matching pending step was found (and thus consumed).
fn apply_tool_terminal(turn: &mut Turn, event: &Event) -> bool {
    let tool_name = event.data.get("tool_name").and_then(|v| v.as_str());
    let Some(step) = turn.find_pending_tool_mut(event.tool_call_id.as_deref(), tool_name) else {
        return false;
    };
    if let Step::ToolUse { status, output, error, metadata, .. } = step {
        match event.event_type {
            EventType::ToolEnd => {
                *status = ToolUseStatus::Done;
                *output = event.data.get("output").and_then(|v| v.as_str()).map(String::from);
                *metadata = event.data.get("metadata").cloned().unwrap_or(serde_json::Value::Null);
            }
            EventType::ToolError => {
                *status = ToolUseStatus::Error;
                *error = event.data.get("error").and_then(|v| v.as_str()).map(String::from);
            }
            _ => unreachable!("apply_tool_terminal only called for tool:end/tool:error"),
        }
    }
    true
}

/// Stateful assembler: one instance per session (or one short-lived
/// instance per `rebuild_from_events` replay).
#[derive(Default)]
pub struct TurnAssembler {
    active: HashMap<String, Turn>,
    orphaned: HashMap<String, Vec<Event>>,
    completed: Vec<Turn>,
}

impl TurnAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_turns(&self) -> impl Iterator<Item = &Turn> {
        self.active.values()
    }

    /// Remove and return every turn completed since the last drain.
    pub fn drain_completed(&mut self) -> Vec<Turn> {
        std::mem::take(&mut self.completed)
    }

    /// Consume the assembler, returning every turn it knows about
    /// (completed and still-active), sorted by sequence.
    pub fn into_all_turns(self) -> Vec<Turn> {
        let mut turns = self.completed;
        turns.extend(self.active.into_values());
        turns.sort_by_key(|t| t.sequence);
        turns
    }

    /// Non-consuming equivalent of `into_all_turns`, for snapshotting a
    /// still-live assembler (e.g. to write `turns.json` after every event).
    pub fn snapshot(&self) -> Vec<Turn> {
        let mut turns: Vec<Turn> = self.completed.clone();
        turns.extend(self.active.values().cloned());
        turns.sort_by_key(|t| t.sequence);
        turns
    }

    /// Feed one event through the assembler. `next_sequence` is invoked at
    /// most once, only if a new turn must be created.
    pub fn apply<F: FnOnce() -> u64>(&mut self, event: &Event, next_sequence: F) {
        if event.parent_agent_id.is_some() {
            return;
        }
        let Some(agent_id) = event.agent_id.clone() else {
            return;
        };
        let turn_id = Turn::turn_id_for_agent(&agent_id);

        match event.event_type {
            EventType::AgentStart => {
                self.active
                    .entry(agent_id.clone())
                    .or_insert_with(|| Turn::new_assistant(&agent_id, next_sequence(), event.timestamp));
            }
            EventType::ThinkingStart | EventType::ThinkingChunk => {
                let turn = self
                    .active
                    .entry(agent_id.clone())
                    .or_insert_with(|| Turn::new_assistant(&agent_id, next_sequence(), event.timestamp));
                let text = event.data.get("text").and_then(|v| v.as_str()).unwrap_or_default();
                turn.append_thinking(text);
            }
            EventType::StatusChange => {
                let turn = self
                    .active
                    .entry(agent_id.clone())
                    .or_insert_with(|| Turn::new_assistant(&agent_id, next_sequence(), event.timestamp));
                if let Some(label) = public_status_label(event.data.get("status").and_then(|v| v.as_str())) {
                    turn.append_thinking(label);
                }
            }
            EventType::ToolStart => {
                let turn = self
                    .active
                    .entry(agent_id.clone())
                    .or_insert_with(|| Turn::new_assistant(&agent_id, next_sequence(), event.timestamp));
                let tool_name = event.data.get("tool_name").and_then(|v| v.as_str()).unwrap_or_default();
                let input = event.data.get("input").cloned().unwrap_or(serde_json::Value::Null);
                let call_id = event.tool_call_id.clone().unwrap_or_default();
                turn.push_tool_use(call_id, tool_name, input);

                if let Some(buffered) = self.orphaned.remove(&turn_id) {
                    let mut remaining = Vec::new();
                    for orphan in buffered {
                        if !apply_tool_terminal(turn, &orphan) {
                            remaining.push(orphan);
                        }
                    }
                    if !remaining.is_empty() {
                        self.orphaned.insert(turn_id.clone(), remaining);
                    }
                }
            }
            EventType::ToolEnd | EventType::ToolError => match self.active.get_mut(&agent_id) {
                Some(turn) if apply_tool_terminal(turn, event) => {}
                _ => {
                    self.orphaned.entry(turn_id).or_default().push(event.clone());
                }
            },
            EventType::LlmEnd => {
                let turn = self
                    .active
                    .entry(agent_id.clone())
                    .or_insert_with(|| Turn::new_assistant(&agent_id, next_sequence(), event.timestamp));
                let has_tool_calls = event.data.get("has_tool_calls").and_then(|v| v.as_bool()).unwrap_or(false);
                if let Some(content) = event.data.get("content").and_then(|v| v.as_str()) {
                    if has_tool_calls {
                        turn.append_thinking(content);
                    } else {
                        turn.push_text("assistant", content);
                    }
                }
            }
            EventType::AgentError => {
                if let Some(turn) = self.active.get_mut(&agent_id) {
                    let message = event.data.get("message").and_then(|v| v.as_str()).unwrap_or("agent error");
                    turn.push_error(message);
                    turn.fail(event.timestamp);
                }
            }
            EventType::AgentEnd => {
                if let Some(mut turn) = self.active.remove(&agent_id) {
                    if turn.status != TurnStatus::Failed {
                        turn.complete(event.timestamp);
                    }
                    if self.orphaned.remove(&turn_id).is_some() {
                        warn!(%turn_id, "TurnAssembler: discarding orphaned tool results still buffered at agent:end");
                    }
                    self.completed.push(turn);
                }
            }
            _ => {}
        }
    }
}

/// Replay a full event log (sorted by `session_seq`) through a fresh
/// assembler, recovering every turn it can from events alone. User turns
/// are not recoverable this way (they are never events); migration callers
/// must re-add them from whatever else persists the original request.
pub fn rebuild_from_events(events: &[Event]) -> Vec<Turn> {
    let mut sorted: Vec<&Event> = events.iter().collect();
    sorted.sort_by_key(|e| e.session_seq.unwrap_or(0));

    let mut assembler = TurnAssembler::new();
    let mut next_seq: u64 = 0;
    for event in sorted {
        assembler.apply(event, || {
            next_seq += 1;
            next_seq
        });
    }
    assembler.into_all_turns()
}
