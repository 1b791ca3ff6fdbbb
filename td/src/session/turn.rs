//! Turn: the conversational projection assembled from the event stream.
//! A user turn wraps a request; an assistant turn wraps one run.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnType {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    Streaming,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolUseStatus {
    Pending,
    Done,
    Error,
}

/// One step within an assistant turn. User turns carry exactly one `Text`
/// step and are never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Step {
    Thinking {
        text: String,
    },
    ToolUse {
        tool_call_id: String,
        tool_name: String,
        input: Value,
        status: ToolUseStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default, skip_serializing_if = "Value::is_null")]
        metadata: Value,
    },
    Text {
        role: String,
        text: String,
    },
    Error {
        message: String,
    },
}

impl Step {
    /// Whether this step is a `tool_use` step still awaiting its terminal
    /// event, optionally narrowed to a specific call id or tool name — the
    /// locator rule `tool:end`/`tool:error` use to find their match.
    fn matches_pending_tool(&self, tool_call_id: Option<&str>, tool_name: Option<&str>) -> bool {
        match self {
            Step::ToolUse { tool_call_id: id, tool_name: name, status, .. } => {
                *status == ToolUseStatus::Pending
                    && match tool_call_id {
                        Some(wanted) => id == wanted,
                        None => tool_name == Some(name.as_str()),
                    }
            }
            _ => false,
        }
    }
}

/// A conversational unit projected from events. Identified by the root
/// agent: `turn-<agentId>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: String,
    #[serde(rename = "type")]
    pub turn_type: TurnType,
    pub sequence: u64,
    pub started_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    pub status: TurnStatus,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub metadata: Value,
}

impl Turn {
    pub fn turn_id_for_agent(agent_id: &str) -> String {
        format!("turn-{agent_id}")
    }

    pub fn new_user(agent_id: &str, sequence: u64, started_at: i64, text: impl Into<String>) -> Self {
        Self {
            id: Self::turn_id_for_agent(agent_id),
            turn_type: TurnType::User,
            sequence,
            started_at,
            completed_at: Some(started_at),
            status: TurnStatus::Completed,
            steps: vec![Step::Text { role: "user".to_string(), text: text.into() }],
            metadata: Value::Null,
        }
    }

    pub fn new_assistant(agent_id: &str, sequence: u64, started_at: i64) -> Self {
        Self {
            id: Self::turn_id_for_agent(agent_id),
            turn_type: TurnType::Assistant,
            sequence,
            started_at,
            completed_at: None,
            status: TurnStatus::Streaming,
            steps: Vec::new(),
            metadata: Value::Null,
        }
    }

    /// Append to the last step if it is `Thinking`, else push a new one
    /// (`thinking:start|chunk` rule).
    pub fn append_thinking(&mut self, text: &str) {
        if let Some(Step::Thinking { text: existing }) = self.steps.last_mut() {
            existing.push_str(text);
        } else {
            self.steps.push(Step::Thinking { text: text.to_string() });
        }
    }

    pub fn push_tool_use(&mut self, tool_call_id: impl Into<String>, tool_name: impl Into<String>, input: Value) {
        self.steps.push(Step::ToolUse {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            input,
            status: ToolUseStatus::Pending,
            output: None,
            error: None,
            metadata: Value::Null,
        });
    }

    /// Locate a pending `tool_use` step by call id (preferred) or by tool
    /// name if no call id matches.
    pub fn find_pending_tool_mut(&mut self, tool_call_id: Option<&str>, tool_name: Option<&str>) -> Option<&mut Step> {
        self.steps.iter_mut().rev().find(|s| s.matches_pending_tool(tool_call_id, tool_name))
    }

    pub fn push_text(&mut self, role: impl Into<String>, text: impl Into<String>) {
        self.steps.push(Step::Text { role: role.into(), text: text.into() });
    }

    pub fn push_error(&mut self, message: impl Into<String>) {
        self.steps.push(Step::Error { message: message.into() });
    }

    pub fn complete(&mut self, completed_at: i64) {
        self.status = TurnStatus::Completed;
        self.completed_at = Some(completed_at);
    }

    pub fn fail(&mut self, completed_at: i64) {
        self.status = TurnStatus::Failed;
        self.completed_at = Some(completed_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_turns_are_immediately_complete_with_one_text_step() {
        let turn = Turn::new_user("agent-1", 1, 0, "do the thing");
        assert_eq!(turn.status, TurnStatus::Completed);
        assert_eq!(turn.steps.len(), 1);
        assert!(matches!(&turn.steps[0], Step::Text { role, .. } if role == "user"));
    }

    #[test]
    fn appending_thinking_merges_into_the_last_thinking_step() {
        let mut turn = Turn::new_assistant("agent-1", 2, 0);
        turn.append_thinking("Let me ");
        turn.append_thinking("check the file.");
        assert_eq!(turn.steps.len(), 1);
        assert!(matches!(&turn.steps[0], Step::Thinking { text } if text == "Let me check the file."));
    }

    #[test]
    fn appending_thinking_after_a_different_step_creates_a_new_one() {
        let mut turn = Turn::new_assistant("agent-1", 2, 0);
        turn.push_text("assistant", "hi");
        turn.append_thinking("thinking now");
        assert_eq!(turn.steps.len(), 2);
    }

    #[test]
    fn find_pending_tool_prefers_call_id_match() {
        let mut turn = Turn::new_assistant("agent-1", 2, 0);
        turn.push_tool_use("call-1", "read", Value::Null);
        turn.push_tool_use("call-2", "read", Value::Null);
        let found = turn.find_pending_tool_mut(Some("call-2"), Some("read")).unwrap();
        assert!(matches!(found, Step::ToolUse { tool_call_id, .. } if tool_call_id == "call-2"));
    }

    #[test]
    fn find_pending_tool_falls_back_to_name_when_no_id_given() {
        let mut turn = Turn::new_assistant("agent-1", 2, 0);
        turn.push_tool_use("call-1", "grep", Value::Null);
        let found = turn.find_pending_tool_mut(None, Some("grep"));
        assert!(found.is_some());
    }

    #[test]
    fn done_tool_steps_are_never_matched_again() {
        let mut turn = Turn::new_assistant("agent-1", 2, 0);
        turn.push_tool_use("call-1", "read", Value::Null);
        if let Some(Step::ToolUse { status, .. }) = turn.find_pending_tool_mut(Some("call-1"), None) {
            *status = ToolUseStatus::Done;
        }
        assert!(turn.find_pending_tool_mut(Some("call-1"), None).is_none());
    }
}
