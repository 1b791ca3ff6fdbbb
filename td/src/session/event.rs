//! Event taxonomy.
//!
//! Every run-facing component emits `Event`s. They are append-only, fan out
//! through `EventBus` to any sink (tracer, analytics, UI callback), and are
//! the sole input `TurnAssembler`/`SessionStore` consume to build the
//! durable per-session projection.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use taskstore::now_ms;

/// The non-exhaustive event taxonomy, tagged with the `component:verb`
/// vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "agent:start")]
    AgentStart,
    #[serde(rename = "agent:end")]
    AgentEnd,
    #[serde(rename = "agent:error")]
    AgentError,
    #[serde(rename = "iteration:start")]
    IterationStart,
    #[serde(rename = "iteration:end")]
    IterationEnd,
    #[serde(rename = "llm:start")]
    LlmStart,
    #[serde(rename = "llm:end")]
    LlmEnd,
    #[serde(rename = "tool:start")]
    ToolStart,
    #[serde(rename = "tool:end")]
    ToolEnd,
    #[serde(rename = "tool:error")]
    ToolError,
    #[serde(rename = "status:change")]
    StatusChange,
    #[serde(rename = "thinking:start")]
    ThinkingStart,
    #[serde(rename = "thinking:chunk")]
    ThinkingChunk,
    #[serde(rename = "subtask:start")]
    SubtaskStart,
    #[serde(rename = "subtask:end")]
    SubtaskEnd,
    #[serde(rename = "orchestrator:start")]
    OrchestratorStart,
    #[serde(rename = "orchestrator:end")]
    OrchestratorEnd,
    #[serde(rename = "orchestrator:answer")]
    OrchestratorAnswer,
    #[serde(rename = "orchestrator:plan")]
    OrchestratorPlan,
    #[serde(rename = "synthesis:forced")]
    SynthesisForced,
    #[serde(rename = "synthesis:start")]
    SynthesisStart,
    #[serde(rename = "synthesis:complete")]
    SynthesisComplete,
    #[serde(rename = "verification:start")]
    VerificationStart,
    #[serde(rename = "verification:complete")]
    VerificationComplete,
    #[serde(rename = "progress:update")]
    ProgressUpdate,
    #[serde(rename = "tier:escalation")]
    TierEscalation,
}

impl EventType {
    pub fn is_tool_start(self) -> bool {
        matches!(self, EventType::ToolStart)
    }

    pub fn is_tool_terminal(self) -> bool {
        matches!(self, EventType::ToolEnd | EventType::ToolError)
    }

    /// `agent:end` is the unique terminator of a run.
    pub fn is_run_terminator(self) -> bool {
        matches!(self, EventType::AgentEnd)
    }
}

/// One append-only event. `session_seq` is assigned by the `SessionStore`
/// on write: monotonically increasing within one `(session_id, run_id)`
/// pair, `None` until then.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: i64,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Start time of a matched begin event, attached to its terminal
    /// event for correlation (e.g. `tool:end.started_at`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_seq: Option<u64>,
}

impl Event {
    pub fn new(event_type: EventType, session_id: impl Into<String>) -> Self {
        Self {
            event_type,
            timestamp: now_ms(),
            session_id: session_id.into(),
            run_id: None,
            agent_id: None,
            parent_agent_id: None,
            tool_call_id: None,
            started_at: None,
            data: Value::Null,
            session_seq: None,
        }
    }

    pub fn with_run(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_parent_agent(mut self, parent_agent_id: impl Into<String>) -> Self {
        self.parent_agent_id = Some(parent_agent_id.into());
        self
    }

    pub fn with_tool_call(mut self, tool_call_id: impl Into<String>) -> Self {
        self.tool_call_id = Some(tool_call_id.into());
        self
    }

    pub fn with_started_at(mut self, started_at: i64) -> Self {
        self.started_at = Some(started_at);
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_serializes_to_spec_vocabulary() {
        let json = serde_json::to_string(&EventType::ToolStart).unwrap();
        assert_eq!(json, "\"tool:start\"");
    }

    #[test]
    fn agent_end_is_the_only_run_terminator() {
        assert!(EventType::AgentEnd.is_run_terminator());
        assert!(!EventType::AgentError.is_run_terminator());
    }

    #[test]
    fn builder_methods_set_optional_fields() {
        let event = Event::new(EventType::ToolEnd, "sess-1")
            .with_run("run-1")
            .with_agent("agent-1")
            .with_tool_call("call-1")
            .with_started_at(100);
        assert_eq!(event.run_id.as_deref(), Some("run-1"));
        assert_eq!(event.agent_id.as_deref(), Some("agent-1"));
        assert_eq!(event.tool_call_id.as_deref(), Some("call-1"));
        assert_eq!(event.started_at, Some(100));
    }

    #[test]
    fn event_round_trips_through_json() {
        let event = Event::new(EventType::AgentStart, "sess-1").with_run("run-1");
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.session_id, "sess-1");
        assert_eq!(back.run_id.as_deref(), Some("run-1"));
    }
}
