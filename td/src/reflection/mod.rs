//! Reflection engine.
//!
//! Periodically asks an LLM to produce a short hypothesis/next-check note.
//! Used both as a standalone nudge between iterations and, when the
//! search-signal tracker concludes a discovery task found nothing, to
//! produce the "nothing found" summary that terminates the run.

use std::sync::Arc;

use tracing::debug;

use crate::llm::{CompletionRequest, LlmClient, LlmError, Message, ToolChoice};

const SYSTEM_PROMPT: &str = "You are reviewing the recent activity of an autonomous coding agent. \
In two or three sentences, state your best hypothesis for what to try next, or why the task may be done. \
Do not call any tools.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectionNote {
    pub hypothesis: String,
}

pub struct ReflectionEngine {
    llm: Arc<dyn LlmClient>,
}

impl ReflectionEngine {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Ask the model to reflect on a text summary of recent activity
    /// (tool names, outputs, progress state) and produce a short note.
    pub async fn reflect(&self, activity_summary: &str) -> Result<ReflectionNote, LlmError> {
        debug!(len = activity_summary.len(), "ReflectionEngine::reflect: called");
        let request = CompletionRequest {
            system_prompt: SYSTEM_PROMPT.to_string(),
            messages: vec![Message::user(activity_summary.to_string())],
            tools: vec![],
            max_tokens: 200,
            tool_choice: ToolChoice::None,
        };
        let response = self.llm.complete(request).await?;
        Ok(ReflectionNote {
            hypothesis: response.content.unwrap_or_default(),
        })
    }

    /// Deterministic "nothing found" summary for a discovery task that
    /// concluded early, used when reflection itself is unavailable or
    /// fails — forced synthesis never produces a bare error.
    pub fn nothing_found_summary(task_text: &str, search_signal_hits: u32) -> String {
        format!(
            "No strong evidence found for \"{task_text}\" after {search_signal_hits} search signal(s). \
             Concluding the search without further iterations."
        )
    }
}
