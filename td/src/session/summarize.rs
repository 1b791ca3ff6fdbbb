//! Conversation history summarization.
//!
//! `getConversationHistoryWithSummarization` tiers a session's turns into:
//! recent (last 3, verbatim), mid-term (next 7, LLM-summarized to at most
//! 500 chars), and old (next 10, LLM-summarized to at most 150 chars). Each
//! tier falls back to a deterministic truncation if the LLM call fails —
//! summarization never produces an error for the caller.

use std::sync::Arc;

use tracing::debug;

use crate::llm::{CompletionRequest, LlmClient, Message, ToolChoice};

use super::turn::{Step, Turn};

pub const RECENT_COUNT: usize = 3;
pub const MID_TERM_COUNT: usize = 7;
pub const OLD_COUNT: usize = 10;

pub const MID_TERM_MAX_CHARS: usize = 500;
pub const OLD_MAX_CHARS: usize = 150;

const SYSTEM_PROMPT: &str = "Summarize the following conversation turn in a single, information-dense sentence. \
Do not call any tools.";

/// One tiered entry in the summarized history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryEntry {
    Verbatim(Turn),
    Summarized { turn_id: String, summary: String },
}

/// Render a turn's steps to a flat text blob for summarization input, or as
/// the basis for deterministic fallback truncation.
fn render_turn_text(turn: &Turn) -> String {
    let mut out = String::new();
    for step in &turn.steps {
        match step {
            Step::Text { text, .. } => {
                out.push_str(text);
                out.push(' ');
            }
            Step::Thinking { text } => {
                out.push_str(text);
                out.push(' ');
            }
            Step::ToolUse { tool_name, output, .. } => {
                out.push_str(tool_name);
                if let Some(output) = output {
                    out.push_str(": ");
                    out.push_str(output);
                }
                out.push(' ');
            }
            Step::Error { message } => {
                out.push_str(message);
                out.push(' ');
            }
        }
    }
    out.trim().to_string()
}

/// Deterministic head+tail truncation fallback for the mid-term tier.
fn truncate_head_tail(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let half = max_chars.saturating_sub(3) / 2;
    let chars: Vec<char> = text.chars().collect();
    let head: String = chars[..half].iter().collect();
    let tail: String = chars[chars.len() - half..].iter().collect();
    format!("{head}...{tail}")
}

/// Deterministic first-sentence-extraction fallback for the old tier.
fn first_sentence(text: &str, max_chars: usize) -> String {
    let sentence = text.split(['.', '!', '?']).next().unwrap_or(text).trim();
    if sentence.chars().count() <= max_chars {
        sentence.to_string()
    } else {
        let truncated: String = sentence.chars().take(max_chars.saturating_sub(1)).collect();
        format!("{truncated}\u{2026}")
    }
}

pub struct HistorySummarizer {
    llm: Option<Arc<dyn LlmClient>>,
}

impl HistorySummarizer {
    pub fn new(llm: Option<Arc<dyn LlmClient>>) -> Self {
        Self { llm }
    }

    async fn summarize_via_llm(&self, text: &str, max_chars: usize) -> Option<String> {
        let llm = self.llm.as_ref()?;
        let request = CompletionRequest {
            system_prompt: SYSTEM_PROMPT.to_string(),
            messages: vec![Message::user(text.to_string())],
            tools: vec![],
            max_tokens: 200,
            tool_choice: ToolChoice::None,
        };
        let response = llm.complete(request).await.ok()?;
        let content = response.content?;
        if content.chars().count() > max_chars {
            Some(truncate_head_tail(&content, max_chars))
        } else {
            Some(content)
        }
    }

    /// Tier turns (newest last, i.e. `turns` already in chronological order)
    /// into recent/mid-term/old buckets.
    pub async fn summarize_history(&self, turns: &[Turn]) -> Vec<HistoryEntry> {
        debug!(total = turns.len(), "HistorySummarizer::summarize_history: called");
        let mut entries = Vec::with_capacity(turns.len());
        if turns.is_empty() {
            return entries;
        }

        let total = turns.len();
        let recent_start = total.saturating_sub(RECENT_COUNT);
        let mid_start = recent_start.saturating_sub(MID_TERM_COUNT);
        let old_start = mid_start.saturating_sub(OLD_COUNT);

        for turn in &turns[..old_start] {
            let text = render_turn_text(turn);
            let summary = match self.summarize_via_llm(&text, OLD_MAX_CHARS).await {
                Some(s) => s,
                None => first_sentence(&text, OLD_MAX_CHARS),
            };
            entries.push(HistoryEntry::Summarized { turn_id: turn.id.clone(), summary });
        }

        for turn in &turns[old_start..mid_start] {
            let text = render_turn_text(turn);
            let summary = match self.summarize_via_llm(&text, MID_TERM_MAX_CHARS).await {
                Some(s) => s,
                None => truncate_head_tail(&text, MID_TERM_MAX_CHARS),
            };
            entries.push(HistoryEntry::Summarized { turn_id: turn.id.clone(), summary });
        }

        for turn in &turns[mid_start..] {
            entries.push(HistoryEntry::Verbatim(turn.clone()));
        }

        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{CompletionResponse, StopReason, TokenUsage};
    use crate::llm::client::mock::MockLlmClient;

    fn turn_with_text(n: u64, text: &str) -> Turn {
        let mut turn = Turn::new_assistant(&format!("agent-{n}"), n, 0);
        turn.push_text("assistant", text);
        turn.complete(1);
        turn
    }

    #[tokio::test]
    async fn small_history_is_all_verbatim() {
        let summarizer = HistorySummarizer::new(None);
        let turns: Vec<Turn> = (0..3).map(|n| turn_with_text(n, "hi")).collect();
        let entries = summarizer.summarize_history(&turns).await;
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| matches!(e, HistoryEntry::Verbatim(_))));
    }

    #[tokio::test]
    async fn large_history_tiers_into_recent_mid_and_old() {
        let summarizer = HistorySummarizer::new(None);
        let turns: Vec<Turn> = (0..25).map(|n| turn_with_text(n, &"word ".repeat(200))).collect();
        let entries = summarizer.summarize_history(&turns).await;
        assert_eq!(entries.len(), 25);

        let recent = &entries[22..25];
        assert!(recent.iter().all(|e| matches!(e, HistoryEntry::Verbatim(_))));

        let mid = &entries[15..22];
        assert!(mid.iter().all(|e| matches!(e, HistoryEntry::Summarized { summary, .. } if summary.chars().count() <= MID_TERM_MAX_CHARS)));

        let old = &entries[..15];
        assert!(old.iter().all(|e| matches!(e, HistoryEntry::Summarized { summary, .. } if summary.chars().count() <= OLD_MAX_CHARS)));
    }

    #[tokio::test]
    async fn llm_summary_is_preferred_when_available() {
        let llm = Arc::new(MockLlmClient::new(vec![CompletionResponse {
            content: Some("short summary".to_string()),
            tool_calls: vec![],
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage::default(),
        }]));
        let summarizer = HistorySummarizer::new(Some(llm));
        let turns: Vec<Turn> = (0..11).map(|n| turn_with_text(n, "content")).collect();
        let entries = summarizer.summarize_history(&turns).await;
        assert!(matches!(&entries[0], HistoryEntry::Summarized { summary, .. } if summary == "short summary"));
    }

    #[test]
    fn truncate_head_tail_keeps_string_under_budget() {
        let text = "a".repeat(1000);
        let truncated = truncate_head_tail(&text, 500);
        assert!(truncated.chars().count() <= 500);
        assert!(truncated.contains("..."));
    }

    #[test]
    fn first_sentence_extracts_up_to_first_terminator() {
        let text = "First sentence here. Second sentence follows.";
        assert_eq!(first_sentence(text, 150), "First sentence here");
    }
}
