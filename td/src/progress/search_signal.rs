//! `SearchSignalTracker` - classifies iteration evidence as none/partial/strong.
//!
//! Prefers an LLM bridge for classification, mirroring the two-tier
//! "LLM call with deterministic fallback" pattern used for progressive
//! summarization (see `crate::session::summarize`); falls back to a
//! keyword-density heuristic when no LLM collaborator is available.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::debug;

use crate::llm::{LlmClient, Message};

/// Classification of one iteration's tool-result evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchSignal {
    None,
    Partial,
    Strong,
}

/// Bounded FIFO cap on retained evidence snippets.
const MAX_SNIPPETS: usize = 6;

/// Keywords whose presence in a tool result nudges the deterministic
/// fallback classifier toward `Strong`/`Partial` rather than `None`.
const STRONG_KEYWORDS: &[&str] = &["found", "match", "defined", "result", "success"];
const PARTIAL_KEYWORDS: &[&str] = &["maybe", "similar", "related", "possibly"];

/// Tracks search-signal classification across iterations, for one run.
pub struct SearchSignalTracker {
    llm: Option<Arc<dyn LlmClient>>,
    hits: u32,
    snippets: VecDeque<String>,
    consecutive_none: u32,
}

impl SearchSignalTracker {
    pub fn new(llm: Option<Arc<dyn LlmClient>>) -> Self {
        Self {
            llm,
            hits: 0,
            snippets: VecDeque::with_capacity(MAX_SNIPPETS),
            consecutive_none: 0,
        }
    }

    pub fn hits(&self) -> u32 {
        self.hits
    }

    pub fn recent_snippets(&self) -> impl Iterator<Item = &String> {
        self.snippets.iter()
    }

    /// Classify one iteration's combined tool-result text, preferring the
    /// LLM bridge when present, falling back to keyword density.
    pub async fn classify(&mut self, tool_results_text: &str) -> SearchSignal {
        let signal = match &self.llm {
            Some(llm) => match self.classify_via_llm(llm, tool_results_text).await {
                Some(s) => s,
                None => classify_by_keyword_density(tool_results_text),
            },
            None => classify_by_keyword_density(tool_results_text),
        };

        match signal {
            SearchSignal::None => {
                self.consecutive_none += 1;
            }
            SearchSignal::Partial | SearchSignal::Strong => {
                self.consecutive_none = 0;
                self.hits += 1;
                if self.snippets.len() >= MAX_SNIPPETS {
                    self.snippets.pop_front();
                }
                self.snippets.push_back(truncate_snippet(tool_results_text));
            }
        }

        debug!(?signal, consecutive_none = self.consecutive_none, "SearchSignalTracker::classify");
        signal
    }

    async fn classify_via_llm(&self, llm: &Arc<dyn LlmClient>, text: &str) -> Option<SearchSignal> {
        let request = crate::llm::CompletionRequest {
            system_prompt: "Classify the evidence strength of this tool output as exactly one word: \
                             none, partial, or strong. Output ONLY that word."
                .to_string(),
            messages: vec![Message::user(text.to_string())],
            tools: vec![],
            max_tokens: 8,
            tool_choice: crate::llm::ToolChoice::None,
        };

        let response = llm.complete(request).await.ok()?;
        let content = response.content?;
        match content.trim().to_lowercase().as_str() {
            "none" => Some(SearchSignal::None),
            "partial" => Some(SearchSignal::Partial),
            "strong" => Some(SearchSignal::Strong),
            _ => None,
        }
    }

    /// True once several consecutive iterations produced `none` and the
    /// task intent is `discovery` rather than `action`.
    pub fn should_conclude_no_result_early(&self, is_discovery_task: bool, threshold: u32) -> bool {
        is_discovery_task && self.consecutive_none >= threshold
    }
}

fn truncate_snippet(text: &str) -> String {
    const MAX_SNIPPET_CHARS: usize = 200;
    if text.len() > MAX_SNIPPET_CHARS {
        format!("{}...", &text[..MAX_SNIPPET_CHARS])
    } else {
        text.to_string()
    }
}

fn classify_by_keyword_density(text: &str) -> SearchSignal {
    let lower = text.to_lowercase();
    if lower.trim().is_empty() {
        return SearchSignal::None;
    }
    let strong_hits = STRONG_KEYWORDS.iter().filter(|k| lower.contains(*k)).count();
    let partial_hits = PARTIAL_KEYWORDS.iter().filter(|k| lower.contains(*k)).count();

    if strong_hits > 0 {
        SearchSignal::Strong
    } else if partial_hits > 0 {
        SearchSignal::Partial
    } else {
        SearchSignal::None
    }
}
