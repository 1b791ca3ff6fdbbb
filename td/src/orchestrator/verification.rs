//! Verification pass: a higher-tier LLM call judging a synthesized answer
//! against the research findings that produced it. Research-path only.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::llm::{CompletionRequest, LlmClient, Message, ToolChoice};

use super::extract_json;

/// Thresholds a `VerificationReport` is judged against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VerificationThresholds {
    pub min_confidence: f64,
    pub min_completeness: f64,
    pub max_unverified_mentions: u32,
}

impl Default for VerificationThresholds {
    fn default() -> Self {
        Self {
            min_confidence: 0.7,
            min_completeness: 0.7,
            max_unverified_mentions: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub confidence: f64,
    pub completeness: f64,
    #[serde(default)]
    pub verified_mentions: Vec<String>,
    #[serde(default)]
    pub unverified_mentions: Vec<String>,
    #[serde(default)]
    pub gaps: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
}

impl VerificationReport {
    pub fn passes(&self, thresholds: &VerificationThresholds) -> bool {
        self.confidence >= thresholds.min_confidence
            && self.completeness >= thresholds.min_completeness
            && self.unverified_mentions.len() as u32 <= thresholds.max_unverified_mentions
    }
}

const SYSTEM_PROMPT: &str = "You are verifying a synthesized research answer against the findings it was \
built from. Respond with ONLY a JSON object of the shape:\n\
{\"confidence\": 0.0-1.0, \"completeness\": 0.0-1.0, \"verifiedMentions\": [string], \
\"unverifiedMentions\": [string], \"gaps\": [string], \"warnings\": [string], \"reasoning\": string}";

/// Ask `llm` (expected to be a higher-tier client than produced the
/// answer) to judge `answer` against `findings`.
pub async fn verify(llm: &dyn LlmClient, task_request: &str, answer: &str, findings: &[String]) -> eyre::Result<VerificationReport> {
    let body = format!(
        "Task: {task_request}\n\nSynthesized answer:\n{answer}\n\nFindings:\n{}",
        findings
            .iter()
            .enumerate()
            .map(|(i, f)| format!("{}. {f}", i + 1))
            .collect::<Vec<_>>()
            .join("\n")
    );

    let request = CompletionRequest {
        system_prompt: SYSTEM_PROMPT.to_string(),
        messages: vec![Message::user(body)],
        tools: vec![],
        max_tokens: 1024,
        tool_choice: ToolChoice::None,
    };

    let response = llm.complete(request).await?;
    let content = response.content.unwrap_or_default();
    debug!(len = content.len(), "verification: raw response received");
    let json = extract_json(&content).ok_or_else(|| eyre::eyre!("verification response contained no JSON object"))?;
    let report: VerificationReport = serde_json::from_str(&json)?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_requires_all_three_thresholds() {
        let thresholds = VerificationThresholds::default();
        let mut report = VerificationReport {
            confidence: 0.9,
            completeness: 0.9,
            verified_mentions: vec![],
            unverified_mentions: vec![],
            gaps: vec![],
            warnings: vec![],
            reasoning: String::new(),
        };
        assert!(report.passes(&thresholds));

        report.unverified_mentions.push("unchecked claim".to_string());
        assert!(!report.passes(&thresholds));
    }
}
