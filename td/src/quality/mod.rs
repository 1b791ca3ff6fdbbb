//! Quality gate.
//!
//! Replaces `loop::validation`'s exit-code-only notion of "done" with a
//! multi-signal score over file sets, tool usage, and search-signal hits.
//! `run_validation` is still available and used as one optional evidence
//! input when a `nextCheck` asks to "run tests".

use serde::{Deserialize, Serialize};

use crate::domain::FileSet;

pub mod weights {
    //! Named scoring weights, kept as constants rather than inline
    //! literals so a reviewer can see at a glance what the gate penalizes.
    pub const TOOL_ERROR_RATE: f64 = 0.3;
    pub const NO_FILES_TOUCHED_ON_ACTION_TASK: f64 = 0.3;
    pub const NO_SEARCH_SIGNAL_ON_DISCOVERY_TASK: f64 = 0.2;
    pub const UNMET_LEDGER_CAPABILITY: f64 = 0.15;
    pub const PASS_THRESHOLD: f64 = 0.5;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityStatus {
    Pass,
    Partial,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub status: QualityStatus,
    pub score: f64,
    pub reasons: Vec<String>,
    pub next_checks: Vec<String>,
}

/// Whether the task being graded is expected to produce file changes
/// (`action`) or is purely investigative (`discovery`/`analysis`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskIntent {
    Action,
    Discovery,
    Analysis,
}

/// Everything the gate needs to score one completed run.
#[derive(Debug, Clone)]
pub struct QualityInputs<'a> {
    pub intent: TaskIntent,
    pub file_set: &'a FileSet,
    pub tool_calls_total: u32,
    pub tool_error_count: u32,
    pub search_signal_hits: u32,
    /// Ledger capabilities the task claimed it would exercise but never
    /// did (e.g. "wrote a test", "ran the linter").
    pub unmet_ledger_capabilities: Vec<String>,
}

/// Score one run: start at 1.0, subtract a fixed penalty per
/// violated expectation, and emit `nextChecks` when the result is only
/// `partial`.
pub fn evaluate(inputs: &QualityInputs) -> QualityReport {
    let mut score = 1.0;
    let mut reasons = Vec::new();
    let mut next_checks = Vec::new();

    if inputs.tool_calls_total > 0 && inputs.tool_error_count as f64 > inputs.tool_calls_total as f64 / 3.0 {
        score -= weights::TOOL_ERROR_RATE;
        reasons.push(format!(
            "{}/{} tool calls errored",
            inputs.tool_error_count, inputs.tool_calls_total
        ));
        next_checks.push("re-read modified files".to_string());
    }

    let wrote_files = !inputs.file_set.modified.is_empty() || !inputs.file_set.created.is_empty();
    if inputs.intent == TaskIntent::Action && !wrote_files {
        score -= weights::NO_FILES_TOUCHED_ON_ACTION_TASK;
        reasons.push("action task completed without modifying or creating any files".to_string());
        next_checks.push("run tests".to_string());
    }

    if inputs.intent == TaskIntent::Discovery && inputs.search_signal_hits == 0 {
        score -= weights::NO_SEARCH_SIGNAL_ON_DISCOVERY_TASK;
        reasons.push("discovery task produced no search signal".to_string());
        next_checks.push("broaden the search".to_string());
    }

    for capability in &inputs.unmet_ledger_capabilities {
        score -= weights::UNMET_LEDGER_CAPABILITY;
        reasons.push(format!("ledger capability not exercised: {capability}"));
        next_checks.push(format!("exercise {capability}"));
    }

    let score = score.clamp(0.0, 1.0);
    let status = if score >= weights::PASS_THRESHOLD {
        QualityStatus::Pass
    } else {
        QualityStatus::Partial
    };

    QualityReport {
        status,
        score,
        reasons,
        next_checks: if status == QualityStatus::Pass { Vec::new() } else { next_checks },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_inputs(file_set: &FileSet) -> QualityInputs<'_> {
        QualityInputs {
            intent: TaskIntent::Action,
            file_set,
            tool_calls_total: 10,
            tool_error_count: 0,
            search_signal_hits: 0,
            unmet_ledger_capabilities: Vec::new(),
        }
    }

    #[test]
    fn clean_action_run_passes_at_full_score() {
        let mut file_set = FileSet::new();
        file_set.mark_modified("src/lib.rs");
        let report = evaluate(&base_inputs(&file_set));
        assert_eq!(report.status, QualityStatus::Pass);
        assert_eq!(report.score, 1.0);
        assert!(report.reasons.is_empty());
    }

    #[test]
    fn high_tool_error_rate_drops_score_and_suggests_reread() {
        let mut file_set = FileSet::new();
        file_set.mark_modified("src/lib.rs");
        let mut inputs = base_inputs(&file_set);
        inputs.tool_error_count = 5;
        let report = evaluate(&inputs);
        assert!(report.score < 1.0);
        assert!(report.reasons.iter().any(|r| r.contains("errored")));
    }

    #[test]
    fn action_task_with_no_files_touched_is_partial() {
        let file_set = FileSet::new();
        let inputs = base_inputs(&file_set);
        let report = evaluate(&inputs);
        assert_eq!(report.status, QualityStatus::Partial);
        assert!(report.next_checks.contains(&"run tests".to_string()));
    }

    #[test]
    fn discovery_task_with_no_search_signal_is_penalized() {
        let file_set = FileSet::new();
        let mut inputs = base_inputs(&file_set);
        inputs.intent = TaskIntent::Discovery;
        let report = evaluate(&inputs);
        assert!(report.reasons.iter().any(|r| r.contains("no search signal")));
    }

    #[test]
    fn unmet_ledger_capabilities_each_cost_a_fixed_penalty() {
        let mut file_set = FileSet::new();
        file_set.mark_modified("src/lib.rs");
        let mut inputs = base_inputs(&file_set);
        inputs.unmet_ledger_capabilities = vec!["wrote a test".to_string()];
        let report = evaluate(&inputs);
        assert!((1.0 - report.score - weights::UNMET_LEDGER_CAPABILITY).abs() < 1e-9);
    }

    #[test]
    fn score_never_goes_negative() {
        let file_set = FileSet::new();
        let mut inputs = base_inputs(&file_set);
        inputs.tool_error_count = 10;
        inputs.intent = TaskIntent::Discovery;
        inputs.unmet_ledger_capabilities = vec!["a".to_string(), "b".to_string(), "c".to_string(), "d".to_string()];
        let report = evaluate(&inputs);
        assert!(report.score >= 0.0);
    }
}
