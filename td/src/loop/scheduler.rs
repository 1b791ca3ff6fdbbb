//! The generalized inner execution loop.
//!
//! `ExecutionLoop` runs the per-iteration state machine: one LLM call, zero
//! or more tool calls, then budget/progress/loop-detector checks before the
//! next iteration. It terminates with a typed `LoopOutcome` rather than a
//! shell exit code, so the caller never has to infer what happened from a
//! status enum plus a string.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{info, warn};

use crate::budget::{BudgetController, TokenEnforcement};
use crate::domain::FileSet;
use crate::llm::{CompletionRequest, CompletionResponse, ContentBlock, LlmClient, Message, ToolChoice, ToolDefinition};
use crate::progress::{ProgressInput, ProgressTracker, SearchSignalTracker};
use crate::quality::TaskIntent;
use crate::reflection::ReflectionEngine;
use crate::session::{Event, EventBus, EventType};
use crate::tools::{ToolContext, ToolExecutor, ToolResult};

use super::LoopDetector;

/// Name of the tool the model calls to report completion (`reportTool`).
const REPORT_TOOL_NAME: &str = "complete_task";

/// Tools considered "broad exploration" and trimmed from the available
/// set once the token budget crosses its soft limit and evidence already
/// looks strong on a non-action task.
const BROAD_EXPLORATION_TOOLS: &[&str] = &["search", "glob", "grep", "fetch", "tree"];

/// One-shot message pushed into the conversation the first time the token
/// budget crosses its soft limit, nudging the model toward a final answer.
const SOFT_LIMIT_NUDGE: &str = "You are approaching the token budget for this task. Converge on a final answer \
soon rather than continuing broad exploration.";

/// Default forced-synthesis timeout, bounded [15s, 300s] by
/// [`ExecutionLoopConfig::new`].
pub const DEFAULT_SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(90);

/// Terminal result of one `ExecutionLoop::run` call.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopOutcome {
    /// The model stopped without calling any tool.
    NoToolCalls { answer: Option<String> },
    /// The model called the report tool to signal completion.
    ReportComplete { answer: String, artifacts: Vec<String> },
    /// The loop detector tripped: the last N tool calls were identical.
    LoopDetected,
    /// The tier selector decided the run should retry at a higher tier.
    Escalate { reason: String },
    /// The iteration budget was exhausted without a terminal result.
    MaxIterations,
    /// The token budget's hard limit was reached; `synthesized_answer` is
    /// `Some` if forced synthesis produced a usable summary in time.
    HardTokenLimit { synthesized_answer: Option<String> },
    /// An abort signal was observed at an iteration boundary.
    Abort,
    /// A discovery task concluded early: several consecutive iterations
    /// produced no search signal.
    SearchConcluded { summary: String },
}

/// Per-loop configuration independent of any particular run's budget state.
#[derive(Debug, Clone)]
pub struct ExecutionLoopConfig {
    pub system_prompt: String,
    pub tool_names: Vec<String>,
    pub max_tokens: u32,
    pub synthesis_timeout: Duration,
    pub force_synthesis_on_hard_limit: bool,
    pub restrict_broad_exploration_at_soft_limit: bool,
    /// What kind of task this run is — only `Discovery` tasks are eligible
    /// for the early no-result conclusion below, and only non-`Action`
    /// tasks are eligible to have broad-exploration tools trimmed once
    /// evidence already looks strong.
    pub task_intent: TaskIntent,
    /// Consecutive no-signal iterations before a discovery task concludes
    /// early.
    pub no_result_threshold: u32,
}

impl ExecutionLoopConfig {
    pub fn new(system_prompt: impl Into<String>, tool_names: Vec<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            tool_names,
            max_tokens: 8192,
            synthesis_timeout: DEFAULT_SYNTHESIS_TIMEOUT,
            force_synthesis_on_hard_limit: true,
            restrict_broad_exploration_at_soft_limit: true,
            task_intent: TaskIntent::Action,
            no_result_threshold: 3,
        }
    }

    /// Clamp a caller-supplied timeout into the [15s, 300s] allowed range.
    pub fn with_synthesis_timeout(mut self, timeout: Duration) -> Self {
        self.synthesis_timeout = timeout.clamp(Duration::from_secs(15), Duration::from_secs(300));
        self
    }
}

/// Evaluates whether the run should escalate to a higher model tier. A
/// `None` result leaves the loop to keep iterating; `Some(reason)` is
/// surfaced as `LoopOutcome::Escalate`. Wired in by `agent::Agent` once a
/// tier selector is attached; absent here, no escalation is ever requested.
pub type EscalationCheck = Box<dyn Fn(&BudgetController, &ProgressTracker) -> Option<String> + Send>;

/// Which event bus and ids an `ExecutionLoop` tags its emitted events with.
/// `agent_id` identifies this particular run for turn assembly
/// (`turn-<agentId>`); a tier-escalation retry gets a fresh one so its
/// turn never collides with the attempt before it.
#[derive(Clone)]
pub struct RunIdentity {
    pub events: EventBus,
    pub session_id: String,
    pub run_id: String,
    pub agent_id: String,
}

/// Drives one run's inner loop to a terminal outcome.
pub struct ExecutionLoop {
    llm: Arc<dyn LlmClient>,
    tool_executor: Arc<ToolExecutor>,
    tool_ctx: ToolContext,
    config: ExecutionLoopConfig,
    identity: RunIdentity,
    abort: Arc<AtomicBool>,
    escalation_check: Option<EscalationCheck>,
    messages: Vec<Message>,
    file_set: FileSet,
    iterations_run: u32,
    tool_calls_total: u32,
    tool_error_count: u32,
    soft_limit_nudge_sent: bool,
}

impl ExecutionLoop {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        tool_executor: Arc<ToolExecutor>,
        tool_ctx: ToolContext,
        config: ExecutionLoopConfig,
        initial_prompt: impl Into<String>,
        identity: RunIdentity,
    ) -> Self {
        Self {
            llm,
            tool_executor,
            tool_ctx,
            config,
            identity,
            abort: Arc::new(AtomicBool::new(false)),
            escalation_check: None,
            messages: vec![Message::user(initial_prompt.into())],
            file_set: FileSet::new(),
            iterations_run: 0,
            tool_calls_total: 0,
            tool_error_count: 0,
            soft_limit_nudge_sent: false,
        }
    }

    /// A handle the caller can flip to request cancellation; checked at the
    /// top of each iteration and between tool calls, never mid-tool-call.
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        self.abort.clone()
    }

    pub fn set_escalation_check(&mut self, check: EscalationCheck) {
        self.escalation_check = Some(check);
    }

    /// Append a message to be included in the next LLM call without
    /// waiting for the model to ask for it (`Agent::injectUserContext`).
    pub fn inject_user_context(&mut self, text: impl Into<String>) {
        self.messages.push(Message::user(text.into()));
    }

    pub fn files_touched(&self) -> &FileSet {
        &self.file_set
    }

    pub fn iterations_run(&self) -> u32 {
        self.iterations_run
    }

    pub fn tool_calls_total(&self) -> u32 {
        self.tool_calls_total
    }

    pub fn tool_error_count(&self) -> u32 {
        self.tool_error_count
    }

    async fn emit(&self, event_type: EventType, data: serde_json::Value) {
        let event = Event::new(event_type, self.identity.session_id.clone())
            .with_run(self.identity.run_id.clone())
            .with_agent(self.identity.agent_id.clone())
            .with_data(data);
        self.identity.events.emit(event).await;
    }

    async fn emit_tool(&self, event_type: EventType, tool_call_id: &str, data: serde_json::Value) {
        let event = Event::new(event_type, self.identity.session_id.clone())
            .with_run(self.identity.run_id.clone())
            .with_agent(self.identity.agent_id.clone())
            .with_tool_call(tool_call_id)
            .with_data(data);
        self.identity.events.emit(event).await;
    }

    /// Run the loop to a terminal outcome, never exceeding
    /// `budget.max_iterations()` iterations (subject to in-flight extension).
    pub async fn run(
        &mut self,
        budget: &mut BudgetController,
        progress: &mut ProgressTracker,
        search_signal: &mut SearchSignalTracker,
        loop_detector: &mut LoopDetector,
    ) -> eyre::Result<LoopOutcome> {
        let tool_defs_full = self.tool_executor.definitions_for(&self.config.tool_names);
        let mut iteration: u32 = 0;

        loop {
            if self.abort.load(Ordering::SeqCst) {
                info!("ExecutionLoop: abort observed at iteration boundary");
                return Ok(LoopOutcome::Abort);
            }

            iteration += 1;
            self.iterations_run = iteration;
            self.emit(EventType::IterationStart, serde_json::json!({"iteration": iteration})).await;

            let max_iterations = budget.iteration_budget();
            let is_last_iteration = iteration >= max_iterations;

            if matches!(budget.token_enforcement(), TokenEnforcement::SoftLimit) && !self.soft_limit_nudge_sent {
                self.soft_limit_nudge_sent = true;
                self.messages.push(Message::user(SOFT_LIMIT_NUDGE));
                info!(iteration, "ExecutionLoop: injected soft-limit convergence nudge");
            }

            let tool_defs = self.active_tool_defs(budget, progress, search_signal, &tool_defs_full);

            let request = CompletionRequest {
                system_prompt: self.config.system_prompt.clone(),
                messages: self.messages.clone(),
                tools: tool_defs,
                max_tokens: self.config.max_tokens,
                tool_choice: ToolChoice::Auto,
            };

            self.emit(EventType::LlmStart, serde_json::json!({"iteration": iteration})).await;
            let response = self.llm.complete(request).await?;
            budget.record_tokens(response.usage.input_tokens + response.usage.output_tokens);
            self.emit(
                EventType::LlmEnd,
                serde_json::json!({"content": response.content, "has_tool_calls": !response.tool_calls.is_empty()}),
            )
            .await;

            let assistant_message = self.build_assistant_message(&response);
            if is_last_iteration && !response.tool_calls.is_empty() {
                warn!(iteration, "ExecutionLoop: tool calls on last permitted iteration, forcing synthesis");
                self.messages.push(assistant_message);
                return Ok(self.forced_synthesis("max_iterations_exhausted").await);
            }

            self.messages.push(assistant_message);

            if response.tool_calls.is_empty() {
                info!(iteration, "ExecutionLoop: no tool calls, terminating");
                return Ok(LoopOutcome::NoToolCalls { answer: response.content });
            }

            if let Some(report) = response.tool_calls.iter().find(|c| c.name == REPORT_TOOL_NAME) {
                let answer = report
                    .input
                    .get("summary")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                let artifacts = report
                    .input
                    .get("artifacts")
                    .and_then(|v| v.as_array())
                    .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                    .unwrap_or_default();
                info!(iteration, "ExecutionLoop: report_complete");
                return Ok(LoopOutcome::ReportComplete { answer, artifacts });
            }

            let results = self.execute_tools(&response.tool_calls).await;

            if self.abort.load(Ordering::SeqCst) {
                info!(iteration, "ExecutionLoop: abort observed between tool calls");
                self.iterations_run = iteration.saturating_sub(1);
                return Ok(LoopOutcome::Abort);
            }

            let tool_result_message = self.build_tool_result_message(&results);
            self.messages.push(tool_result_message);

            let mut evidence_delta: i64 = 0;
            let mut failed_tools = 0u32;
            self.tool_calls_total += response.tool_calls.len() as u32;
            for (call, (_, result)) in response.tool_calls.iter().zip(results.iter()) {
                if result.is_error {
                    failed_tools += 1;
                    self.tool_error_count += 1;
                } else {
                    evidence_delta += 1;
                }
                let signal = search_signal.classify(&result.content).await;
                if signal != crate::progress::SearchSignal::None {
                    evidence_delta += 1;
                }
                self.record_file_touch(&call.name, &call.input);
            }

            if search_signal.should_conclude_no_result_early(self.config.task_intent == TaskIntent::Discovery, self.config.no_result_threshold) {
                info!(iteration, "ExecutionLoop: concluding discovery task early, no search signal");
                let summary = self.search_concluded_summary(search_signal).await;
                return Ok(LoopOutcome::SearchConcluded { summary });
            }

            let calls_for_detector: Vec<(String, serde_json::Value)> =
                response.tool_calls.iter().map(|c| (c.name.clone(), c.input.clone())).collect();
            if loop_detector.record_iteration(&calls_for_detector) {
                info!(iteration, "ExecutionLoop: loop detected");
                return Ok(LoopOutcome::LoopDetected);
            }

            let new_file_appeared = response
                .tool_calls
                .iter()
                .any(|c| matches!(c.name.as_str(), "write" | "edit"));
            let input = ProgressInput {
                tool_name: response.tool_calls.first().map(|c| c.name.clone()).unwrap_or_default(),
                output_size: results.iter().map(|(_, r)| r.content.len()).sum(),
                evidence_delta,
                failed_tools_this_iteration: failed_tools,
                search_signal_hits: search_signal.hits(),
                new_file_appeared,
            };
            progress.record(&input);
            self.emit(
                EventType::ProgressUpdate,
                serde_json::json!({
                    "iterationsSinceProgress": progress.iterations_since_progress(),
                    "evidenceScore": progress.evidence_score(),
                }),
            )
            .await;

            if let Some(check) = &self.escalation_check {
                if let Some(reason) = check(budget, progress) {
                    info!(iteration, %reason, "ExecutionLoop: escalation requested");
                    return Ok(LoopOutcome::Escalate { reason });
                }
            }

            match budget.token_enforcement() {
                TokenEnforcement::HardLimit => {
                    if self.config.force_synthesis_on_hard_limit {
                        return Ok(self.forced_synthesis("hard_token_limit").await);
                    }
                    return Ok(LoopOutcome::HardTokenLimit { synthesized_answer: None });
                }
                TokenEnforcement::SoftLimit | TokenEnforcement::None | TokenEnforcement::Disabled => {}
            }

            budget.maybe_extend(progress.iterations_since_progress(), true);

            if iteration >= budget.iteration_budget() {
                info!(iteration, "ExecutionLoop: max iterations reached");
                return Ok(LoopOutcome::MaxIterations);
            }

            self.emit(EventType::IterationEnd, serde_json::json!({"iteration": iteration, "hadToolCalls": true})).await;
        }
    }

    /// Drop broad-exploration tools once the token budget is past its soft
    /// limit, evidence already looks strong, and the task isn't an
    /// `action` task that still needs those tools to make changes.
    fn active_tool_defs(
        &self,
        budget: &BudgetController,
        progress: &ProgressTracker,
        search_signal: &SearchSignalTracker,
        full: &[ToolDefinition],
    ) -> Vec<ToolDefinition> {
        if !self.config.restrict_broad_exploration_at_soft_limit {
            return full.to_vec();
        }
        let at_or_past_soft_limit = matches!(budget.token_enforcement(), TokenEnforcement::SoftLimit | TokenEnforcement::HardLimit);
        let evidence_already_strong = progress.evidence_score() > 0 || search_signal.hits() > 0;
        let non_action_task = self.config.task_intent != TaskIntent::Action;

        if at_or_past_soft_limit && evidence_already_strong && non_action_task {
            full.iter()
                .filter(|t| !BROAD_EXPLORATION_TOOLS.contains(&t.name.as_str()))
                .cloned()
                .collect()
        } else {
            full.to_vec()
        }
    }

    async fn execute_tools(&self, tool_calls: &[crate::llm::ToolCall]) -> Vec<(String, ToolResult)> {
        let mut results = Vec::with_capacity(tool_calls.len());
        for call in tool_calls {
            self.emit_tool(EventType::ToolStart, &call.id, serde_json::json!({"tool_name": call.name, "input": call.input}))
                .await;

            let result = if self.abort.load(Ordering::SeqCst) {
                ToolResult::error("aborted before execution")
            } else {
                self.tool_executor.execute(call, &self.tool_ctx).await
            };

            if result.is_error {
                self.emit_tool(EventType::ToolError, &call.id, serde_json::json!({"tool_name": call.name, "error": result.content}))
                    .await;
            } else {
                self.emit_tool(EventType::ToolEnd, &call.id, serde_json::json!({"tool_name": call.name, "output": result.content}))
                    .await;
            }

            results.push((call.id.clone(), result));
        }
        results
    }

    fn build_assistant_message(&self, response: &CompletionResponse) -> Message {
        let mut blocks = Vec::new();
        if let Some(text) = &response.content {
            blocks.push(ContentBlock::text(text));
        }
        for call in &response.tool_calls {
            blocks.push(ContentBlock::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: call.input.clone(),
            });
        }
        Message::assistant_blocks(blocks)
    }

    fn build_tool_result_message(&self, results: &[(String, ToolResult)]) -> Message {
        let blocks: Vec<ContentBlock> = results
            .iter()
            .map(|(id, result)| ContentBlock::tool_result(id, &result.content, result.is_error))
            .collect();
        Message::user_blocks(blocks)
    }

    fn record_file_touch(&mut self, tool_name: &str, input: &serde_json::Value) {
        let Some(path) = input.get("path").and_then(|v| v.as_str()) else {
            return;
        };
        match tool_name {
            "read" | "grep" | "glob" | "list" | "tree" | "search" => self.file_set.mark_read(path),
            "write" => self.file_set.mark_created(path),
            "edit" => self.file_set.mark_modified(path),
            _ => {}
        }
    }

    /// Forced synthesis: one "no tools" LLM call under a timeout, falling
    /// back to a deterministic summary rather than an error.
    async fn forced_synthesis(&mut self, reason: &str) -> LoopOutcome {
        self.emit(EventType::SynthesisForced, serde_json::json!({"reason": reason})).await;
        self.messages.push(Message::user(
            "Stop calling tools. Summarize what you accomplished and the current state of the task in plain text.",
        ));

        let request = CompletionRequest {
            system_prompt: self.config.system_prompt.clone(),
            messages: self.messages.clone(),
            tools: vec![],
            max_tokens: self.config.max_tokens,
            tool_choice: ToolChoice::None,
        };

        match tokio::time::timeout(self.config.synthesis_timeout, self.llm.complete(request)).await {
            Ok(Ok(response)) => match response.content {
                Some(text) => LoopOutcome::NoToolCalls { answer: Some(text) },
                None => LoopOutcome::HardTokenLimit {
                    synthesized_answer: Some(self.fallback_summary(reason)),
                },
            },
            Ok(Err(e)) => {
                warn!(error = %e, reason, "ExecutionLoop: forced synthesis call failed");
                LoopOutcome::HardTokenLimit {
                    synthesized_answer: Some(self.fallback_summary(reason)),
                }
            }
            Err(_) => {
                warn!(reason, "ExecutionLoop: forced synthesis timed out");
                LoopOutcome::HardTokenLimit {
                    synthesized_answer: Some(self.fallback_summary(reason)),
                }
            }
        }
    }

    /// Run the reflection engine over a summary of recent activity and
    /// combine its hypothesis with the deterministic "nothing found"
    /// summary, falling back to the deterministic summary alone if the
    /// reflection call fails.
    async fn search_concluded_summary(&self, search_signal: &SearchSignalTracker) -> String {
        let base = ReflectionEngine::nothing_found_summary(&self.initial_task_text(), search_signal.hits());
        let engine = ReflectionEngine::new(self.llm.clone());
        match engine.reflect(&self.recent_activity_summary()).await {
            Ok(note) => format!("{base} {}", note.hypothesis),
            Err(e) => {
                warn!(error = %e, "ExecutionLoop: reflection call failed, using deterministic summary");
                base
            }
        }
    }

    /// Text of the initial user prompt, used to ground a "nothing found"
    /// summary with the actual task the run concluded on.
    fn initial_task_text(&self) -> String {
        self.messages.first().and_then(|m| m.content.as_text()).unwrap_or_default().to_string()
    }

    /// Short description of files touched so far, fed to the reflection
    /// engine as its activity summary.
    fn recent_activity_summary(&self) -> String {
        format!(
            "Task: {}\nFiles read: {}. Files modified: {}. Files created: {}.",
            self.initial_task_text(),
            self.file_set.read.len(),
            self.file_set.modified.len(),
            self.file_set.created.len(),
        )
    }

    fn fallback_summary(&self, reason: &str) -> String {
        let mut files: Vec<&String> = self
            .file_set
            .modified
            .iter()
            .chain(self.file_set.created.iter())
            .collect();
        files.sort();
        format!(
            "Stopped due to {reason}. Files touched: [{}]. {} tool results read so far.",
            files.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", "),
            self.file_set.read.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::mock::MockLlmClient;
    use crate::llm::{StopReason, TokenUsage, ToolCall};
    use tempfile::tempdir;

    fn test_identity() -> RunIdentity {
        RunIdentity {
            events: EventBus::new(),
            session_id: "sess-1".to_string(),
            run_id: "run-1".to_string(),
            agent_id: "agent-1".to_string(),
        }
    }

    fn response_with_content(text: &str) -> CompletionResponse {
        CompletionResponse {
            content: Some(text.to_string()),
            tool_calls: vec![],
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage::default(),
        }
    }

    fn response_with_tool(name: &str, input: serde_json::Value) -> CompletionResponse {
        CompletionResponse {
            content: None,
            tool_calls: vec![ToolCall {
                id: "call-1".to_string(),
                name: name.to_string(),
                input,
            }],
            stop_reason: StopReason::ToolUse,
            usage: TokenUsage::default(),
        }
    }

    fn setup() -> (Arc<ToolExecutor>, ToolContext, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let ctx = ToolContext::new_unsandboxed(dir.path().to_path_buf(), "test-exec".to_string());
        (Arc::new(ToolExecutor::standard()), ctx, dir)
    }

    #[tokio::test]
    async fn no_tool_calls_terminates_with_answer() {
        let (executor, ctx, _dir) = setup();
        let llm = Arc::new(MockLlmClient::new(vec![response_with_content("all done")]));
        let config = ExecutionLoopConfig::new("system", vec!["read".to_string()]);
        let mut run_loop = ExecutionLoop::new(llm, executor, ctx, config, "do the task", test_identity());

        let mut budget = crate::budget::BudgetController::new(&crate::budget::BudgetConfig::default());
        let mut progress = ProgressTracker::new();
        let mut search_signal = SearchSignalTracker::new(None);
        let mut detector = LoopDetector::default();

        let outcome = run_loop.run(&mut budget, &mut progress, &mut search_signal, &mut detector).await.unwrap();
        assert_eq!(outcome, LoopOutcome::NoToolCalls { answer: Some("all done".to_string()) });
    }

    #[tokio::test]
    async fn report_tool_call_terminates_with_report_complete() {
        let (executor, ctx, _dir) = setup();
        let llm = Arc::new(MockLlmClient::new(vec![response_with_tool(
            "complete_task",
            serde_json::json!({"summary": "fixed the bug", "artifacts": ["src/lib.rs"]}),
        )]));
        let config = ExecutionLoopConfig::new("system", vec!["complete_task".to_string()]);
        let mut run_loop = ExecutionLoop::new(llm, executor, ctx, config, "fix the bug", test_identity());

        let mut budget = crate::budget::BudgetController::new(&crate::budget::BudgetConfig::default());
        let mut progress = ProgressTracker::new();
        let mut search_signal = SearchSignalTracker::new(None);
        let mut detector = LoopDetector::default();

        let outcome = run_loop.run(&mut budget, &mut progress, &mut search_signal, &mut detector).await.unwrap();
        match outcome {
            LoopOutcome::ReportComplete { answer, artifacts } => {
                assert_eq!(answer, "fixed the bug");
                assert_eq!(artifacts, vec!["src/lib.rs".to_string()]);
            }
            other => panic!("expected ReportComplete, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn repeated_identical_tool_calls_trigger_loop_detected() {
        let (executor, ctx, dir) = setup();
        std::fs::write(dir.path().join("a.txt"), "hello").unwrap();
        let responses = vec![
            response_with_tool("read", serde_json::json!({"path": "a.txt"})),
            response_with_tool("read", serde_json::json!({"path": "a.txt"})),
            response_with_tool("read", serde_json::json!({"path": "a.txt"})),
        ];
        let llm = Arc::new(MockLlmClient::new(responses));
        let config = ExecutionLoopConfig::new("system", vec!["read".to_string()]);
        let mut run_loop = ExecutionLoop::new(llm, executor, ctx, config, "read the file repeatedly", test_identity());

        let mut budget = crate::budget::BudgetController::new(&crate::budget::BudgetConfig::default());
        let mut progress = ProgressTracker::new();
        let mut search_signal = SearchSignalTracker::new(None);
        let mut detector = LoopDetector::new(3);

        let outcome = run_loop.run(&mut budget, &mut progress, &mut search_signal, &mut detector).await.unwrap();
        assert_eq!(outcome, LoopOutcome::LoopDetected);
    }

    #[tokio::test]
    async fn abort_handle_short_circuits_before_next_iteration() {
        let (executor, ctx, _dir) = setup();
        let llm = Arc::new(MockLlmClient::new(vec![response_with_content("unused")]));
        let config = ExecutionLoopConfig::new("system", vec!["read".to_string()]);
        let mut run_loop = ExecutionLoop::new(llm, executor, ctx, config, "do the task", test_identity());
        run_loop.abort_handle().store(true, Ordering::SeqCst);

        let mut budget = crate::budget::BudgetController::new(&crate::budget::BudgetConfig::default());
        let mut progress = ProgressTracker::new();
        let mut search_signal = SearchSignalTracker::new(None);
        let mut detector = LoopDetector::default();

        let outcome = run_loop.run(&mut budget, &mut progress, &mut search_signal, &mut detector).await.unwrap();
        assert_eq!(outcome, LoopOutcome::Abort);
        assert_eq!(run_loop.iterations_run(), 0);
    }

    #[tokio::test]
    async fn tool_calls_on_last_iteration_force_synthesis() {
        let (executor, ctx, _dir) = setup();
        let responses = vec![
            response_with_tool("read", serde_json::json!({"path": "a.txt"})),
            response_with_content("synthesized summary"),
        ];
        let llm = Arc::new(MockLlmClient::new(responses));
        let config = ExecutionLoopConfig::new("system", vec!["read".to_string()]);
        let mut run_loop = ExecutionLoop::new(llm, executor, ctx, config, "do the task", test_identity());

        // A budget of exactly one iteration makes the very first iteration
        // the last permitted one, so a tool-calling response there must
        // trigger forced synthesis rather than executing the tool.
        let budget_config = crate::budget::BudgetConfig {
            max_iterations: 1,
            task_iteration_hint: Some(1),
            ..Default::default()
        };
        let mut budget = crate::budget::BudgetController::new(&budget_config);
        let mut progress = ProgressTracker::new();
        let mut search_signal = SearchSignalTracker::new(None);
        let mut detector = LoopDetector::default();

        let outcome = run_loop.run(&mut budget, &mut progress, &mut search_signal, &mut detector).await.unwrap();
        assert_eq!(outcome, LoopOutcome::NoToolCalls { answer: Some("synthesized summary".to_string()) });
    }

    #[tokio::test]
    async fn llm_and_tool_events_are_emitted_to_a_recording_sink() {
        let (executor, ctx, _dir) = setup();
        let llm = Arc::new(MockLlmClient::new(vec![response_with_tool("read", serde_json::json!({"path": "a.txt"})), response_with_content("done")]));
        let config = ExecutionLoopConfig::new("system", vec!["read".to_string()]);
        let events = EventBus::new();
        let sink = Arc::new(crate::session::RecordingSink::new());
        events.register(sink.clone());
        let identity = RunIdentity { events, session_id: "sess-1".to_string(), run_id: "run-1".to_string(), agent_id: "agent-1".to_string() };
        let mut run_loop = ExecutionLoop::new(llm, executor, ctx, config, "do the task", identity);

        let mut budget = crate::budget::BudgetController::new(&crate::budget::BudgetConfig::default());
        let mut progress = ProgressTracker::new();
        let mut search_signal = SearchSignalTracker::new(None);
        let mut detector = LoopDetector::default();

        run_loop.run(&mut budget, &mut progress, &mut search_signal, &mut detector).await.unwrap();

        let recorded = sink.events();
        let types: Vec<EventType> = recorded.iter().map(|e| e.event_type).collect();
        assert!(types.contains(&EventType::LlmStart));
        assert!(types.contains(&EventType::LlmEnd));
        assert!(types.contains(&EventType::ToolStart));
        assert!(types.contains(&EventType::ToolEnd));
        assert!(types.contains(&EventType::IterationStart));
    }
}
