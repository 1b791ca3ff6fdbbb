//! Orchestrator: classifies a task simple/research/complex and drives the
//! matching execution program over one or more `Agent` runs. Unlike a
//! mailbox between independently-spawned processes, the Orchestrator owns
//! every `Agent` it spawns directly, so the question/answer back-channel
//! (`AskRequest`/`AskResponse`) is a plain in-process call rather than a
//! message bus.

pub mod verification;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::agent::{Agent, AgentConfig, AgentOutcome, TaskResult};
use crate::domain::{FileSet, Task};
use crate::llm::{CompletionRequest, LlmClient, Message, ToolChoice};
use crate::session::{Event, EventBus, EventType};
use crate::tier::ModelTier;
use crate::tools::{ToolContext, ToolExecutor};

pub use verification::{VerificationReport, VerificationThresholds};

/// Find the first balanced `{...}` object in `text`, tolerating prose or
/// a markdown fence around it. Every JSON-schema LLM call in this module
/// (task-type classification aside, which wants a single word) is parsed
/// through this.
pub(crate) fn extract_json(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        let c = b as char;
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..=i].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Which of the three execution programs a task runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Simple,
    Research,
    Complex,
}

const CLASSIFY_PROMPT: &str = "Classify the following task as exactly one word: simple, research, or complex.\n\
`simple` is a narrow lookup answerable in a handful of tool calls. `research` requires gathering and \
synthesizing several independent pieces of evidence. `complex` requires breaking the task into \
independent subtasks, possibly reordering or dropping some as work proceeds. Output ONLY that word.";

/// Classify a task via one small-tier, no-tools LLM call. Defaults to
/// `Research` on an unrecognized answer or a failed call: it is the
/// middle path, neither as shallow as `Simple` nor as structurally
/// committed as `Complex`.
async fn classify_task_type(llm: &dyn LlmClient, request: &str) -> TaskType {
    let req = CompletionRequest {
        system_prompt: CLASSIFY_PROMPT.to_string(),
        messages: vec![Message::user(request.to_string())],
        tools: vec![],
        max_tokens: 8,
        tool_choice: ToolChoice::None,
    };
    match llm.complete(req).await {
        Ok(response) => match response.content.as_deref().map(str::trim).map(str::to_lowercase).as_deref() {
            Some("simple") => TaskType::Simple,
            Some("complex") => TaskType::Complex,
            _ => TaskType::Research,
        },
        Err(err) => {
            warn!(error = %err, "orchestrator: task-type classification failed, defaulting to research");
            TaskType::Research
        }
    }
}

/// Configuration for every execution program the orchestrator can run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Base agent config every spawned Agent starts from.
    pub agent_config: AgentConfig,
    pub simple_iteration_cap: u32,
    pub simple_min_answer_len: usize,
    pub research_min_subtasks: u32,
    pub research_max_subtasks: u32,
    pub research_early_stop_confidence: f64,
    pub research_max_improvement_rounds: u32,
    pub research_max_gap_fill_subtasks: u32,
    pub verify_research: bool,
    pub verification_thresholds: VerificationThresholds,
    pub complex_consecutive_failure_threshold: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            agent_config: AgentConfig::default(),
            simple_iteration_cap: 5,
            simple_min_answer_len: 100,
            research_min_subtasks: 2,
            research_max_subtasks: 4,
            research_early_stop_confidence: 0.8,
            research_max_improvement_rounds: 2,
            research_max_gap_fill_subtasks: 3,
            verify_research: true,
            verification_thresholds: VerificationThresholds::default(),
            complex_consecutive_failure_threshold: 2,
        }
    }
}

/// Everything the orchestrator produced for one top-level task.
#[derive(Debug, Clone)]
pub struct OrchestratorResult {
    pub task_type: TaskType,
    pub result: TaskResult,
    pub subtask_results: Vec<TaskResult>,
    pub verification: Option<VerificationReport>,
}

/// A question an Agent raised mid-run via `onAskOrchestrator`.
#[derive(Debug, Clone)]
pub struct AskRequest {
    pub question: String,
    pub reason: String,
    pub context: String,
    pub iteration: u32,
    pub subtask: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AskAction {
    Continue,
    Skip,
    RetryWithHint,
}

#[derive(Debug, Clone, Deserialize)]
struct RawAskResponse {
    answer: String,
    action: String,
    #[serde(default)]
    hint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AskResponse {
    pub answer: String,
    pub action: AskAction,
    pub hint: Option<String>,
}

/// Decision a decomposition LLM call returned for a `Complex` task.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DecompositionOutput {
    #[serde(default)]
    should_decompose: bool,
    #[serde(default)]
    subtasks: Vec<String>,
    #[serde(default)]
    #[allow(dead_code)]
    estimated_iterations: Option<u32>,
}

const DECOMPOSE_PROMPT: &str = "Decide whether the following task should be broken into independent subtasks. \
Respond with ONLY a JSON object of the shape:\n\
{\"shouldDecompose\": bool, \"subtasks\": [string], \"estimatedIterations\": number}\n\
If the task is already a single coherent unit of work, set shouldDecompose to false and leave subtasks empty.";

const SUBPLAN_PROMPT: &str = "Generate a research sub-plan for the following task: 2 to 4 subtasks, each a \
self-contained question whose answer contributes evidence toward the overall task. Respond with ONLY a JSON \
object of the shape: {\"subtasks\": [string]}";

const EARLY_STOP_PROMPT: &str = "Given the task and the findings gathered so far, judge whether enough evidence \
has been gathered to stop early. Respond with ONLY a JSON object: {\"confidence\": 0.0-1.0, \"reasoning\": string}";

const REORDER_PROMPT: &str = "Two or more consecutive subtasks have failed. Decide how to proceed: \
\"skip\" the failing subtask and move on, \"reorder\" the remaining subtasks to try a different one next, or \
\"continue\" retrying the same subtask. Respond with ONLY a JSON object: \
{\"decision\": \"skip\"|\"reorder\"|\"continue\", \"reasoning\": string}";

#[derive(Debug, Clone, Deserialize)]
struct EarlyStopOutput {
    confidence: f64,
    #[serde(default)]
    #[allow(dead_code)]
    reasoning: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ReorderOutput {
    decision: String,
    #[serde(default)]
    #[allow(dead_code)]
    reasoning: String,
}

fn failed_task_result(task_id: String, err: eyre::Report) -> TaskResult {
    TaskResult {
        task_id,
        outcome: AgentOutcome::Failed { reason: err.to_string() },
        answer: None,
        artifacts: Vec::new(),
        files: FileSet::new(),
        iterations: 0,
        tokens_used: 0,
        tier_escalations: Vec::new(),
        quality: None,
    }
}

fn is_successful(result: &TaskResult) -> bool {
    matches!(result.outcome, AgentOutcome::Success | AgentOutcome::Partial)
}

/// Binds one orchestration run to its LLM, tool stack, and event sink, and
/// drives the simple/research/complex execution programs over however
/// many `Agent`s that requires.
pub struct Orchestrator {
    llm: Arc<dyn LlmClient>,
    tool_executor: Arc<ToolExecutor>,
    tool_ctx: ToolContext,
    config: OrchestratorConfig,
    events: EventBus,
    session_id: String,
    /// Id of the Agent currently running a subtask, if any. Subtasks run
    /// sequentially, so at most one entry is ever active.
    active_agent_id: Option<String>,
    /// Corrections injected before their target agent started running.
    pending_corrections: Vec<(Option<String>, String)>,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        tool_executor: Arc<ToolExecutor>,
        tool_ctx: ToolContext,
        config: OrchestratorConfig,
        events: EventBus,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            tool_executor,
            tool_ctx,
            config,
            events,
            session_id: session_id.into(),
            active_agent_id: None,
            pending_corrections: Vec::new(),
        }
    }

    async fn emit(&self, event_type: EventType, agent_id: Option<&str>, data: serde_json::Value) {
        let mut event = Event::new(event_type, self.session_id.clone()).with_data(data);
        if let Some(agent_id) = agent_id {
            event = event.with_agent(agent_id);
        }
        self.events.emit(event).await;
    }

    async fn complete_json<T: for<'de> Deserialize<'de>>(&self, system_prompt: &str, body: String, max_tokens: u32) -> eyre::Result<T> {
        let request = CompletionRequest {
            system_prompt: system_prompt.to_string(),
            messages: vec![Message::user(body)],
            tools: vec![],
            max_tokens,
            tool_choice: ToolChoice::None,
        };
        let response = self.llm.complete(request).await?;
        let content = response.content.unwrap_or_default();
        let json = extract_json(&content).ok_or_else(|| eyre::eyre!("orchestrator: response contained no JSON object"))?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Run one subtask to completion as its own Agent. Injects any queued
    /// corrections addressed to it (or broadcast), and records it as the
    /// currently active agent for the duration of the run.
    async fn run_subtask(&mut self, request: impl Into<String>, extra_context: &[String]) -> TaskResult {
        let task = Task::new(request);
        let mut agent = Agent::new(
            task.clone(),
            self.llm.clone(),
            self.tool_executor.clone(),
            self.tool_ctx.clone(),
            self.config.agent_config.clone(),
            self.events.clone(),
            self.session_id.clone(),
        );
        for ctx in extra_context {
            agent.inject_user_context(ctx.clone());
        }
        for message in self.drain_corrections_for(&task.id) {
            agent.inject_user_context(message);
        }

        self.active_agent_id = Some(task.id.clone());
        self.emit(EventType::SubtaskStart, Some(&task.id), serde_json::json!({"request": task.request})).await;

        let result = match agent.run_with_escalation().await {
            Ok(result) => result,
            Err(err) => failed_task_result(task.id.clone(), err),
        };

        self.emit(
            EventType::SubtaskEnd,
            Some(&task.id),
            serde_json::json!({"outcome": format!("{:?}", result.outcome), "iterations": result.iterations}),
        )
        .await;
        self.active_agent_id = None;
        result
    }

    /// Drain corrections matching `agent_id` or addressed to everyone.
    fn drain_corrections_for(&mut self, agent_id: &str) -> Vec<String> {
        let (mine, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending_corrections)
            .into_iter()
            .partition(|(target, _)| target.as_deref().map_or(true, |t| t == agent_id));
        self.pending_corrections = rest;
        mine.into_iter().map(|(_, message)| message).collect()
    }

    /// Route a correction to one, some, or all running agents. Since this
    /// orchestrator runs subtasks sequentially,
    /// "running" reduces to "the one active agent, or whichever agent is
    /// about to run next if none is active yet".
    pub async fn inject_correction(&mut self, message: impl Into<String>, target_agent_id: Option<String>) {
        let message = message.into();
        match (&target_agent_id, &self.active_agent_id) {
            (Some(target), _) => self.pending_corrections.push((Some(target.clone()), message)),
            (None, Some(active)) => self.pending_corrections.push((Some(active.clone()), message)),
            (None, None) => self.pending_corrections.push((None, message)),
        }
    }

    /// Analyse a running Agent's question and decide how it should
    /// proceed.
    pub async fn answer_question(&self, request: AskRequest) -> AskResponse {
        let fallback = AskResponse {
            answer: "Use your best judgement and continue.".to_string(),
            action: AskAction::Continue,
            hint: None,
        };

        let body = format!(
            "Question: {}\nReason: {}\nContext: {}\nIteration: {}\nSubtask: {}\n\n\
             Respond with ONLY a JSON object of the shape: \
             {{\"answer\": string, \"action\": \"continue\"|\"skip\"|\"retry_with_hint\", \"hint\": string|null}}",
            request.question,
            request.reason,
            request.context,
            request.iteration,
            request.subtask.as_deref().unwrap_or("(none)"),
        );

        let raw: eyre::Result<RawAskResponse> = self
            .complete_json("You are an orchestrator resolving a subordinate agent's question.", body, 512)
            .await;
        let raw = match raw {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "orchestrator: answer_question call failed, using fallback");
                return fallback;
            }
        };

        let action = match raw.action.as_str() {
            "skip" => AskAction::Skip,
            "retry_with_hint" => AskAction::RetryWithHint,
            _ => AskAction::Continue,
        };
        AskResponse { answer: raw.answer, action, hint: raw.hint }
    }

    /// Classify `task` and run the matching execution program.
    pub async fn run(&mut self, task: Task) -> eyre::Result<OrchestratorResult> {
        self.emit(EventType::OrchestratorStart, None, serde_json::json!({"request": task.request})).await;
        let task_type = classify_task_type(self.llm.as_ref(), &task.request).await;
        info!(task_id = %task.id, ?task_type, "Orchestrator: classified task");

        let mut subtask_results = Vec::new();
        let (result, verification) = match task_type {
            TaskType::Simple => {
                let simple_result = self.run_simple(&task).await;
                if self.is_inconclusive(&simple_result) {
                    info!(task_id = %task.id, "Orchestrator: simple result inconclusive, escalating to research");
                    let (research_result, research_verification) = self.run_research(&task, &mut subtask_results).await;
                    (research_result, research_verification)
                } else {
                    (simple_result, None)
                }
            }
            TaskType::Research => {
                let (research_result, research_verification) = self.run_research(&task, &mut subtask_results).await;
                (research_result, research_verification)
            }
            TaskType::Complex => {
                let complex_result = self.run_complex(&task, &mut subtask_results).await;
                (complex_result, None)
            }
        };

        self.emit(
            EventType::OrchestratorEnd,
            None,
            serde_json::json!({"taskType": task_type, "outcome": format!("{:?}", result.outcome)}),
        )
        .await;

        Ok(OrchestratorResult { task_type, result, subtask_results, verification })
    }

    /// "Simple": a single Agent at medium tier capped at a handful
    /// of iterations, with tier escalation disabled — the orchestrator's
    /// own simple→research escalation is the fallback if this is
    /// inconclusive, not a per-tier retry of the same narrow question.
    async fn run_simple(&mut self, task: &Task) -> TaskResult {
        let mut config = self.config.agent_config.clone();
        config.start_tier = ModelTier::Medium;
        config.enable_escalation = false;
        config.budget.max_iterations = self.config.simple_iteration_cap;

        let mut agent = Agent::new(
            task.clone(),
            self.llm.clone(),
            self.tool_executor.clone(),
            self.tool_ctx.clone(),
            config,
            self.events.clone(),
            self.session_id.clone(),
        );
        match agent.run_with_escalation().await {
            Ok(result) => result,
            Err(err) => failed_task_result(task.id.clone(), err),
        }
    }

    fn is_inconclusive(&self, result: &TaskResult) -> bool {
        result.iterations >= self.config.simple_iteration_cap
            || result.answer.as_deref().map(str::len).unwrap_or(0) < self.config.simple_min_answer_len
            || !is_successful(result)
    }

    /// "Research": decompose, execute sequentially with accumulated
    /// findings as context, allow early stop, synthesize, optionally
    /// verify and improve.
    async fn run_research(&mut self, task: &Task, subtask_results: &mut Vec<TaskResult>) -> (TaskResult, Option<VerificationReport>) {
        let subplan = self.generate_research_subplan(&task.request).await;
        self.emit(EventType::OrchestratorPlan, None, serde_json::json!({"subtasks": subplan})).await;

        let mut findings: Vec<String> = Vec::new();
        for subtask_request in &subplan {
            let context = vec![format!("Accumulated findings so far:\n{}", findings.join("\n\n"))];
            let result = self.run_subtask(subtask_request.clone(), if findings.is_empty() { &[] } else { &context }).await;
            if let Some(answer) = &result.answer {
                findings.push(answer.clone());
            }
            let finished = subtask_results.len() + 1 == subplan.len();
            subtask_results.push(result);

            if !finished && self.should_stop_research_early(&task.request, &findings).await {
                info!(task_id = %task.id, "Orchestrator: research early-stop threshold reached");
                break;
            }
        }

        let mut answer = self.synthesize_research_answer(&task.request, &findings).await;
        let mut verification = None;

        if self.config.verify_research {
            for round in 0..=self.config.research_max_improvement_rounds {
                let report = match verification::verify(self.llm.as_ref(), &task.request, &answer, &findings).await {
                    Ok(report) => report,
                    Err(err) => {
                        warn!(error = %err, "orchestrator: verification call failed, accepting answer as-is");
                        break;
                    }
                };
                let passes = report.passes(&self.config.verification_thresholds);
                verification = Some(report.clone());
                if passes || round == self.config.research_max_improvement_rounds {
                    break;
                }

                info!(task_id = %task.id, round, "Orchestrator: verification below threshold, improving");
                if !report.gaps.is_empty() {
                    let gap_subtasks: Vec<_> = report.gaps.iter().take(self.config.research_max_gap_fill_subtasks as usize).cloned().collect();
                    for gap in &gap_subtasks {
                        let result = self.run_subtask(gap.clone(), &[]).await;
                        if let Some(gap_answer) = &result.answer {
                            findings.push(gap_answer.clone());
                        }
                        subtask_results.push(result);
                    }
                } else if !report.unverified_mentions.is_empty() {
                    findings.push(format!(
                        "Do not repeat these unverified claims: {}",
                        report.unverified_mentions.join("; ")
                    ));
                } else {
                    findings.push(format!("Low-confidence guidance: {}", report.reasoning));
                }
                answer = self.synthesize_research_answer(&task.request, &findings).await;
            }
        }

        let files = subtask_results.iter().fold(FileSet::new(), |mut acc, r| {
            acc.merge(&r.files);
            acc
        });
        let result = TaskResult {
            task_id: task.id.clone(),
            outcome: AgentOutcome::Success,
            answer: Some(answer),
            artifacts: Vec::new(),
            files,
            iterations: subtask_results.iter().map(|r| r.iterations).sum(),
            tokens_used: subtask_results.iter().map(|r| r.tokens_used).sum(),
            tier_escalations: subtask_results.iter().flat_map(|r| r.tier_escalations.clone()).collect(),
            quality: None,
        };
        (result, verification)
    }

    async fn generate_research_subplan(&self, request: &str) -> Vec<String> {
        #[derive(Deserialize)]
        struct SubPlan {
            #[serde(default)]
            subtasks: Vec<String>,
        }
        let body = format!("Task: {request}");
        match self.complete_json::<SubPlan>(SUBPLAN_PROMPT, body, 512).await {
            Ok(plan) if plan.subtasks.len() >= self.config.research_min_subtasks as usize => {
                plan.subtasks.into_iter().take(self.config.research_max_subtasks as usize).collect()
            }
            Ok(_) | Err(_) => vec![request.to_string()],
        }
    }

    async fn should_stop_research_early(&self, request: &str, findings: &[String]) -> bool {
        let body = format!("Task: {request}\n\nFindings so far:\n{}", findings.join("\n\n"));
        match self.complete_json::<EarlyStopOutput>(EARLY_STOP_PROMPT, body, 256).await {
            Ok(output) => output.confidence >= self.config.research_early_stop_confidence,
            Err(_) => false,
        }
    }

    async fn synthesize_research_answer(&self, request: &str, findings: &[String]) -> String {
        let body = format!(
            "Task: {request}\n\nSynthesize a final answer from these findings:\n{}",
            findings
                .iter()
                .enumerate()
                .map(|(i, f)| format!("{}. {f}", i + 1))
                .collect::<Vec<_>>()
                .join("\n")
        );
        let request = CompletionRequest {
            system_prompt: "You are synthesizing a final answer from independently gathered research findings. \
                             Be concise and cite the findings that support each claim."
                .to_string(),
            messages: vec![Message::user(body)],
            tools: vec![],
            max_tokens: 2048,
            tool_choice: ToolChoice::None,
        };
        match self.llm.complete(request).await {
            Ok(response) => response.content.unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "orchestrator: synthesis call failed, falling back to a joined findings list");
                findings.join("\n\n")
            }
        }
    }

    /// "Complex": a decomposition decision tool either says the task
    /// is already atomic (run as a single Agent) or yields subtasks to
    /// execute sequentially, with failure-driven skip/reorder/continue
    /// decisions and adaptive necessity checks after each one.
    async fn run_complex(&mut self, task: &Task, subtask_results: &mut Vec<TaskResult>) -> TaskResult {
        let decision = self.decide_decomposition(&task.request).await;
        if !decision.should_decompose || decision.subtasks.is_empty() {
            return self.run_subtask(task.request.clone(), &[]).await;
        }

        let mut remaining: std::collections::VecDeque<String> = decision.subtasks.into_iter().collect();
        let mut consecutive_failures = 0u32;

        while let Some(subtask_request) = remaining.pop_front() {
            let result = self.run_subtask(subtask_request, &[]).await;
            let succeeded = is_successful(&result);
            subtask_results.push(result);

            if succeeded {
                consecutive_failures = 0;
            } else {
                consecutive_failures += 1;
            }

            if consecutive_failures >= self.config.complex_consecutive_failure_threshold {
                let decision = self.decide_reorder(&task.request).await;
                self.emit(
                    EventType::OrchestratorPlan,
                    None,
                    serde_json::json!({"planUpdate": decision, "remaining": remaining.len()}),
                )
                .await;
                match decision.as_str() {
                    "skip" => {
                        consecutive_failures = 0;
                    }
                    "reorder" => {
                        if let Some(next) = remaining.pop_front() {
                            remaining.push_back(next);
                        }
                        consecutive_failures = 0;
                    }
                    _ => {}
                }
            }

            if !remaining.is_empty() && !self.subtasks_still_necessary(&task.request, subtask_results).await {
                info!(task_id = %task.id, "Orchestrator: remaining subtasks judged no longer necessary");
                break;
            }
        }

        let files = subtask_results.iter().fold(FileSet::new(), |mut acc, r| {
            acc.merge(&r.files);
            acc
        });
        let any_success = subtask_results.iter().any(is_successful);
        TaskResult {
            task_id: task.id.clone(),
            outcome: if any_success { AgentOutcome::Success } else { AgentOutcome::Failed { reason: "all subtasks failed".to_string() } },
            answer: subtask_results.iter().rev().find_map(|r| r.answer.clone()),
            artifacts: subtask_results.iter().flat_map(|r| r.artifacts.clone()).collect(),
            files,
            iterations: subtask_results.iter().map(|r| r.iterations).sum(),
            tokens_used: subtask_results.iter().map(|r| r.tokens_used).sum(),
            tier_escalations: subtask_results.iter().flat_map(|r| r.tier_escalations.clone()).collect(),
            quality: None,
        }
    }

    async fn decide_decomposition(&self, request: &str) -> DecompositionOutput {
        let body = format!("Task: {request}");
        self.complete_json(DECOMPOSE_PROMPT, body, 1024).await.unwrap_or(DecompositionOutput {
            should_decompose: false,
            subtasks: Vec::new(),
            estimated_iterations: None,
        })
    }

    async fn decide_reorder(&self, request: &str) -> String {
        let body = format!("Task: {request}");
        match self.complete_json::<ReorderOutput>(REORDER_PROMPT, body, 256).await {
            Ok(output) => output.decision,
            Err(_) => "continue".to_string(),
        }
    }

    async fn subtasks_still_necessary(&self, request: &str, results_so_far: &[TaskResult]) -> bool {
        let summary: Vec<String> = results_so_far.iter().map(|r| r.answer.clone().unwrap_or_default()).collect();
        let body = format!(
            "Task: {request}\n\nSubtasks completed so far:\n{}\n\nAre the remaining planned subtasks still \
             necessary? Respond with ONLY a JSON object: {{\"necessary\": bool}}",
            summary.join("\n")
        );
        #[derive(Deserialize)]
        struct Necessity {
            necessary: bool,
        }
        match self.complete_json::<Necessity>("You are re-evaluating a running plan.", body, 128).await {
            Ok(n) => n.necessary,
            Err(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::mock::MockLlmClient;
    use crate::llm::{CompletionResponse, StopReason, TokenUsage, ToolCall};
    use tempfile::tempdir;

    fn text_response(text: &str) -> CompletionResponse {
        CompletionResponse {
            content: Some(text.to_string()),
            tool_calls: vec![],
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage::default(),
        }
    }

    fn report_response(answer: &str) -> CompletionResponse {
        CompletionResponse {
            content: None,
            tool_calls: vec![ToolCall {
                id: "call-1".to_string(),
                name: "complete_task".to_string(),
                input: serde_json::json!({"summary": answer, "artifacts": []}),
            }],
            stop_reason: StopReason::ToolUse,
            usage: TokenUsage::default(),
        }
    }

    fn setup(responses: Vec<CompletionResponse>) -> (Orchestrator, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let ctx = ToolContext::new_unsandboxed(dir.path().to_path_buf(), "orch-test".to_string());
        let llm = Arc::new(MockLlmClient::new(responses));
        let executor = Arc::new(ToolExecutor::standard());
        let orchestrator = Orchestrator::new(llm, executor, ctx, OrchestratorConfig::default(), EventBus::new(), "sess-1");
        (orchestrator, dir)
    }

    #[test]
    fn extract_json_finds_a_balanced_object_amid_prose() {
        let text = "Sure, here you go:\n```json\n{\"a\": 1, \"b\": {\"c\": 2}}\n```\nHope that helps.";
        let json = extract_json(text).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["a"], 1);
        assert_eq!(value["b"]["c"], 2);
    }

    #[test]
    fn extract_json_ignores_braces_inside_strings() {
        let text = r#"{"a": "contains a } brace", "b": 2}"#;
        let json = extract_json(text).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["b"], 2);
    }

    #[tokio::test]
    async fn simple_task_below_the_iteration_cap_does_not_escalate() {
        let (mut orch, _dir) = setup(vec![
            text_response("simple"),    // classification
            text_response("action"),    // Agent::infer_intent
            report_response(&"x".repeat(150)), // long enough to be conclusive
        ]);
        let result = orch.run(Task::new("what version is this")).await.unwrap();
        assert_eq!(result.task_type, TaskType::Simple);
        assert!(result.subtask_results.is_empty());
        assert_eq!(result.result.outcome, AgentOutcome::Success);
    }

    #[tokio::test]
    async fn inconclusive_simple_result_escalates_to_research() {
        let (mut orch, _dir) = setup(vec![
            text_response("simple"),  // classification
            text_response("action"),  // Agent::infer_intent for the simple attempt
            report_response("too short"), // short answer -> inconclusive
            text_response("{\"subtasks\": [\"look here\", \"look there\"]}"), // subplan
            text_response("action"),  // infer_intent for subtask 1
            report_response("finding one, plenty of detail to count as evidence"),
            text_response("{\"confidence\": 0.9, \"reasoning\": \"enough\"}"), // early stop
            text_response("final synthesized answer"), // synthesis
        ]);
        orch.config.verify_research = false;
        let result = orch.run(Task::new("investigate the outage")).await.unwrap();
        assert_eq!(result.task_type, TaskType::Simple);
        assert!(!result.subtask_results.is_empty());
        assert_eq!(result.result.answer.as_deref(), Some("final synthesized answer"));
    }

    #[tokio::test]
    async fn complex_task_without_decomposition_runs_as_a_single_agent() {
        let (mut orch, _dir) = setup(vec![
            text_response("complex"), // classification
            text_response("{\"shouldDecompose\": false, \"subtasks\": []}"), // decomposition decision
            text_response("action"),  // infer_intent
            report_response("done in one shot"),
        ]);
        let result = orch.run(Task::new("fix the one failing test")).await.unwrap();
        assert_eq!(result.task_type, TaskType::Complex);
        assert!(result.subtask_results.is_empty());
        assert_eq!(result.result.answer.as_deref(), Some("done in one shot"));
    }

    #[tokio::test]
    async fn answer_question_falls_back_to_continue_on_unparsable_response() {
        let (orch, _dir) = setup(vec![text_response("not json at all")]);
        let response = orch
            .answer_question(AskRequest {
                question: "should I keep going".to_string(),
                reason: "ambiguous result".to_string(),
                context: "".to_string(),
                iteration: 3,
                subtask: None,
            })
            .await;
        assert_eq!(response.action, AskAction::Continue);
    }

    #[tokio::test]
    async fn inject_correction_without_a_target_or_active_agent_is_broadcast() {
        let (mut orch, _dir) = setup(vec![]);
        orch.inject_correction("only touch src/", None).await;
        assert_eq!(orch.pending_corrections.len(), 1);
        assert!(orch.pending_corrections[0].0.is_none());
    }
}
