//! Agent: binds one `(Task, ModelTier, ToolExecutor, Config)` to one
//! `ExecutionLoop` run.
//!
//! `run_with_escalation` is the outer tier-escalation wrapper around the
//! inner loop: on a budget-exhausted outcome it retries the same task one
//! tier up, strictly forward-only.

use std::sync::Arc;

use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::budget::{BudgetConfig, BudgetController};
use crate::domain::{DomainId, FileSet, Task};
use crate::llm::{CompletionRequest, LlmClient, Message, ToolChoice};
use crate::progress::{ProgressTracker, SearchSignalTracker};
use crate::quality::{self, QualityInputs, QualityReport, TaskIntent};
use crate::r#loop::{EscalationCheck, ExecutionLoop, ExecutionLoopConfig, LoopDetector, LoopOutcome, RunIdentity};
use crate::session::{Event, EventBus, EventType};
use crate::tier::{ModelTier, SmartTieringPolicy, TierSelector};
use crate::tools::{ToolContext, ToolExecutor};

/// System prompt template, rendered once per run via Handlebars.
const SYSTEM_PROMPT_TEMPLATE: &str = "You are an autonomous coding agent. Work on the task below, calling \
tools as needed, then call `complete_task` with a short summary once it is done.\n\nTask: {{task}}\
{{#if constraints}}\n\nConstraints:\n{{#each constraints}}- {{this}}\n{{/each}}{{/if}}\
{{#if requirements}}\n\nRequirements:\n{{#each requirements}}- {{this}}\n{{/each}}{{/if}}";

/// Default tool set offered to an Agent's inner loop.
fn default_tool_names() -> Vec<String> {
    vec![
        "read".to_string(),
        "write".to_string(),
        "edit".to_string(),
        "list".to_string(),
        "glob".to_string(),
        "grep".to_string(),
        "bash".to_string(),
        "tree".to_string(),
        "search".to_string(),
        "fetch".to_string(),
        "complete_task".to_string(),
    ]
}

/// Static configuration for one Agent run, independent of any particular
/// task's content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub tool_names: Vec<String>,
    pub max_tokens: u32,
    pub budget: BudgetConfig,
    pub start_tier: ModelTier,
    pub enable_escalation: bool,
    pub tiering: SmartTieringPolicy,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            tool_names: default_tool_names(),
            max_tokens: 8192,
            budget: BudgetConfig::default(),
            start_tier: ModelTier::Medium,
            enable_escalation: true,
            tiering: SmartTieringPolicy::default(),
        }
    }
}

/// One tier-escalation event, recorded in the order it happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierEscalationRecord {
    pub from: ModelTier,
    pub to: ModelTier,
    pub reason: String,
    pub iteration: u32,
}

/// Final disposition of a `TaskResult`.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentOutcome {
    Success,
    Partial,
    /// The run was stopped by an external abort signal rather than
    /// reaching a success, partial, or failure outcome on its own.
    Stopped,
    Failed { reason: String },
}

/// Everything an orchestrator needs to know about one finished Agent run.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub task_id: String,
    pub outcome: AgentOutcome,
    pub answer: Option<String>,
    pub artifacts: Vec<String>,
    pub files: FileSet,
    pub iterations: u32,
    pub tokens_used: u64,
    pub tier_escalations: Vec<TierEscalationRecord>,
    pub quality: Option<QualityReport>,
}

/// Binds one task to one model tier and drives it through the execution
/// loop, escalating tier on request.
pub struct Agent {
    task: Task,
    llm: Arc<dyn LlmClient>,
    tool_executor: Arc<ToolExecutor>,
    tool_ctx: ToolContext,
    config: AgentConfig,
    current_tier: ModelTier,
    injected_context: Vec<String>,
    events: EventBus,
    session_id: String,
}

impl Agent {
    pub fn new(
        task: Task,
        llm: Arc<dyn LlmClient>,
        tool_executor: Arc<ToolExecutor>,
        tool_ctx: ToolContext,
        config: AgentConfig,
        events: EventBus,
        session_id: impl Into<String>,
    ) -> Self {
        let current_tier = config.start_tier;
        Self {
            task,
            llm,
            tool_executor,
            tool_ctx,
            config,
            current_tier,
            injected_context: Vec::new(),
            events,
            session_id: session_id.into(),
        }
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn current_tier(&self) -> ModelTier {
        self.current_tier
    }

    /// Append a message to be prepended to the next LLM call, without
    /// waiting for the model to ask for it.
    pub fn inject_user_context(&mut self, msg: impl Into<String>) {
        self.injected_context.push(msg.into());
    }

    /// Create a child Agent sharing this agent's LLM client, tool
    /// executor, config, and event bus. The caller drives the child to
    /// completion and tags its `TaskResult` with a synthetic subtask id.
    pub fn spawn_agent(&self, request: impl Into<String>) -> Agent {
        Agent::new(
            Task::new(request),
            self.llm.clone(),
            self.tool_executor.clone(),
            self.tool_ctx.clone(),
            self.config.clone(),
            self.events.clone(),
            self.session_id.clone(),
        )
    }

    /// Classify this task as `action`, `discovery`, or `analysis` via one
    /// small-tier, no-tools LLM call. Defaults to `Action` on failure — an
    /// unrecognized task is safer treated as one expected to touch files
    /// than silently exempted from that quality check.
    pub async fn infer_intent(&self) -> TaskIntent {
        let request = CompletionRequest {
            system_prompt: "Classify the following task as exactly one word: action, discovery, or analysis. \
                             Output ONLY that word."
                .to_string(),
            messages: vec![Message::user(self.task.request.clone())],
            tools: vec![],
            max_tokens: 8,
            tool_choice: ToolChoice::None,
        };
        match self.llm.complete(request).await {
            Ok(response) => match response.content.as_deref().map(str::trim).map(str::to_lowercase).as_deref() {
                Some("discovery") => TaskIntent::Discovery,
                Some("analysis") => TaskIntent::Analysis,
                _ => TaskIntent::Action,
            },
            Err(e) => {
                warn!(error = %e, "Agent::infer_intent: classification call failed, defaulting to action");
                TaskIntent::Action
            }
        }
    }

    fn build_system_prompt(&self) -> String {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(false);
        registry
            .register_template_string("system_prompt", SYSTEM_PROMPT_TEMPLATE)
            .expect("system prompt template is a fixed, valid Handlebars string");
        let context = json!({
            "task": self.task.request,
            "constraints": self.task.context.constraints,
            "requirements": self.task.context.requirements,
        });
        registry
            .render("system_prompt", &context)
            .expect("system prompt context matches the template's fields")
    }

    fn build_initial_prompt(&self) -> String {
        match &self.task.context.target_directory {
            Some(dir) => format!("{}\n\nTarget directory: {dir}", self.task.request),
            None => self.task.request.clone(),
        }
    }

    fn make_escalation_check(&self) -> EscalationCheck {
        let selector = TierSelector::new(self.config.tiering.clone(), self.current_tier);
        let current_tier = self.current_tier;
        Box::new(move |budget: &BudgetController, progress: &ProgressTracker| {
            let decision = selector.evaluate_escalation_need(current_tier, budget, progress);
            if decision.should_escalate { decision.reason } else { None }
        })
    }

    async fn emit(&self, event_type: EventType, data: serde_json::Value) {
        let event = Event::new(event_type, self.session_id.clone()).with_data(data);
        self.events.emit(event).await;
    }

    async fn emit_agent_end(&self, agent_id: &str, started_at: i64, data: serde_json::Value) {
        let event = Event::new(EventType::AgentEnd, self.session_id.clone())
            .with_agent(agent_id.to_string())
            .with_started_at(started_at)
            .with_data(data);
        self.events.emit(event).await;
    }

    /// Run one `ExecutionLoop` at the agent's current tier to a terminal
    /// outcome. Does not retry at a different tier — see
    /// [`Agent::run_with_escalation`] for that. Each call gets a fresh
    /// `run_id`/`agent_id` so a tier-escalation retry's turn never
    /// collides with the attempt before it.
    async fn run_once(&mut self, intent: TaskIntent) -> eyre::Result<(LoopOutcome, u32, u64, FileSet, u32, u32, u32)> {
        let mut loop_config = ExecutionLoopConfig::new(self.build_system_prompt(), self.config.tool_names.clone());
        loop_config.max_tokens = self.config.max_tokens;
        loop_config.task_intent = intent;
        if let Some(token_budget) = &self.config.budget.token_budget {
            loop_config.force_synthesis_on_hard_limit = token_budget.force_synthesis_on_hard_limit;
        }

        let run_id = DomainId::new("run", &self.task.request).as_str().to_string();
        let agent_id = DomainId::new("agent", &self.task.request).as_str().to_string();
        let identity = RunIdentity {
            events: self.events.clone(),
            session_id: self.session_id.clone(),
            run_id: run_id.clone(),
            agent_id: agent_id.clone(),
        };

        let started_at = taskstore::now_ms();
        let start_event = Event::new(EventType::AgentStart, self.session_id.clone())
            .with_run(run_id.clone())
            .with_agent(agent_id.clone())
            .with_data(json!({"tier": self.current_tier, "taskId": self.task.id}));
        self.events.emit(start_event).await;

        let mut run_loop = ExecutionLoop::new(
            self.llm.clone(),
            self.tool_executor.clone(),
            self.tool_ctx.clone(),
            loop_config,
            self.build_initial_prompt(),
            identity,
        );
        for msg in &self.injected_context {
            run_loop.inject_user_context(msg.clone());
        }
        if self.config.enable_escalation {
            run_loop.set_escalation_check(self.make_escalation_check());
        }

        let mut budget = BudgetController::new(&self.config.budget);
        let mut progress = ProgressTracker::new();
        let mut search_signal = SearchSignalTracker::new(None);
        let mut detector = LoopDetector::default();

        let outcome = run_loop.run(&mut budget, &mut progress, &mut search_signal, &mut detector).await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                let error_event = Event::new(EventType::AgentError, self.session_id.clone())
                    .with_run(run_id.clone())
                    .with_agent(agent_id.clone())
                    .with_data(json!({"message": e.to_string()}));
                self.events.emit(error_event).await;
                return Err(e);
            }
        };

        self.emit_agent_end(
            &agent_id,
            started_at,
            json!({"stopped": matches!(outcome, LoopOutcome::Abort)}),
        )
        .await;

        Ok((
            outcome,
            run_loop.iterations_run(),
            budget.tokens_used(),
            run_loop.files_touched().clone(),
            run_loop.tool_calls_total(),
            run_loop.tool_error_count(),
            search_signal.hits(),
        ))
    }

    /// Drive the task to completion, escalating to the next model tier on
    /// a non-success or `escalate` outcome: advance
    /// `small -> medium -> large`, emit at most one escalation record per
    /// tier, and return whatever the `large` tier produces even if it is
    /// itself a failure. An abort is never escalated — it stops the run
    /// outright with a dedicated `Stopped` outcome.
    pub async fn run_with_escalation(&mut self) -> eyre::Result<TaskResult> {
        let intent = self.infer_intent().await;
        let mut escalations = Vec::new();

        loop {
            let started_tier = self.current_tier;
            info!(task_id = %self.task.id, tier = %started_tier, "Agent: starting run");

            let (outcome, iterations, tokens_used, files, tool_calls_total, tool_error_count, search_signal_hits) =
                self.run_once(intent).await?;

            if matches!(outcome, LoopOutcome::Abort) {
                return Ok(self.stopped_result(iterations, tokens_used, files, escalations));
            }

            let (is_terminal_success, failure_reason, escalate_reason) = match &outcome {
                LoopOutcome::ReportComplete { .. } => (true, None, None),
                LoopOutcome::NoToolCalls { .. } => (true, None, None),
                LoopOutcome::SearchConcluded { .. } => (true, None, None),
                LoopOutcome::HardTokenLimit { synthesized_answer: Some(_) } => (true, None, None),
                LoopOutcome::Escalate { reason } => (false, None, Some(reason.clone())),
                LoopOutcome::LoopDetected => (false, Some("loop detected".to_string()), None),
                LoopOutcome::MaxIterations => (false, Some("max iterations exhausted".to_string()), None),
                LoopOutcome::HardTokenLimit { synthesized_answer: None } => {
                    (false, Some("hard token limit with forced synthesis disabled".to_string()), None)
                }
                LoopOutcome::Abort => unreachable!("handled above"),
            };

            let should_escalate = self.config.enable_escalation
                && !is_terminal_success
                && self.current_tier.next().is_some();

            if should_escalate {
                let to = self.current_tier.next().expect("checked is_some above");
                let reason = escalate_reason.unwrap_or_else(|| {
                    failure_reason.clone().unwrap_or_else(|| "non-success outcome".to_string())
                });
                self.emit(
                    EventType::TierEscalation,
                    json!({"from": started_tier, "to": to, "reason": reason, "iteration": iterations}),
                )
                .await;
                escalations.push(TierEscalationRecord {
                    from: started_tier,
                    to,
                    reason,
                    iteration: iterations,
                });
                warn!(task_id = %self.task.id, from = %started_tier, %to, "Agent: escalating tier");
                self.current_tier = to;
                continue;
            }

            return Ok(self.finalize(
                outcome,
                iterations,
                tokens_used,
                files,
                tool_calls_total,
                tool_error_count,
                search_signal_hits,
                intent,
                escalations,
                failure_reason,
            ));
        }
    }

    /// Build the dedicated `Stopped` result for an aborted run. Quality
    /// scoring is skipped — an aborted run was never a candidate for
    /// success or partial credit.
    fn stopped_result(&self, iterations: u32, tokens_used: u64, files: FileSet, tier_escalations: Vec<TierEscalationRecord>) -> TaskResult {
        TaskResult {
            task_id: self.task.id.clone(),
            outcome: AgentOutcome::Stopped,
            answer: Some(format!("Stopped by user after {iterations} iteration(s)")),
            artifacts: Vec::new(),
            files,
            iterations,
            tokens_used,
            tier_escalations,
            quality: None,
        }
    }

    /// Run the quality gate and assemble the final `TaskResult`. Quality
    /// scoring is best-effort: a panic-free, infallible computation, so it
    /// never prevents a result from being returned.
    #[allow(clippy::too_many_arguments)]
    fn finalize(
        &self,
        outcome: LoopOutcome,
        iterations: u32,
        tokens_used: u64,
        files: FileSet,
        tool_calls_total: u32,
        tool_error_count: u32,
        search_signal_hits: u32,
        intent: TaskIntent,
        tier_escalations: Vec<TierEscalationRecord>,
        failure_reason: Option<String>,
    ) -> TaskResult {
        let (answer, artifacts, agent_outcome) = match outcome {
            LoopOutcome::ReportComplete { answer, artifacts } => (Some(answer), artifacts, AgentOutcome::Success),
            LoopOutcome::NoToolCalls { answer } => (answer, Vec::new(), AgentOutcome::Success),
            LoopOutcome::SearchConcluded { summary } => (Some(summary), Vec::new(), AgentOutcome::Success),
            LoopOutcome::HardTokenLimit { synthesized_answer: Some(answer) } => {
                (Some(answer), Vec::new(), AgentOutcome::Partial)
            }
            other => (
                None,
                Vec::new(),
                AgentOutcome::Failed {
                    reason: failure_reason.unwrap_or_else(|| format!("{other:?}")),
                },
            ),
        };

        let quality_inputs = QualityInputs {
            intent,
            file_set: &files,
            tool_calls_total,
            tool_error_count,
            search_signal_hits,
            unmet_ledger_capabilities: Vec::new(),
        };
        let quality_report = quality::evaluate(&quality_inputs);

        let agent_outcome = match (&agent_outcome, quality_report.status) {
            (AgentOutcome::Success, quality::QualityStatus::Partial) => AgentOutcome::Partial,
            (other, _) => other.clone(),
        };

        TaskResult {
            task_id: self.task.id.clone(),
            outcome: agent_outcome,
            answer,
            artifacts,
            files,
            iterations,
            tokens_used,
            tier_escalations,
            quality: Some(quality_report),
        }
    }
}
