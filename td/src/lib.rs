//! TaskDaemon - autonomous agent execution runtime
//!
//! TaskDaemon runs one task to completion through a budgeted, tiered
//! execution loop: fresh LLM context each run, progress/search-signal/loop
//! detection guarding against stalls, and a quality gate judging the
//! result. An `Orchestrator` classifies a task simple/research/complex and
//! drives one or more `Agent` runs accordingly, projecting everything that
//! happens into an append-only session event log.
//!
//! # Core Concepts
//!
//! - **Typed outcomes, not exceptions**: the execution loop returns a
//!   `LoopOutcome` enum; nothing throws for control flow.
//! - **Budgets as data**: iteration and token budgets are resolved once at
//!   run start and enforced deterministically.
//! - **State in files**: domain records persist via `taskstore`; session
//!   turns persist via an append-only event log plus snapshot.
//!
//! # Modules
//!
//! - [`agent`] - binds a task, tier, and tool executor to one execution run
//! - [`orchestrator`] - classifies and drives simple/research/complex tasks
//! - [`budget`] - iteration and token budget enforcement
//! - [`progress`] / [`quality`] / [`tier`] / [`reflection`] - run-quality signals
//! - [`r#loop`] - the execution loop and loop detector
//! - [`session`] - event bus, turn assembler, and session store
//! - [`llm`] - LLM client trait and Anthropic/OpenAI implementations
//! - [`tools`] - tool system for file/command operations
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface (reduced surface; no daemon/TUI dispatch)

// Some teacher-inherited modules (state) expose a wider API than the
// execution-scheduler path in this crate currently drives end to end.
#![allow(dead_code)]

pub mod agent;
pub mod budget;
pub mod cli;
pub mod config;
pub mod domain;
pub mod llm;
pub mod mode;
pub mod orchestrator;
pub mod progress;
pub mod quality;
pub mod reflection;
pub mod session;
pub mod state;
pub mod tier;
pub mod tools;

// Note: 'loop' is a reserved keyword, so we use r#loop
#[path = "loop/mod.rs"]
pub mod r#loop;

// Re-export commonly used types
pub use agent::{Agent, AgentConfig, AgentOutcome, TaskResult, TierEscalationRecord};
pub use config::{Config, LlmConfig, SessionConfig};
pub use domain::{
    DomainId, FileSet, Filter, FilterOp, IndexValue, LoopExecution, LoopExecutionStatus, Phase, PhaseStatus, Priority,
    Record, RunPhase, Store, Task, TaskContext,
};
pub use llm::{AnthropicClient, CompletionRequest, CompletionResponse, LlmClient, LlmError};
pub use mode::{Mode, ModeRegistry};
pub use orchestrator::{
    AskAction, AskRequest, AskResponse, Orchestrator, OrchestratorConfig, OrchestratorResult, TaskType,
    VerificationReport, VerificationThresholds,
};
pub use progress::{IterationContext, ProgressStrategy, SystemCapturedProgress};
pub use quality::{QualityInputs, QualityReport, QualityStatus, TaskIntent};
pub use r#loop::{EscalationCheck, ExecutionLoop, ExecutionLoopConfig, LoopDetector, LoopOutcome, ValidationResult, run_validation};
pub use reflection::{ReflectionEngine, ReflectionNote};
pub use session::{
    Event, EventBus, EventSink, EventType, HistoryEntry, HistorySummarizer, SessionStore, Step, Turn, TurnAssembler,
    TurnStatus, TurnType,
};
pub use state::{RecoveryStats, StateCommand, StateError, StateManager, StateResponse, recover, scan_for_recovery};
pub use tier::{EscalationDecision, ModelTier, SmartTieringPolicy, TierDecisionPoint, TierSelector};
pub use tools::{Tool, ToolContext, ToolError, ToolExecutor, ToolResult};
