//! Loop execution module
//!
//! The Execution Loop runs the per-iteration state machine: one LLM call,
//! zero or more tool calls, then budget/progress/loop checks before the
//! next iteration. `Iteration` is exactly that unit — one LLM call plus
//! its tool calls — and the loop returns a typed `LoopOutcome` rather than
//! looping on exit codes or throwing for control flow. `validation::run_validation`
//! is kept as the shell-command-with-timeout primitive a `QualityGate`
//! `nextCheck` of "run tests" can invoke.

mod loop_detector;
mod scheduler;
mod validation;

pub use loop_detector::{LoopDetector, ToolCallSignature};
pub use scheduler::{EscalationCheck, ExecutionLoop, ExecutionLoopConfig, LoopOutcome, RunIdentity};
pub use validation::{ValidationResult, run_validation};
