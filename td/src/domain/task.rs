//! Task domain type
//!
//! A task is the immutable unit of work an orchestrator hands to an agent:
//! a string request plus optional structured context. Nothing past
//! construction mutates it — retries, escalation, and re-planning all
//! operate on the same `Task`, never a copy with edited fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use taskstore::now_ms;

use super::id::generate_id;

/// Structured context accompanying a task request: target directory,
/// constraints, and requirements, all optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_directory: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<String>,

    /// Anything else an orchestrator wants to thread through that doesn't
    /// warrant its own field yet.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub extra: Value,
}

impl TaskContext {
    pub fn is_empty(&self) -> bool {
        self.target_directory.is_none() && self.constraints.is_empty() && self.requirements.is_empty() && self.extra.is_null()
    }
}

/// A task: one string request plus optional structured context. Created at
/// orchestrator entry and immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub request: String,
    #[serde(default)]
    pub context: TaskContext,
    pub created_at: i64,
}

impl Task {
    pub fn new(request: impl Into<String>) -> Self {
        let request = request.into();
        Self {
            id: generate_id("task", &request),
            request,
            context: TaskContext::default(),
            created_at: now_ms(),
        }
    }

    pub fn with_context(mut self, context: TaskContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_target_directory(mut self, dir: impl Into<String>) -> Self {
        self.context.target_directory = Some(dir.into());
        self
    }
}
