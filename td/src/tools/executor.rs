//! ToolExecutor - manages tool execution for a loop

use std::collections::HashMap;

use crate::llm::{ToolCall, ToolDefinition};

use super::builtin::{
    CompleteTaskTool, EditFileTool, FetchTool, GlobTool, GrepTool, ListDirectoryTool, ReadFileTool, RunCommandTool,
    SearchTool, TodoTool, TreeTool, WriteFileTool,
};
use super::{Tool, ToolContext, ToolResult};

/// Manages tool execution for a loop
pub struct ToolExecutor {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolExecutor {
    /// Create executor with standard tools
    pub fn standard() -> Self {
        let mut tools: HashMap<String, Box<dyn Tool>> = HashMap::new();

        // File system tools
        tools.insert("read".into(), Box::new(ReadFileTool));
        tools.insert("write".into(), Box::new(WriteFileTool));
        tools.insert("edit".into(), Box::new(EditFileTool));
        tools.insert("list".into(), Box::new(ListDirectoryTool));
        tools.insert("glob".into(), Box::new(GlobTool));
        tools.insert("grep".into(), Box::new(GrepTool));

        // Command execution
        tools.insert("bash".into(), Box::new(RunCommandTool));

        // New tools
        tools.insert("tree".into(), Box::new(TreeTool));
        tools.insert("todo".into(), Box::new(TodoTool::new()));
        tools.insert("fetch".into(), Box::new(FetchTool::new()));
        tools.insert("search".into(), Box::new(SearchTool));

        // Task completion
        tools.insert("complete_task".into(), Box::new(CompleteTaskTool));

        Self { tools }
    }

    /// Create an empty executor (for testing)
    pub fn empty() -> Self {
        Self { tools: HashMap::new() }
    }

    /// Add a tool to the executor
    pub fn add_tool(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Get tool definitions for LLM
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    /// Get definitions for a subset of tools by name
    pub fn definitions_for(&self, tool_names: &[String]) -> Vec<ToolDefinition> {
        tool_names
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    /// Execute a tool call
    pub async fn execute(&self, tool_call: &ToolCall, ctx: &ToolContext) -> ToolResult {
        match self.tools.get(&tool_call.name) {
            Some(tool) => tool.execute(tool_call.input.clone(), ctx).await,
            None => ToolResult::error(format!("Unknown tool: {}", tool_call.name)),
        }
    }

    /// Execute multiple tool calls
    pub async fn execute_all(&self, tool_calls: &[ToolCall], ctx: &ToolContext) -> Vec<(String, ToolResult)> {
        let mut results = Vec::with_capacity(tool_calls.len());

        for call in tool_calls {
            let result = self.execute(call, ctx).await;
            results.push((call.id.clone(), result));
        }

        results
    }

    /// Check if a tool exists
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Get tool names
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }
}

impl Default for ToolExecutor {
    fn default() -> Self {
        Self::standard()
    }
}
