//! edit_file tool - find-and-replace a string within a previously-read file

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;

use crate::tools::{Tool, ToolContext, ToolError, ToolResult};

/// Replace an exact string match within a file that has already been read
pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &'static str {
        "edit"
    }

    fn description(&self) -> &'static str {
        "Replace an exact string match in a file. The file must have been read first in this iteration."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to worktree"
                },
                "old_string": {
                    "type": "string",
                    "description": "Exact text to replace"
                },
                "new_string": {
                    "type": "string",
                    "description": "Replacement text"
                },
                "replace_all": {
                    "type": "boolean",
                    "description": "Replace every occurrence instead of requiring exactly one (default: false)",
                    "default": false
                }
            },
            "required": ["path", "old_string", "new_string"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let path = match input["path"].as_str() {
            Some(p) => p,
            None => return ToolResult::error("path is required"),
        };

        let old_string = match input["old_string"].as_str() {
            Some(s) => s,
            None => return ToolResult::error("old_string is required"),
        };

        let new_string = match input["new_string"].as_str() {
            Some(s) => s,
            None => return ToolResult::error("new_string is required"),
        };

        let replace_all = input["replace_all"].as_bool().unwrap_or(false);

        let full_path = match ctx.validate_path(Path::new(path)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        if !ctx.was_read(&full_path).await {
            return ToolResult::error(ToolError::EditWithoutRead { path: path.to_string() }.to_string());
        }

        let content = match tokio::fs::read_to_string(&full_path).await {
            Ok(c) => c,
            Err(e) => return ToolResult::error(format!("Failed to read file: {}", e)),
        };

        let count = content.matches(old_string).count();

        if count == 0 {
            return ToolResult::error(ToolError::PatternNotFound { pattern: old_string.to_string() }.to_string());
        }

        if count > 1 && !replace_all {
            return ToolResult::error(ToolError::PatternNotUnique { count }.to_string());
        }

        let updated = if replace_all {
            content.replace(old_string, new_string)
        } else {
            content.replacen(old_string, new_string, 1)
        };

        if let Err(e) = tokio::fs::write(&full_path, &updated).await {
            return ToolResult::error(format!("Failed to write file: {}", e));
        }

        ctx.track_read(&full_path).await;

        ToolResult::success(format!(
            "Replaced {} occurrence{} in {}",
            if replace_all { count } else { 1 },
            if replace_all && count != 1 { "s" } else { "" },
            path
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    async fn read_and_context(temp: &tempfile::TempDir, name: &str, content: &str) -> ToolContext {
        let file_path = temp.path().join(name);
        fs::write(&file_path, content).unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".to_string());
        ctx.track_read(&file_path).await;
        ctx
    }

    #[tokio::test]
    async fn test_edit_without_read_fails() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("test.txt"), "hello world").unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".to_string());

        let tool = EditFileTool;
        let result = tool
            .execute(
                serde_json::json!({"path": "test.txt", "old_string": "hello", "new_string": "goodbye"}),
                &ctx,
            )
            .await;

        assert!(result.is_error);
        assert!(result.content.contains("Must read file before editing"));
    }

    #[tokio::test]
    async fn test_edit_basic_replace() {
        let temp = tempdir().unwrap();
        let ctx = read_and_context(&temp, "test.txt", "hello world").await;

        let tool = EditFileTool;
        let result = tool
            .execute(
                serde_json::json!({"path": "test.txt", "old_string": "hello", "new_string": "goodbye"}),
                &ctx,
            )
            .await;

        assert!(!result.is_error);
        let content = fs::read_to_string(temp.path().join("test.txt")).unwrap();
        assert_eq!(content, "goodbye world");
    }

    #[tokio::test]
    async fn test_edit_requires_unique_match() {
        let temp = tempdir().unwrap();
        let ctx = read_and_context(&temp, "test.txt", "foo foo foo").await;

        let tool = EditFileTool;
        let result = tool
            .execute(serde_json::json!({"path": "test.txt", "old_string": "foo", "new_string": "bar"}), &ctx)
            .await;

        assert!(result.is_error);
        assert!(result.content.contains("replace_all"));
    }

    #[tokio::test]
    async fn test_edit_replace_all() {
        let temp = tempdir().unwrap();
        let ctx = read_and_context(&temp, "test.txt", "foo foo foo").await;

        let tool = EditFileTool;
        let result = tool
            .execute(
                serde_json::json!({"path": "test.txt", "old_string": "foo", "new_string": "bar", "replace_all": true}),
                &ctx,
            )
            .await;

        assert!(!result.is_error);
        let content = fs::read_to_string(temp.path().join("test.txt")).unwrap();
        assert_eq!(content, "bar bar bar");
    }

    #[tokio::test]
    async fn test_edit_pattern_not_found() {
        let temp = tempdir().unwrap();
        let ctx = read_and_context(&temp, "test.txt", "hello world").await;

        let tool = EditFileTool;
        let result = tool
            .execute(
                serde_json::json!({"path": "test.txt", "old_string": "missing", "new_string": "x"}),
                &ctx,
            )
            .await;

        assert!(result.is_error);
        assert!(result.content.contains("not found in file"));
    }
}
