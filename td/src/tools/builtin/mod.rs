//! Built-in tools for Ralph loops

mod complete_task;
mod edit_file;
mod fetch;
mod glob;
mod grep;
mod list_directory;
mod read_file;
mod run_command;
mod search;
mod todo;
mod tree;
mod write_file;

pub use complete_task::CompleteTaskTool;
pub use edit_file::EditFileTool;
pub use fetch::FetchTool;
pub use glob::GlobTool;
pub use grep::GrepTool;
pub use list_directory::ListDirectoryTool;
pub use read_file::ReadFileTool;
pub use run_command::RunCommandTool;
pub use search::SearchTool;
pub use todo::TodoTool;
pub use tree::TreeTool;
pub use write_file::WriteFileTool;
