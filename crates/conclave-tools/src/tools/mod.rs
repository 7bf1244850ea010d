//! Built-in tool implementations, grouped by the catalog bucket they serve.

mod exec;
mod file;
mod git;
mod net;
mod search;

pub use exec::{ExecutePythonTool, LintCodeTool, RunTestsTool};
pub use file::{ListDirectoryTool, ReadFileTool, SearchFilesTool, WriteFileTool};
pub use git::{GitBranchTool, GitCommitTool, GitDiffTool, GitLogTool, GitStatusTool};
pub use net::{DownloadFileTool, HttpRequestTool, WebSearchTool};
pub use search::CodeSearchTool;

/// Truncate tool output to stay within typical LLM context budgets.
pub(crate) const MAX_OUTPUT_CHARS: usize = 30_000;

pub(crate) fn truncate_output(mut output: String) -> String {
    if output.len() <= MAX_OUTPUT_CHARS {
        return output;
    }
    output.truncate(MAX_OUTPUT_CHARS);
    output.push_str("\n\n... (output truncated — exceeded 30000 character limit)");
    output
}
