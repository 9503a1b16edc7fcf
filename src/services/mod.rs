pub mod process;
pub mod workspace;

pub use process::{run_tool, tool_available, RunOptions, ToolError, ToolOutput};
pub use workspace::{TempWorkspace, WorkspaceError};
