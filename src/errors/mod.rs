mod execution_error;
mod mcp_error;
mod tool_error;

pub use execution_error::{parse_retry_after, ExecutionError, ExecutionErrorCode};
pub use mcp_error::{ErrorCode, McpError};
pub use tool_error::{ToolError, ToolErrorKind};
