use crate::errors::{ToolError, ToolErrorKind};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(i32)]
pub enum ErrorCode {
    RequestTimeout = -32001,
    UpstreamFailure = -32002,
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,
}

impl ErrorCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Clone, Serialize, Error)]
#[error("{message}")]
pub struct McpError {
    pub code: ErrorCode,
    pub message: String,
}

impl McpError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Renders a tool failure as a protocol error, keeping its classification visible.
    pub fn from_tool_error(tool: &str, error: &ToolError) -> Self {
        let mut lines = vec![
            "GatewayError".to_string(),
            format!("tool: {}", tool),
            format!("kind: {:?}", error.kind).to_lowercase(),
            format!("code: {}", error.code),
            format!("retryable: {}", error.retryable),
            format!("message: {}", error.message),
        ];
        if let Some(retry_after) = error.retry_after_ms {
            lines.push(format!("retry_after_ms: {}", retry_after));
        }
        if let Some(hint) = &error.hint {
            lines.push(format!("hint: {}", hint));
        }
        let message = lines.join("\n");
        let code = match error.kind {
            ToolErrorKind::InvalidParams => ErrorCode::InvalidParams,
            ToolErrorKind::NotFound | ToolErrorKind::Conflict => ErrorCode::InvalidRequest,
            ToolErrorKind::Upstream if error.is_timeout() => ErrorCode::RequestTimeout,
            ToolErrorKind::Upstream => ErrorCode::UpstreamFailure,
            ToolErrorKind::Internal => ErrorCode::InternalError,
        };
        McpError::new(code, message)
    }
}
