use crate::errors::{ExecutionError, ExecutionErrorCode};
use crate::services::circuit_breaker::CircuitOpenError;
use crate::utils::json_path::PathError;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    InvalidParams,
    NotFound,
    Conflict,
    /// The remote integration failed or is being shielded by its circuit.
    Upstream,
    Internal,
}

/// Failure of a tool call, before any upstream request could produce a
/// pipeline response.
#[derive(Debug, Clone, Serialize, Error)]
#[error("{message}")]
pub struct ToolError {
    pub kind: ToolErrorKind,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl ToolError {
    pub fn new(kind: ToolErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            hint: None,
            details: None,
            retryable: false,
            retry_after_ms: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::InvalidParams, "INVALID_PARAMS", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::NotFound, "NOT_FOUND", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Conflict, "CONFLICT", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Internal, "INTERNAL", message)
    }

    pub fn is_timeout(&self) -> bool {
        self.code == ExecutionErrorCode::Timeout.as_str()
    }
}

impl From<std::io::Error> for ToolError {
    fn from(err: std::io::Error) -> Self {
        ToolError::internal(err.to_string())
    }
}

/// Bad JSONPath input keeps its own code (`INVALID_PATH`, ...).
impl From<PathError> for ToolError {
    fn from(err: PathError) -> Self {
        ToolError::invalid_params(err.to_string())
            .with_code(err.code())
            .with_details(json!({ "path": err.path() }))
    }
}

impl From<ExecutionError> for ToolError {
    fn from(err: ExecutionError) -> Self {
        let mut out = ToolError::new(ToolErrorKind::Upstream, err.code.as_str(), err.message.clone());
        out.retryable = err.retryable;
        out.retry_after_ms = err.retry_after_ms;
        out.details = serde_json::to_value(&err).ok();
        out
    }
}

impl From<CircuitOpenError> for ToolError {
    fn from(err: CircuitOpenError) -> Self {
        ToolError::from(ExecutionError::circuit_open(&err.circuit_id, err.retry_after_ms))
            .with_hint("Wait for the circuit to half-open, or reset it with circuit_reset.")
    }
}
