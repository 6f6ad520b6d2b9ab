use crate::errors::{ErrorCode, McpError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// `tools/call` parameters. A missing or null `arguments` means no arguments.
#[derive(Debug, Deserialize)]
pub struct ToolCallParams {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCallParams {
    pub fn from_params(params: &Value) -> Result<Self, McpError> {
        let params = match params {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };
        let parsed: Self = serde_json::from_value(params).map_err(|err| {
            McpError::new(
                ErrorCode::InvalidParams,
                format!("Invalid tools/call params: {}", err),
            )
        })?;
        if parsed.name.trim().is_empty() {
            return Err(McpError::new(ErrorCode::InvalidParams, "Missing tool name"));
        }
        Ok(parsed)
    }
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(JsonRpcError {
                code: code.as_i32(),
                message: message.into(),
            }),
        }
    }

    pub fn from_error(id: Value, err: McpError) -> Self {
        Self::failure(id, err.code, err.message)
    }
}

/// Decodes one line from the transport. Failures come back as the response
/// to send, carrying the request id whenever it could be read.
pub fn decode_line(line: &str) -> Result<JsonRpcRequest, JsonRpcResponse> {
    let raw: Value = serde_json::from_str(line)
        .map_err(|_| JsonRpcResponse::failure(Value::Null, ErrorCode::ParseError, "Parse error"))?;
    let id = raw.get("id").cloned().unwrap_or(Value::Null);
    let request: JsonRpcRequest = serde_json::from_value(raw)
        .map_err(|_| JsonRpcResponse::failure(id.clone(), ErrorCode::InvalidRequest, "Invalid request"))?;
    if request.jsonrpc != JSONRPC_VERSION {
        return Err(JsonRpcResponse::failure(
            id,
            ErrorCode::InvalidRequest,
            format!("Unsupported jsonrpc version '{}'", request.jsonrpc),
        ));
    }
    Ok(request)
}
