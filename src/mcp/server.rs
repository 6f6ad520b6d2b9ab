use crate::app::App;
use crate::errors::{ErrorCode, McpError, ToolError};
use crate::mcp::catalog::{tool_by_name, tool_catalog, validate_tool_args};
use crate::mcp::protocol::{decode_line, JsonRpcRequest, JsonRpcResponse, ToolCallParams};
use crate::services::settings::GatewaySettings;
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};

const PROTOCOL_VERSION: &str = "2025-06-18";
const SERVER_NAME: &str = "gateway";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct McpServer {
    app: Arc<App>,
}

impl McpServer {
    pub async fn new(settings: GatewaySettings) -> Result<Self, ToolError> {
        let app = App::initialize(settings).await?;
        Ok(Self::with_app(Arc::new(app)))
    }

    pub fn with_app(app: Arc<App>) -> Self {
        Self { app }
    }

    fn handle_initialize(&self) -> Value {
        serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {"tools": {"list": true, "call": true}},
            "serverInfo": {"name": SERVER_NAME, "version": SERVER_VERSION},
        })
    }

    fn handle_tools_list(&self) -> Value {
        serde_json::json!({ "tools": tool_catalog() })
    }

    async fn handle_tools_call(&self, name: &str, raw_args: Value) -> Result<Value, McpError> {
        if tool_by_name(name).is_none() {
            let err = ToolError::invalid_params(format!("Unknown tool: {}", name)).with_hint(
                format!(
                    "Known tools: {}",
                    tool_catalog()
                        .iter()
                        .map(|tool| tool.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            );
            return Err(McpError::from_tool_error(name, &err));
        }
        let args = if raw_args.is_null() {
            Value::Object(Default::default())
        } else {
            raw_args
        };
        validate_tool_args(name, &args)?;

        let envelope = self
            .app
            .tool_executor
            .execute(name, args)
            .await
            .map_err(|err| McpError::from_tool_error(name, &err))?;

        Ok(serde_json::json!({
            "content": [ { "type": "text", "text": serde_json::to_string(&envelope).unwrap_or_else(|_| "{}".to_string()) } ]
        }))
    }

    /// Returns `None` for notifications and other id-less requests.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        match request.method.as_str() {
            "notifications/initialized" => request
                .id
                .map(|id| JsonRpcResponse::success(id, serde_json::json!({}))),
            _ if request.method.starts_with("notifications/") && request.is_notification() => None,
            "initialize" => request
                .id
                .map(|id| JsonRpcResponse::success(id, self.handle_initialize())),
            "tools/list" => request
                .id
                .map(|id| JsonRpcResponse::success(id, self.handle_tools_list())),
            "tools/call" => {
                let id = request.id?;
                let call = match ToolCallParams::from_params(&request.params) {
                    Ok(call) => call,
                    Err(err) => return Some(JsonRpcResponse::from_error(id, err)),
                };
                Some(match self.handle_tools_call(&call.name, call.arguments).await {
                    Ok(result) => JsonRpcResponse::success(id, result),
                    Err(err) => JsonRpcResponse::from_error(id, err),
                })
            }
            _ => request.id.map(|id| {
                JsonRpcResponse::failure(
                    id,
                    ErrorCode::MethodNotFound,
                    format!("Method not found: {}", request.method),
                )
            }),
        }
    }

    pub async fn run_stdio(&self) -> Result<(), ToolError> {
        let stdin = tokio::io::stdin();
        let stdout = tokio::io::stdout();
        let mut reader = BufReader::new(stdin).lines();
        let mut writer = BufWriter::new(stdout);

        self.app.logger.info(
            "Server ready",
            Some(&serde_json::json!({ "protocol": PROTOCOL_VERSION, "version": SERVER_VERSION })),
        );

        while let Some(line) = reader
            .next_line()
            .await
            .map_err(|err| ToolError::internal(err.to_string()))?
        {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let response = match decode_line(trimmed) {
                Ok(request) => self.handle_request(request).await,
                Err(rejected) => Some(rejected),
            };

            if let Some(response) = response {
                let payload = serde_json::to_string(&response).unwrap_or_default();
                writer.write_all(payload.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }

        self.app.logger.info("stdin closed, shutting down", None);
        Ok(())
    }
}

pub async fn run_stdio(settings: GatewaySettings) -> Result<(), ToolError> {
    let server = McpServer::new(settings).await?;
    server.run_stdio().await
}
