use crate::constants::network;
use crate::errors::{ExecutionError, ToolError};
use crate::services::logger::Logger;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    /// Header names are lower-cased.
    pub headers: BTreeMap<String, String>,
    pub body: Value,
    pub duration_ms: u64,
    pub truncated: bool,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Short printable prefix of the body, for error messages.
    pub fn preview(&self) -> String {
        let text = match &self.body {
            Value::Null => return String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        text.chars().take(network::ERROR_PREVIEW_CHARS).collect()
    }
}

/// Outbound HTTP seam. Non-2xx responses are returned as `Ok`; only
/// transport-level failures come back as errors.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> Result<RawResponse, ExecutionError>;
}

pub struct ReqwestTransport {
    logger: Logger,
    client: Client,
    max_capture_bytes: usize,
}

impl ReqwestTransport {
    pub fn new(logger: Logger) -> Result<Self, ToolError> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(network::USER_AGENT)
            .build()
            .map_err(|err| ToolError::internal(format!("Failed to build HTTP client: {}", err)))?;
        Ok(Self {
            logger: logger.child("http"),
            client,
            max_capture_bytes: network::MAX_CAPTURE_BYTES,
        })
    }
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> ExecutionError {
    if err.is_timeout() {
        return ExecutionError::timeout("HTTP request timed out");
    }
    if err.is_connect() || err.is_request() || err.is_body() {
        return ExecutionError::network(err.to_string());
    }
    ExecutionError::unknown(err.to_string())
}

fn to_header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, ExecutionError> {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| ExecutionError::unknown(format!("Invalid header name: {}", key)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| ExecutionError::unknown(format!("Invalid header value for {}", key)))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn from_header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for (name, value) in headers {
        if let Ok(text) = value.to_str() {
            out.entry(name.as_str().to_ascii_lowercase())
                .and_modify(|existing: &mut String| {
                    existing.push_str(", ");
                    existing.push_str(text);
                })
                .or_insert_with(|| text.to_string());
        }
    }
    out
}

fn decode_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: OutboundRequest) -> Result<RawResponse, ExecutionError> {
        let method = Method::from_bytes(request.method.to_uppercase().as_bytes())
            .map_err(|_| ExecutionError::unknown(format!("Invalid HTTP method: {}", request.method)))?;
        let mut builder = self
            .client
            .request(method, &request.url)
            .headers(to_header_map(&request.headers)?)
            .timeout(Duration::from_millis(request.timeout_ms));
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let started = Instant::now();
        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let headers = from_header_map(response.headers());

        let mut captured = Vec::new();
        let mut truncated = false;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let remaining = self.max_capture_bytes.saturating_sub(captured.len());
            if chunk.len() > remaining {
                captured.extend_from_slice(&chunk[..remaining]);
                truncated = true;
                break;
            }
            captured.extend_from_slice(&chunk);
        }
        if truncated {
            self.logger.warn(
                "Response body truncated",
                Some(&serde_json::json!({ "url": request.url, "limit": self.max_capture_bytes })),
            );
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        self.logger.debug(
            "HTTP exchange",
            Some(&serde_json::json!({
                "method": request.method,
                "url": request.url,
                "status": status,
                "duration_ms": duration_ms,
            })),
        );
        Ok(RawResponse {
            status,
            headers,
            body: decode_body(&captured),
            duration_ms,
            truncated,
        })
    }
}
