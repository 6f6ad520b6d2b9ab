use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Classification of a failed outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionErrorCode {
    NetworkError,
    Timeout,
    RateLimited,
    ServerError,
    ClientError,
    CircuitOpen,
    MaxRetriesExceeded,
    UnknownError,
}

impl ExecutionErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionErrorCode::NetworkError => "NETWORK_ERROR",
            ExecutionErrorCode::Timeout => "TIMEOUT",
            ExecutionErrorCode::RateLimited => "RATE_LIMITED",
            ExecutionErrorCode::ServerError => "SERVER_ERROR",
            ExecutionErrorCode::ClientError => "CLIENT_ERROR",
            ExecutionErrorCode::CircuitOpen => "CIRCUIT_OPEN",
            ExecutionErrorCode::MaxRetriesExceeded => "MAX_RETRIES_EXCEEDED",
            ExecutionErrorCode::UnknownError => "UNKNOWN_ERROR",
        }
    }

    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ExecutionErrorCode::NetworkError
                | ExecutionErrorCode::Timeout
                | ExecutionErrorCode::RateLimited
                | ExecutionErrorCode::ServerError
        )
    }

    pub fn is_timeout(self) -> bool {
        self == ExecutionErrorCode::Timeout
    }

    /// Failures that say something about the health of the target.
    pub fn counts_against_circuit(self) -> bool {
        self.is_retryable()
    }
}

#[derive(Debug, Clone, Error, Serialize)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct ExecutionError {
    pub code: ExecutionErrorCode,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<ExecutionErrorCode>,
}

impl ExecutionError {
    pub fn new(code: ExecutionErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retryable: code.is_retryable(),
            status: None,
            retry_after_ms: None,
            attempts: None,
            cause: None,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ExecutionErrorCode::NetworkError, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ExecutionErrorCode::Timeout, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ExecutionErrorCode::UnknownError, message)
    }

    pub fn circuit_open(circuit_id: &str, retry_after_ms: u64) -> Self {
        let mut err = Self::new(
            ExecutionErrorCode::CircuitOpen,
            format!(
                "Circuit '{}' is open; retry in {}ms",
                circuit_id, retry_after_ms
            ),
        );
        err.retry_after_ms = Some(retry_after_ms);
        err
    }

    /// Wraps the last attempt's error once the retry budget is spent.
    pub fn max_retries_exceeded(last: ExecutionError, attempts: u32) -> Self {
        Self {
            code: ExecutionErrorCode::MaxRetriesExceeded,
            message: format!("Gave up after {} attempts: {}", attempts, last.message),
            retryable: false,
            status: last.status,
            retry_after_ms: last.retry_after_ms,
            attempts: Some(attempts),
            cause: Some(last.code),
        }
    }

    /// Classifies a non-success HTTP status.
    pub fn from_status(status: u16, headers: &BTreeMap<String, String>, preview: &str) -> Self {
        let code = match status {
            408 => ExecutionErrorCode::Timeout,
            429 => ExecutionErrorCode::RateLimited,
            400..=499 => ExecutionErrorCode::ClientError,
            500..=599 => ExecutionErrorCode::ServerError,
            _ => ExecutionErrorCode::UnknownError,
        };
        let message = if preview.is_empty() {
            format!("Upstream responded with status {}", status)
        } else {
            format!("Upstream responded with status {}: {}", status, preview)
        };
        let mut err = Self::new(code, message);
        err.status = Some(status);
        err.retry_after_ms = headers.get("retry-after").and_then(|v| parse_retry_after(v));
        err
    }
}

/// `Retry-After` is either delta-seconds or an HTTP date.
pub fn parse_retry_after(raw: &str) -> Option<u64> {
    let trimmed = raw.trim();
    if let Ok(seconds) = trimmed.parse::<u64>() {
        return Some(seconds.saturating_mul(1000));
    }
    let at = chrono::DateTime::parse_from_rfc2822(trimmed).ok()?;
    let delta = at.timestamp_millis() - chrono::Utc::now().timestamp_millis();
    Some(delta.max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification_sets_retryable() {
        let headers = BTreeMap::new();
        let rate = ExecutionError::from_status(429, &headers, "");
        assert_eq!(rate.code, ExecutionErrorCode::RateLimited);
        assert!(rate.retryable);

        let client = ExecutionError::from_status(404, &headers, "missing");
        assert_eq!(client.code, ExecutionErrorCode::ClientError);
        assert!(!client.retryable);

        let server = ExecutionError::from_status(503, &headers, "");
        assert_eq!(server.code, ExecutionErrorCode::ServerError);
        assert!(server.retryable);
    }

    #[test]
    fn retry_after_seconds_are_converted_to_ms() {
        let mut headers = BTreeMap::new();
        headers.insert("retry-after".to_string(), "7".to_string());
        let err = ExecutionError::from_status(429, &headers, "");
        assert_eq!(err.retry_after_ms, Some(7_000));
    }

    #[test]
    fn circuit_open_is_not_retryable() {
        let err = ExecutionError::circuit_open("stripe", 1200);
        assert!(!err.retryable);
        assert_eq!(err.retry_after_ms, Some(1200));
        assert_eq!(err.code.as_str(), "CIRCUIT_OPEN");
    }

    #[test]
    fn max_retries_keeps_cause_and_hint() {
        let mut last = ExecutionError::from_status(503, &BTreeMap::new(), "");
        last.retry_after_ms = Some(500);
        let err = ExecutionError::max_retries_exceeded(last, 3);
        assert_eq!(err.code, ExecutionErrorCode::MaxRetriesExceeded);
        assert_eq!(err.cause, Some(ExecutionErrorCode::ServerError));
        assert_eq!(err.attempts, Some(3));
        assert_eq!(err.retry_after_ms, Some(500));
        assert!(!err.retryable);
    }
}
