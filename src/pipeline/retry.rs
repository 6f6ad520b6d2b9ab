use crate::constants::retry;
use crate::errors::ExecutionError;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    pub enabled: bool,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: f64,
    pub retry_on_status: Vec<u16>,
    pub respect_retry_after: bool,
    pub max_retry_after_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: retry::MAX_ATTEMPTS,
            base_delay_ms: retry::BASE_DELAY_MS,
            max_delay_ms: retry::MAX_DELAY_MS,
            jitter: retry::JITTER,
            retry_on_status: retry::STATUS_CODES.to_vec(),
            respect_retry_after: true,
            max_retry_after_ms: retry::MAX_RETRY_AFTER_MS,
        }
    }
}

fn field<'a>(source: &'a Value, snake: &str, camel: &str) -> Option<&'a Value> {
    source.get(snake).or_else(|| source.get(camel))
}

impl RetryPolicy {
    /// Defaults overlaid with an action's `retry` block. `false` disables
    /// retries outright.
    pub fn from_overrides(source: Option<&Value>) -> Self {
        let mut policy = Self::default();
        let Some(source) = source else {
            return policy;
        };
        if let Some(enabled) = source.as_bool() {
            policy.enabled = enabled;
            return policy;
        }
        if let Some(enabled) = source.get("enabled").and_then(|v| v.as_bool()) {
            policy.enabled = enabled;
        }
        if let Some(attempts) = field(source, "max_attempts", "maxAttempts").and_then(|v| v.as_u64()) {
            policy.max_attempts = attempts.max(1) as u32;
        }
        if let Some(base) = field(source, "base_delay_ms", "baseDelayMs").and_then(|v| v.as_u64()) {
            policy.base_delay_ms = base;
        }
        if let Some(max) = field(source, "max_delay_ms", "maxDelayMs").and_then(|v| v.as_u64()) {
            policy.max_delay_ms = max;
        }
        if let Some(jitter) = source.get("jitter").and_then(|v| v.as_f64()) {
            policy.jitter = jitter.clamp(0.0, 1.0);
        }
        if let Some(codes) = field(source, "retry_on_status", "retryOnStatus").and_then(|v| v.as_array()) {
            policy.retry_on_status = codes
                .iter()
                .filter_map(|v| v.as_u64())
                .map(|v| v as u16)
                .collect();
        }
        if let Some(respect) =
            field(source, "respect_retry_after", "respectRetryAfter").and_then(|v| v.as_bool())
        {
            policy.respect_retry_after = respect;
        }
        if let Some(ceiling) =
            field(source, "max_retry_after_ms", "maxRetryAfterMs").and_then(|v| v.as_u64())
        {
            policy.max_retry_after_ms = ceiling;
        }
        policy
    }

    /// Attempts allowed in total, the first call included.
    pub fn attempts(&self) -> u32 {
        if self.enabled {
            self.max_attempts.max(1)
        } else {
            1
        }
    }

    /// Only retryable classifications qualify; status-bearing errors must
    /// also appear in `retry_on_status`. A Retry-After hint above
    /// `max_retry_after_ms` ends the retries so the caller gets the hint.
    pub fn should_retry(&self, err: &ExecutionError, attempt: u32) -> bool {
        if !self.enabled || !err.retryable || attempt >= self.attempts() {
            return false;
        }
        if self.respect_retry_after
            && err
                .retry_after_ms
                .map(|hint| hint > self.max_retry_after_ms)
                .unwrap_or(false)
        {
            return false;
        }
        match err.status {
            Some(status) => self.retry_on_status.contains(&status),
            None => true,
        }
    }

    /// Backoff before attempt `attempt + 1`; `attempt` starts at 1.
    pub fn delay_ms(&self, attempt: u32, err: Option<&ExecutionError>) -> u64 {
        let exponent = attempt.saturating_sub(1).min(30) as i32;
        let mut delay = (self.base_delay_ms as f64) * 2f64.powi(exponent);
        if delay > self.max_delay_ms as f64 {
            delay = self.max_delay_ms as f64;
        }
        if self.jitter > 0.0 {
            let delta = delay * self.jitter;
            delay = delay - delta + rand::random::<f64>() * delta * 2.0;
        }
        if self.respect_retry_after {
            if let Some(hint) = err.and_then(|e| e.retry_after_ms) {
                let hint = hint.min(self.max_retry_after_ms) as f64;
                if hint > delay {
                    delay = hint;
                }
            }
        }
        delay.max(0.0) as u64
    }
}
