use crate::constants::{network, pagination, validation};
use crate::services::circuit_breaker::CircuitBreakerConfig;
use crate::utils::feature_flags::{env_string, env_u64};
use std::path::PathBuf;

/// Process-wide knobs, read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewaySettings {
    pub http_timeout_ms: u64,
    pub max_pages: usize,
    pub max_items: usize,
    pub validation_timeout_ms: u64,
    pub circuit: CircuitBreakerConfig,
    pub store_path: Option<PathBuf>,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            http_timeout_ms: network::TIMEOUT_API_REQUEST_MS,
            max_pages: pagination::MAX_PAGES,
            max_items: pagination::MAX_ITEMS,
            validation_timeout_ms: validation::TIMEOUT_MS,
            circuit: CircuitBreakerConfig::default(),
            store_path: None,
        }
    }
}

impl GatewaySettings {
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Some(ms) = env_u64(&["GATEWAY_HTTP_TIMEOUT_MS"]) {
            settings.http_timeout_ms = ms;
        }
        if let Some(pages) = env_u64(&["GATEWAY_MAX_PAGES"]) {
            settings.max_pages = pages.max(1) as usize;
        }
        if let Some(items) = env_u64(&["GATEWAY_MAX_ITEMS"]) {
            settings.max_items = items.max(1) as usize;
        }
        if let Some(ms) = env_u64(&["GATEWAY_VALIDATION_TIMEOUT_MS"]) {
            settings.validation_timeout_ms = ms;
        }
        if let Some(threshold) = env_u64(&["GATEWAY_CIRCUIT_FAILURE_THRESHOLD"]) {
            settings.circuit.failure_threshold = threshold.max(1) as u32;
        }
        if let Some(ms) = env_u64(&["GATEWAY_CIRCUIT_WINDOW_MS"]) {
            settings.circuit.failure_window_ms = ms;
        }
        if let Some(ms) = env_u64(&["GATEWAY_CIRCUIT_RESET_TIMEOUT_MS"]) {
            settings.circuit.reset_timeout_ms = ms;
        }
        if let Some(count) = env_u64(&["GATEWAY_CIRCUIT_SUCCESS_THRESHOLD"]) {
            settings.circuit.success_threshold = count.max(1) as u32;
        }
        settings.store_path = env_string(&["GATEWAY_STORE_PATH"]).map(PathBuf::from);
        settings
    }

    pub fn with_store_path(mut self, path: Option<PathBuf>) -> Self {
        if path.is_some() {
            self.store_path = path;
        }
        self
    }
}
