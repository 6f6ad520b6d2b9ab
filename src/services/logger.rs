use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "error" => LogLevel::Error,
            "warn" | "warning" => LogLevel::Warn,
            "debug" | "trace" => LogLevel::Debug,
            _ => LogLevel::Info,
        }
    }

    pub fn from_env() -> Self {
        std::env::var("LOG_LEVEL")
            .map(|v| Self::parse(&v))
            .unwrap_or(LogLevel::Info)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }

    fn rank(self) -> u8 {
        match self {
            LogLevel::Error => 0,
            LogLevel::Warn => 1,
            LogLevel::Info => 2,
            LogLevel::Debug => 3,
        }
    }

    fn allows(self, other: LogLevel) -> bool {
        other.rank() <= self.rank()
    }
}

#[derive(Debug, Default)]
struct Counters {
    error: AtomicU64,
    warn: AtomicU64,
    info: AtomicU64,
    debug: AtomicU64,
}

/// Component-scoped facade over `tracing`. Children share counters with
/// their parent so `stats()` reflects the whole process.
#[derive(Debug, Clone)]
pub struct Logger {
    context: String,
    level: LogLevel,
    counters: Arc<Counters>,
}

impl Logger {
    pub fn new(context: &str) -> Self {
        Self {
            context: context.to_string(),
            level: LogLevel::from_env(),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn child(&self, suffix: &str) -> Self {
        let context = if suffix.is_empty() {
            self.context.clone()
        } else {
            format!("{}:{}", self.context, suffix)
        };
        Self {
            context,
            level: self.level,
            counters: self.counters.clone(),
        }
    }

    pub fn set_level(&mut self, level: LogLevel) {
        self.level = level;
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    fn log(&self, level: LogLevel, message: &str, meta: Option<&Value>) {
        if !self.level.allows(level) {
            return;
        }
        let counter = match level {
            LogLevel::Error => &self.counters.error,
            LogLevel::Warn => &self.counters.warn,
            LogLevel::Info => &self.counters.info,
            LogLevel::Debug => &self.counters.debug,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        let meta = meta
            .filter(|m| !m.is_null())
            .map(|m| m.to_string())
            .unwrap_or_default();
        let context = self.context.as_str();
        match level {
            LogLevel::Error => tracing::error!(context, meta = %meta, "{}", message),
            LogLevel::Warn => tracing::warn!(context, meta = %meta, "{}", message),
            LogLevel::Info => tracing::info!(context, meta = %meta, "{}", message),
            LogLevel::Debug => tracing::debug!(context, meta = %meta, "{}", message),
        }
    }

    pub fn error(&self, message: &str, meta: Option<&Value>) {
        self.log(LogLevel::Error, message, meta);
    }

    pub fn warn(&self, message: &str, meta: Option<&Value>) {
        self.log(LogLevel::Warn, message, meta);
    }

    pub fn info(&self, message: &str, meta: Option<&Value>) {
        self.log(LogLevel::Info, message, meta);
    }

    pub fn debug(&self, message: &str, meta: Option<&Value>) {
        self.log(LogLevel::Debug, message, meta);
    }

    pub fn stats(&self) -> Value {
        serde_json::json!({
            "level": self.level.as_str(),
            "context": self.context,
            "error": self.counters.error.load(Ordering::Relaxed),
            "warn": self.counters.warn.load(Ordering::Relaxed),
            "info": self.counters.info.load(Ordering::Relaxed),
            "debug": self.counters.debug.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_share_counters_and_extend_context() {
        let mut root = Logger::new("gateway");
        root.set_level(LogLevel::Debug);
        let child = root.child("circuit");
        assert_eq!(child.context(), "gateway:circuit");
        child.warn("opened", None);
        root.debug("tick", None);
        let stats = root.stats();
        assert_eq!(stats["warn"], 1);
        assert_eq!(stats["debug"], 1);
    }

    #[test]
    fn level_filters_counters() {
        let mut logger = Logger::new("gateway");
        logger.set_level(LogLevel::Warn);
        logger.info("skipped", None);
        logger.error("kept", None);
        let stats = logger.stats();
        assert_eq!(stats["info"], 0);
        assert_eq!(stats["error"], 1);
    }
}
