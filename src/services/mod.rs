pub mod cache;
pub mod circuit_breaker;
pub mod logger;
pub mod settings;
pub mod tool_executor;
pub mod transport;
pub mod validation;
