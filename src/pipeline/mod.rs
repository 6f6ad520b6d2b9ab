pub mod mapping;
pub mod orchestrator;
pub mod pagination;
pub mod retry;
pub mod types;
pub mod validation;

pub use orchestrator::{ExecutionRequest, ExecutionResponse, Orchestrator};
