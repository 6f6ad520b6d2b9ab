pub mod engine;
pub mod resolver;

pub use engine::{
    apply_compiled, apply_mappings, CompiledMappingSet, MappingError, MappingErrorCode,
    MappingRequest, MappingResult, MappingStats,
};
pub use resolver::{merge_mappings, MappingResolver};
