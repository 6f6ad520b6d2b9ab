mod drift;
mod schema;
mod validator;

pub use drift::{fingerprint, shape_fields, DriftConfig, DriftReportEntry, DriftStatus, DriftTracker};
pub use schema::{compile_schema, CompiledSchema, SchemaKind, SchemaNode, StringFormat};
pub use validator::{
    validate, Severity, ValidationIssue, ValidationIssueCode, ValidationResult, ValidationStats,
};
