pub mod coercion;
pub mod feature_flags;
pub mod fs_atomic;
pub mod json_path;
pub mod link_header;
pub mod template;
pub mod tool_errors;
