use crate::errors::{ErrorCode, McpError};
use crate::utils::tool_errors::suggest;
use jsonschema::error::{TypeKind, ValidationErrorKind};
use jsonschema::JSONSchema;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

static TOOL_CATALOG: Lazy<Vec<ToolDef>> = Lazy::new(|| {
    let raw = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/tool_catalog.json"));
    match serde_json::from_str(raw) {
        Ok(tools) => tools,
        Err(err) => {
            tracing::error!(error = %err, "tool_catalog.json is not valid JSON");
            Vec::new()
        }
    }
});

static TOOL_VALIDATORS: Lazy<HashMap<String, JSONSchema>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for tool in TOOL_CATALOG.iter() {
        if let Ok(schema) = JSONSchema::compile(&tool.input_schema) {
            map.insert(tool.name.clone(), schema);
        }
    }
    map
});

pub fn tool_catalog() -> &'static Vec<ToolDef> {
    &TOOL_CATALOG
}

pub fn tool_by_name(name: &str) -> Option<&'static ToolDef> {
    TOOL_CATALOG.iter().find(|tool| tool.name == name)
}

/// Checks `args` against the tool's input schema. Tools without a
/// compiled schema pass through.
pub fn validate_tool_args(tool_name: &str, args: &Value) -> Result<(), McpError> {
    let Some(schema) = TOOL_VALIDATORS.get(tool_name) else {
        return Ok(());
    };
    if let Err(errors) = schema.validate(args) {
        let rendered: Vec<String> = errors.take(10).map(|err| render_error(args, &err)).collect();
        let action = args.get("action").and_then(|v| v.as_str());
        let header = match action {
            Some(action) => format!("Invalid arguments for {}:{}", tool_name, action),
            None => format!("Invalid arguments for {}", tool_name),
        };
        let mut lines = vec![header];
        lines.extend(rendered.into_iter().map(|line| format!("- {}", line)));
        return Err(McpError::new(ErrorCode::InvalidParams, lines.join("\n")));
    }
    Ok(())
}

fn render_error(args: &Value, err: &jsonschema::ValidationError<'_>) -> String {
    let pointer = err.instance_path.to_string();
    let location = if pointer.is_empty() {
        "(root)".to_string()
    } else {
        pointer.clone()
    };
    match &err.kind {
        ValidationErrorKind::AdditionalProperties { unexpected } => {
            format!("{}: unknown field(s) {}", location, unexpected.join(", "))
        }
        ValidationErrorKind::Enum { options } => {
            let allowed: Vec<&str> = options
                .as_array()
                .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
                .unwrap_or_default();
            let received = args.pointer(&pointer).and_then(|v| v.as_str()).unwrap_or("");
            let close = suggest(received, &allowed);
            if close.is_empty() {
                format!("{}: expected one of {}", location, allowed.join(", "))
            } else {
                format!(
                    "{}: expected one of {} (did you mean {}?)",
                    location,
                    allowed.join(", "),
                    close.join(", ")
                )
            }
        }
        ValidationErrorKind::Required { property } => {
            let name = property
                .as_str()
                .map(|s| s.to_string())
                .unwrap_or_else(|| property.to_string());
            format!("{}: missing required field '{}'", location, name)
        }
        ValidationErrorKind::Type { kind } => {
            let expected = match kind {
                TypeKind::Single(primitive) => primitive.to_string(),
                TypeKind::Multiple(types) => (*types)
                    .into_iter()
                    .map(|t| t.to_string())
                    .collect::<Vec<_>>()
                    .join(" | "),
            };
            format!("{}: expected {}", location, expected)
        }
        _ => format!("{}: {}", location, err),
    }
}
