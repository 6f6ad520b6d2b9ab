use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringFormat {
    Email,
    Uri,
    Uuid,
    DateTime,
    Date,
}

impl StringFormat {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "email" => Some(StringFormat::Email),
            "uri" | "url" => Some(StringFormat::Uri),
            "uuid" => Some(StringFormat::Uuid),
            "date-time" => Some(StringFormat::DateTime),
            "date" => Some(StringFormat::Date),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StringFormat::Email => "email",
            StringFormat::Uri => "uri",
            StringFormat::Uuid => "uuid",
            StringFormat::DateTime => "date-time",
            StringFormat::Date => "date",
        }
    }
}

#[derive(Debug, Clone)]
pub enum SchemaKind {
    Any,
    String {
        min_length: Option<usize>,
        max_length: Option<usize>,
        pattern: Option<Regex>,
        format: Option<StringFormat>,
    },
    Number {
        integer: bool,
        minimum: Option<f64>,
        maximum: Option<f64>,
    },
    Boolean,
    Null,
    Array {
        items: Option<Box<SchemaNode>>,
        min_items: Option<usize>,
        max_items: Option<usize>,
    },
    Object {
        properties: BTreeMap<String, SchemaNode>,
        required: Vec<String>,
    },
}

impl SchemaKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            SchemaKind::Any => "any",
            SchemaKind::String { .. } => "string",
            SchemaKind::Number { integer: true, .. } => "integer",
            SchemaKind::Number { .. } => "number",
            SchemaKind::Boolean => "boolean",
            SchemaKind::Null => "null",
            SchemaKind::Array { .. } => "array",
            SchemaKind::Object { .. } => "object",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchemaNode {
    pub kind: SchemaKind,
    pub nullable: bool,
    pub enum_values: Option<Vec<Value>>,
}

/// Runtime validator built from a stored JSON Schema subset.
#[derive(Debug, Clone)]
pub struct CompiledSchema {
    pub root: SchemaNode,
}

impl CompiledSchema {
    /// Top-level property names, when the root is an object schema.
    pub fn root_properties(&self) -> Option<&BTreeMap<String, SchemaNode>> {
        match &self.root.kind {
            SchemaKind::Object { properties, .. } => Some(properties),
            _ => None,
        }
    }
}

/// Returns `None` for schemas that describe nothing checkable; such
/// responses pass through unvalidated.
pub fn compile_schema(schema: &Value) -> Option<CompiledSchema> {
    let obj = schema.as_object()?;
    if obj.is_empty() {
        return None;
    }
    let root = compile_node(schema);
    if matches!(root.kind, SchemaKind::Any) && root.enum_values.is_none() {
        return None;
    }
    Some(CompiledSchema { root })
}

fn as_usize(value: Option<&Value>) -> Option<usize> {
    value.and_then(|v| v.as_u64()).map(|v| v as usize)
}

fn declared_types(schema: &Value) -> (Vec<String>, bool) {
    let mut nullable = schema
        .get("nullable")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let types: Vec<String> = match schema.get("type") {
        Some(Value::String(t)) => vec![t.clone()],
        Some(Value::Array(list)) => list
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    };
    let has_null = types.iter().any(|t| t == "null");
    let non_null: Vec<String> = types.iter().filter(|t| *t != "null").cloned().collect();
    if non_null.is_empty() {
        return (types, nullable);
    }
    nullable |= has_null;
    (non_null, nullable)
}

fn compile_node(schema: &Value) -> SchemaNode {
    let (types, nullable) = declared_types(schema);
    let enum_values = schema.get("enum").and_then(|v| v.as_array()).cloned();

    let type_name = match types.as_slice() {
        [single] => Some(single.as_str()),
        [] if schema.get("properties").is_some() => Some("object"),
        [] if schema.get("items").is_some() => Some("array"),
        _ => None,
    };

    let kind = match type_name {
        Some("string") => SchemaKind::String {
            min_length: as_usize(schema.get("minLength")),
            max_length: as_usize(schema.get("maxLength")),
            pattern: schema
                .get("pattern")
                .and_then(|v| v.as_str())
                .and_then(|p| Regex::new(p).ok()),
            format: schema
                .get("format")
                .and_then(|v| v.as_str())
                .and_then(StringFormat::parse),
        },
        Some(t @ ("number" | "integer")) => SchemaKind::Number {
            integer: t == "integer",
            minimum: schema.get("minimum").and_then(|v| v.as_f64()),
            maximum: schema.get("maximum").and_then(|v| v.as_f64()),
        },
        Some("boolean") => SchemaKind::Boolean,
        Some("null") => SchemaKind::Null,
        Some("array") => SchemaKind::Array {
            items: schema
                .get("items")
                .filter(|v| v.is_object())
                .map(|v| Box::new(compile_node(v))),
            min_items: as_usize(schema.get("minItems")),
            max_items: as_usize(schema.get("maxItems")),
        },
        Some("object") => {
            let properties = schema
                .get("properties")
                .and_then(|v| v.as_object())
                .map(|props| {
                    props
                        .iter()
                        .map(|(key, sub)| (key.clone(), compile_node(sub)))
                        .collect()
                })
                .unwrap_or_default();
            let required = schema
                .get("required")
                .and_then(|v| v.as_array())
                .map(|list| {
                    list.iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default();
            SchemaKind::Object {
                properties,
                required,
            }
        }
        _ => SchemaKind::Any,
    };

    SchemaNode {
        kind,
        nullable,
        enum_values,
    }
}
