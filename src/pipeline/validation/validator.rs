use super::schema::{CompiledSchema, SchemaKind, SchemaNode, StringFormat};
use crate::constants::validation::MAX_ISSUES;
use crate::pipeline::types::{ExtraFieldsMode, ValidationConfig, ValidationMode};
use crate::utils::coercion::{coerce, CoercionType};
use chrono::{DateTime, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use url::Url;

static EMAIL_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationIssueCode {
    TypeMismatch,
    UnexpectedNull,
    MissingRequiredField,
    InvalidEnumValue,
    StringTooShort,
    StringTooLong,
    ArrayTooShort,
    ArrayTooLong,
    ValueOutOfRange,
    InvalidFormat,
    UnknownField,
    SchemaError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub code: ValidationIssueCode,
    pub path: String,
    pub message: String,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationStats {
    pub fields_coerced: usize,
    pub fields_stripped: usize,
    pub issues_truncated: bool,
    pub timed_out: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub valid: bool,
    /// Input after stripping and coercion.
    pub data: Value,
    pub issues: Vec<ValidationIssue>,
    pub stats: ValidationStats,
}

impl ValidationResult {
    fn skipped(data: &Value) -> Self {
        Self {
            valid: true,
            data: data.clone(),
            issues: Vec::new(),
            stats: ValidationStats::default(),
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn format_matches(format: StringFormat, raw: &str) -> bool {
    match format {
        StringFormat::Email => EMAIL_RE.as_ref().map(|re| re.is_match(raw)).unwrap_or(true),
        StringFormat::Uri => Url::parse(raw).is_ok(),
        StringFormat::Uuid => uuid::Uuid::parse_str(raw).is_ok(),
        StringFormat::DateTime => DateTime::parse_from_rfc3339(raw).is_ok(),
        StringFormat::Date => NaiveDate::parse_from_str(raw, "%Y-%m-%d").is_ok(),
    }
}

fn is_integral(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.is_i64() || n.is_u64() || n.as_f64().map(|f| f.fract() == 0.0).unwrap_or(false),
        _ => false,
    }
}

struct Walker<'a> {
    config: &'a ValidationConfig,
    severity: Severity,
    coerce: bool,
    deadline: Instant,
    issues: Vec<ValidationIssue>,
    stats: ValidationStats,
}

impl<'a> Walker<'a> {
    fn push(
        &mut self,
        code: ValidationIssueCode,
        path: &str,
        message: String,
        expected: Option<String>,
        received: Option<String>,
    ) {
        if self.issues.len() >= MAX_ISSUES {
            self.stats.issues_truncated = true;
            return;
        }
        self.issues.push(ValidationIssue {
            code,
            path: path.to_string(),
            message,
            severity: self.severity,
            expected,
            received,
        });
    }

    fn mismatch(&mut self, path: &str, expected: &str, value: &Value) {
        let received = json_type(value);
        self.push(
            ValidationIssueCode::TypeMismatch,
            path,
            format!("expected {}, got {}", expected, received),
            Some(expected.to_string()),
            Some(received.to_string()),
        );
    }

    fn out_of_time(&mut self) -> bool {
        if self.stats.timed_out {
            return true;
        }
        if Instant::now() >= self.deadline {
            self.stats.timed_out = true;
        }
        self.stats.timed_out
    }

    /// Returns false when the value still has the wrong type.
    fn coerce_into(&mut self, value: &mut Value, target: CoercionType) -> bool {
        if !self.coerce {
            return false;
        }
        let outcome = coerce(value, target);
        if outcome.success && outcome.coerced {
            *value = outcome.value;
            self.stats.fields_coerced += 1;
        }
        outcome.success
    }

    fn visit(&mut self, node: &SchemaNode, value: &mut Value, path: &str) {
        if self.out_of_time() {
            return;
        }
        if value.is_null() {
            if !node.nullable && !matches!(node.kind, SchemaKind::Null | SchemaKind::Any) {
                self.push(
                    ValidationIssueCode::UnexpectedNull,
                    path,
                    format!("unexpected null, expected {}", node.kind.type_name()),
                    Some(node.kind.type_name().to_string()),
                    Some("null".to_string()),
                );
            }
            return;
        }

        match &node.kind {
            SchemaKind::Any => {}
            SchemaKind::Null => self.mismatch(path, "null", value),
            SchemaKind::Boolean => {
                if !value.is_boolean() && !self.coerce_into(value, CoercionType::Boolean) {
                    self.mismatch(path, "boolean", value);
                    return;
                }
            }
            SchemaKind::String {
                min_length,
                max_length,
                pattern,
                format,
            } => {
                if !value.is_string() && !self.coerce_into(value, CoercionType::String) {
                    self.mismatch(path, "string", value);
                    return;
                }
                let text = value.as_str().unwrap_or_default().to_string();
                let length = text.chars().count();
                if let Some(min) = min_length.filter(|min| length < *min) {
                    self.push(
                        ValidationIssueCode::StringTooShort,
                        path,
                        format!("length {} is below minimum {}", length, min),
                        Some(format!(">= {}", min)),
                        Some(length.to_string()),
                    );
                }
                if let Some(max) = max_length.filter(|max| length > *max) {
                    self.push(
                        ValidationIssueCode::StringTooLong,
                        path,
                        format!("length {} exceeds maximum {}", length, max),
                        Some(format!("<= {}", max)),
                        Some(length.to_string()),
                    );
                }
                if let Some(re) = pattern {
                    if !re.is_match(&text) {
                        self.push(
                            ValidationIssueCode::InvalidFormat,
                            path,
                            format!("value does not match pattern {}", re.as_str()),
                            Some(re.as_str().to_string()),
                            None,
                        );
                    }
                }
                if let Some(fmt) = format {
                    if !format_matches(*fmt, &text) {
                        self.push(
                            ValidationIssueCode::InvalidFormat,
                            path,
                            format!("value is not a valid {}", fmt.as_str()),
                            Some(fmt.as_str().to_string()),
                            None,
                        );
                    }
                }
            }
            SchemaKind::Number {
                integer,
                minimum,
                maximum,
            } => {
                if !value.is_number() && !self.coerce_into(value, CoercionType::Number) {
                    self.mismatch(path, node.kind.type_name(), value);
                    return;
                }
                if *integer && !is_integral(value) {
                    self.mismatch(path, "integer", value);
                    return;
                }
                let number = value.as_f64().unwrap_or_default();
                let below = minimum.filter(|min| number < *min);
                let above = maximum.filter(|max| number > *max);
                if below.is_some() || above.is_some() {
                    let expected = match (minimum, maximum) {
                        (Some(min), Some(max)) => format!("{}..={}", min, max),
                        (Some(min), None) => format!(">= {}", min),
                        (None, Some(max)) => format!("<= {}", max),
                        (None, None) => String::new(),
                    };
                    self.push(
                        ValidationIssueCode::ValueOutOfRange,
                        path,
                        format!("{} is outside {}", number, expected),
                        Some(expected),
                        Some(number.to_string()),
                    );
                }
            }
            SchemaKind::Array {
                items,
                min_items,
                max_items,
            } => {
                let list = match value {
                    Value::Array(list) => list,
                    other => {
                        self.mismatch(path, "array", other);
                        return;
                    }
                };
                let len = list.len();
                if let Some(min) = min_items.filter(|min| len < *min) {
                    self.push(
                        ValidationIssueCode::ArrayTooShort,
                        path,
                        format!("{} items, minimum is {}", len, min),
                        Some(format!(">= {}", min)),
                        Some(len.to_string()),
                    );
                }
                if let Some(max) = max_items.filter(|max| len > *max) {
                    self.push(
                        ValidationIssueCode::ArrayTooLong,
                        path,
                        format!("{} items, maximum is {}", len, max),
                        Some(format!("<= {}", max)),
                        Some(len.to_string()),
                    );
                }
                if let Some(item_schema) = items {
                    for (idx, item) in list.iter_mut().enumerate() {
                        self.visit(item_schema, item, &format!("{}[{}]", path, idx));
                        if self.stats.timed_out {
                            return;
                        }
                    }
                }
            }
            SchemaKind::Object {
                properties,
                required,
            } => {
                let obj = match value {
                    Value::Object(obj) => obj,
                    other => {
                        self.mismatch(path, "object", other);
                        return;
                    }
                };
                for key in required {
                    if !obj.contains_key(key) {
                        self.push(
                            ValidationIssueCode::MissingRequiredField,
                            &format!("{}.{}", path, key),
                            format!("missing required field '{}'", key),
                            None,
                            None,
                        );
                    }
                }
                for (key, child) in properties {
                    if let Some(field) = obj.get_mut(key) {
                        self.visit(child, field, &format!("{}.{}", path, key));
                        if self.stats.timed_out {
                            return;
                        }
                    }
                }
            }
        }

        if let Some(allowed) = &node.enum_values {
            if !allowed.contains(value) {
                self.push(
                    ValidationIssueCode::InvalidEnumValue,
                    path,
                    format!("value {} is not one of the allowed values", value),
                    Some(Value::Array(allowed.clone()).to_string()),
                    Some(value.to_string()),
                );
            }
        }
    }

    fn handle_extra_fields(&mut self, schema: &CompiledSchema, data: &mut Value) {
        let Some(properties) = schema.root_properties() else {
            return;
        };
        let Some(obj) = data.as_object_mut() else {
            return;
        };
        let extras: Vec<String> = obj
            .keys()
            .filter(|key| !properties.contains_key(*key))
            .cloned()
            .collect();
        let mode = self.config.extra_fields;
        match mode {
            ExtraFieldsMode::Preserve => {}
            ExtraFieldsMode::Strip => {
                for key in extras {
                    obj.remove(&key);
                    self.stats.fields_stripped += 1;
                }
            }
            ExtraFieldsMode::Error => {
                for key in extras {
                    self.push(
                        ValidationIssueCode::UnknownField,
                        &format!("$.{}", key),
                        format!("field '{}' is not declared in the schema", key),
                        None,
                        None,
                    );
                }
            }
        }
    }
}

/// Validates `data` against `schema`. A missing schema or a disabled config
/// passes the data through untouched. Only strict mode reports `valid: false`.
pub fn validate(
    data: &Value,
    schema: Option<&CompiledSchema>,
    config: &ValidationConfig,
) -> ValidationResult {
    let schema = match schema {
        Some(schema) if config.enabled => schema,
        _ => return ValidationResult::skipped(data),
    };

    let mut walker = Walker {
        config,
        severity: if config.mode == ValidationMode::Strict {
            Severity::Error
        } else {
            Severity::Warning
        },
        coerce: config.coerce_types || config.mode == ValidationMode::Lenient,
        deadline: Instant::now() + Duration::from_millis(config.timeout_ms),
        issues: Vec::new(),
        stats: ValidationStats::default(),
    };

    let mut output = data.clone();
    walker.handle_extra_fields(schema, &mut output);
    walker.visit(&schema.root, &mut output, "$");
    if walker.stats.timed_out {
        walker.push(
            ValidationIssueCode::SchemaError,
            "$",
            format!("validation exceeded {}ms", config.timeout_ms),
            None,
            None,
        );
    }

    let valid = config.mode != ValidationMode::Strict || walker.issues.is_empty();
    ValidationResult {
        valid,
        data: output,
        issues: walker.issues,
        stats: walker.stats,
    }
}
