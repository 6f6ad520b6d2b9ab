use crate::pipeline::types::{
    ArrayMode, Direction, FailureMode, FieldMapping, MappingConfig, MappingSource, ResolvedMapping,
    TransformConfig,
};
use crate::utils::coercion::{coerce, CoercionType};
use crate::utils::json_path::{CompiledPath, PathError};
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MappingErrorCode {
    PathNotFound,
    InvalidPath,
    PathOverflow,
    CoercionFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingError {
    pub code: MappingErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping_id: Option<String>,
    pub source_path: String,
    pub target_path: String,
    pub direction: Direction,
}

impl MappingError {
    fn new(code: MappingErrorCode, mapping: &FieldMapping, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            mapping_id: (!mapping.id.is_empty()).then(|| mapping.id.clone()),
            source_path: mapping.source_path.clone(),
            target_path: mapping.target_path.clone(),
            direction: mapping.direction,
        }
    }

    fn from_path(mapping: &FieldMapping, err: &PathError) -> Self {
        let code = match err {
            PathError::WildcardOverflow { .. } => MappingErrorCode::PathOverflow,
            _ => MappingErrorCode::InvalidPath,
        };
        Self::new(code, mapping, err.to_string())
    }
}

/// A mapping whose paths are already parsed.
#[derive(Debug, Clone)]
pub struct CompiledMapping {
    pub mapping: FieldMapping,
    pub provenance: MappingSource,
    source: CompiledPath,
    target: CompiledPath,
}

#[derive(Debug, Clone)]
pub struct CompiledMappingSet {
    pub direction: Direction,
    pub entries: Vec<CompiledMapping>,
    /// Mappings whose paths failed to parse; reported on every apply.
    pub invalid: Vec<MappingError>,
}

impl CompiledMappingSet {
    pub fn compile(direction: Direction, resolved: &[ResolvedMapping]) -> Self {
        let mut entries = Vec::new();
        let mut invalid = Vec::new();
        for item in resolved.iter().filter(|r| r.mapping.direction == direction) {
            let mapping = &item.mapping;
            let parsed = CompiledPath::parse(&mapping.source_path)
                .and_then(|source| Ok((source, CompiledPath::parse(&mapping.target_path)?)));
            match parsed {
                Ok((source, target)) => entries.push(CompiledMapping {
                    mapping: mapping.clone(),
                    provenance: item.source,
                    source,
                    target,
                }),
                Err(err) => invalid.push(MappingError::from_path(mapping, &err)),
            }
        }
        Self {
            direction,
            entries,
            invalid,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.invalid.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingStats {
    pub fields_transformed: usize,
    pub fields_coerced: usize,
    pub fields_defaulted: usize,
    pub fields_omitted: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MappingResult {
    pub applied: bool,
    pub data: Value,
    pub errors: Vec<MappingError>,
    pub stats: MappingStats,
    pub failure_mode: FailureMode,
}

impl MappingResult {
    fn untouched(data: &Value, failure_mode: FailureMode) -> Self {
        Self {
            applied: false,
            data: data.clone(),
            errors: Vec::new(),
            stats: MappingStats::default(),
            failure_mode,
        }
    }

    /// True when fail mode rejected the transformation.
    pub fn failed(&self) -> bool {
        self.failure_mode == FailureMode::Fail && !self.errors.is_empty()
    }
}

pub struct MappingRequest<'a> {
    pub direction: Direction,
    pub config: &'a MappingConfig,
    pub mappings: &'a [FieldMapping],
}

/// Compiles `request.mappings` on the fly and applies them.
pub fn apply_mappings(data: &Value, request: MappingRequest<'_>) -> MappingResult {
    let resolved: Vec<ResolvedMapping> = request
        .mappings
        .iter()
        .map(|m| ResolvedMapping {
            mapping: m.clone(),
            source: if m.connection_id.is_some() {
                MappingSource::Connection
            } else {
                MappingSource::Default
            },
        })
        .collect();
    let compiled = CompiledMappingSet::compile(request.direction, &resolved);
    apply_compiled(data, request.config, &compiled)
}

fn empty_like(data: &Value) -> Value {
    match data {
        Value::Array(_) => Value::Array(Vec::new()),
        _ => Value::Object(Map::new()),
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn reduce_array(value: Value, mode: ArrayMode) -> Value {
    match (value, mode) {
        (Value::Array(items), ArrayMode::First) => items.into_iter().next().unwrap_or(Value::Null),
        (Value::Array(items), ArrayMode::Last) => items.into_iter().last().unwrap_or(Value::Null),
        (value, _) => value,
    }
}

enum Coerced {
    Value(Value, usize),
    Failed(String),
}

fn coerce_value(value: Value, target: CoercionType, per_element: bool) -> Coerced {
    let items = match value {
        Value::Array(items) if per_element => items,
        single => {
            let outcome = coerce(&single, target);
            return if outcome.success {
                Coerced::Value(outcome.value, usize::from(outcome.coerced))
            } else {
                Coerced::Failed(format!(
                    "Cannot coerce {} to {}",
                    type_name(&single),
                    target.as_str()
                ))
            };
        }
    };
    let mut out = Vec::with_capacity(items.len());
    let mut count = 0;
    let mut failures = Vec::new();
    for (idx, item) in items.iter().enumerate() {
        let outcome = coerce(item, target);
        if outcome.success {
            count += usize::from(outcome.coerced);
            out.push(outcome.value);
        } else {
            failures.push(format!("[{}] {}", idx, type_name(item)));
        }
    }
    if failures.is_empty() {
        Coerced::Value(Value::Array(out), count)
    } else {
        Coerced::Failed(format!(
            "Cannot coerce to {}: {}",
            target.as_str(),
            failures.join(", ")
        ))
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Applies a compiled set. Never fails: problems are returned in
/// `errors`, and fail mode reverts to the original data.
pub fn apply_compiled(data: &Value, config: &MappingConfig, set: &CompiledMappingSet) -> MappingResult {
    let failure_mode = config.failure_mode;
    if set.is_empty() {
        return MappingResult::untouched(data, failure_mode);
    }

    let mut errors: Vec<MappingError> = set.invalid.clone();
    if failure_mode == FailureMode::Fail && !errors.is_empty() {
        return MappingResult {
            errors,
            ..MappingResult::untouched(data, failure_mode)
        };
    }

    let mut out = if config.preserve_unmapped {
        data.clone()
    } else {
        empty_like(data)
    };
    let mut stats = MappingStats::default();

    for entry in &set.entries {
        let mapping = &entry.mapping;
        let transform: &TransformConfig = &mapping.transform_config;
        let lookup = match entry.source.get(data) {
            Ok(lookup) => lookup,
            Err(err) => {
                errors.push(MappingError::from_path(mapping, &err));
                if failure_mode == FailureMode::Fail {
                    break;
                }
                continue;
            }
        };

        let missing = !lookup.found || lookup.value.is_null();
        let mut value = lookup.value;
        if missing && transform.default_value.is_some() {
            value = transform.default_value.clone().unwrap_or(Value::Null);
            stats.fields_defaulted += 1;
        } else if (transform.omit_if_null && missing)
            || (transform.omit_if_empty && (missing || is_empty_value(&value)))
        {
            stats.fields_omitted += 1;
            continue;
        } else if !lookup.found {
            errors.push(MappingError::new(
                MappingErrorCode::PathNotFound,
                mapping,
                format!("Source path {} not found", entry.source),
            ));
            if failure_mode == FailureMode::Fail {
                break;
            }
            continue;
        }

        if let Some(coercion) = transform.coercion {
            if !value.is_null() {
                match coerce_value(value.clone(), coercion.target, lookup.is_array) {
                    Coerced::Value(next, count) => {
                        value = next;
                        stats.fields_coerced += count;
                    }
                    Coerced::Failed(message) => {
                        errors.push(MappingError::new(
                            MappingErrorCode::CoercionFailed,
                            mapping,
                            message,
                        ));
                        if failure_mode == FailureMode::Fail {
                            break;
                        }
                    }
                }
            }
        }

        if !entry.target.has_wildcard() {
            value = reduce_array(value, transform.array_mode);
        }
        entry.target.set_in_place(&mut out, value);
        stats.fields_transformed += 1;
    }

    if failure_mode == FailureMode::Fail && !errors.is_empty() {
        return MappingResult {
            errors,
            stats,
            ..MappingResult::untouched(data, failure_mode)
        };
    }
    MappingResult {
        applied: true,
        data: out,
        errors,
        stats,
        failure_mode,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::CoercionConfig;
    use serde_json::json;

    fn mapping(source: &str, target: &str, direction: Direction) -> FieldMapping {
        FieldMapping {
            id: format!("{}->{}", source, target),
            action_id: "act1".to_string(),
            connection_id: None,
            source_path: source.to_string(),
            target_path: target.to_string(),
            direction,
            transform_config: TransformConfig::default(),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn enabled(failure_mode: FailureMode) -> MappingConfig {
        MappingConfig {
            enabled: true,
            preserve_unmapped: true,
            failure_mode,
        }
    }

    #[test]
    fn renames_and_coerces() {
        let mut m = mapping("$.data.user_email", "$.email", Direction::Output);
        m.transform_config.coercion = Some(CoercionConfig {
            target: CoercionType::String,
        });
        let config = enabled(FailureMode::Passthrough);
        let result = apply_mappings(
            &json!({ "data": { "user_email": "a@x.io" } }),
            MappingRequest {
                direction: Direction::Output,
                config: &config,
                mappings: &[m],
            },
        );
        assert!(result.applied);
        assert_eq!(result.data["email"], json!("a@x.io"));
        assert_eq!(result.data["data"]["user_email"], json!("a@x.io"));
        assert!(result.errors.is_empty());
        assert_eq!(result.stats.fields_transformed, 1);
        assert_eq!(result.stats.fields_coerced, 0);
    }

    #[test]
    fn wildcard_source_with_first_mode() {
        let mut m = mapping("$.items[*].id", "$.firstId", Direction::Output);
        m.transform_config.array_mode = ArrayMode::First;
        let config = MappingConfig {
            preserve_unmapped: false,
            ..enabled(FailureMode::Passthrough)
        };
        let result = apply_mappings(
            &json!({ "items": [{ "id": 1 }, { "id": 2 }] }),
            MappingRequest {
                direction: Direction::Output,
                config: &config,
                mappings: &[m],
            },
        );
        assert_eq!(result.data, json!({ "firstId": 1 }));
    }

    #[test]
    fn rename_without_preserving_yields_only_target() {
        let config = MappingConfig {
            preserve_unmapped: false,
            ..enabled(FailureMode::Passthrough)
        };
        let result = apply_mappings(
            &json!({ "data": { "user_email": "a@b.com" } }),
            MappingRequest {
                direction: Direction::Output,
                config: &config,
                mappings: &[mapping("$.data.user_email", "$.email", Direction::Output)],
            },
        );
        assert!(result.applied);
        assert_eq!(result.data, json!({ "email": "a@b.com" }));
    }

    #[test]
    fn wildcard_source_collects_every_match() {
        let m = mapping("$.users[*].email", "$.emails", Direction::Output);
        assert_eq!(m.transform_config.array_mode, ArrayMode::All);
        let config = MappingConfig {
            preserve_unmapped: false,
            ..enabled(FailureMode::Passthrough)
        };
        let input = json!({ "users": [{ "email": "x" }, { "email": "y" }] });
        let result = apply_mappings(
            &input,
            MappingRequest {
                direction: Direction::Output,
                config: &config,
                mappings: &[m.clone()],
            },
        );
        assert_eq!(result.data, json!({ "emails": ["x", "y"] }));

        let preserving = enabled(FailureMode::Passthrough);
        let result = apply_mappings(
            &input,
            MappingRequest {
                direction: Direction::Output,
                config: &preserving,
                mappings: &[m],
            },
        );
        assert_eq!(result.data["emails"], json!(["x", "y"]));
        assert_eq!(result.data["users"], input["users"]);
    }

    #[test]
    fn coercion_failure_passthrough_keeps_original() {
        let mut m = mapping("$.count", "$.count", Direction::Output);
        m.transform_config.coercion = Some(CoercionConfig {
            target: CoercionType::Number,
        });
        let config = enabled(FailureMode::Passthrough);
        let result = apply_mappings(
            &json!({ "count": "abc" }),
            MappingRequest {
                direction: Direction::Output,
                config: &config,
                mappings: &[m],
            },
        );
        assert!(result.applied);
        assert_eq!(result.data["count"], json!("abc"));
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code, MappingErrorCode::CoercionFailed);
    }

    #[test]
    fn fail_mode_reverts_to_original() {
        let good = mapping("$.a", "$.renamed", Direction::Output);
        let bad = mapping("$.missing", "$.other", Direction::Output);
        let config = enabled(FailureMode::Fail);
        let input = json!({ "a": 1 });
        let result = apply_mappings(
            &input,
            MappingRequest {
                direction: Direction::Output,
                config: &config,
                mappings: &[good, bad],
            },
        );
        assert!(!result.applied);
        assert!(result.failed());
        assert_eq!(result.data, input);
        assert_eq!(result.errors[0].code, MappingErrorCode::PathNotFound);
    }

    #[test]
    fn defaults_and_omissions() {
        let mut defaulted = mapping("$.status", "$.status", Direction::Output);
        defaulted.transform_config.default_value = Some(json!("unknown"));
        let mut omitted = mapping("$.note", "$.note_out", Direction::Output);
        omitted.transform_config.omit_if_empty = true;
        let config = MappingConfig {
            preserve_unmapped: false,
            ..enabled(FailureMode::Passthrough)
        };
        let result = apply_mappings(
            &json!({ "status": null, "note": "" }),
            MappingRequest {
                direction: Direction::Output,
                config: &config,
                mappings: &[defaulted, omitted],
            },
        );
        assert_eq!(result.data, json!({ "status": "unknown" }));
        assert_eq!(result.stats.fields_defaulted, 1);
        assert_eq!(result.stats.fields_omitted, 1);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn other_direction_is_untouched() {
        let m = mapping("$.a", "$.b", Direction::Input);
        let config = enabled(FailureMode::Passthrough);
        let input = json!({ "a": 1 });
        let result = apply_mappings(
            &input,
            MappingRequest {
                direction: Direction::Output,
                config: &config,
                mappings: &[m],
            },
        );
        assert!(!result.applied);
        assert_eq!(result.data, input);
    }

    #[test]
    fn invalid_paths_surface_as_errors() {
        let m = mapping("data.a", "$.b", Direction::Output);
        let config = enabled(FailureMode::Passthrough);
        let result = apply_mappings(
            &json!({ "data": { "a": 1 } }),
            MappingRequest {
                direction: Direction::Output,
                config: &config,
                mappings: &[m],
            },
        );
        assert_eq!(result.errors[0].code, MappingErrorCode::InvalidPath);
    }

    #[test]
    fn inverse_mapping_round_trips() {
        let forward = mapping("$.a", "$.b", Direction::Output);
        let inverse = mapping("$.b", "$.a", Direction::Output);
        let config = MappingConfig {
            preserve_unmapped: false,
            ..enabled(FailureMode::Passthrough)
        };
        let input = json!({ "a": { "nested": [1, 2] } });
        let there = apply_mappings(
            &input,
            MappingRequest {
                direction: Direction::Output,
                config: &config,
                mappings: &[forward],
            },
        );
        let back = apply_mappings(
            &there.data,
            MappingRequest {
                direction: Direction::Output,
                config: &config,
                mappings: &[inverse],
            },
        );
        assert_eq!(back.data, input);
    }
}
