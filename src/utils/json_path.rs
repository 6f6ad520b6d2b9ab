use crate::constants::paths::{MAX_DEPTH, MAX_WILDCARD_MATCHES};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Property(String),
    Index(usize),
    Wildcard,
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Property(key) => write!(f, ".{}", key),
            PathSegment::Index(idx) => write!(f, "[{}]", idx),
            PathSegment::Wildcard => write!(f, "[*]"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("Invalid path '{path}': {reason}")]
    Malformed { path: String, reason: String },
    #[error("Path '{path}' exceeds maximum depth of {max} (got {depth})")]
    TooDeep {
        path: String,
        depth: usize,
        max: usize,
    },
    #[error("Wildcard path '{path}' matched more than {limit} values")]
    WildcardOverflow { path: String, limit: usize },
}

impl PathError {
    pub fn code(&self) -> &'static str {
        match self {
            PathError::Malformed { .. } | PathError::TooDeep { .. } => "INVALID_PATH",
            PathError::WildcardOverflow { .. } => "PATH_OVERFLOW",
        }
    }

    pub fn path(&self) -> &str {
        match self {
            PathError::Malformed { path, .. }
            | PathError::TooDeep { path, .. }
            | PathError::WildcardOverflow { path, .. } => path,
        }
    }
}

fn malformed(path: &str, reason: impl Into<String>) -> PathError {
    PathError::Malformed {
        path: path.to_string(),
        reason: reason.into(),
    }
}

/// A parsed `$`-rooted path. Parsing happens once; lookups reuse the segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPath {
    raw: String,
    segments: Vec<PathSegment>,
}

impl CompiledPath {
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        Ok(Self {
            raw: raw.trim().to_string(),
            segments: parse_path(raw)?,
        })
    }

    pub fn root() -> Self {
        Self {
            raw: "$".to_string(),
            segments: Vec::new(),
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn has_wildcard(&self) -> bool {
        self.segments.iter().any(|s| *s == PathSegment::Wildcard)
    }

    pub fn get(&self, data: &Value) -> Result<PathLookup, PathError> {
        get_segments(data, &self.segments).map_err(|_| PathError::WildcardOverflow {
            path: self.raw.clone(),
            limit: MAX_WILDCARD_MATCHES,
        })
    }

    pub fn set(&self, data: &Value, value: Value) -> Value {
        let mut out = data.clone();
        set_segments(&mut out, &self.segments, value);
        out
    }

    pub fn set_in_place(&self, data: &mut Value, value: Value) {
        set_segments(data, &self.segments, value);
    }
}

impl fmt::Display for CompiledPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

pub fn parse_path(raw: &str) -> Result<Vec<PathSegment>, PathError> {
    let path = raw.trim();
    let mut chars = path.char_indices().peekable();
    match chars.next() {
        Some((_, '$')) => {}
        _ => return Err(malformed(path, "must start with '$'")),
    }

    let mut segments = Vec::new();
    while let Some((pos, ch)) = chars.next() {
        match ch {
            '.' => {
                let mut key = String::new();
                while let Some(&(_, next)) = chars.peek() {
                    if next == '.' || next == '[' {
                        break;
                    }
                    key.push(next);
                    chars.next();
                }
                if key.is_empty() {
                    return Err(malformed(path, format!("empty property at offset {}", pos)));
                }
                if key == "*" {
                    segments.push(PathSegment::Wildcard);
                } else {
                    segments.push(PathSegment::Property(key));
                }
            }
            '[' => {
                let mut inner = String::new();
                let mut closed = false;
                for (_, next) in chars.by_ref() {
                    if next == ']' {
                        closed = true;
                        break;
                    }
                    inner.push(next);
                }
                if !closed {
                    return Err(malformed(path, format!("unclosed '[' at offset {}", pos)));
                }
                let inner = inner.trim();
                if inner == "*" {
                    segments.push(PathSegment::Wildcard);
                } else if let Ok(index) = inner.parse::<usize>() {
                    segments.push(PathSegment::Index(index));
                } else {
                    return Err(malformed(
                        path,
                        format!("bracket segment '{}' is not an index or '*'", inner),
                    ));
                }
            }
            other => {
                return Err(malformed(
                    path,
                    format!("unexpected '{}' at offset {}", other, pos),
                ));
            }
        }
    }

    if segments.len() > MAX_DEPTH {
        return Err(PathError::TooDeep {
            path: path.to_string(),
            depth: segments.len(),
            max: MAX_DEPTH,
        });
    }
    Ok(segments)
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathLookup {
    pub found: bool,
    pub value: Value,
    /// True when the value was assembled from wildcard matches.
    pub is_array: bool,
}

impl PathLookup {
    fn missing() -> Self {
        Self {
            found: false,
            value: Value::Null,
            is_array: false,
        }
    }
}

struct Overflow;

pub fn get(data: &Value, path: &str) -> Result<PathLookup, PathError> {
    CompiledPath::parse(path)?.get(data)
}

pub fn set(data: &Value, path: &str, value: Value) -> Result<Value, PathError> {
    Ok(CompiledPath::parse(path)?.set(data, value))
}

fn get_segments(data: &Value, segments: &[PathSegment]) -> Result<PathLookup, Overflow> {
    let Some(split) = segments.iter().position(|s| *s == PathSegment::Wildcard) else {
        return Ok(match walk(data, segments) {
            Some(value) => PathLookup {
                found: true,
                value: value.clone(),
                is_array: false,
            },
            None => PathLookup::missing(),
        });
    };

    let Some(Value::Array(items)) = walk(data, &segments[..split]) else {
        return Ok(PathLookup::missing());
    };
    let rest = &segments[split + 1..];
    let mut matches = Vec::new();
    collect(items, rest, &mut matches)?;
    Ok(PathLookup {
        found: true,
        value: Value::Array(matches),
        is_array: true,
    })
}

fn collect(items: &[Value], rest: &[PathSegment], out: &mut Vec<Value>) -> Result<(), Overflow> {
    for item in items {
        let nested = get_segments(item, rest)?;
        if !nested.found {
            continue;
        }
        if nested.is_array {
            if let Value::Array(values) = nested.value {
                out.extend(values);
            }
        } else {
            out.push(nested.value);
        }
        if out.len() > MAX_WILDCARD_MATCHES {
            return Err(Overflow);
        }
    }
    Ok(())
}

fn walk<'a>(data: &'a Value, segments: &[PathSegment]) -> Option<&'a Value> {
    let mut current = data;
    for segment in segments {
        current = match segment {
            PathSegment::Property(key) => current.as_object()?.get(key)?,
            PathSegment::Index(idx) => current.as_array()?.get(*idx)?,
            PathSegment::Wildcard => return None,
        };
    }
    Some(current)
}

fn set_segments(target: &mut Value, segments: &[PathSegment], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *target = value;
        return;
    };
    match head {
        PathSegment::Property(key) => {
            if !target.is_object() {
                *target = Value::Object(Map::new());
            }
            if let Value::Object(map) = target {
                let slot = map.entry(key.clone()).or_insert(Value::Null);
                set_segments(slot, rest, value);
            }
        }
        PathSegment::Index(idx) => {
            if !target.is_array() {
                *target = Value::Array(Vec::new());
            }
            if let Value::Array(items) = target {
                if items.len() <= *idx {
                    items.resize(idx + 1, Value::Null);
                }
                set_segments(&mut items[*idx], rest, value);
            }
        }
        PathSegment::Wildcard => {
            if !target.is_array() {
                *target = Value::Array(Vec::new());
            }
            let Value::Array(items) = target else {
                return;
            };
            match value {
                Value::Array(values) => {
                    if items.len() < values.len() {
                        items.resize(values.len(), Value::Null);
                    }
                    for (slot, next) in items.iter_mut().zip(values) {
                        set_segments(slot, rest, next);
                    }
                }
                scalar => {
                    for slot in items.iter_mut() {
                        set_segments(slot, rest, scalar.clone());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_grammar() {
        let segments = parse_path("$.users[0].tags[*]").unwrap();
        assert_eq!(
            segments,
            vec![
                PathSegment::Property("users".to_string()),
                PathSegment::Index(0),
                PathSegment::Property("tags".to_string()),
                PathSegment::Wildcard,
            ]
        );
        assert!(parse_path("$").unwrap().is_empty());
    }

    #[test]
    fn rejects_malformed_paths() {
        for raw in ["users.name", "$..name", "$.a[", "$.a[x]", "$a", ""] {
            let err = parse_path(raw).unwrap_err();
            assert_eq!(err.code(), "INVALID_PATH", "{}", raw);
        }
    }

    #[test]
    fn rejects_depth_over_ten() {
        assert!(parse_path("$.a.b.c.d.e.f.g.h.i.j").is_ok());
        let err = parse_path("$.a.b.c.d.e.f.g.h.i.j.k").unwrap_err();
        assert!(matches!(err, PathError::TooDeep { depth: 11, .. }));
        assert_eq!(err.code(), "INVALID_PATH");
    }

    #[test]
    fn get_distinguishes_null_from_missing() {
        let data = json!({ "a": null, "b": { "c": [10, 20] } });
        let lookup = get(&data, "$.a").unwrap();
        assert!(lookup.found);
        assert_eq!(lookup.value, Value::Null);

        assert!(!get(&data, "$.missing").unwrap().found);
        assert_eq!(get(&data, "$.b.c[1]").unwrap().value, json!(20));
        assert!(!get(&data, "$.b.c[5]").unwrap().found);
    }

    #[test]
    fn wildcard_flattens_nested_matches() {
        let data = json!({
            "groups": [
                { "users": [{ "id": 1 }, { "id": 2 }] },
                { "users": [{ "id": 3 }] },
                { "other": true }
            ]
        });
        let lookup = get(&data, "$.groups[*].users[*].id").unwrap();
        assert!(lookup.found);
        assert!(lookup.is_array);
        assert_eq!(lookup.value, json!([1, 2, 3]));
    }

    #[test]
    fn wildcard_overflow_is_reported() {
        let items: Vec<Value> = (0..(MAX_WILDCARD_MATCHES + 1)).map(|i| json!(i)).collect();
        let data = json!({ "items": items });
        let err = get(&data, "$.items[*]").unwrap_err();
        assert_eq!(err.code(), "PATH_OVERFLOW");
    }

    #[test]
    fn set_materializes_intermediates_without_mutating_input() {
        let data = json!({ "keep": 1 });
        let out = set(&data, "$.a.b[2].c", json!("x")).unwrap();
        assert_eq!(data, json!({ "keep": 1 }));
        assert_eq!(
            out,
            json!({ "keep": 1, "a": { "b": [null, null, { "c": "x" }] } })
        );
    }

    #[test]
    fn set_with_wildcard_distributes_array_values() {
        let data = json!({});
        let out = set(&data, "$.users[*].email", json!(["a@x.io", "b@x.io"])).unwrap();
        assert_eq!(
            out,
            json!({ "users": [{ "email": "a@x.io" }, { "email": "b@x.io" }] })
        );
    }

    #[test]
    fn root_set_replaces_document() {
        let out = set(&json!({ "a": 1 }), "$", json!([1, 2])).unwrap();
        assert_eq!(out, json!([1, 2]));
    }
}
