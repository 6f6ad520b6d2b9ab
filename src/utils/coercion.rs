use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoercionType {
    String,
    Number,
    Boolean,
}

impl CoercionType {
    pub fn as_str(self) -> &'static str {
        match self {
            CoercionType::String => "string",
            CoercionType::Number => "number",
            CoercionType::Boolean => "boolean",
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            CoercionType::String => value.is_string(),
            CoercionType::Number => value.is_number(),
            CoercionType::Boolean => value.is_boolean(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoercionOutcome {
    pub success: bool,
    pub value: Value,
    pub coerced: bool,
}

impl CoercionOutcome {
    fn unchanged(value: &Value) -> Self {
        Self {
            success: true,
            value: value.clone(),
            coerced: false,
        }
    }

    fn converted(value: Value) -> Self {
        Self {
            success: true,
            value,
            coerced: true,
        }
    }

    fn failed(value: &Value) -> Self {
        Self {
            success: false,
            value: value.clone(),
            coerced: false,
        }
    }
}

const TRUE_WORDS: [&str; 4] = ["true", "1", "yes", "on"];
const FALSE_WORDS: [&str; 4] = ["false", "0", "no", "off"];

/// Converts a scalar between string, number and boolean. Null, arrays and
/// objects never coerce.
pub fn coerce(value: &Value, target: CoercionType) -> CoercionOutcome {
    if target.matches(value) {
        return CoercionOutcome::unchanged(value);
    }
    let converted = match (value, target) {
        (Value::String(s), CoercionType::Number) => parse_number(s).map(Value::Number),
        (Value::String(s), CoercionType::Boolean) => parse_boolean(s).map(Value::Bool),
        (Value::Number(n), CoercionType::String) => Some(Value::String(n.to_string())),
        (Value::Number(n), CoercionType::Boolean) => Some(Value::Bool(!is_zero(n))),
        (Value::Bool(b), CoercionType::String) => Some(Value::String(b.to_string())),
        (Value::Bool(b), CoercionType::Number) => Some(Value::from(u8::from(*b))),
        _ => None,
    };
    match converted {
        Some(v) => CoercionOutcome::converted(v),
        None => CoercionOutcome::failed(value),
    }
}

fn parse_number(raw: &str) -> Option<Number> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(int) = trimmed.parse::<i64>() {
        return Some(Number::from(int));
    }
    // f64 parsing accepts "inf" and "NaN"; neither is representable in JSON.
    let float = trimmed.parse::<f64>().ok()?;
    if !float.is_finite() {
        return None;
    }
    Number::from_f64(float)
}

fn parse_boolean(raw: &str) -> Option<bool> {
    let lowered = raw.trim().to_ascii_lowercase();
    if TRUE_WORDS.contains(&lowered.as_str()) {
        Some(true)
    } else if FALSE_WORDS.contains(&lowered.as_str()) {
        Some(false)
    } else {
        None
    }
}

fn is_zero(n: &Number) -> bool {
    n.as_f64().map(|f| f == 0.0).unwrap_or(false)
}
