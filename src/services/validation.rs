use crate::errors::ToolError;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Argument checks shared by the tool managers.
#[derive(Clone, Default)]
pub struct Validation;

impl Validation {
    pub fn new() -> Self {
        Self
    }

    pub fn ensure_string(&self, value: &Value, label: &str, trim: bool) -> Result<String, ToolError> {
        let text = value.as_str().ok_or_else(|| {
            ToolError::invalid_params(format!("{} must be a non-empty string", label))
        })?;
        let normalized = text.trim();
        if normalized.is_empty() {
            return Err(ToolError::invalid_params(format!(
                "{} must be a non-empty string",
                label
            )));
        }
        Ok(if trim {
            normalized.to_string()
        } else {
            text.to_string()
        })
    }

    /// Identifiers double as cache-key components, so `:` is reserved.
    pub fn ensure_identifier(&self, value: &Value, label: &str) -> Result<String, ToolError> {
        let id = self.ensure_string(value, label, true)?;
        if id.contains(':') || id.chars().any(char::is_whitespace) {
            return Err(ToolError::invalid_params(format!(
                "{} must not contain ':' or whitespace",
                label
            )));
        }
        Ok(id)
    }

    pub fn ensure_optional_identifier(
        &self,
        value: Option<&Value>,
        label: &str,
    ) -> Result<Option<String>, ToolError> {
        match value {
            None => Ok(None),
            Some(val) if val.is_null() => Ok(None),
            Some(val) => self.ensure_identifier(val, label).map(Some),
        }
    }

    pub fn ensure_object<'a>(
        &self,
        value: Option<&'a Value>,
        label: &str,
    ) -> Result<&'a serde_json::Map<String, Value>, ToolError> {
        value
            .and_then(|v| v.as_object())
            .ok_or_else(|| ToolError::invalid_params(format!("{} must be an object", label)))
    }

    pub fn parse<T: DeserializeOwned>(&self, value: Value, label: &str) -> Result<T, ToolError> {
        serde_json::from_value(value)
            .map_err(|err| ToolError::invalid_params(format!("Invalid {}: {}", label, err)))
    }
}
