use crate::errors::ToolError;
use serde_json::Value;

/// Up to three known names sharing a prefix or substring with `input`.
pub fn suggest<'a>(input: &str, known: &[&'a str]) -> Vec<&'a str> {
    let needle = input.to_lowercase();
    let mut hits: Vec<&str> = known
        .iter()
        .copied()
        .filter(|candidate| {
            let candidate = candidate.to_lowercase();
            candidate.starts_with(&needle)
                || needle.starts_with(&candidate)
                || candidate.contains(&needle)
        })
        .collect();
    hits.truncate(3);
    hits
}

pub fn unknown_action_error(tool: &str, action: Option<&Value>, known_actions: &[&str]) -> ToolError {
    let action_value = action.and_then(|v| v.as_str()).unwrap_or("");
    let suggestions = if action_value.is_empty() {
        Vec::new()
    } else {
        suggest(action_value, known_actions)
    };
    let mut hint = format!("Use one of: {}.", known_actions.join(", "));
    if !suggestions.is_empty() {
        hint = format!("Did you mean: {}? {}", suggestions.join(", "), hint);
    }
    ToolError::invalid_params(format!("Unknown {} action: {}", tool, action_value))
        .with_hint(hint)
        .with_details(serde_json::json!({
            "known_actions": known_actions,
            "did_you_mean": suggestions,
        }))
}
