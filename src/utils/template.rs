use crate::utils::json_path::CompiledPath;
use serde_json::Value;

fn lookup(expression: &str, context: &Value) -> Option<Value> {
    let expression = expression.trim();
    if expression.is_empty() {
        return None;
    }
    let raw = if expression.starts_with('$') {
        expression.to_string()
    } else {
        format!("$.{}", expression)
    };
    let path = CompiledPath::parse(&raw).ok()?;
    let lookup = path.get(context).ok()?;
    lookup.found.then_some(lookup.value)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Number(num) => num.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Renders `{{name}}` / `{{$.a.b}}` placeholders from `context`. Unknown
/// placeholders render as empty strings.
pub fn render_template(template: &str, context: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        let (prefix, tail) = rest.split_at(start);
        out.push_str(prefix);
        let Some(end) = tail.find("}}") else {
            out.push_str(tail);
            return out;
        };
        if let Some(value) = lookup(&tail[2..end], context) {
            out.push_str(&stringify(&value));
        }
        rest = &tail[end + 2..];
    }
    out.push_str(rest);
    out
}
