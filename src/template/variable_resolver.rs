use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::core::execution_context::ExecutionContext;

/// Keys a node output may wrap its payload in.
const WRAPPER_KEYS: [&str; 3] = ["output", "data", "result"];

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("reference pattern is valid"))
}

/// Resolve one variable reference against `ctx`.
///
/// Accepted forms: `__input__`, `input[.path]`, a scope variable
/// (`item`, `index`, loop variables) or `nodeId[.path]`, optionally wrapped
/// in `{{ }}`. Path segments may index arrays (`items.0` or `items[0]`).
/// Gaps resolve to `None`, never to an error.
pub fn resolve_reference(reference: &str, ctx: &ExecutionContext) -> Option<Value> {
    let reference = strip_braces(reference);
    if reference.is_empty() {
        return None;
    }
    if reference == "__input__" {
        return Some(ctx.input().clone());
    }

    let segments = split_path(reference);
    let (head, path) = segments.split_first()?;

    let root = if head == "input" {
        ctx.input()
    } else if let Some(v) = ctx.scope_var(head) {
        v
    } else {
        ctx.output(head)?
    };

    lookup(root, path)
}

/// Walk `path` into `value`, diving one level into an `output`/`data`/
/// `result` wrapper when the direct walk misses.
pub fn lookup(value: &Value, path: &[String]) -> Option<Value> {
    if path.is_empty() {
        return Some(value.clone());
    }
    if let Some(found) = walk(value, path) {
        return Some(found);
    }
    WRAPPER_KEYS
        .iter()
        .filter_map(|k| value.get(*k))
        .find_map(|inner| walk(inner, path))
}

fn walk(value: &Value, path: &[String]) -> Option<Value> {
    let mut current = value.clone();
    for segment in path {
        if let Value::String(text) = &current {
            // Model replies are often JSON carried as text.
            match serde_json::from_str::<Value>(text) {
                Ok(parsed @ (Value::Object(_) | Value::Array(_))) => current = parsed,
                _ => return None,
            }
        }
        current = match &current {
            Value::Object(map) => map.get(segment)?.clone(),
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?.clone(),
            _ => return None,
        };
    }
    Some(current)
}

fn strip_braces(reference: &str) -> &str {
    let trimmed = reference.trim();
    trimmed
        .strip_prefix("{{")
        .and_then(|s| s.strip_suffix("}}"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

/// `a.b[0].c` -> `["a", "b", "0", "c"]`
fn split_path(reference: &str) -> Vec<String> {
    reference
        .replace('[', ".")
        .replace(']', "")
        .split('.')
        .map(|s| s.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Render a value for interpolation: strings verbatim, missing as empty,
/// everything else as compact JSON.
pub fn value_to_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Replace every `{{ reference }}` in `text`.
pub fn render_template(text: &str, ctx: &ExecutionContext) -> String {
    reference_pattern()
        .replace_all(text, |caps: &regex::Captures| {
            value_to_text(resolve_reference(&caps[1], ctx).as_ref())
        })
        .into_owned()
}

/// Every reference mentioned in `text`, in order.
pub fn extract_references(text: &str) -> Vec<String> {
    reference_pattern()
        .captures_iter(text)
        .map(|cap| cap[1].trim().to_string())
        .collect()
}

/// Resolve a configuration value.
///
/// A string that is exactly one `{{reference}}` resolves to the typed value
/// (`null` when missing); other strings containing references render as
/// text; arrays and objects resolve element-wise.
pub fn resolve_value_spec(spec: &Value, ctx: &ExecutionContext) -> Value {
    match spec {
        Value::String(s) => {
            let trimmed = s.trim();
            if let Some(caps) = reference_pattern().captures(trimmed) {
                if caps.get(0).map(|m| m.as_str().len()) == Some(trimmed.len()) {
                    return resolve_reference(&caps[1], ctx).unwrap_or(Value::Null);
                }
                return Value::String(render_template(s, ctx));
            }
            spec.clone()
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve_value_spec(v, ctx)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_value_spec(v, ctx)))
                .collect::<Map<String, Value>>(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::{NodeResult, NodeStatus};
    use serde_json::json;

    fn ctx() -> ExecutionContext {
        let mut ctx = ExecutionContext::new(json!({"name": "Alice", "tags": ["x", "y"]}));
        for (id, output) in [
            ("llm", json!("plain text")),
            ("api", json!({"data": {"user": {"id": 7}}})),
            ("json_text", json!("{\"score\": 9}")),
            ("list", json!([{"v": 1}, {"v": 2}])),
        ] {
            ctx.insert(NodeResult {
                node_id: id.into(),
                node_type: "code".into(),
                label: id.into(),
                status: NodeStatus::Completed,
                output,
                error: None,
                start_time: 0,
                duration: None,
                tolerated: false,
            });
        }
        ctx
    }

    #[test]
    fn test_input_references() {
        let ctx = ctx();
        assert_eq!(resolve_reference("__input__", &ctx), Some(ctx.input().clone()));
        assert_eq!(resolve_reference("input.name", &ctx), Some(json!("Alice")));
        assert_eq!(resolve_reference("{{ input.tags[1] }}", &ctx), Some(json!("y")));
    }

    #[test]
    fn test_node_references_and_wrapper_dive() {
        let ctx = ctx();
        assert_eq!(resolve_reference("llm", &ctx), Some(json!("plain text")));
        assert_eq!(resolve_reference("api.user.id", &ctx), Some(json!(7)));
        assert_eq!(resolve_reference("api.data.user.id", &ctx), Some(json!(7)));
        assert_eq!(resolve_reference("json_text.score", &ctx), Some(json!(9)));
        assert_eq!(resolve_reference("list.1.v", &ctx), Some(json!(2)));
    }

    #[test]
    fn test_gaps_are_none() {
        let ctx = ctx();
        assert_eq!(resolve_reference("never_ran", &ctx), None);
        assert_eq!(resolve_reference("api.missing", &ctx), None);
        assert_eq!(resolve_reference("llm.field", &ctx), None);
        assert_eq!(resolve_reference("", &ctx), None);
    }

    #[test]
    fn test_render_template() {
        let ctx = ctx();
        let out = render_template("Hi {{input.name}}: {{llm}} / {{api.user}} / [{{ghost}}]", &ctx);
        assert_eq!(out, "Hi Alice: plain text / {\"id\":7} / []");
        assert_eq!(extract_references("{{a}} and {{ b.c }}"), vec!["a", "b.c"]);
    }

    #[test]
    fn test_resolve_value_spec() {
        let ctx = ctx();
        let spec = json!({
            "whole": "{{api.user}}",
            "text": "id={{api.user.id}}",
            "literal": "plain",
            "list": ["{{input.name}}", 3],
            "missing": "{{ghost}}"
        });
        let v = resolve_value_spec(&spec, &ctx);
        assert_eq!(v["whole"], json!({"id": 7}));
        assert_eq!(v["text"], json!("id=7"));
        assert_eq!(v["literal"], json!("plain"));
        assert_eq!(v["list"], json!(["Alice", 3]));
        assert_eq!(v["missing"], Value::Null);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let ctx = ctx();
        for reference in ["input", "api.user.id", "ghost", "list.0"] {
            assert_eq!(resolve_reference(reference, &ctx), resolve_reference(reference, &ctx));
        }
    }
}
