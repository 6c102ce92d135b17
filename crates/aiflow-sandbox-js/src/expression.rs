//! Boolean / value expressions such as `input > 5` or `count >= 3 && done`.
//!
//! Each binding becomes a parameter of the wrapping function, so expressions
//! reference them as plain identifiers.

use std::time::Duration;

use aiflow_types::{SandboxError, DEFAULT_CODE_TIMEOUT};
use serde_json::{Map, Value};

use crate::runtime::{
    json_literal, run_script, ScriptLimits, DEFAULT_ALLOWED_GLOBALS, DEFAULT_RECURSION_LIMIT,
};

const RESERVED: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete", "do",
    "else", "enum", "export", "extends", "false", "finally", "for", "function", "if", "import",
    "in", "instanceof", "new", "null", "return", "super", "switch", "this", "throw", "true", "try",
    "typeof", "var", "void", "while", "with", "yield", "let", "static", "await", "arguments",
    "eval",
];

#[derive(Clone, Debug)]
pub struct ExpressionEvaluator {
    timeout: Duration,
    loop_iteration_limit: u64,
}

impl Default for ExpressionEvaluator {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_CODE_TIMEOUT,
            loop_iteration_limit: 1_000_000,
        }
    }
}

impl ExpressionEvaluator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    /// Evaluate `expr` and coerce the result with JS truthiness.
    pub async fn evaluate_bool(&self, expr: &str, bindings: &Map<String, Value>) -> Result<bool, SandboxError> {
        let value = self.run(expr, bindings, true).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    /// Evaluate `expr` and return its JSON form (`null` for undefined).
    pub async fn evaluate(&self, expr: &str, bindings: &Map<String, Value>) -> Result<Value, SandboxError> {
        self.run(expr, bindings, false).await
    }

    async fn run(&self, expr: &str, bindings: &Map<String, Value>, coerce: bool) -> Result<Value, SandboxError> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(SandboxError::CompilationError("empty expression".into()));
        }

        let names: Vec<&String> = bindings.keys().filter(|k| is_bindable(k)).collect();
        let params = names.iter().map(|n| n.as_str()).collect::<Vec<_>>().join(", ");
        let args = names
            .iter()
            .map(|n| format!("__b[{}]", Value::String((*n).clone())))
            .collect::<Vec<_>>()
            .join(", ");
        let body = if coerce {
            format!("!!({})", expr)
        } else {
            format!("({})", expr)
        };

        let script = format!(
            r#"
var __b = {bindings};
try {{
    __state.value = (function({params}) {{ return {body}; }})({args});
    __state.done = true;
}} catch (e) {{
    __state.done = true;
    __state.error = __describe_error(e);
}}
"#,
            bindings = json_literal(&Value::Object(bindings.clone()))?,
            params = params,
            body = body,
            args = args,
        );

        let limits = ScriptLimits {
            timeout: self.timeout,
            loop_iteration_limit: self.loop_iteration_limit,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            allowed_globals: DEFAULT_ALLOWED_GLOBALS.iter().map(|s| s.to_string()).collect(),
        };
        let outcome = run_script(script, limits).await?;
        Ok(outcome.value)
    }
}

fn is_bindable(name: &str) -> bool {
    let mut chars = name.chars();
    let first_ok = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$');
    first_ok
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        && !name.starts_with("__")
        && !RESERVED.contains(&name)
}
