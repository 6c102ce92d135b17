//! Built-in JavaScript sandbox using boa_engine.
//!
//! User code declares `main`, optionally `async`. It is called with one
//! object argument carrying every entry of `vars` spread at the top level plus
//! `input` and `vars` themselves. The resolved return value becomes the output.

use std::time::{Duration, Instant};

use aiflow_types::sandbox::*;

use crate::runtime::{
    json_literal, run_script, ScriptLimits, DEFAULT_ALLOWED_GLOBALS, DEFAULT_RECURSION_LIMIT,
};

#[derive(Clone, Debug)]
pub struct JsSandboxConfig {
    /// Max code length (bytes)
    pub max_code_length: usize,

    /// Used when the request leaves the timeout at zero
    pub default_timeout: Duration,

    /// Per-frame loop iteration cap. Stops runaway loops on the blocking
    /// thread after the caller has already given up on them.
    pub loop_iteration_limit: u64,

    /// Max JS call depth.
    pub recursion_limit: usize,

    pub allowed_globals: Vec<String>,
}

impl Default for JsSandboxConfig {
    fn default() -> Self {
        Self {
            max_code_length: 1_000_000,
            default_timeout: DEFAULT_CODE_TIMEOUT,
            loop_iteration_limit: 5_000_000,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            allowed_globals: DEFAULT_ALLOWED_GLOBALS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

pub struct JsSandbox {
    config: JsSandboxConfig,
}

impl Default for JsSandbox {
    fn default() -> Self {
        Self::new(JsSandboxConfig::default())
    }
}

impl JsSandbox {
    pub fn new(config: JsSandboxConfig) -> Self {
        Self { config }
    }

    fn validate_code(&self, code: &str) -> Result<(), SandboxError> {
        if code.len() > self.config.max_code_length {
            return Err(SandboxError::CodeTooLarge {
                max: self.config.max_code_length,
                actual: code.len(),
            });
        }
        if !code.contains("main") {
            return Err(SandboxError::CompilationError(
                "code must define a `main` function".into(),
            ));
        }
        Ok(())
    }

    fn build_script(code: &str, inputs: &serde_json::Value) -> Result<String, SandboxError> {
        Ok(format!(
            r#"
{code}

;(function() {{
    if (typeof main !== 'function') {{
        __state.done = true;
        __state.error = 'main() is not defined';
        return;
    }}
    var __inputs = {inputs};
    var __vars = (__inputs.vars && typeof __inputs.vars === 'object') ? __inputs.vars : {{}};
    var __args = Object.assign({{}}, __vars, {{ input: __inputs.input, vars: __vars }});
    var __result;
    try {{
        __result = main(__args);
    }} catch (e) {{
        __state.done = true;
        __state.error = __describe_error(e);
        return;
    }}
    Promise.resolve(__result)
        .then(
            function(v) {{ __state.done = true; __state.value = v; }},
            function(e) {{ __state.done = true; __state.error = __describe_error(e); }}
        );
}})();
"#,
            code = code,
            inputs = json_literal(inputs)?,
        ))
    }
}

#[async_trait::async_trait]
impl CodeSandbox for JsSandbox {
    fn sandbox_type(&self) -> SandboxType {
        SandboxType::Builtin
    }

    fn supported_languages(&self) -> Vec<CodeLanguage> {
        vec![CodeLanguage::JavaScript]
    }

    async fn execute(&self, request: SandboxRequest) -> Result<SandboxResult, SandboxError> {
        if request.language != CodeLanguage::JavaScript {
            return Err(SandboxError::UnsupportedLanguage(request.language));
        }
        self.validate_code(&request.code)?;

        let timeout = if request.config.timeout.is_zero() {
            self.config.default_timeout
        } else {
            request.config.timeout
        };
        let script = Self::build_script(&request.code, &request.inputs)?;
        let limits = ScriptLimits {
            timeout,
            loop_iteration_limit: self.config.loop_iteration_limit,
            recursion_limit: self.config.recursion_limit,
            allowed_globals: self.config.allowed_globals.clone(),
        };

        let start_time = Instant::now();
        let outcome = run_script(script, limits).await?;
        let execution_time = start_time.elapsed();
        tracing::debug!(elapsed_ms = execution_time.as_millis() as u64, "javascript main() settled");

        Ok(SandboxResult {
            output: outcome.value,
            stdout: outcome.logs.join("\n"),
            stderr: String::new(),
            execution_time,
        })
    }

    async fn validate(&self, code: &str, language: CodeLanguage) -> Result<(), SandboxError> {
        if language != CodeLanguage::JavaScript {
            return Err(SandboxError::UnsupportedLanguage(language));
        }
        self.validate_code(code)
    }

    async fn health_check(&self) -> Result<HealthStatus, SandboxError> {
        let request = SandboxRequest::new(
            "function main() { return { ok: true }; }",
            CodeLanguage::JavaScript,
            serde_json::Value::Null,
            serde_json::json!({}),
        );
        match self.execute(request).await {
            Ok(r) if r.output["ok"] == serde_json::Value::Bool(true) => Ok(HealthStatus::Healthy),
            Ok(_) => Ok(HealthStatus::Degraded("unexpected health check output".into())),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(code: &str, input: serde_json::Value, vars: serde_json::Value) -> SandboxRequest {
        SandboxRequest::new(code, CodeLanguage::JavaScript, input, vars)
    }

    #[tokio::test]
    async fn test_simple_return() {
        let sandbox = JsSandbox::default();
        let result = sandbox
            .execute(request("function main() { return { a: 1 }; }", json!(null), json!({})))
            .await
            .unwrap();
        assert_eq!(result.output, json!({ "a": 1 }));
    }

    #[tokio::test]
    async fn test_async_main_with_spread_vars() {
        let sandbox = JsSandbox::default();
        let code = r#"
            async function main({ name, input, vars }) {
                return { greeting: "Hello, " + name, input: input, count: Object.keys(vars).length };
            }
        "#;
        let result = sandbox
            .execute(request(code, json!("hi"), json!({ "name": "World" })))
            .await
            .unwrap();
        assert_eq!(result.output["greeting"], json!("Hello, World"));
        assert_eq!(result.output["input"], json!("hi"));
        assert_eq!(result.output["count"], json!(1));
    }

    #[tokio::test]
    async fn test_await_timer() {
        let sandbox = JsSandbox::default();
        let code = r#"
            async function main({ input }) {
                var order = [];
                setTimeout(function() { order.push('late'); }, 50);
                await new Promise(function(resolve) { setTimeout(resolve, 10); });
                order.push('after-wait');
                await new Promise(function(resolve) { setTimeout(resolve, 100); });
                return order;
            }
        "#;
        let result = sandbox.execute(request(code, json!(null), json!({}))).await.unwrap();
        assert_eq!(result.output, json!(["after-wait", "late"]));
    }

    #[tokio::test]
    async fn test_console_captured() {
        let sandbox = JsSandbox::default();
        let code = r#"function main() { console.log("x", { y: 1 }); return 1; }"#;
        let result = sandbox.execute(request(code, json!(null), json!({}))).await.unwrap();
        assert_eq!(result.stdout, "x {\"y\":1}");
        assert_eq!(result.output, json!(1));
    }

    #[tokio::test]
    async fn test_globals_are_stripped() {
        let sandbox = JsSandbox::default();
        let code = r#"function main() { return { evalType: typeof eval, jsonType: typeof JSON }; }"#;
        let result = sandbox.execute(request(code, json!(null), json!({}))).await.unwrap();
        assert_eq!(result.output["evalType"], json!("undefined"));
        assert_eq!(result.output["jsonType"], json!("object"));
    }

    #[tokio::test]
    async fn test_thrown_error_is_reported() {
        let sandbox = JsSandbox::default();
        let code = r#"function main() { throw new Error("boom"); }"#;
        let err = sandbox.execute(request(code, json!(null), json!({}))).await.unwrap_err();
        assert!(err.to_string().contains("boom"), "{}", err);
    }

    #[tokio::test]
    async fn test_infinite_loop_times_out() {
        let sandbox = JsSandbox::new(JsSandboxConfig {
            loop_iteration_limit: 200_000,
            ..JsSandboxConfig::default()
        });
        let code = "function main() { while (true) {} }";
        let err = sandbox
            .execute(
                request(code, json!(null), json!({})).with_timeout(Duration::from_millis(300)),
            )
            .await
            .unwrap_err();
        assert!(err.is_timeout(), "expected timeout, got {:?}", err);
    }

    #[tokio::test]
    async fn test_deep_recursion_fails_fast() {
        let sandbox = JsSandbox::default();
        let code = "function main() { function down(n) { return down(n + 1) + 1; } return down(0); }";
        let started = Instant::now();
        let err = sandbox
            .execute(request(code, json!(null), json!({})).with_timeout(Duration::from_secs(10)))
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::ExecutionError(_)), "got {:?}", err);
        assert!(err.to_string().contains("recursive calls"), "{}", err);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_blocking_run_stops_at_deadline() {
        // Each timer callback is a fresh frame, so the per-frame loop limit
        // never trips; only the deadline ends the run.
        let code = r#"
            function main() {
                return new Promise(function() {
                    function tick() {
                        var x = 0;
                        for (var i = 0; i < 100000; i++) { x += i; }
                        setTimeout(tick, 0);
                    }
                    tick();
                });
            }
        "#;
        let script = JsSandbox::build_script(code, &json!({"input": null, "vars": {}})).unwrap();
        let limits = ScriptLimits {
            timeout: Duration::from_millis(200),
            loop_iteration_limit: 5_000_000,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            allowed_globals: DEFAULT_ALLOWED_GLOBALS.iter().map(|s| s.to_string()).collect(),
        };
        let started = Instant::now();
        let err = crate::runtime::run_blocking(&script, &limits).unwrap_err();
        assert!(err.is_timeout(), "expected timeout, got {:?}", err);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_missing_main() {
        let sandbox = JsSandbox::default();
        let err = sandbox
            .execute(request("var x = 1;", json!(null), json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::CompilationError(_)));

        let err = sandbox
            .execute(request("var mainly = 1;", json!(null), json!({})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("main() is not defined"));
    }

    #[tokio::test]
    async fn test_syntax_error() {
        let sandbox = JsSandbox::default();
        let err = sandbox
            .execute(request("function main( { return {}; }", json!(null), json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::CompilationError(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn test_unsupported_language() {
        let sandbox = JsSandbox::default();
        let err = sandbox
            .execute(SandboxRequest::new("def main(): pass", CodeLanguage::Python, json!(null), json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::UnsupportedLanguage(CodeLanguage::Python)));
    }

    #[tokio::test]
    async fn test_no_state_leaks_between_runs() {
        let sandbox = JsSandbox::default();
        sandbox
            .execute(request("var leaked = 1; function main() { return 1; }", json!(null), json!({})))
            .await
            .unwrap();
        let result = sandbox
            .execute(request("function main() { return typeof leaked; }", json!(null), json!({})))
            .await
            .unwrap();
        assert_eq!(result.output, json!("undefined"));
    }

    #[tokio::test]
    async fn test_health_check() {
        assert_eq!(JsSandbox::default().health_check().await.unwrap(), HealthStatus::Healthy);
    }
}
