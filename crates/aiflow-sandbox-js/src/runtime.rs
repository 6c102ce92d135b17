//! Script host shared by the code sandbox and the expression evaluator.
//!
//! Every call builds a fresh `Context`, installs the console/timer shims,
//! strips the global object down to an allowlist and then runs the caller's
//! script. Promise jobs and virtual timers are drained on the host side, so
//! `async` user code settles without an event loop.

use std::time::{Duration, Instant};

use aiflow_types::SandboxError;
use boa_engine::{Context, JsError, Source};
use serde_json::Value;

/// Upper bound on timer callbacks fired per invocation.
const MAX_TIMER_FIRINGS: usize = 10_000;

/// JS call depth allowed before a call fails.
pub(crate) const DEFAULT_RECURSION_LIMIT: usize = 256;

pub(crate) const DEFAULT_ALLOWED_GLOBALS: &[&str] = &[
    "globalThis",
    "undefined",
    "NaN",
    "Infinity",
    "JSON",
    "Math",
    "parseInt",
    "parseFloat",
    "isNaN",
    "isFinite",
    "Number",
    "String",
    "Boolean",
    "Array",
    "Object",
    "Symbol",
    "Map",
    "Set",
    "Promise",
    "RegExp",
    "Date",
    "Error",
    "TypeError",
    "RangeError",
    "SyntaxError",
    "ReferenceError",
    "encodeURIComponent",
    "decodeURIComponent",
    "encodeURI",
    "decodeURI",
    "console",
    "setTimeout",
    "clearTimeout",
];

const SHIMS: &str = r#"
var __console_logs = [];
var console = (function() {
    function write() {
        var parts = [];
        for (var i = 0; i < arguments.length; i++) {
            var a = arguments[i];
            parts.push(typeof a === 'object' && a !== null ? JSON.stringify(a) : String(a));
        }
        __console_logs.push(parts.join(' '));
    }
    return { log: write, info: write, warn: write, error: write, debug: write };
})();

var __timers = [];
var __timer_seq = 0;
var __virtual_now = 0;
function setTimeout(fn, ms) {
    var args = Array.prototype.slice.call(arguments, 2);
    var delay = typeof ms === 'number' && ms > 0 ? ms : 0;
    __timer_seq += 1;
    __timers.push({ id: __timer_seq, due: __virtual_now + delay, fn: fn, args: args });
    return __timer_seq;
}
function clearTimeout(id) {
    __timers = __timers.filter(function(t) { return t.id !== id; });
}
function __fire_next_timer() {
    if (__timers.length === 0) { return false; }
    var next = 0;
    for (var i = 1; i < __timers.length; i++) {
        var t = __timers[i];
        var best = __timers[next];
        if (t.due < best.due || (t.due === best.due && t.id < best.id)) { next = i; }
    }
    var timer = __timers.splice(next, 1)[0];
    __virtual_now = timer.due;
    if (typeof timer.fn === 'function') { timer.fn.apply(null, timer.args); }
    return true;
}

function __describe_error(e) {
    if (e && typeof e === 'object' && 'message' in e) {
        return (e.name ? e.name + ': ' : '') + e.message;
    }
    return String(e);
}
var __state = { done: false, value: null, error: null };
"#;

fn lockdown(allowed: &[String]) -> String {
    let list = allowed
        .iter()
        .map(|s| serde_json::Value::String(s.clone()).to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!(
        r#"
(function() {{
    var allowed = new Set([{list}]);
    var g = globalThis;
    Object.getOwnPropertyNames(g).forEach(function(key) {{
        if (key.indexOf('__') === 0 || allowed.has(key)) {{ return; }}
        try {{ delete g[key]; }} catch (e) {{ g[key] = undefined; }}
    }});
}})();
"#
    )
}

/// Raw result read back from `__state` after the script settled.
#[derive(Debug)]
pub(crate) struct ScriptOutcome {
    pub value: Value,
    pub logs: Vec<String>,
}

#[derive(Clone, Debug)]
pub(crate) struct ScriptLimits {
    pub timeout: Duration,
    pub loop_iteration_limit: u64,
    pub recursion_limit: usize,
    pub allowed_globals: Vec<String>,
}

/// Run `body` in a fresh context. `body` must eventually set `__state.done`.
///
/// Boa offers no way to interrupt a running script, so a timed-out run keeps
/// its blocking thread until a runtime limit trips or the thread reaches its
/// own deadline between promise jobs and timer callbacks.
pub(crate) async fn run_script(body: String, limits: ScriptLimits) -> Result<ScriptOutcome, SandboxError> {
    let timeout = limits.timeout;
    let started = Instant::now();
    let handle = tokio::task::spawn_blocking(move || run_blocking(&body, &limits));

    let outcome = match tokio::time::timeout(timeout, handle).await {
        Err(_) => {
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, "script exceeded wall-clock limit");
            return Err(SandboxError::ExecutionTimeout(timeout));
        }
        Ok(Err(join)) => return Err(SandboxError::InternalError(format!("Task join error: {}", join))),
        Ok(Ok(result)) => result,
    };

    if started.elapsed() > timeout {
        return Err(SandboxError::ExecutionTimeout(timeout));
    }
    outcome
}

pub(crate) fn run_blocking(body: &str, limits: &ScriptLimits) -> Result<ScriptOutcome, SandboxError> {
    let deadline = Instant::now() + limits.timeout;
    let mut context = Context::default();
    let runtime_limits = context.runtime_limits_mut();
    runtime_limits.set_loop_iteration_limit(limits.loop_iteration_limit);
    runtime_limits.set_recursion_limit(limits.recursion_limit);

    crate::builtins::register_all(&mut context)
        .map_err(|e| SandboxError::InternalError(format!("Failed to register builtins: {}", e)))?;

    let mut allowed = limits.allowed_globals.clone();
    allowed.extend(crate::builtins::NATIVE_GLOBALS.iter().map(|s| s.to_string()));
    allowed.push("main".into());
    allowed.sort();
    allowed.dedup();

    let setup = format!("{}\n{}", SHIMS, lockdown(&allowed));
    context
        .eval(Source::from_bytes(&setup))
        .map_err(|e| SandboxError::InternalError(format!("Sandbox setup failed: {}", e)))?;

    context
        .eval(Source::from_bytes(body))
        .map_err(|e| map_js_error(e, limits.timeout))?;
    drain(&mut context, limits.timeout, deadline)?;

    let raw = context
        .eval(Source::from_bytes(
            "JSON.stringify({ done: __state.done, value: __state.value === undefined ? null : __state.value, error: __state.error, logs: __console_logs })",
        ))
        .map_err(|e| map_js_error(e, limits.timeout))?;
    let raw = raw
        .as_string()
        .map(|s| s.to_std_string_escaped())
        .ok_or_else(|| SandboxError::SerializationError("script state is not serializable".into()))?;

    let state: Value = serde_json::from_str(&raw)
        .map_err(|e| SandboxError::SerializationError(format!("Failed to parse result: {}", e)))?;

    let logs = state
        .get("logs")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    if let Some(err) = state.get("error").and_then(|v| v.as_str()) {
        if err.contains("RuntimeLimit") {
            return Err(SandboxError::ExecutionTimeout(limits.timeout));
        }
        return Err(SandboxError::ExecutionError(err.to_string()));
    }
    if !state.get("done").and_then(|v| v.as_bool()).unwrap_or(false) {
        return Err(SandboxError::ExecutionError(
            "main() returned a promise that never settled".into(),
        ));
    }

    Ok(ScriptOutcome {
        value: state.get("value").cloned().unwrap_or(Value::Null),
        logs,
    })
}

/// Run pending promise jobs, then fire virtual timers one at a time.
fn drain(context: &mut Context, timeout: Duration, deadline: Instant) -> Result<(), SandboxError> {
    context.run_jobs();
    for _ in 0..MAX_TIMER_FIRINGS {
        if Instant::now() >= deadline {
            return Err(SandboxError::ExecutionTimeout(timeout));
        }
        let fired = context
            .eval(Source::from_bytes("__fire_next_timer()"))
            .map_err(|e| map_js_error(e, timeout))?;
        if !fired.as_boolean().unwrap_or(false) {
            return Ok(());
        }
        context.run_jobs();
    }
    Err(SandboxError::ExecutionError(format!(
        "more than {} timer callbacks scheduled",
        MAX_TIMER_FIRINGS
    )))
}

fn map_js_error(e: JsError, timeout: Duration) -> SandboxError {
    let message = e.to_string();
    if message.contains("recursive calls") || message.contains("call stack") {
        SandboxError::ExecutionError(message)
    } else if message.contains("RuntimeLimit") {
        SandboxError::ExecutionTimeout(timeout)
    } else if message.starts_with("SyntaxError") {
        SandboxError::CompilationError(message)
    } else {
        SandboxError::ExecutionError(message)
    }
}

/// Encode `value` as a JS expression that reproduces it.
pub(crate) fn json_literal(value: &Value) -> Result<String, SandboxError> {
    let json = serde_json::to_string(value).map_err(|e| SandboxError::SerializationError(e.to_string()))?;
    let quoted = serde_json::to_string(&json).map_err(|e| SandboxError::SerializationError(e.to_string()))?;
    Ok(format!("JSON.parse({})", quoted))
}
