//! Python code execution in a short-lived subprocess.
//!
//! The host writes `{"input": ..., "vars": ...}` to the child's stdin; a
//! generated wrapper calls the user's `main(input, vars)` and prints the JSON
//! result between [`OUTPUT_START`] and [`OUTPUT_END`]. The child is killed
//! when the wall-clock cap elapses (or the future is dropped), and the temp
//! script is removed on every path.

use std::io::Write;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use aiflow_types::{
    CodeLanguage, CodeSandbox, HealthStatus, SandboxError, SandboxRequest, SandboxResult, SandboxType,
    DEFAULT_CODE_TIMEOUT,
};

pub const OUTPUT_START: &str = "<<MASTRA_OUTPUT>>";
pub const OUTPUT_END: &str = "<<MASTRA_OUTPUT_END>>";

#[derive(Clone, Debug)]
pub struct PythonSandboxConfig {
    pub python_bin: String,
    pub default_timeout: Duration,
    pub max_code_size: usize,
}

impl Default for PythonSandboxConfig {
    fn default() -> Self {
        Self {
            python_bin: "python3".to_string(),
            default_timeout: DEFAULT_CODE_TIMEOUT,
            max_code_size: 1_000_000,
        }
    }
}

#[derive(Default)]
pub struct PythonSandbox {
    config: PythonSandboxConfig,
}

impl PythonSandbox {
    pub fn new(config: PythonSandboxConfig) -> Self {
        Self { config }
    }

    fn wrapper_script(code: &str) -> String {
        format!(
            r#"import json
import sys
import traceback

{code}


def __aiflow_entry():
    payload = json.loads(sys.stdin.read() or "{{}}")
    try:
        result = main(payload.get("input"), payload.get("vars") or {{}})
    except Exception as exc:
        traceback.print_exc()
        sys.stderr.write("%s: %s\n" % (type(exc).__name__, exc))
        sys.stderr.flush()
        sys.exit(1)
    sys.stdout.write("\n{start}\n")
    sys.stdout.write(json.dumps(result, default=str))
    sys.stdout.write("\n{end}\n")
    sys.stdout.flush()


if __name__ == "__main__":
    __aiflow_entry()
"#,
            code = code,
            start = OUTPUT_START,
            end = OUTPUT_END,
        )
    }

    /// Extract the result strictly between the markers; without markers the
    /// whole of stdout must be JSON. Returns `(result, stdout outside markers)`.
    pub fn parse_output(stdout: &str) -> Result<(Value, String), SandboxError> {
        if let Some(start) = stdout.find(OUTPUT_START) {
            let body_start = start + OUTPUT_START.len();
            let end = stdout[body_start..]
                .find(OUTPUT_END)
                .map(|i| body_start + i)
                .ok_or_else(|| SandboxError::OutputParse("missing end-of-output marker".into()))?;
            let value = serde_json::from_str(stdout[body_start..end].trim())
                .map_err(|e| SandboxError::OutputParse(e.to_string()))?;
            let logs = format!("{}{}", &stdout[..start], &stdout[end + OUTPUT_END.len()..]);
            return Ok((value, logs.trim().to_string()));
        }
        let value = serde_json::from_str(stdout.trim())
            .map_err(|e| SandboxError::OutputParse(format!("no output markers and stdout is not JSON: {}", e)))?;
        Ok((value, String::new()))
    }

    fn failure_message(stderr: &str, code: Option<i32>) -> String {
        stderr
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("python exited with status {:?}", code))
    }
}

#[async_trait]
impl CodeSandbox for PythonSandbox {
    fn sandbox_type(&self) -> SandboxType {
        SandboxType::Subprocess
    }

    fn supported_languages(&self) -> Vec<CodeLanguage> {
        vec![CodeLanguage::Python]
    }

    async fn execute(&self, request: SandboxRequest) -> Result<SandboxResult, SandboxError> {
        if request.language != CodeLanguage::Python {
            return Err(SandboxError::UnsupportedLanguage(request.language));
        }
        self.validate(&request.code, request.language).await?;

        let started = Instant::now();
        let timeout = if request.config.timeout.is_zero() {
            self.config.default_timeout
        } else {
            request.config.timeout
        };

        let mut script = tempfile::Builder::new()
            .prefix("aiflow_")
            .suffix(".py")
            .tempfile()
            .map_err(|e| SandboxError::SandboxUnavailable(format!("temp script: {}", e)))?;
        script
            .write_all(Self::wrapper_script(&request.code).as_bytes())
            .and_then(|_| script.flush())
            .map_err(|e| SandboxError::InternalError(format!("write temp script: {}", e)))?;

        let mut child = Command::new(&self.config.python_bin)
            .arg(script.path())
            .envs(&request.config.env_vars)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SandboxError::SandboxUnavailable(format!("spawn {}: {}", self.config.python_bin, e)))?;
        debug!(pid = ?child.id(), script = %script.path().display(), "python sandbox spawned");

        let payload =
            serde_json::to_vec(&request.inputs).map_err(|e| SandboxError::SerializationError(e.to_string()))?;
        // Feeding stdin and collecting output share one deadline: a child that
        // stalls before reading would otherwise block the write forever.
        let stdin = child.stdin.take();
        let run = async move {
            let feed = async move {
                if let Some(mut stdin) = stdin {
                    if let Err(e) = stdin.write_all(&payload).await {
                        // The child may exit before reading; its status tells the story.
                        debug!(error = %e, "python stdin write failed");
                    }
                }
            };
            let ((), output) = tokio::join!(feed, child.wait_with_output());
            output
        };

        let output = match tokio::time::timeout(timeout, run).await {
            Ok(result) => result.map_err(|e| SandboxError::ExecutionError(e.to_string()))?,
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "python sandbox timed out");
                return Err(SandboxError::ExecutionTimeout(timeout));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !output.status.success() {
            return Err(SandboxError::ExecutionError(Self::failure_message(&stderr, output.status.code())));
        }

        let (value, logs) = Self::parse_output(&stdout)?;
        Ok(SandboxResult {
            output: value,
            stdout: logs,
            stderr,
            execution_time: started.elapsed(),
        })
    }

    async fn validate(&self, code: &str, language: CodeLanguage) -> Result<(), SandboxError> {
        if language != CodeLanguage::Python {
            return Err(SandboxError::UnsupportedLanguage(language));
        }
        if code.len() > self.config.max_code_size {
            return Err(SandboxError::CodeTooLarge {
                max: self.config.max_code_size,
                actual: code.len(),
            });
        }
        if !code.contains("def main") {
            return Err(SandboxError::CompilationError("code must define `def main(input, vars)`".into()));
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<HealthStatus, SandboxError> {
        let version = Command::new(&self.config.python_bin)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await;
        Ok(match version {
            Ok(status) if status.success() => HealthStatus::Healthy,
            Ok(status) => HealthStatus::Unhealthy(format!("{} exited with {}", self.config.python_bin, status)),
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        })
    }
}
