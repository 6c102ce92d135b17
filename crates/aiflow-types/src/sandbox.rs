use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Default wall-clock cap for one user-code invocation.
pub const DEFAULT_CODE_TIMEOUT: Duration = Duration::from_secs(5);

// ================================
// CodeSandbox Trait
// ================================

/// Isolated execution environment for user-supplied code.
///
/// Implementations must leave no residual state behind: every call gets a
/// fresh interpreter context or a fresh OS process.
#[async_trait::async_trait]
pub trait CodeSandbox: Send + Sync {
    fn sandbox_type(&self) -> SandboxType;

    fn supported_languages(&self) -> Vec<CodeLanguage>;

    /// Run `request.code`. The sandbox calls the user's `main` entry point
    /// with `request.inputs` and returns its JSON-serialized result.
    async fn execute(&self, request: SandboxRequest) -> Result<SandboxResult, SandboxError>;

    /// Cheap pre-flight check, e.g. that a `main` entry point is declared.
    async fn validate(&self, code: &str, language: CodeLanguage) -> Result<(), SandboxError> {
        let _ = (code, language);
        Ok(())
    }

    async fn health_check(&self) -> Result<HealthStatus, SandboxError> {
        Ok(HealthStatus::Healthy)
    }
}

// ================================
// Enums
// ================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxType {
    /// In-process Boa interpreter
    Builtin,
    /// Short-lived interpreter subprocess
    Subprocess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeLanguage {
    #[serde(alias = "js", alias = "Javascript")]
    JavaScript,
    #[serde(alias = "py", alias = "python3")]
    Python,
}

impl CodeLanguage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeLanguage::JavaScript => "javascript",
            CodeLanguage::Python => "python",
        }
    }
}

impl std::fmt::Display for CodeLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

// ================================
// Request / Response / Config
// ================================

#[derive(Debug, Clone)]
pub struct SandboxRequest {
    pub code: String,
    pub language: CodeLanguage,
    /// Object of the shape `{ input, vars }`.
    pub inputs: Value,
    pub config: ExecutionConfig,
}

impl SandboxRequest {
    pub fn new(code: impl Into<String>, language: CodeLanguage, input: Value, vars: Value) -> Self {
        Self {
            code: code.into(),
            language,
            inputs: serde_json::json!({ "input": input, "vars": vars }),
            config: ExecutionConfig::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Wall-clock cap for one invocation
    pub timeout: Duration,

    /// Max source size in bytes
    pub max_code_size: usize,

    /// Extra environment for subprocess sandboxes
    pub env_vars: HashMap<String, String>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_CODE_TIMEOUT,
            max_code_size: 1024 * 1024,
            env_vars: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SandboxResult {
    pub output: Value,

    /// Captured console / print output
    pub stdout: String,

    pub stderr: String,

    pub execution_time: Duration,
}

// ================================
// Errors
// ================================

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(CodeLanguage),

    #[error("Code too large (max {max} bytes, got {actual} bytes)")]
    CodeTooLarge { max: usize, actual: usize },

    #[error("Compilation error: {0}")]
    CompilationError(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Execution timeout after {0:?}")]
    ExecutionTimeout(Duration),

    #[error("Output parse error: {0}")]
    OutputParse(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Sandbox unavailable: {0}")]
    SandboxUnavailable(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl SandboxError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, SandboxError::ExecutionTimeout(_))
    }
}
