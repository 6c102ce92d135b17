use std::collections::HashMap;
use std::sync::Arc;

use aiflow_sandbox_js::{JsSandbox, JsSandboxConfig};
use aiflow_types::{CodeLanguage, CodeSandbox, HealthStatus, SandboxError, SandboxRequest, SandboxResult, SandboxType};

use super::python::{PythonSandbox, PythonSandboxConfig};

#[derive(Clone, Debug, Default)]
pub struct SandboxManagerConfig {
    pub js: JsSandboxConfig,
    pub python: PythonSandboxConfig,
}

/// Routes code requests to the sandbox registered for their language.
pub struct SandboxManager {
    sandboxes: HashMap<CodeLanguage, Arc<dyn CodeSandbox>>,
}

impl SandboxManager {
    /// JavaScript (Boa) and Python (subprocess).
    pub fn new(config: SandboxManagerConfig) -> Self {
        let mut manager = Self::new_empty();
        manager.register_sandbox(CodeLanguage::JavaScript, Arc::new(JsSandbox::new(config.js)));
        manager.register_sandbox(CodeLanguage::Python, Arc::new(PythonSandbox::new(config.python)));
        manager
    }

    pub fn new_empty() -> Self {
        Self {
            sandboxes: HashMap::new(),
        }
    }

    pub fn register_sandbox(&mut self, language: CodeLanguage, sandbox: Arc<dyn CodeSandbox>) {
        self.sandboxes.insert(language, sandbox);
    }

    pub async fn execute(&self, request: SandboxRequest) -> Result<SandboxResult, SandboxError> {
        let sandbox = self
            .sandboxes
            .get(&request.language)
            .ok_or(SandboxError::UnsupportedLanguage(request.language))?;
        if !sandbox.supported_languages().contains(&request.language) {
            return Err(SandboxError::UnsupportedLanguage(request.language));
        }
        sandbox.execute(request).await
    }

    pub async fn validate(&self, code: &str, language: CodeLanguage) -> Result<(), SandboxError> {
        let sandbox = self
            .sandboxes
            .get(&language)
            .ok_or(SandboxError::UnsupportedLanguage(language))?;
        sandbox.validate(code, language).await
    }

    pub async fn health_check_all(&self) -> Vec<(SandboxType, HealthStatus)> {
        let mut results = Vec::new();
        let mut checked = std::collections::HashSet::new();
        for sandbox in self.sandboxes.values() {
            let st = sandbox.sandbox_type();
            if !checked.insert(st) {
                continue;
            }
            match sandbox.health_check().await {
                Ok(status) => results.push((st, status)),
                Err(e) => results.push((st, HealthStatus::Unhealthy(e.to_string()))),
            }
        }
        results
    }
}

impl Default for SandboxManager {
    fn default() -> Self {
        Self::new(SandboxManagerConfig::default())
    }
}
