pub mod sandbox;

pub use sandbox::{
    CodeLanguage, CodeSandbox, ExecutionConfig, HealthStatus, SandboxError, SandboxRequest,
    SandboxResult, SandboxType, DEFAULT_CODE_TIMEOUT,
};
