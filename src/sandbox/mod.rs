//! Code sandboxes: the Boa JavaScript runtime (from `aiflow-sandbox-js`) and
//! the Python subprocess runner, selected by language.

pub mod manager;
pub mod python;

pub use aiflow_types::{CodeLanguage, CodeSandbox, SandboxError, SandboxRequest, SandboxResult};
pub use manager::{SandboxManager, SandboxManagerConfig};
pub use python::{PythonSandbox, PythonSandboxConfig};
