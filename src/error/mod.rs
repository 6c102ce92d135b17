//! Error types for the workflow engine.
//!
//! - [`NodeError`]: raised by a single node handler.
//! - [`WorkflowError`]: graph errors and fatal run errors.
//! - [`ErrorContext`]: structured metadata (code, retryability, severity).

pub mod error_context;
pub mod node_error;
pub mod workflow_error;

pub use error_context::{ErrorCode, ErrorContext, ErrorRetryability, ErrorSeverity};
pub use node_error::NodeError;
pub use workflow_error::WorkflowError;

pub type WorkflowResult<T> = Result<T, WorkflowError>;
