//! Data-shaping node executors: template, variable assignment/aggregation,
//! sandboxed code and HTTP requests.

pub mod aggregator;
pub mod assigner;
pub mod code;
pub mod http;
pub mod template;

pub use aggregator::VariableAggregatorExecutor;
pub use assigner::VariableAssignmentExecutor;
pub use code::CodeNodeExecutor;
pub use http::HttpRequestExecutor;
pub use template::TemplateNodeExecutor;
