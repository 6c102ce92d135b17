//! Workflow-level error types.

use super::NodeError;
use crate::dsl::validation::ValidationReport;
use thiserror::Error;

/// Workflow-level errors
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Definition parse error: {0}")]
    DslParseError(String),
    #[error("Duplicate node id: {0}")]
    DuplicateNodeId(String),
    #[error("Edge {edge_id} references unknown node: {node_id}")]
    DanglingEdge { edge_id: String, node_id: String },
    #[error("Edge {edge_id} crosses sub-graph scopes ({source_scope} -> {target_scope})")]
    CrossScopeEdge {
        edge_id: String,
        source_scope: String,
        target_scope: String,
    },
    #[error("Node not found: {0}")]
    NodeNotFound(String),
    #[error("Node executor not found for type: {0}")]
    ExecutorNotFound(String),
    #[error("No trigger node found")]
    NoTriggerNode,
    #[error("Cycle detected in graph")]
    CycleDetected,
    #[error("Execution timeout")]
    ExecutionTimeout,
    #[error("Max steps exceeded: {0}")]
    MaxStepsExceeded(usize),
    #[error("Workflow aborted: {0}")]
    Aborted(String),
    #[error("Validation failed")]
    ValidationFailed(Box<ValidationReport>),
    #[error("Config error: {0}")]
    ConfigError(String),
    #[error("Node error: {0}")]
    NodeError(Box<NodeError>),
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl WorkflowError {
    /// Graph errors are reported before any node runs.
    pub fn is_graph_error(&self) -> bool {
        matches!(
            self,
            WorkflowError::DslParseError(_)
                | WorkflowError::DuplicateNodeId(_)
                | WorkflowError::DanglingEdge { .. }
                | WorkflowError::CrossScopeEdge { .. }
                | WorkflowError::NoTriggerNode
                | WorkflowError::CycleDetected
                | WorkflowError::ValidationFailed(_)
        )
    }
}

impl From<NodeError> for WorkflowError {
    fn from(value: NodeError) -> Self {
        WorkflowError::NodeError(Box::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_error_display() {
        assert_eq!(
            WorkflowError::DslParseError("x".into()).to_string(),
            "Definition parse error: x"
        );
        assert_eq!(
            WorkflowError::DanglingEdge {
                edge_id: "e1".into(),
                node_id: "ghost".into()
            }
            .to_string(),
            "Edge e1 references unknown node: ghost"
        );
        assert_eq!(WorkflowError::NoTriggerNode.to_string(), "No trigger node found");
        assert_eq!(
            WorkflowError::Aborted("cancelled".into()).to_string(),
            "Workflow aborted: cancelled"
        );
        assert_eq!(
            WorkflowError::MaxStepsExceeded(100).to_string(),
            "Max steps exceeded: 100"
        );
    }

    #[test]
    fn test_graph_error_classification() {
        assert!(WorkflowError::CycleDetected.is_graph_error());
        assert!(WorkflowError::DuplicateNodeId("a".into()).is_graph_error());
        assert!(!WorkflowError::ExecutionTimeout.is_graph_error());
        assert!(!WorkflowError::from(NodeError::Cancelled).is_graph_error());
    }
}
