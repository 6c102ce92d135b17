//! Definition validation producing a [`ValidationReport`].
//!
//! Structural checks run first and collect every finding; topology checks
//! (triggers, cycles, reachability) only run on a structurally sound
//! definition.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::parser::{parse_definition, DslFormat};
use super::schema::{NodePolicy, NodeType, WorkflowDefinition};
use crate::error::WorkflowError;
use crate::graph::{build_graph, Graph};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Error,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edge_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationReport {
    pub fn errors(&self) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Error)
            .collect()
    }

    pub fn warnings(&self) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Warning)
            .collect()
    }
}

pub fn validate_text(content: &str, format: DslFormat) -> ValidationReport {
    match parse_definition(content, format) {
        Ok(def) => validate_definition(&def),
        Err(err) => ValidationReport {
            is_valid: false,
            diagnostics: vec![error("E001", err.to_string(), None, None)],
        },
    }
}

pub fn validate_definition(def: &WorkflowDefinition) -> ValidationReport {
    let mut diagnostics = structure(def);

    if diagnostics.iter().all(|d| d.level != DiagnosticLevel::Error) {
        match build_graph(def) {
            Ok(graph) => diagnostics.extend(topology(&graph)),
            Err(WorkflowError::NoTriggerNode) => diagnostics.push(error(
                "E007",
                "No trigger node (start, cron_trigger, webhook) at the top level".into(),
                None,
                None,
            )),
            Err(WorkflowError::CycleDetected) => {
                diagnostics.push(error("E008", "Cycle detected in graph".into(), None, None))
            }
            Err(other) => diagnostics.push(error("E009", other.to_string(), None, None)),
        }
    }

    let is_valid = diagnostics.iter().all(|d| d.level != DiagnosticLevel::Error);
    ValidationReport {
        is_valid,
        diagnostics,
    }
}

fn structure(def: &WorkflowDefinition) -> Vec<Diagnostic> {
    let mut diags = Vec::new();
    let mut scopes: HashMap<&str, Option<&str>> = HashMap::new();

    for node in &def.nodes {
        if scopes.insert(node.id.as_str(), node.parent_id.as_deref()).is_some() {
            diags.push(error(
                "E002",
                format!("Duplicate node id: {}", node.id),
                Some(node.id.clone()),
                None,
            ));
        }
    }

    for node in &def.nodes {
        if let Some(parent) = &node.parent_id {
            if !scopes.contains_key(parent.as_str()) {
                diags.push(error(
                    "E005",
                    format!("parentId references unknown node: {}", parent),
                    Some(node.id.clone()),
                    None,
                ));
            }
        }

        match node.kind() {
            None => diags.push(error(
                "E006",
                format!("Unknown node type: {}", node.node_type),
                Some(node.id.clone()),
                None,
            )),
            Some(kind) => diags.extend(node_config(kind, &node.id, &node.data)),
        }
    }

    for edge in &def.edges {
        let source = scopes.get(edge.source.as_str());
        let target = scopes.get(edge.target.as_str());
        for (end, found) in [(&edge.source, source), (&edge.target, target)] {
            if found.is_none() {
                diags.push(error(
                    "E003",
                    format!("Edge references unknown node: {}", end),
                    None,
                    Some(edge.id.clone()),
                ));
            }
        }
        if let (Some(s), Some(t)) = (source, target) {
            if s != t {
                diags.push(error(
                    "E004",
                    format!("Edge {} -> {} crosses sub-graph scopes", edge.source, edge.target),
                    None,
                    Some(edge.id.clone()),
                ));
            }
        }
    }

    diags
}

fn node_config(kind: NodeType, node_id: &str, data: &serde_json::Value) -> Vec<Diagnostic> {
    let missing = |field: &str| {
        error(
            "E010",
            format!("{} node is missing `{}`", kind, field),
            Some(node_id.to_string()),
            None,
        )
    };
    let has_str = |field: &str| data.get(field).and_then(|v| v.as_str()).map(|s| !s.trim().is_empty()).unwrap_or(false);

    let mut diags: Vec<Diagnostic> = NodePolicy::malformed_fields(data)
        .into_iter()
        .map(|(field, reason)| {
            error(
                "E011",
                format!("Invalid `{}` on node {}: {}", field, node_id, reason),
                Some(node_id.to_string()),
                None,
            )
        })
        .collect();
    match kind {
        NodeType::Code if !has_str("code") => diags.push(missing("code")),
        NodeType::HttpRequest if !has_str("url") => diags.push(missing("url")),
        NodeType::Template if !has_str("template") => diags.push(missing("template")),
        NodeType::QuestionClassifier => {
            let empty = data
                .get("categories")
                .and_then(|v| v.as_array())
                .map(|a| a.is_empty())
                .unwrap_or(true);
            if empty {
                diags.push(missing("categories"));
            }
        }
        _ => {}
    }
    diags
}

fn topology(graph: &Graph) -> Vec<Diagnostic> {
    let mut diags = Vec::new();
    let reachable = graph.reachable();

    for node in graph.nodes() {
        if !reachable.contains(&node.id) {
            diags.push(warn(
                "W101",
                format!("Node {} is unreachable from any trigger and will never run", node.id),
                Some(node.id.clone()),
            ));
        }
        if node.is_branch() {
            let unhandled = graph
                .out_edge_indices(&node.id)
                .iter()
                .filter(|&&e| graph.edge(e).source_handle.is_none())
                .count();
            if unhandled > 0 {
                diags.push(warn(
                    "W102",
                    format!("Branch node {} has {} outgoing edge(s) without sourceHandle; they always run", node.id, unhandled),
                    Some(node.id.clone()),
                ));
            }
        }
        if let Some(child) = graph.sub_graph(&node.id) {
            if child.is_empty() {
                diags.push(warn(
                    "W103",
                    format!("Container node {} has an empty sub-graph", node.id),
                    Some(node.id.clone()),
                ));
            } else {
                let nested: HashSet<String> = topology(&child).into_iter().map(|d| d.message).collect();
                diags.extend(nested.into_iter().map(|m| warn("W104", m, Some(node.id.clone()))));
            }
        }
    }
    diags
}

fn error(code: &str, message: String, node_id: Option<String>, edge_id: Option<String>) -> Diagnostic {
    Diagnostic {
        level: DiagnosticLevel::Error,
        code: code.to_string(),
        message,
        node_id,
        edge_id,
    }
}

fn warn(code: &str, message: String, node_id: Option<String>) -> Diagnostic {
    Diagnostic {
        level: DiagnosticLevel::Warning,
        code: code.to_string(),
        message,
        node_id,
        edge_id: None,
    }
}
