use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use petgraph::graph::{DiGraph, NodeIndex};

use crate::dsl::{EdgeSchema, NodeSchema, SubGraphSpec, WorkflowDefinition};
use crate::error::{WorkflowError, WorkflowResult};

use super::types::*;

/// Build the top-level graph. Requires at least one trigger node.
pub fn build_graph(def: &WorkflowDefinition) -> WorkflowResult<Graph> {
    build_scope(def, true)
}

/// Build one scope of `def` (nodes without `parentId`) and, recursively, the
/// private sub-graph of every container node in it.
pub fn build_scope(def: &WorkflowDefinition, require_trigger: bool) -> WorkflowResult<Graph> {
    let mut by_id: HashMap<&str, &NodeSchema> = HashMap::new();
    for node in &def.nodes {
        if by_id.insert(node.id.as_str(), node).is_some() {
            return Err(WorkflowError::DuplicateNodeId(node.id.clone()));
        }
    }

    for node in &def.nodes {
        if let Some(parent) = &node.parent_id {
            if !by_id.contains_key(parent.as_str()) {
                return Err(WorkflowError::NodeNotFound(parent.clone()));
            }
        }
    }

    for edge in &def.edges {
        let source = by_id.get(edge.source.as_str()).ok_or_else(|| WorkflowError::DanglingEdge {
            edge_id: edge.id.clone(),
            node_id: edge.source.clone(),
        })?;
        let target = by_id.get(edge.target.as_str()).ok_or_else(|| WorkflowError::DanglingEdge {
            edge_id: edge.id.clone(),
            node_id: edge.target.clone(),
        })?;
        if source.parent_id != target.parent_id {
            return Err(WorkflowError::CrossScopeEdge {
                edge_id: edge.id.clone(),
                source_scope: scope_name(&source.parent_id),
                target_scope: scope_name(&target.parent_id),
            });
        }
    }

    let mut graph = Graph {
        nodes: Vec::new(),
        edges: Vec::new(),
        index: HashMap::new(),
        in_edges: Vec::new(),
        out_edges: Vec::new(),
        topology: DiGraph::new(),
        children: HashMap::new(),
    };

    for node in def.nodes.iter().filter(|n| n.parent_id.is_none()) {
        let idx = graph.nodes.len();
        graph.index.insert(node.id.clone(), idx);
        graph.nodes.push(GraphNode {
            id: node.id.clone(),
            node_type: node.node_type.clone(),
            kind: node.kind(),
            label: node.label(),
            config: node.data.clone(),
        });
        graph.in_edges.push(Vec::new());
        graph.out_edges.push(Vec::new());
        graph.topology.add_node(idx);
    }

    for edge in &def.edges {
        let (Some(&s), Some(&t)) = (graph.index.get(&edge.source), graph.index.get(&edge.target)) else {
            continue;
        };
        let idx = graph.edges.len();
        graph.edges.push(GraphEdge {
            id: if edge.id.is_empty() {
                format!("{}->{}", edge.source, edge.target)
            } else {
                edge.id.clone()
            },
            source: edge.source.clone(),
            target: edge.target.clone(),
            source_handle: edge.source_handle.clone(),
        });
        graph.out_edges[s].push(idx);
        graph.in_edges[t].push(idx);
        graph.topology.add_edge(NodeIndex::new(s), NodeIndex::new(t), idx);
    }

    if require_trigger && !graph.nodes.iter().any(|n| n.is_trigger()) {
        return Err(WorkflowError::NoTriggerNode);
    }

    if petgraph::algo::toposort(&graph.topology, None).is_err() {
        return Err(WorkflowError::CycleDetected);
    }

    let containers: Vec<String> = graph
        .nodes
        .iter()
        .filter(|n| n.kind.map(|k| k.is_container()).unwrap_or(false))
        .map(|n| n.id.clone())
        .collect();
    for owner in containers {
        let child_def = sub_definition(def, &owner, by_id[owner.as_str()]);
        let child = build_scope(&child_def, false)?;
        graph.children.insert(owner, Arc::new(child));
    }

    Ok(graph)
}

fn scope_name(parent: &Option<String>) -> String {
    parent.clone().unwrap_or_else(|| "root".to_string())
}

/// The private definition owned by `owner`: inline `subNodes`/`subEdges` when
/// present, otherwise every descendant tagged through `parentId`.
pub fn sub_definition(def: &WorkflowDefinition, owner: &str, owner_node: &NodeSchema) -> WorkflowDefinition {
    let spec: SubGraphSpec = serde_json::from_value(owner_node.data.clone()).unwrap_or_default();
    if let Some(nodes) = spec.sub_nodes.filter(|n| !n.is_empty()) {
        return WorkflowDefinition {
            nodes,
            edges: spec.sub_edges.unwrap_or_default(),
        };
    }

    let parents: HashMap<&str, Option<&str>> = def
        .nodes
        .iter()
        .map(|n| (n.id.as_str(), n.parent_id.as_deref()))
        .collect();
    let is_descendant = |id: &str| {
        let mut current = parents.get(id).copied().flatten();
        let mut hops = 0;
        while let Some(p) = current {
            if p == owner {
                return true;
            }
            hops += 1;
            if hops > parents.len() {
                return false;
            }
            current = parents.get(p).copied().flatten();
        }
        false
    };

    let nodes: Vec<NodeSchema> = def
        .nodes
        .iter()
        .filter(|n| is_descendant(&n.id))
        .map(|n| {
            let mut n = n.clone();
            if n.parent_id.as_deref() == Some(owner) {
                n.parent_id = None;
            }
            n
        })
        .collect();
    let members: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    let edges: Vec<EdgeSchema> = def
        .edges
        .iter()
        .filter(|e| members.contains(e.source.as_str()) && members.contains(e.target.as_str()))
        .cloned()
        .collect();

    WorkflowDefinition { nodes, edges }
}

/// Node types of every node in `graph` and its nested scopes that have no
/// known [`NodeType`].
pub fn unknown_node_types(graph: &Graph) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = graph
        .nodes
        .iter()
        .filter(|n| n.kind.is_none())
        .map(|n| (n.id.clone(), n.node_type.clone()))
        .collect();
    for child in graph.children.values() {
        out.extend(unknown_node_types(child));
    }
    out
}
