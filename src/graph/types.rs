use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use serde_json::Value;

use crate::dsl::NodeType;

#[derive(Debug, Clone)]
pub struct GraphNode {
    pub id: String,
    /// Raw tag as written in the definition.
    pub node_type: String,
    /// `None` when the tag is not a known node type.
    pub kind: Option<NodeType>,
    pub label: String,
    pub config: Value,
}

impl GraphNode {
    pub fn is_trigger(&self) -> bool {
        self.kind.map(|k| k.is_trigger()).unwrap_or(false)
    }

    pub fn is_branch(&self) -> bool {
        self.kind.map(|k| k.is_branch()).unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub source_handle: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeTraversalState {
    Pending,
    Taken,
    Skipped,
}

/// One scope of a workflow, with its nested container scopes pre-built.
#[derive(Debug)]
pub struct Graph {
    pub(crate) nodes: Vec<GraphNode>,
    pub(crate) edges: Vec<GraphEdge>,
    pub(crate) index: HashMap<String, usize>,
    pub(crate) in_edges: Vec<Vec<usize>>,
    pub(crate) out_edges: Vec<Vec<usize>>,
    pub(crate) topology: DiGraph<usize, usize>,
    pub(crate) children: HashMap<String, Arc<Graph>>,
}

impl Graph {
    pub fn node(&self, node_id: &str) -> Option<&GraphNode> {
        self.index.get(node_id).map(|&i| &self.nodes[i])
    }

    /// Nodes in definition order.
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn edge(&self, idx: usize) -> &GraphEdge {
        &self.edges[idx]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn in_edge_indices(&self, node_id: &str) -> &[usize] {
        self.index
            .get(node_id)
            .map(|&i| self.in_edges[i].as_slice())
            .unwrap_or(&[])
    }

    pub fn out_edge_indices(&self, node_id: &str) -> &[usize] {
        self.index
            .get(node_id)
            .map(|&i| self.out_edges[i].as_slice())
            .unwrap_or(&[])
    }

    /// Targets of `node_id`'s outgoing edges, deduplicated, in edge order.
    pub fn downstream_node_ids(&self, node_id: &str) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.out_edge_indices(node_id)
            .iter()
            .map(|&e| self.edges[e].target.as_str())
            .filter(|t| seen.insert(*t))
            .collect()
    }

    pub fn has_branch_handle(&self, node_id: &str, handle: &str) -> bool {
        self.out_edge_indices(node_id)
            .iter()
            .any(|&e| self.edges[e].source_handle.as_deref() == Some(handle))
    }

    /// Entry points: trigger nodes, or every node without inbound edges when
    /// the scope declares no trigger.
    pub fn roots(&self) -> Vec<&str> {
        let triggers: Vec<&str> = self
            .nodes
            .iter()
            .filter(|n| n.is_trigger())
            .map(|n| n.id.as_str())
            .collect();
        if !triggers.is_empty() {
            return triggers;
        }
        self.nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| self.in_edges[*i].is_empty())
            .map(|(_, n)| n.id.as_str())
            .collect()
    }

    /// Nodes with a path from any root. Computed on every call.
    pub fn reachable(&self) -> HashSet<String> {
        let mut reachable = HashSet::new();
        for root in self.roots() {
            let Some(&start) = self.index.get(root) else {
                continue;
            };
            let mut bfs = Bfs::new(&self.topology, NodeIndex::new(start));
            while let Some(nx) = bfs.next(&self.topology) {
                reachable.insert(self.nodes[self.topology[nx]].id.clone());
            }
        }
        reachable
    }

    /// Private sub-graph owned by container node `owner_id`.
    pub fn sub_graph(&self, owner_id: &str) -> Option<Arc<Graph>> {
        self.children.get(owner_id).cloned()
    }
}
