use std::collections::HashSet;

use crate::dsl::EdgeHandle;

use super::types::{EdgeTraversalState, Graph};

/// Per-run edge state for one [`Graph`].
#[derive(Debug, Clone)]
pub struct EdgeStates {
    states: Vec<EdgeTraversalState>,
}

impl EdgeStates {
    pub fn new(graph: &Graph) -> Self {
        Self {
            states: vec![EdgeTraversalState::Pending; graph.edges().len()],
        }
    }

    /// Mark every outgoing edge of a finished node as taken.
    pub fn process_normal_edges(&mut self, graph: &Graph, node_id: &str) {
        for &e in graph.out_edge_indices(node_id) {
            self.states[e] = EdgeTraversalState::Taken;
        }
    }

    /// Keep edges whose handle matches `handle` (and unhandled edges); skip
    /// the rest. `EdgeHandle::Default` keeps every edge.
    pub fn process_branch_edges(&mut self, graph: &Graph, node_id: &str, handle: &EdgeHandle) {
        for &e in graph.out_edge_indices(node_id) {
            let live = match (handle, graph.edge(e).source_handle.as_deref()) {
                (EdgeHandle::Default, _) | (_, None) => true,
                (EdgeHandle::Branch(selected), Some(h)) => h == selected,
            };
            self.states[e] = if live {
                EdgeTraversalState::Taken
            } else {
                EdgeTraversalState::Skipped
            };
        }
    }

    /// Propagate a skip: every outgoing edge becomes skipped.
    pub fn skip_outgoing(&mut self, graph: &Graph, node_id: &str) {
        for &e in graph.out_edge_indices(node_id) {
            self.states[e] = EdgeTraversalState::Skipped;
        }
    }

    /// Inbound edges that count for readiness: those whose source is reachable.
    fn live_in_edges<'g>(
        &self,
        graph: &'g Graph,
        node_id: &str,
        reachable: &'g HashSet<String>,
    ) -> impl Iterator<Item = usize> + 'g {
        graph
            .in_edge_indices(node_id)
            .iter()
            .copied()
            .filter(move |&e| reachable.contains(&graph.edge(e).source))
    }

    /// Every counted inbound edge has been resolved.
    pub fn is_node_ready(&self, graph: &Graph, node_id: &str, reachable: &HashSet<String>) -> bool {
        self.live_in_edges(graph, node_id, reachable)
            .all(|e| self.states[e] != EdgeTraversalState::Pending)
    }

    /// The node has counted inbound edges and all of them were skipped.
    pub fn all_inputs_skipped(&self, graph: &Graph, node_id: &str, reachable: &HashSet<String>) -> bool {
        let mut any = false;
        for e in self.live_in_edges(graph, node_id, reachable) {
            any = true;
            if self.states[e] != EdgeTraversalState::Skipped {
                return false;
            }
        }
        any
    }

    /// Sources of taken inbound edges, deduplicated, in edge order.
    pub fn taken_predecessors<'g>(&self, graph: &'g Graph, node_id: &str) -> Vec<&'g str> {
        let mut seen = HashSet::new();
        graph
            .in_edge_indices(node_id)
            .iter()
            .filter(|&&e| self.states[e] == EdgeTraversalState::Taken)
            .map(|&e| graph.edge(e).source.as_str())
            .filter(|s| seen.insert(*s))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::WorkflowDefinition;
    use crate::graph::build_graph;
    use serde_json::json;

    fn branching_graph() -> Graph {
        let def: WorkflowDefinition = serde_json::from_value(json!({
            "nodes": [
                {"id": "s", "type": "start"},
                {"id": "c", "type": "condition"},
                {"id": "yes", "type": "template"},
                {"id": "no", "type": "template"},
                {"id": "join", "type": "output"}
            ],
            "edges": [
                {"id": "e1", "source": "s", "target": "c"},
                {"id": "e2", "source": "c", "target": "yes", "sourceHandle": "true"},
                {"id": "e3", "source": "c", "target": "no", "sourceHandle": "false"},
                {"id": "e4", "source": "yes", "target": "join"},
                {"id": "e5", "source": "no", "target": "join"}
            ]
        }))
        .unwrap();
        build_graph(&def).unwrap()
    }

    #[test]
    fn test_branch_selection() {
        let graph = branching_graph();
        let reachable = graph.reachable();
        let mut states = EdgeStates::new(&graph);

        assert!(states.is_node_ready(&graph, "s", &reachable));
        assert!(!states.is_node_ready(&graph, "c", &reachable));

        states.process_normal_edges(&graph, "s");
        assert!(states.is_node_ready(&graph, "c", &reachable));

        states.process_branch_edges(&graph, "c", &EdgeHandle::Branch("true".into()));
        assert!(states.is_node_ready(&graph, "yes", &reachable));
        assert!(states.all_inputs_skipped(&graph, "no", &reachable));
        assert!(!states.all_inputs_skipped(&graph, "yes", &reachable));

        states.skip_outgoing(&graph, "no");
        assert!(!states.is_node_ready(&graph, "join", &reachable));
        states.process_normal_edges(&graph, "yes");
        assert!(states.is_node_ready(&graph, "join", &reachable));
        assert!(!states.all_inputs_skipped(&graph, "join", &reachable));
        assert_eq!(states.taken_predecessors(&graph, "join"), vec!["yes"]);
    }

    #[test]
    fn test_unreachable_sources_do_not_block() {
        let def: WorkflowDefinition = serde_json::from_value(json!({
            "nodes": [
                {"id": "s", "type": "start"},
                {"id": "ghost", "type": "template"},
                {"id": "a", "type": "output"}
            ],
            "edges": [
                {"id": "e1", "source": "s", "target": "a"},
                {"id": "e2", "source": "ghost", "target": "a"}
            ]
        }))
        .unwrap();
        let graph = build_graph(&def).unwrap();
        let reachable = graph.reachable();
        assert!(!reachable.contains("ghost"));

        let mut states = EdgeStates::new(&graph);
        states.process_normal_edges(&graph, "s");
        assert!(states.is_node_ready(&graph, "a", &reachable));
    }
}
