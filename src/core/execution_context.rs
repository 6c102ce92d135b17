use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::dsl::{NodeResult, NodeStatus};

/// Per-run mapping `nodeId -> NodeResult`.
///
/// Entries are write-once. A sub-run context (iteration item, loop pass)
/// starts empty and falls back to a frozen snapshot of its parent for reads,
/// so nested graphs can reference outer node outputs without being able to
/// touch them.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    input: Value,
    scope: Map<String, Value>,
    results: HashMap<String, NodeResult>,
    order: Vec<String>,
    parent: Option<Arc<ExecutionContext>>,
}

impl ExecutionContext {
    pub fn new(input: Value) -> Self {
        Self {
            input,
            ..Self::default()
        }
    }

    /// Fresh context for a nested sub-run.
    pub fn child(parent: Arc<ExecutionContext>, input: Value, scope: Map<String, Value>) -> Self {
        Self {
            input,
            scope,
            results: HashMap::new(),
            order: Vec::new(),
            parent: Some(parent),
        }
    }

    /// Raw input of this scope (trigger payload, iteration item, loop input).
    pub fn input(&self) -> &Value {
        &self.input
    }

    pub fn scope(&self) -> &Map<String, Value> {
        &self.scope
    }

    /// Scope variable lookup, innermost scope first.
    pub fn scope_var(&self, name: &str) -> Option<&Value> {
        self.scope
            .get(name)
            .or_else(|| self.parent.as_ref().and_then(|p| p.scope_var(name)))
    }

    pub fn result(&self, node_id: &str) -> Option<&NodeResult> {
        self.results
            .get(node_id)
            .or_else(|| self.parent.as_ref().and_then(|p| p.result(node_id)))
    }

    /// Output visible to downstream resolution: completed nodes, and failed
    /// nodes whose output was substituted by their error policy.
    pub fn output(&self, node_id: &str) -> Option<&Value> {
        self.result(node_id)
            .filter(|r| r.status == NodeStatus::Completed || r.tolerated)
            .map(|r| &r.output)
    }

    /// Record a terminal result. Returns `false` (and keeps the first entry)
    /// when the node already has one in this scope.
    pub fn insert(&mut self, result: NodeResult) -> bool {
        if self.results.contains_key(&result.node_id) {
            return false;
        }
        self.order.push(result.node_id.clone());
        self.results.insert(result.node_id.clone(), result);
        true
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.results.contains_key(node_id)
    }

    /// Results of this scope only, in the order they were recorded.
    pub fn results(&self) -> Vec<NodeResult> {
        self.order
            .iter()
            .filter_map(|id| self.results.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Outputs of every visible node plus scope variables, for expression
    /// bindings. Inner scopes shadow outer ones.
    pub fn bindings(&self) -> Map<String, Value> {
        let mut out = match &self.parent {
            Some(parent) => parent.bindings(),
            None => Map::new(),
        };
        for id in &self.order {
            if let Some(v) = self.output(id) {
                out.insert(id.clone(), v.clone());
            }
        }
        for (k, v) in &self.scope {
            out.insert(k.clone(), v.clone());
        }
        out.insert("input".to_string(), self.input.clone());
        out
    }

    /// Frozen copy handed to nested sub-runs as their read-only parent.
    pub fn snapshot(&self) -> Arc<ExecutionContext> {
        Arc::new(self.clone())
    }
}
