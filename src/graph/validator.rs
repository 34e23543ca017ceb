//! Structural checks run when a workflow is saved. The engine itself does
//! not re-validate reachability at run time; it trusts the saved graph and
//! bounds runaway loops with its step limit.

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::Bfs;
use std::collections::HashMap;

use crate::model::{WorkflowConnection, WorkflowNode};
use crate::nodes::NodeExecutorRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Offending node id, when the finding is node-scoped.
    pub node_id: Option<i64>,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        !self
            .diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    fn error(&mut self, node_id: Option<i64>, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Error,
            node_id,
            message: message.into(),
        });
    }

    fn warning(&mut self, node_id: Option<i64>, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            node_id,
            message: message.into(),
        });
    }
}

/// Validate a workflow graph before it is persisted:
/// entry points exist and are triggers, connection endpoints resolve,
/// every non-entry node is reachable from an entry node, and each node's
/// config passes its executor's published schema.
///
/// Cycles are intentionally allowed: retry paths are wired in the graph
/// and bounded at run time by the engine's step limit.
pub fn validate_workflow(
    nodes: &[WorkflowNode],
    connections: &[WorkflowConnection],
    registry: &NodeExecutorRegistry,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    let entries: Vec<&WorkflowNode> = nodes.iter().filter(|n| n.is_entry_point).collect();
    if entries.is_empty() {
        report.error(None, "workflow has no entry point");
    }
    for node in &entries {
        if !node.kind.is_trigger() {
            report.error(
                Some(node.id),
                format!("entry node '{}' is not a trigger ({})", node.name, node.kind),
            );
        }
    }
    for node in nodes.iter().filter(|n| !n.is_entry_point) {
        if node.kind.is_trigger() {
            report.warning(
                Some(node.id),
                format!("trigger node '{}' is not an entry point", node.name),
            );
        }
    }

    // Graph construction; unknown endpoints are reported, not silently
    // dropped.
    let mut graph: StableDiGraph<i64, ()> = StableDiGraph::new();
    let mut index: HashMap<i64, NodeIndex> = HashMap::new();
    for node in nodes {
        index.insert(node.id, graph.add_node(node.id));
    }
    for conn in connections {
        match (index.get(&conn.from_node_id), index.get(&conn.to_node_id)) {
            (Some(from), Some(to)) => {
                graph.add_edge(*from, *to, ());
            }
            _ => report.error(
                None,
                format!(
                    "connection {} references unknown node ({} -> {})",
                    conn.id, conn.from_node_id, conn.to_node_id
                ),
            ),
        }
    }

    // Reachability from the union of entry nodes.
    let mut reached: HashMap<i64, bool> = nodes.iter().map(|n| (n.id, false)).collect();
    for entry in &entries {
        if let Some(start) = index.get(&entry.id) {
            let mut bfs = Bfs::new(&graph, *start);
            while let Some(idx) = bfs.next(&graph) {
                if let Some(node_id) = graph.node_weight(idx) {
                    reached.insert(*node_id, true);
                }
            }
        }
    }
    for node in nodes.iter().filter(|n| !n.is_entry_point) {
        if !reached.get(&node.id).copied().unwrap_or(false) {
            report.error(
                Some(node.id),
                format!("node '{}' is not reachable from any entry point", node.name),
            );
        }
    }

    // Per-node config against the executor's published schema.
    for node in nodes {
        match registry.get(node.kind) {
            None => report.error(
                Some(node.id),
                format!("no executor registered for node kind {}", node.kind),
            ),
            Some(executor) => {
                if let Err(e) = crate::nodes::validate_config(&executor.config_schema(), &node.config)
                {
                    report.error(Some(node.id), format!("node '{}': {e}", node.name));
                }
            }
        }
    }

    report
}
