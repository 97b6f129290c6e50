//! DAG model and validator.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use ratchet_core::NodeId;

use crate::TRACING_TARGET_GRAPH;
use crate::definition::WorkflowDefinition;
use crate::error::{EngineError, EngineResult};

/// Compiled adjacency view of a workflow definition.
///
/// Built once per engine construction. Validation rejects cyclic graphs and
/// dangling references before any node executes, so a bad definition never
/// causes partial side effects.
#[derive(Debug)]
pub struct WorkflowGraph {
    /// Outgoing edges per node, in edge-definition order.
    ///
    /// petgraph iterates neighbors in reverse insertion order, so the
    /// deterministic child order the engine schedules in is kept here.
    children: HashMap<NodeId, Vec<NodeId>>,
    /// Incoming edge counts, used by the Kahn-style cycle check.
    node_count: usize,
}

impl WorkflowGraph {
    /// Compiles and validates the adjacency of a definition.
    pub fn compile(definition: &WorkflowDefinition) -> EngineResult<Self> {
        let mut graph: DiGraph<NodeId, ()> = DiGraph::new();
        let mut indices: HashMap<NodeId, NodeIndex> = HashMap::new();
        let mut children: HashMap<NodeId, Vec<NodeId>> = HashMap::new();

        for node in &definition.nodes {
            if indices.contains_key(&node.id) {
                return Err(EngineError::InvalidDefinition(format!(
                    "duplicate node id: {}",
                    node.id
                )));
            }
            let idx = graph.add_node(node.id);
            indices.insert(node.id, idx);
            children.insert(node.id, Vec::new());
        }

        if !indices.contains_key(&definition.entry) {
            return Err(EngineError::MissingNode(definition.entry));
        }

        for edge in &definition.edges {
            let from = *indices.get(&edge.from).ok_or(EngineError::MissingNode(edge.from))?;
            let to = *indices.get(&edge.to).ok_or(EngineError::MissingNode(edge.to))?;
            graph.add_edge(from, to, ());

            let outgoing = children.entry(edge.from).or_default();
            if !outgoing.contains(&edge.to) {
                outgoing.push(edge.to);
            }
        }

        Self::reject_cycles(&graph)?;

        tracing::debug!(
            target: TRACING_TARGET_GRAPH,
            workflow_id = %definition.id,
            node_count = definition.nodes.len(),
            edge_count = definition.edges.len(),
            "Compiled workflow graph"
        );

        Ok(Self {
            children,
            node_count: definition.nodes.len(),
        })
    }

    /// Kahn's algorithm: peel zero-in-degree nodes; anything left is cyclic.
    fn reject_cycles(graph: &DiGraph<NodeId, ()>) -> EngineResult<()> {
        use petgraph::Direction;

        let mut in_degree: HashMap<NodeIndex, usize> = graph
            .node_indices()
            .map(|idx| (idx, graph.neighbors_directed(idx, Direction::Incoming).count()))
            .collect();

        let mut ready: Vec<NodeIndex> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(idx, _)| *idx)
            .collect();

        let mut processed = 0usize;
        while let Some(idx) = ready.pop() {
            processed += 1;
            for neighbor in graph.neighbors_directed(idx, Direction::Outgoing) {
                if let Some(degree) = in_degree.get_mut(&neighbor) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(neighbor);
                    }
                }
            }
        }

        if processed < graph.node_count() {
            return Err(EngineError::CyclicWorkflow);
        }
        Ok(())
    }

    /// Returns a node's static children, in edge-definition order.
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.children.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns the number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.node_count
    }
}
