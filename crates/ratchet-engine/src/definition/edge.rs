//! Edge definitions.

use ratchet_core::{EdgeId, NodeId};
use serde::{Deserialize, Serialize};

/// A directed edge between two nodes.
///
/// Immutable once the workflow is created; the edge set defines the static
/// adjacency a node's `next` pruning is intersected against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Unique within the owning workflow.
    pub id: EdgeId,
    /// Source node.
    pub from: NodeId,
    /// Target node.
    pub to: NodeId,
}

impl Edge {
    /// Creates an edge with a fresh id.
    pub fn new(from: NodeId, to: NodeId) -> Self {
        Self {
            id: EdgeId::new(),
            from,
            to,
        }
    }
}
