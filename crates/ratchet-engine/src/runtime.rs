//! Resumable runtime cursor.

use std::collections::VecDeque;

use ratchet_core::{NodeId, WorkflowId};
use serde::{Deserialize, Serialize};

/// The BFS cursor that makes execution resumable.
///
/// Invariants: a node id appears in at most one of `queue` or `visited`;
/// `finished == true` implies the queue is empty and `current` is `None`.
/// The runtime is created when a workflow is loaded, mutated once per
/// `clock()`, and reaped only after the workflow finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeState {
    /// The workflow this cursor belongs to.
    pub id: WorkflowId,
    /// BFS frontier, FIFO order, duplicates forbidden.
    #[serde(default)]
    pub queue: VecDeque<NodeId>,
    /// Processed nodes, in execution order for determinism.
    #[serde(default)]
    pub visited: Vec<NodeId>,
    /// The node most recently popped for execution.
    #[serde(default)]
    pub current: Option<NodeId>,
    /// Terminal flag.
    #[serde(default)]
    pub finished: bool,
    /// Set when a node deliberately stopped the run (`terminate_run`),
    /// letting status reporting distinguish terminated from finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminated_by: Option<NodeId>,
}

impl RuntimeState {
    /// Creates a fresh cursor with the entry node queued.
    pub fn seeded(id: WorkflowId, entry: NodeId) -> Self {
        Self {
            id,
            queue: VecDeque::from([entry]),
            visited: Vec::new(),
            current: None,
            finished: false,
            terminated_by: None,
        }
    }

    /// Returns whether a node is already queued or visited.
    pub fn is_scheduled(&self, node: NodeId) -> bool {
        self.visited.contains(&node) || self.queue.contains(&node)
    }

    /// Enqueues a node unless it is already queued or visited.
    ///
    /// Returns whether the node was added. This is what keeps a diamond
    /// join from executing twice.
    pub fn enqueue(&mut self, node: NodeId) -> bool {
        if self.is_scheduled(node) {
            return false;
        }
        self.queue.push_back(node);
        true
    }

    /// Pops the frontier head and marks it current.
    pub fn pop_current(&mut self) -> Option<NodeId> {
        let node = self.queue.pop_front()?;
        self.current = Some(node);
        Some(node)
    }

    /// Pushes a node back to the frontier head (external-input pause).
    pub fn requeue_front(&mut self, node: NodeId) {
        if !self.queue.contains(&node) {
            self.queue.push_front(node);
        }
    }

    /// Appends the node to `visited` if absent.
    pub fn mark_visited(&mut self, node: NodeId) {
        if !self.visited.contains(&node) {
            self.visited.push(node);
        }
    }

    /// Marks the run terminal, clearing the frontier and cursor.
    pub fn finish(&mut self) {
        self.queue.clear();
        self.current = None;
        self.finished = true;
    }

    /// Marks the run terminal due to a deliberate stop by `node`.
    pub fn terminate(&mut self, node: NodeId) {
        self.finish();
        self.terminated_by = Some(node);
    }
}
