//! Node registry: closed tag to executor constructor.

use std::collections::HashMap;
use std::sync::Arc;

use crate::definition::{Node, NodeKind};
use crate::error::{EngineError, EngineResult};

use super::NodeExecutor;
use super::builtin;

/// Constructor for a node executor.
///
/// Builders parse the node's config eagerly so a malformed payload fails at
/// construction, before the node is marked executed.
pub type NodeBuilder = dyn Fn(&Node) -> EngineResult<Box<dyn NodeExecutor>> + Send + Sync;

/// Registry mapping node kinds to executor constructors.
///
/// A lookup miss is the single `UnknownNodeType` branch; there is no
/// fallback behavior.
#[derive(Clone)]
pub struct NodeRegistry {
    builders: HashMap<NodeKind, Arc<NodeBuilder>>,
}

impl NodeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    /// Creates a registry with all built-in node kinds registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtin::register_all(&mut registry);
        registry
    }

    /// Registers (or replaces) the builder for a node kind.
    pub fn register<F>(&mut self, kind: NodeKind, builder: F) -> &mut Self
    where
        F: Fn(&Node) -> EngineResult<Box<dyn NodeExecutor>> + Send + Sync + 'static,
    {
        self.builders.insert(kind, Arc::new(builder));
        self
    }

    /// Returns whether a kind has a registered builder.
    pub fn supports(&self, kind: NodeKind) -> bool {
        self.builders.contains_key(&kind)
    }

    /// Constructs the executor for a node.
    pub fn build(&self, node: &Node) -> EngineResult<Box<dyn NodeExecutor>> {
        let builder = self
            .builders
            .get(&node.kind)
            .ok_or(EngineError::UnknownNodeType(node.kind))?;
        builder(node)
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<String> = self.builders.keys().map(|k| k.to_string()).collect();
        kinds.sort();
        f.debug_struct("NodeRegistry").field("kinds", &kinds).finish()
    }
}
