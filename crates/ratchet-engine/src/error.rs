//! Engine error types.

use ratchet_core::NodeId;
use thiserror::Error;

use crate::definition::NodeKind;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised while compiling or stepping a workflow.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The edge set induces a cycle; rejected before any node executes.
    #[error("workflow contains a cycle")]
    CyclicWorkflow,

    /// An edge or the entry marker references a node that does not exist.
    #[error("workflow references non-existent node: {0}")]
    MissingNode(NodeId),

    /// The workflow already reached its terminal state; double-advance guard.
    #[error("workflow already executed to completion")]
    AlreadyExecuted,

    /// The registry has no builder for a node kind.
    #[error("unknown node type: {0}")]
    UnknownNodeType(NodeKind),

    /// A node's configuration payload failed to parse.
    #[error("invalid config for node {node_id}: {message}")]
    InvalidNodeConfig {
        /// Node carrying the bad config.
        node_id: NodeId,
        /// Parse failure detail.
        message: String,
    },

    /// The definition is structurally invalid beyond the cases above.
    #[error("invalid workflow definition: {0}")]
    InvalidDefinition(String),

    /// Serialization of definition or runtime state failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
