//! Error types for the hierarchy engine

use thiserror::Error;

use crate::path::NodeId;

pub type Result<T> = std::result::Result<T, HierarchyError>;

#[derive(Error, Debug)]
pub enum HierarchyError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Parent not found: {0}")]
    ParentNotFound(NodeId),

    #[error("Node already exists: {0}")]
    DuplicateNode(NodeId),

    #[error("Invalid node id: {0}")]
    InvalidId(NodeId),

    #[error("Cycle: cannot move {node} under {new_parent}")]
    Cycle { node: NodeId, new_parent: NodeId },

    #[error("Parent links of {0} loop back on themselves")]
    ParentLoop(NodeId),

    #[error("Id {0} does not fit a bigint column")]
    IdOutOfRange(NodeId),

    #[error("Node {0} still has descendants")]
    HasDescendants(NodeId),

    #[error("Empty input")]
    EmptyInput,

    #[error("Unsupported presence filter: {0}")]
    UnsupportedPresenceFilter(String),

    #[error("Engine worker stopped")]
    WorkerStopped,

    #[error("Store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

impl From<sled::Error> for HierarchyError {
    fn from(e: sled::Error) -> Self {
        HierarchyError::Store(e.to_string())
    }
}
