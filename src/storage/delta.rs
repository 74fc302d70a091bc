//! Write batches for the store

use serde::{Deserialize, Serialize};

use super::NodeRecord;
use crate::path::{NodeId, TraversalIds};

/// Operation in a write batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Delta {
    Insert(NodeRecord),
    Delete { id: NodeId },
    /// Move a node: new parent and new materialized path
    Rewrite {
        id: NodeId,
        parent_id: Option<NodeId>,
        traversal_ids: TraversalIds,
    },
}

impl Delta {
    pub fn node_id(&self) -> NodeId {
        match self {
            Delta::Insert(node) => node.id,
            Delta::Delete { id } => *id,
            Delta::Rewrite { id, .. } => *id,
        }
    }
}

/// Ordered list of deltas, replayed in reverse as the memory store's undo
/// log when a batch fails half-way
#[derive(Debug, Default)]
pub struct DeltaLog {
    operations: Vec<Delta>,
}

impl DeltaLog {
    pub fn new() -> Self {
        Self {
            operations: Vec::new(),
        }
    }

    pub fn push(&mut self, delta: Delta) {
        self.operations.push(delta);
    }

    pub fn drain(&mut self) -> impl DoubleEndedIterator<Item = Delta> + '_ {
        self.operations.drain(..)
    }
}
