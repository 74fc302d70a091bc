//! Node storage: records, the store trait and its adapters

pub mod delta;
pub mod memory;
pub mod sled_store;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::path::{NodeId, PathRange, TraversalIds};
use crate::query::{self, Query};

pub use delta::{Delta, DeltaLog};
pub use memory::MemoryStore;
pub use sled_store::SledStore;

/// One namespace in the forest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Unique, immutable id (0 is reserved)
    pub id: NodeId,

    /// `None` for roots
    pub parent_id: Option<NodeId>,

    /// Materialized path, always `parent.traversal_ids + [id]`
    pub traversal_ids: TraversalIds,

    /// Display label, not used by any resolver
    pub name: Option<String>,
}

impl NodeRecord {
    pub fn depth(&self) -> usize {
        self.traversal_ids.depth()
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn root_id(&self) -> NodeId {
        self.traversal_ids.root().unwrap_or(self.id)
    }
}

/// Storage backend for node records
///
/// Stores only need to provide point lookups, ordered path scans and atomic
/// batches. Query plans are evaluated on top of these primitives unless an
/// adapter overrides [`NamespaceStore::execute`] with a native translation.
pub trait NamespaceStore {
    /// Point lookup by id
    fn get(&self, id: NodeId) -> Result<Option<NodeRecord>>;

    /// Lookup several ids; missing ids are skipped, duplicates collapse
    fn get_many(&self, ids: &[NodeId]) -> Result<Vec<NodeRecord>> {
        let mut seen = std::collections::HashSet::with_capacity(ids.len());
        let mut result = Vec::with_capacity(ids.len());
        for &id in ids {
            if !seen.insert(id) {
                continue;
            }
            if let Some(node) = self.get(id)? {
                result.push(node);
            }
        }
        Ok(result)
    }

    /// Nodes whose path falls inside `range`, in path order
    fn scan_range(&self, range: &PathRange) -> Result<Vec<NodeRecord>>;

    /// Every node, in path order
    fn scan_all(&self) -> Result<Vec<NodeRecord>>;

    /// Up to `limit` nodes with id greater than `after`, in id order
    fn scan_ids(&self, after: Option<NodeId>, limit: usize) -> Result<Vec<NodeRecord>>;

    /// Direct children of `parent`, in id order
    fn children(&self, parent: NodeId) -> Result<Vec<NodeRecord>>;

    /// Apply a batch atomically: either every delta lands or none does
    fn apply(&mut self, batch: &[Delta]) -> Result<()>;

    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Persist pending writes
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Run a query plan
    fn execute(&self, query: &Query) -> Result<Vec<NodeRecord>> {
        query::evaluate(self, query)
    }
}

impl<S: NamespaceStore + ?Sized> NamespaceStore for Box<S> {
    fn get(&self, id: NodeId) -> Result<Option<NodeRecord>> {
        (**self).get(id)
    }

    fn get_many(&self, ids: &[NodeId]) -> Result<Vec<NodeRecord>> {
        (**self).get_many(ids)
    }

    fn scan_range(&self, range: &PathRange) -> Result<Vec<NodeRecord>> {
        (**self).scan_range(range)
    }

    fn scan_all(&self) -> Result<Vec<NodeRecord>> {
        (**self).scan_all()
    }

    fn scan_ids(&self, after: Option<NodeId>, limit: usize) -> Result<Vec<NodeRecord>> {
        (**self).scan_ids(after, limit)
    }

    fn children(&self, parent: NodeId) -> Result<Vec<NodeRecord>> {
        (**self).children(parent)
    }

    fn apply(&mut self, batch: &[Delta]) -> Result<()> {
        (**self).apply(batch)
    }

    fn len(&self) -> Result<usize> {
        (**self).len()
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn execute(&self, query: &Query) -> Result<Vec<NodeRecord>> {
        (**self).execute(query)
    }
}
