//! Hierarchy API and its engine

pub mod engine;
pub mod filter;
pub mod traversal;

pub use engine::{BackfillReport, HierarchyEngine, Violation, ViolationKind};
pub use filter::{filter_by_parent, PresenceFilter};

use crate::error::Result;
use crate::path::NodeId;
use crate::resolver::Order;
use crate::storage::NodeRecord;

/// Main trait for a namespace hierarchy
///
/// Every query takes node ids; unknown ids are reported as
/// [`NodeNotFound`](crate::error::HierarchyError::NodeNotFound).
pub trait HierarchyStore {
    // === NODE OPERATIONS ===

    /// Insert a node under `parent_id` (or as a root)
    fn create_node(&mut self, id: NodeId, parent_id: Option<NodeId>, name: Option<String>) -> Result<NodeRecord>;

    /// Move a node with its whole subtree; returns rewritten path count
    fn reparent(&mut self, id: NodeId, new_parent: Option<NodeId>) -> Result<usize>;

    /// Remove a node; `cascade` removes its subtree as well
    fn delete_node(&mut self, id: NodeId, cascade: bool) -> Result<usize>;

    fn get_node(&self, id: NodeId) -> Result<Option<NodeRecord>>;

    fn node_exists(&self, id: NodeId) -> Result<bool> {
        Ok(self.get_node(id)?.is_some())
    }

    /// Every node matching `filter`, in path order
    fn list_nodes(&self, filter: PresenceFilter) -> Result<Vec<NodeRecord>>;

    // === HIERARCHY QUERIES ===

    fn ancestors(&self, ids: &[NodeId], include_self: bool, upto: &[NodeId], order: Order) -> Result<Vec<NodeRecord>>;

    fn descendants(&self, ids: &[NodeId], include_self: bool) -> Result<Vec<NodeRecord>>;

    fn roots(&self, ids: &[NodeId]) -> Result<Vec<NodeRecord>>;

    fn root_ancestor(&self, id: NodeId) -> Result<NodeRecord>;

    /// Ancestors, self and descendants of one node
    fn hierarchy(&self, id: NodeId) -> Result<Vec<NodeRecord>>;

    fn children(&self, id: NodeId) -> Result<Vec<NodeRecord>>;

    /// Nodes at or below any of `ids`
    fn in_hierarchy(&self, ids: &[NodeId]) -> Result<Vec<NodeRecord>>;

    /// Strict: a node is not its own ancestor
    fn is_ancestor_of(&self, ancestor: NodeId, node: NodeId) -> Result<bool>;

    fn is_descendant_of(&self, node: NodeId, ancestor: NodeId) -> Result<bool> {
        self.is_ancestor_of(ancestor, node)
    }

    // === MAINTENANCE ===

    /// Recompute every path from parent links; `None` uses the configured batch size
    fn backfill_traversal_ids(&mut self, batch_size: Option<usize>) -> Result<BackfillReport>;

    /// Check every stored path against parent links
    fn verify(&self) -> Result<Vec<Violation>>;

    fn flush(&mut self) -> Result<()>;

    // === STATS ===

    fn node_count(&self) -> Result<usize>;
}
