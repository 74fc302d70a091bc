//! Hierarchy resolvers over materialized paths
//!
//! | Resolver    | Path strategies                    | Fallback       |
//! |-------------|------------------------------------|----------------|
//! | ancestors   | inner join, per-row unnest         | parent walk    |
//! | descendants | range comparison, containment      | children BFS   |
//! | roots       | first path component               | parent walk    |
//! | hierarchy   | ancestors + descendants via paths  | both walks     |
//!
//! Every strategy of a resolver returns the same set of nodes; they differ
//! only in how much work the store does.

pub mod ancestors;
pub mod config;
pub mod descendants;
pub mod hierarchy;
pub mod roots;

use std::cmp::Reverse;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::path::NodeId;
use crate::query::Query;
use crate::storage::{NamespaceStore, NodeRecord};

pub use ancestors::AncestorOptions;
pub use config::{
    AncestorStrategy, DescendantStrategy, EngineConfig, HierarchyStrategy, ResolverConfig, RootStrategy,
    StrategySelector, Switch,
};
pub use descendants::DescendantOptions;

/// Depth ordering of results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Order {
    /// Sorted by id
    #[default]
    None,
    /// Root first
    Asc,
    /// Deepest first
    Desc,
}

impl Order {
    /// Sort by depth in this direction, id ascending on ties
    pub fn sort(self, nodes: &mut [NodeRecord]) {
        match self {
            Order::None => nodes.sort_by_key(|n| n.id),
            Order::Asc => nodes.sort_by_key(|n| (n.depth(), n.id)),
            Order::Desc => nodes.sort_by_key(|n| (Reverse(n.depth()), n.id)),
        }
    }
}

/// Resolves hierarchy queries against one store
///
/// Cheap to build: borrows the store and the selector for the duration of
/// a request.
pub struct Resolver<'a, S: NamespaceStore + ?Sized> {
    store: &'a S,
    selector: &'a dyn StrategySelector,
    /// Batches of at least this many paths use the sort-based superset reduction
    sorted_reduction_threshold: usize,
}

impl<'a, S: NamespaceStore + ?Sized> Resolver<'a, S> {
    pub fn new(store: &'a S, selector: &'a dyn StrategySelector) -> Self {
        Self {
            store,
            selector,
            sorted_reduction_threshold: config::DEFAULT_SORTED_REDUCTION_THRESHOLD,
        }
    }

    pub fn with_sorted_reduction_threshold(mut self, threshold: usize) -> Self {
        self.sorted_reduction_threshold = threshold;
        self
    }

    pub fn store(&self) -> &'a S {
        self.store
    }

    /// Switches are scoped to the root of the first input node
    fn scope_root(nodes: &[NodeRecord]) -> Option<NodeId> {
        nodes.first().map(NodeRecord::root_id)
    }

    /// Direct children of `node`
    pub fn children_of(&self, node: &NodeRecord) -> Result<Vec<NodeRecord>> {
        self.store.execute(&Query::ChildrenOf { parent: node.id })
    }

    /// Nodes whose path overlaps `ids`: self or descendants of any of them
    pub fn in_hierarchy_of(&self, ids: &[NodeId]) -> Result<Vec<NodeRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut nodes = self.store.execute(&Query::Overlap { ids: ids.to_vec() })?;
        nodes.sort_by(|a, b| a.traversal_ids.cmp(&b.traversal_ids));
        Ok(nodes)
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_order_sort() {
        let store = forest();
        let mut list = nodes(&store, &[7, 1, 3, 2, 10]);

        Order::Asc.sort(&mut list);
        assert_eq!(ids(&list), vec![1, 10, 2, 3, 7]);

        Order::Desc.sort(&mut list);
        assert_eq!(ids(&list), vec![7, 3, 2, 1, 10]);

        Order::None.sort(&mut list);
        assert_eq!(ids(&list), vec![1, 2, 3, 7, 10]);
    }

    #[test]
    fn test_children_and_overlap() {
        let store = forest();
        let config = ResolverConfig::default();
        let resolver = Resolver::new(&store, &config);

        let root = store.get(2).unwrap().unwrap();
        assert_eq!(sorted_ids(&resolver.children_of(&root).unwrap()), vec![3, 5]);

        let overlap = resolver.in_hierarchy_of(&[3, 11]).unwrap();
        assert_eq!(ids(&overlap), vec![3, 7, 11]);
        assert!(resolver.in_hierarchy_of(&[]).unwrap().is_empty());
    }
}
