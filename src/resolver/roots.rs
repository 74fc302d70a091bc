//! Root resolution

use std::collections::HashSet;

use super::config::{root_strategy, RootStrategy};
use super::Resolver;
use crate::error::{HierarchyError, Result};
use crate::graph::traversal;
use crate::path::NodeId;
use crate::query::Query;
use crate::storage::{NamespaceStore, NodeRecord};

impl<'a, S: NamespaceStore + ?Sized> Resolver<'a, S> {
    /// Distinct top-level nodes of `nodes`, sorted by id
    pub fn roots_of(&self, nodes: &[NodeRecord]) -> Result<Vec<NodeRecord>> {
        self.roots_with(nodes, None)
    }

    pub fn roots_with(&self, nodes: &[NodeRecord], strategy: Option<RootStrategy>) -> Result<Vec<NodeRecord>> {
        if nodes.is_empty() {
            return Ok(Vec::new());
        }

        let strategy = strategy.unwrap_or_else(|| root_strategy(self.selector, Self::scope_root(nodes)));
        tracing::debug!(?strategy, inputs = nodes.len(), "resolving roots");

        let mut seen = HashSet::new();
        let ids: Vec<NodeId> = match strategy {
            RootStrategy::Paths => nodes
                .iter()
                .filter_map(|n| n.traversal_ids.root())
                .filter(|id| seen.insert(*id))
                .collect(),
            RootStrategy::ParentWalk => {
                let mut ids = Vec::new();
                for node in nodes {
                    let chain = traversal::walk_up(node.id, |id| {
                        self.store
                            .get(id)?
                            .map(|n| n.parent_id)
                            .ok_or(HierarchyError::NodeNotFound(id))
                    })?;
                    if let Some(&root) = chain.last() {
                        if seen.insert(root) {
                            ids.push(root);
                        }
                    }
                }
                ids
            }
        };

        let mut roots = self.store.execute(&Query::ById { ids })?;
        roots.sort_by_key(|n| n.id);
        Ok(roots)
    }

    /// Root of a single node
    pub fn root_ancestor(&self, node: &NodeRecord) -> Result<NodeRecord> {
        self.roots_of(std::slice::from_ref(node))?
            .pop()
            .ok_or(HierarchyError::NodeNotFound(node.root_id()))
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::super::ResolverConfig;
    use super::*;
    use crate::path::TraversalIds;
    use crate::storage::{Delta, MemoryStore};

    #[test]
    fn test_root_extraction() {
        let mut store = MemoryStore::new();
        let chain = [(7, None), (3, Some(7)), (9, Some(3))];
        let mut path: Option<TraversalIds> = None;
        for (id, parent) in chain {
            let traversal_ids = TraversalIds::for_node(id, path.as_ref());
            store
                .apply(&[Delta::Insert(NodeRecord {
                    id,
                    parent_id: parent,
                    traversal_ids: traversal_ids.clone(),
                    name: None,
                })])
                .unwrap();
            path = Some(traversal_ids);
        }

        let config = ResolverConfig::default();
        let resolver = Resolver::new(&store, &config);
        let node = store.get(9).unwrap().unwrap();
        assert_eq!(node.traversal_ids.as_slice(), &[7, 3, 9]);
        assert_eq!(resolver.root_ancestor(&node).unwrap().id, 7);
    }

    #[test]
    fn test_roots_are_distinct() {
        let store = forest();
        let config = ResolverConfig::default();
        let resolver = Resolver::new(&store, &config);
        let input = nodes(&store, &[7, 4, 11, 1, 5]);

        for strategy in [RootStrategy::Paths, RootStrategy::ParentWalk] {
            let roots = resolver.roots_with(&input, Some(strategy)).unwrap();
            assert_eq!(ids(&roots), vec![1, 10], "{:?}", strategy);
        }
    }

    #[test]
    fn test_roots_of_empty_input() {
        let store = forest();
        let config = ResolverConfig::default();
        let resolver = Resolver::new(&store, &config);
        assert!(resolver.roots_of(&[]).unwrap().is_empty());
    }
}
