//! Full hierarchy: self, ancestors and descendants of one node

use super::ancestors::AncestorOptions;
use super::config::{
    ancestor_strategy, descendant_strategy, hierarchy_strategy, AncestorStrategy, DescendantStrategy, HierarchyStrategy,
};
use super::descendants::DescendantOptions;
use super::{Order, Resolver};
use crate::error::Result;
use crate::storage::{NamespaceStore, NodeRecord};

impl<'a, S: NamespaceStore + ?Sized> Resolver<'a, S> {
    /// Ancestors (root first, node included) followed by descendants in
    /// path order
    pub fn self_and_hierarchy(&self, node: &NodeRecord) -> Result<Vec<NodeRecord>> {
        self.hierarchy_with(node, None)
    }

    pub fn hierarchy_with(&self, node: &NodeRecord, strategy: Option<HierarchyStrategy>) -> Result<Vec<NodeRecord>> {
        let input = std::slice::from_ref(node);
        let root = Some(node.root_id());
        let strategy = strategy.unwrap_or_else(|| hierarchy_strategy(self.selector, root));

        // the path union still honours each resolver's own switches
        let (ancestors, descendants) = match strategy {
            HierarchyStrategy::Paths => (
                ancestor_strategy(self.selector, root),
                descendant_strategy(self.selector, root),
            ),
            HierarchyStrategy::ParentWalk => (AncestorStrategy::RecursiveWalk, DescendantStrategy::RecursiveWalk),
        };
        tracing::debug!(?strategy, ?ancestors, ?descendants, node = node.id, "resolving hierarchy");

        let mut result = self.ancestors_of(
            input,
            &AncestorOptions::new()
                .include_self(true)
                .order(Order::Asc)
                .strategy(ancestors),
        )?;
        result.extend(self.descendants_of(
            input,
            &DescendantOptions::new().include_self(false).strategy(descendants),
        )?);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::super::ResolverConfig;
    use super::*;

    #[test]
    fn test_hierarchy_union() {
        let store = forest();
        let config = ResolverConfig::default();
        let resolver = Resolver::new(&store, &config);
        let node = store.get(2).unwrap().unwrap();

        for strategy in [HierarchyStrategy::Paths, HierarchyStrategy::ParentWalk] {
            let result = resolver.hierarchy_with(&node, Some(strategy)).unwrap();
            assert_eq!(ids(&result), vec![1, 2, 3, 7, 5], "{:?}", strategy);
        }
    }

    #[test]
    fn test_path_union_follows_resolver_switches() {
        use std::cell::RefCell;

        use super::super::Switch;
        use crate::path::NodeId;

        let store = forest();
        let asked = RefCell::new(Vec::new());
        let selector = |switch: Switch, _root: Option<NodeId>| {
            asked.borrow_mut().push(switch);
            !matches!(switch, Switch::DescendantsViaRangeComparison | Switch::AncestorsViaInnerJoin)
        };
        let resolver = Resolver::new(&store, &selector);
        let node = store.get(2).unwrap().unwrap();

        assert_eq!(ids(&resolver.self_and_hierarchy(&node).unwrap()), vec![1, 2, 3, 7, 5]);

        let asked = asked.into_inner();
        assert!(asked.contains(&Switch::HierarchyUnionViaPaths));
        assert!(asked.contains(&Switch::DescendantsViaRangeComparison));
        assert!(asked.contains(&Switch::AncestorsViaInnerJoin));
    }

    #[test]
    fn test_hierarchy_of_lone_root() {
        let store = forest();
        let config = ResolverConfig::default();
        let resolver = Resolver::new(&store, &config);
        let node = store.get(12).unwrap().unwrap();

        assert_eq!(ids(&resolver.self_and_hierarchy(&node).unwrap()), vec![12]);
    }

    #[test]
    fn test_hierarchy_has_no_duplicates() {
        let store = forest();
        let config = ResolverConfig::default();
        let resolver = Resolver::new(&store, &config);

        for id in [1, 2, 3, 7, 10, 11] {
            let node = store.get(id).unwrap().unwrap();
            let result = ids(&resolver.self_and_hierarchy(&node).unwrap());
            let mut deduped = result.clone();
            deduped.sort();
            deduped.dedup();
            assert_eq!(deduped.len(), result.len());
        }
    }
}
