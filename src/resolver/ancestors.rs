//! Ancestor resolution

use std::collections::HashSet;

use super::config::{ancestor_strategy, AncestorStrategy};
use super::{Order, Resolver};
use crate::error::{HierarchyError, Result};
use crate::graph::traversal;
use crate::path::NodeId;
use crate::query::Query;
use crate::storage::{NamespaceStore, NodeRecord};

#[derive(Debug, Clone, Default)]
pub struct AncestorOptions {
    pub include_self: bool,
    /// Stop climbing at these nodes: ids on their own paths are excluded
    pub upto: Vec<NodeRecord>,
    pub order: Order,
    /// Forces a strategy instead of asking the selector
    pub strategy: Option<AncestorStrategy>,
}

impl AncestorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include_self(mut self, include: bool) -> Self {
        self.include_self = include;
        self
    }

    pub fn upto(mut self, nodes: Vec<NodeRecord>) -> Self {
        self.upto = nodes;
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub fn strategy(mut self, strategy: AncestorStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }
}

impl<'a, S: NamespaceStore + ?Sized> Resolver<'a, S> {
    /// Plan the store runs for `ancestors_of`; `None` for the parent walk
    pub fn ancestors_plan(&self, nodes: &[NodeRecord], options: &AncestorOptions) -> Option<Query> {
        let strategy = options
            .strategy
            .unwrap_or_else(|| ancestor_strategy(self.selector, Self::scope_root(nodes)));
        let paths = || nodes.iter().map(|n| n.traversal_ids.clone()).collect::<Vec<_>>();

        match strategy {
            AncestorStrategy::InnerJoin => Some(Query::UnnestJoin {
                paths: paths(),
                include_self: options.include_self,
                exclude: upto_ids_from_paths(&options.upto),
            }),
            AncestorStrategy::PerRowUnnest => Some(Query::UnnestPerRow {
                paths: paths(),
                include_self: options.include_self,
                exclude: upto_ids_from_paths(&options.upto),
            }),
            AncestorStrategy::RecursiveWalk => None,
        }
    }

    /// Ancestors of every node in `nodes`, each returned once
    pub fn ancestors_of(&self, nodes: &[NodeRecord], options: &AncestorOptions) -> Result<Vec<NodeRecord>> {
        if nodes.is_empty() {
            return Ok(Vec::new());
        }

        let plan = self.ancestors_plan(nodes, options);
        tracing::debug!(
            plan = plan.as_ref().map_or("parent_walk", Query::kind),
            inputs = nodes.len(),
            "resolving ancestors"
        );

        let mut result = match plan {
            Some(plan) => self.store.execute(&plan)?,
            None => self.ancestors_by_walk(nodes, options)?,
        };

        options.order.sort(&mut result);
        Ok(result)
    }

    pub fn ancestor_ids_of(&self, nodes: &[NodeRecord], options: &AncestorOptions) -> Result<Vec<NodeId>> {
        Ok(self.ancestors_of(nodes, options)?.into_iter().map(|n| n.id).collect())
    }

    fn parent_of(&self, id: NodeId) -> Result<Option<NodeId>> {
        self.store
            .get(id)?
            .map(|n| n.parent_id)
            .ok_or(HierarchyError::NodeNotFound(id))
    }

    fn ancestors_by_walk(&self, nodes: &[NodeRecord], options: &AncestorOptions) -> Result<Vec<NodeRecord>> {
        let mut exclude = HashSet::new();
        for node in &options.upto {
            exclude.extend(traversal::walk_up(node.id, |id| self.parent_of(id))?);
        }

        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for node in nodes {
            let chain = traversal::walk_up(node.id, |id| self.parent_of(id))?;
            let skip = if options.include_self { 0 } else { 1 };
            for id in chain.into_iter().skip(skip) {
                if !exclude.contains(&id) && seen.insert(id) {
                    ids.push(id);
                }
            }
        }

        self.store.get_many(&ids)
    }
}

fn upto_ids_from_paths(upto: &[NodeRecord]) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    upto.iter()
        .flat_map(|n| n.traversal_ids.as_slice().iter().copied())
        .filter(|id| seen.insert(*id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::super::ResolverConfig;
    use super::*;

    const STRATEGIES: [AncestorStrategy; 3] = [
        AncestorStrategy::InnerJoin,
        AncestorStrategy::PerRowUnnest,
        AncestorStrategy::RecursiveWalk,
    ];

    #[test]
    fn test_ancestors_ordered_by_depth() {
        // root(1) -> child(2) -> grandchild(3)
        let store = forest();
        let config = ResolverConfig::default();
        let resolver = Resolver::new(&store, &config);
        let grandchild = nodes(&store, &[3]);

        let asc = resolver
            .ancestors_of(&grandchild, &AncestorOptions::new().order(Order::Asc))
            .unwrap();
        assert_eq!(ids(&asc), vec![1, 2]);
        assert_eq!(asc[0].depth(), 1);
        assert_eq!(asc[1].depth(), 2);

        let desc = resolver
            .ancestors_of(&grandchild, &AncestorOptions::new().include_self(true).order(Order::Desc))
            .unwrap();
        assert_eq!(ids(&desc), vec![3, 2, 1]);
    }

    #[test]
    fn test_strategies_agree() {
        let store = forest();
        let config = ResolverConfig::default();
        let resolver = Resolver::new(&store, &config);

        let inputs: &[&[NodeId]] = &[&[7], &[7, 5], &[3, 2], &[11, 4], &[12], &[1]];
        for input in inputs {
            let input = nodes(&store, input);
            for include_self in [true, false] {
                let expected = resolver
                    .ancestor_ids_of(
                        &input,
                        &AncestorOptions::new()
                            .include_self(include_self)
                            .strategy(AncestorStrategy::RecursiveWalk),
                    )
                    .unwrap();
                for strategy in STRATEGIES {
                    let options = AncestorOptions::new().include_self(include_self).strategy(strategy);
                    let actual = resolver.ancestor_ids_of(&input, &options).unwrap();
                    assert_eq!(actual, expected, "{:?} include_self={}", strategy, include_self);
                }
            }
        }
    }

    #[test]
    fn test_shared_ancestors_returned_once() {
        let store = forest();
        let config = ResolverConfig::default();
        let resolver = Resolver::new(&store, &config);

        for strategy in STRATEGIES {
            let result = resolver
                .ancestors_of(&nodes(&store, &[7, 5, 4]), &AncestorOptions::new().strategy(strategy))
                .unwrap();
            // 3 is an ancestor of 7 even though it is not in the input
            assert_eq!(ids(&result), vec![1, 2, 3], "{:?}", strategy);
        }
    }

    #[test]
    fn test_upto_stops_at_chain() {
        let store = forest();
        let config = ResolverConfig::default();
        let resolver = Resolver::new(&store, &config);
        let upto = nodes(&store, &[2]);

        for strategy in STRATEGIES {
            let options = AncestorOptions::new().upto(upto.clone()).strategy(strategy);
            let result = resolver.ancestor_ids_of(&nodes(&store, &[7]), &options).unwrap();
            assert_eq!(result, vec![3], "{:?}", strategy);
        }
    }

    #[test]
    fn test_root_has_no_ancestors() {
        let store = forest();
        let config = ResolverConfig::default();
        let resolver = Resolver::new(&store, &config);

        for strategy in STRATEGIES {
            let options = AncestorOptions::new().strategy(strategy);
            assert!(resolver.ancestors_of(&nodes(&store, &[12]), &options).unwrap().is_empty());
        }
    }

    #[test]
    fn test_empty_input() {
        let store = forest();
        let config = ResolverConfig::default();
        let resolver = Resolver::new(&store, &config);
        assert!(resolver.ancestors_of(&[], &AncestorOptions::new()).unwrap().is_empty());
    }

    #[test]
    fn test_selector_picks_walk_when_paths_disabled() {
        let store = forest();
        let config = ResolverConfig::without_paths();
        let resolver = Resolver::new(&store, &config);
        let result = resolver
            .ancestor_ids_of(&nodes(&store, &[7]), &AncestorOptions::new())
            .unwrap();
        assert_eq!(result, vec![1, 2, 3]);
    }
}
