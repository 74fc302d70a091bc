//! Descendant resolution

use super::config::{descendant_strategy, superset_reduction, DescendantStrategy};
use super::Resolver;
use crate::error::Result;
use crate::graph::traversal;
use crate::path::{reduce_to_superset, reduce_to_superset_sorted, NodeId, TraversalIds};
use crate::query::Query;
use crate::storage::{NamespaceStore, NodeRecord};

#[derive(Debug, Clone, Copy, Default)]
pub struct DescendantOptions {
    pub include_self: bool,
    /// Forces a strategy instead of asking the selector
    pub strategy: Option<DescendantStrategy>,
}

impl DescendantOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include_self(mut self, include: bool) -> Self {
        self.include_self = include;
        self
    }

    pub fn strategy(mut self, strategy: DescendantStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }
}

impl<'a, S: NamespaceStore + ?Sized> Resolver<'a, S> {
    fn descendant_strategy_for(&self, nodes: &[NodeRecord], options: &DescendantOptions) -> DescendantStrategy {
        options
            .strategy
            .unwrap_or_else(|| descendant_strategy(self.selector, Self::scope_root(nodes)))
    }

    /// Superset reduction of the input paths, sort-based for large batches
    fn reduce_paths(&self, paths: &[TraversalIds]) -> Vec<TraversalIds> {
        if paths.len() >= self.sorted_reduction_threshold {
            reduce_to_superset_sorted(paths)
        } else {
            reduce_to_superset(paths)
        }
    }

    /// Plan the store runs for `descendants_of`; `None` for the children walk
    pub fn descendants_plan(&self, nodes: &[NodeRecord], options: &DescendantOptions) -> Option<Query> {
        let exclude: Vec<NodeId> = if options.include_self {
            Vec::new()
        } else {
            nodes.iter().map(|n| n.id).collect()
        };

        match self.descendant_strategy_for(nodes, options) {
            DescendantStrategy::RangeComparison => {
                let paths: Vec<TraversalIds> = nodes.iter().map(|n| n.traversal_ids.clone()).collect();
                let paths = if superset_reduction(self.selector, Self::scope_root(nodes)) {
                    self.reduce_paths(&paths)
                } else {
                    paths
                };
                let ranges = paths.iter().map(|p| p.subtree_range(options.include_self)).collect();
                Some(Query::RangeScan { ranges, exclude })
            }
            DescendantStrategy::Containment => Some(Query::ContainmentScan {
                ids: nodes.iter().map(|n| n.id).collect(),
                exclude,
            }),
            DescendantStrategy::RecursiveWalk => None,
        }
    }

    /// Descendants of every node in `nodes`, in path (pre-order) order
    ///
    /// Without `include_self` exactly the input nodes are left out, even
    /// when one input is a descendant of another.
    pub fn descendants_of(&self, nodes: &[NodeRecord], options: &DescendantOptions) -> Result<Vec<NodeRecord>> {
        if nodes.is_empty() {
            return Ok(Vec::new());
        }

        let strategy = self.descendant_strategy_for(nodes, options);
        tracing::debug!(?strategy, inputs = nodes.len(), "resolving descendants");

        let mut result = match self.descendants_plan(nodes, &options.strategy(strategy)) {
            Some(plan) => self.store.execute(&plan)?,
            None => {
                let start: Vec<NodeId> = nodes.iter().map(|n| n.id).collect();
                let ids: Vec<NodeId> = traversal::bfs(&start, |id| {
                    Ok(self.store.children(id)?.into_iter().map(|c| c.id).collect())
                })?
                .into_iter()
                .filter(|id| options.include_self || !start.contains(id))
                .collect();
                self.store.get_many(&ids)?
            }
        };

        result.sort_by(|a, b| a.traversal_ids.cmp(&b.traversal_ids));
        Ok(result)
    }

    pub fn descendant_ids_of(&self, nodes: &[NodeRecord], options: &DescendantOptions) -> Result<Vec<NodeId>> {
        Ok(self.descendants_of(nodes, options)?.into_iter().map(|n| n.id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::super::{ResolverConfig, Switch};
    use super::*;

    const STRATEGIES: [DescendantStrategy; 3] = [
        DescendantStrategy::RangeComparison,
        DescendantStrategy::Containment,
        DescendantStrategy::RecursiveWalk,
    ];

    #[test]
    fn test_descendants_of_root() {
        let store = forest();
        let config = ResolverConfig::default();
        let resolver = Resolver::new(&store, &config);

        let result = resolver
            .descendant_ids_of(&nodes(&store, &[1]), &DescendantOptions::new())
            .unwrap();
        // pre-order by path
        assert_eq!(result, vec![2, 3, 7, 5, 4]);
    }

    #[test]
    fn test_no_self_descendant() {
        let store = forest();
        let config = ResolverConfig::default();
        let resolver = Resolver::new(&store, &config);

        for strategy in STRATEGIES {
            for id in [1, 2, 3, 7, 10, 12] {
                let options = DescendantOptions::new().strategy(strategy);
                let result = resolver.descendant_ids_of(&nodes(&store, &[id]), &options).unwrap();
                assert!(!result.contains(&id), "{:?} returned {} for itself", strategy, id);
            }
        }
    }

    #[test]
    fn test_strategies_agree() {
        let store = forest();
        let config = ResolverConfig::default();
        let resolver = Resolver::new(&store, &config);

        let inputs: &[&[NodeId]] = &[&[1], &[2, 3], &[3, 10], &[7], &[12, 11], &[5, 1]];
        for input in inputs {
            let input = nodes(&store, input);
            for include_self in [true, false] {
                let expected = resolver
                    .descendant_ids_of(
                        &input,
                        &DescendantOptions::new()
                            .include_self(include_self)
                            .strategy(DescendantStrategy::RecursiveWalk),
                    )
                    .unwrap();
                for strategy in STRATEGIES {
                    let options = DescendantOptions::new().include_self(include_self).strategy(strategy);
                    let actual = resolver.descendant_ids_of(&input, &options).unwrap();
                    assert_eq!(actual, expected, "{:?} include_self={}", strategy, include_self);
                }
            }
        }
    }

    #[test]
    fn test_excludes_inputs_covered_by_other_inputs() {
        let store = forest();
        let config = ResolverConfig::default();
        let resolver = Resolver::new(&store, &config);

        let result = resolver
            .descendant_ids_of(&nodes(&store, &[2, 3]), &DescendantOptions::new())
            .unwrap();
        assert_eq!(result, vec![7, 5]);
    }

    #[test]
    fn test_without_superset_reduction_same_result() {
        let store = forest();
        let config = ResolverConfig::new().set(Switch::SupersetReduction, false);
        let resolver = Resolver::new(&store, &config);

        let result = resolver
            .descendant_ids_of(&nodes(&store, &[1, 2, 3]), &DescendantOptions::new().include_self(true))
            .unwrap();
        assert_eq!(result, vec![1, 2, 3, 7, 5, 4]);
    }

    #[test]
    fn test_large_batches_reduce_by_sorting() {
        let store = forest();
        let config = ResolverConfig::default();
        let input = nodes(&store, &[7, 10, 3, 2]);

        fn range_lowers(plan: Option<Query>) -> Vec<TraversalIds> {
            match plan {
                Some(Query::RangeScan { ranges, .. }) => ranges.into_iter().map(|r| r.lower).collect(),
                other => panic!("unexpected plan: {:?}", other),
            }
        }

        // below the threshold input order is kept
        let small = Resolver::new(&store, &config);
        assert_eq!(
            range_lowers(small.descendants_plan(&input, &DescendantOptions::new())),
            vec![TraversalIds::new(vec![10]), TraversalIds::new(vec![1, 2])]
        );

        // at the threshold the sorted variant runs and yields path order
        let large = Resolver::new(&store, &config).with_sorted_reduction_threshold(4);
        assert_eq!(
            range_lowers(large.descendants_plan(&input, &DescendantOptions::new())),
            vec![TraversalIds::new(vec![1, 2]), TraversalIds::new(vec![10])]
        );

        let expected = small.descendant_ids_of(&input, &DescendantOptions::new()).unwrap();
        assert_eq!(expected, vec![5, 11]);
        assert_eq!(large.descendant_ids_of(&input, &DescendantOptions::new()).unwrap(), expected);
    }

    #[test]
    fn test_walk_has_no_plan() {
        let store = forest();
        let config = ResolverConfig::without_paths();
        let resolver = Resolver::new(&store, &config);
        assert!(resolver
            .descendants_plan(&nodes(&store, &[1]), &DescendantOptions::new())
            .is_none());
    }

    #[test]
    fn test_round_trip_through_ancestors() {
        use super::super::AncestorOptions;

        let store = forest();
        let config = ResolverConfig::default();
        let resolver = Resolver::new(&store, &config);
        let n = nodes(&store, &[2]);

        let descendants = resolver
            .descendants_of(&n, &DescendantOptions::new().include_self(true))
            .unwrap();
        for d in &descendants {
            let ancestors = resolver
                .ancestor_ids_of(std::slice::from_ref(d), &AncestorOptions::new().include_self(true))
                .unwrap();
            assert!(ancestors.contains(&2), "ancestors of {} miss 2", d.id);
        }
    }
}
