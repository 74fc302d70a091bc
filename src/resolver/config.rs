//! Strategy switches and their resolution
//!
//! Each resolver has several interchangeable algorithms. Which one runs is
//! decided once per call by a [`StrategySelector`], scoped to the root of
//! the hierarchy being queried, so a rollout can be staged root by root.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::path::NodeId;

/// Recognized switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Switch {
    UseMaterializedPaths,
    RootsViaPaths,
    AncestorsViaPaths,
    AncestorsViaInnerJoin,
    DescendantsViaPaths,
    DescendantsViaRangeComparison,
    HierarchyUnionViaPaths,
    SupersetReduction,
}

impl Switch {
    pub const ALL: [Switch; 8] = [
        Switch::UseMaterializedPaths,
        Switch::RootsViaPaths,
        Switch::AncestorsViaPaths,
        Switch::AncestorsViaInnerJoin,
        Switch::DescendantsViaPaths,
        Switch::DescendantsViaRangeComparison,
        Switch::HierarchyUnionViaPaths,
        Switch::SupersetReduction,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AncestorStrategy {
    /// Union every path, unnest, distinct, fetch
    InnerJoin,
    /// Unnest each path on its own row, filter self, fetch
    PerRowUnnest,
    /// Follow `parent_id` links, no paths involved
    RecursiveWalk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescendantStrategy {
    /// `traversal_ids @> {id}` scan
    Containment,
    /// `[path, next_sibling(path))` range scan
    RangeComparison,
    /// Breadth-first walk over children
    RecursiveWalk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootStrategy {
    Paths,
    ParentWalk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HierarchyStrategy {
    Paths,
    ParentWalk,
}

/// Answers whether a switch is on for a given root
pub trait StrategySelector {
    fn enabled(&self, switch: Switch, root: Option<NodeId>) -> bool;
}

impl<F> StrategySelector for F
where
    F: Fn(Switch, Option<NodeId>) -> bool,
{
    fn enabled(&self, switch: Switch, root: Option<NodeId>) -> bool {
        self(switch, root)
    }
}

/// Switch values plus per-root overrides
///
/// ```json
/// {
///   "switches": { "descendants_via_range_comparison": false },
///   "root_overrides": { "42": { "use_materialized_paths": false } }
/// }
/// ```
///
/// Switches not listed default to on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub switches: BTreeMap<Switch, bool>,
    pub root_overrides: HashMap<NodeId, BTreeMap<Switch, bool>>,
}

impl ResolverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, switch: Switch, value: bool) -> Self {
        self.switches.insert(switch, value);
        self
    }

    pub fn set_for_root(mut self, root: NodeId, switch: Switch, value: bool) -> Self {
        self.root_overrides.entry(root).or_default().insert(switch, value);
        self
    }

    /// Every switch off: parent-link walks only
    pub fn without_paths() -> Self {
        Self::new().set(Switch::UseMaterializedPaths, false)
    }
}

impl StrategySelector for ResolverConfig {
    fn enabled(&self, switch: Switch, root: Option<NodeId>) -> bool {
        if let Some(value) = root
            .and_then(|r| self.root_overrides.get(&r))
            .and_then(|overrides| overrides.get(&switch))
        {
            return *value;
        }
        self.switches.get(&switch).copied().unwrap_or(true)
    }
}

pub const DEFAULT_SORTED_REDUCTION_THRESHOLD: usize = 256;

/// Engine settings loaded at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub resolver: ResolverConfig,
    /// Nodes per batch when rebuilding paths from parent links
    pub backfill_batch_size: usize,
    /// Input size from which descendant lookups reduce paths by sorting
    pub sorted_reduction_threshold: usize,
    /// Reject empty id lists with `EmptyInput` instead of answering empty
    pub strict_empty_input: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            resolver: ResolverConfig::default(),
            backfill_batch_size: 1000,
            sorted_reduction_threshold: DEFAULT_SORTED_REDUCTION_THRESHOLD,
            strict_empty_input: false,
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file; missing fields take defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }
}

fn paths_enabled(selector: &dyn StrategySelector, switch: Switch, root: Option<NodeId>) -> bool {
    selector.enabled(Switch::UseMaterializedPaths, root) && selector.enabled(switch, root)
}

pub fn ancestor_strategy(selector: &dyn StrategySelector, root: Option<NodeId>) -> AncestorStrategy {
    if !paths_enabled(selector, Switch::AncestorsViaPaths, root) {
        AncestorStrategy::RecursiveWalk
    } else if selector.enabled(Switch::AncestorsViaInnerJoin, root) {
        AncestorStrategy::InnerJoin
    } else {
        AncestorStrategy::PerRowUnnest
    }
}

pub fn descendant_strategy(selector: &dyn StrategySelector, root: Option<NodeId>) -> DescendantStrategy {
    if !paths_enabled(selector, Switch::DescendantsViaPaths, root) {
        DescendantStrategy::RecursiveWalk
    } else if selector.enabled(Switch::DescendantsViaRangeComparison, root) {
        DescendantStrategy::RangeComparison
    } else {
        DescendantStrategy::Containment
    }
}

pub fn root_strategy(selector: &dyn StrategySelector, root: Option<NodeId>) -> RootStrategy {
    if paths_enabled(selector, Switch::RootsViaPaths, root) {
        RootStrategy::Paths
    } else {
        RootStrategy::ParentWalk
    }
}

pub fn hierarchy_strategy(selector: &dyn StrategySelector, root: Option<NodeId>) -> HierarchyStrategy {
    if paths_enabled(selector, Switch::HierarchyUnionViaPaths, root) {
        HierarchyStrategy::Paths
    } else {
        HierarchyStrategy::ParentWalk
    }
}

pub fn superset_reduction(selector: &dyn StrategySelector, root: Option<NodeId>) -> bool {
    selector.enabled(Switch::SupersetReduction, root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_prefer_paths() {
        let config = ResolverConfig::default();
        for switch in Switch::ALL {
            assert!(config.enabled(switch, None));
        }
        assert_eq!(ancestor_strategy(&config, None), AncestorStrategy::InnerJoin);
        assert_eq!(descendant_strategy(&config, None), DescendantStrategy::RangeComparison);
        assert_eq!(root_strategy(&config, None), RootStrategy::Paths);
        assert_eq!(hierarchy_strategy(&config, None), HierarchyStrategy::Paths);
    }

    #[test]
    fn test_master_switch_disables_every_path_strategy() {
        let config = ResolverConfig::without_paths();
        assert_eq!(ancestor_strategy(&config, None), AncestorStrategy::RecursiveWalk);
        assert_eq!(descendant_strategy(&config, None), DescendantStrategy::RecursiveWalk);
        assert_eq!(root_strategy(&config, None), RootStrategy::ParentWalk);
        assert_eq!(hierarchy_strategy(&config, None), HierarchyStrategy::ParentWalk);
    }

    #[test]
    fn test_root_override_wins() {
        let config = ResolverConfig::new()
            .set(Switch::DescendantsViaRangeComparison, false)
            .set_for_root(7, Switch::DescendantsViaRangeComparison, true);

        assert_eq!(descendant_strategy(&config, Some(1)), DescendantStrategy::Containment);
        assert_eq!(descendant_strategy(&config, Some(7)), DescendantStrategy::RangeComparison);
        assert_eq!(descendant_strategy(&config, None), DescendantStrategy::Containment);
    }

    #[test]
    fn test_closure_selector() {
        let selector = |switch: Switch, _root: Option<NodeId>| switch != Switch::AncestorsViaInnerJoin;
        assert_eq!(ancestor_strategy(&selector, None), AncestorStrategy::PerRowUnnest);
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "resolver": {
                "switches": { "ancestors_via_inner_join": false },
                "root_overrides": { "42": { "use_materialized_paths": false } }
            }
        }"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.backfill_batch_size, 1000);
        assert!(!config.strict_empty_input);
        assert_eq!(config.sorted_reduction_threshold, DEFAULT_SORTED_REDUCTION_THRESHOLD);
        assert_eq!(ancestor_strategy(&config.resolver, Some(1)), AncestorStrategy::PerRowUnnest);
        assert_eq!(ancestor_strategy(&config.resolver, Some(42)), AncestorStrategy::RecursiveWalk);
    }
}
