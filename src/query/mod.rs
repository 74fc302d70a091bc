//! Query plans for hierarchy lookups
//!
//! Resolvers describe *what* to fetch as a [`Query`]; stores decide *how*.
//! [`evaluate`] runs a plan on any [`NamespaceStore`] using its primitive
//! scans, [`sql::to_sql`] renders the same plan for a relational engine with
//! array columns.

pub mod sql;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::path::{NodeId, PathRange, TraversalIds};
use crate::storage::{NamespaceStore, NodeRecord};

/// Tagged query plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Query {
    /// `id IN (...)`
    ById { ids: Vec<NodeId> },

    /// `traversal_ids @> {id}` for any id, `id NOT IN exclude`, distinct
    ContainmentScan { ids: Vec<NodeId>, exclude: Vec<NodeId> },

    /// Union of lexicographic path ranges, `id NOT IN exclude`
    RangeScan { ranges: Vec<PathRange>, exclude: Vec<NodeId> },

    /// Union all paths, unnest, distinct, join back
    UnnestJoin {
        paths: Vec<TraversalIds>,
        include_self: bool,
        exclude: Vec<NodeId>,
    },

    /// Unnest every path on its own row into `(base_id, ancestor_id)` pairs
    UnnestPerRow {
        paths: Vec<TraversalIds>,
        include_self: bool,
        exclude: Vec<NodeId>,
    },

    /// `traversal_ids && ids`
    Overlap { ids: Vec<NodeId> },

    /// `parent_id = parent`
    ChildrenOf { parent: NodeId },
}

impl Query {
    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Query::ById { .. } => "by_id",
            Query::ContainmentScan { .. } => "containment_scan",
            Query::RangeScan { .. } => "range_scan",
            Query::UnnestJoin { .. } => "unnest_join",
            Query::UnnestPerRow { .. } => "unnest_per_row",
            Query::Overlap { .. } => "overlap",
            Query::ChildrenOf { .. } => "children_of",
        }
    }
}

/// Evaluate a plan with the store's primitive operations
pub fn evaluate<S: NamespaceStore + ?Sized>(store: &S, query: &Query) -> Result<Vec<NodeRecord>> {
    tracing::trace!(kind = query.kind(), "evaluating query");

    match query {
        Query::ById { ids } => store.get_many(ids),

        Query::ContainmentScan { ids, exclude } => {
            let all = store.scan_all()?;
            let mut seen = HashSet::new();
            let mut result = Vec::new();
            // One pass per base id, like a containment join; rows matching
            // several base ids collapse on node id.
            for &base in ids {
                for node in &all {
                    if node.traversal_ids.contains(base)
                        && !exclude.contains(&node.id)
                        && seen.insert(node.id)
                    {
                        result.push(node.clone());
                    }
                }
            }
            Ok(result)
        }

        Query::RangeScan { ranges, exclude } => {
            let mut seen = HashSet::new();
            let mut result = Vec::new();
            for range in ranges {
                for node in store.scan_range(range)? {
                    if !exclude.contains(&node.id) && seen.insert(node.id) {
                        result.push(node);
                    }
                }
            }
            Ok(result)
        }

        Query::UnnestJoin { paths, include_self, exclude } => {
            let mut seen = HashSet::new();
            let ids: Vec<NodeId> = paths
                .iter()
                .flat_map(|p| p.ancestor_ids(*include_self).iter().copied())
                .filter(|id| !exclude.contains(id))
                .filter(|id| seen.insert(*id))
                .collect();
            store.get_many(&ids)
        }

        Query::UnnestPerRow { paths, include_self, exclude } => {
            let mut seen = HashSet::new();
            let mut result = Vec::new();
            for path in paths {
                let Some(base_id) = path.last() else { continue };
                for &ancestor_id in path.as_slice() {
                    if !include_self && ancestor_id == base_id {
                        continue;
                    }
                    if exclude.contains(&ancestor_id) || !seen.insert(ancestor_id) {
                        continue;
                    }
                    if let Some(node) = store.get(ancestor_id)? {
                        result.push(node);
                    }
                }
            }
            Ok(result)
        }

        Query::Overlap { ids } => Ok(store
            .scan_all()?
            .into_iter()
            .filter(|node| node.traversal_ids.overlaps(ids))
            .collect()),

        Query::ChildrenOf { parent } => store.children(*parent),
    }
}
