//! HierarchyEngine: path maintenance on writes, resolvers on reads

use std::collections::HashMap;
use std::env;
use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{traversal, HierarchyStore, PresenceFilter};
use crate::error::{HierarchyError, Result};
use crate::path::{NodeId, TraversalIds};
use crate::query::sql;
use crate::resolver::{AncestorOptions, DescendantOptions, EngineConfig, Order, Resolver, StrategySelector, Switch};
use crate::storage::{Delta, MemoryStore, NamespaceStore, NodeRecord, SledStore};

// Debug logging macro - enabled via NSDB_DEBUG=1
macro_rules! debug_log {
    ($($arg:tt)*) => {
        if env::var("NSDB_DEBUG").is_ok() {
            eprintln!("[NSDB DEBUG] {}", format!($($arg)*));
        }
    };
}

/// Outcome of a backfill run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillReport {
    pub scanned: usize,
    pub updated: usize,
    pub batches: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationKind {
    EmptyPath,
    MissingParent { parent: NodeId },
    ParentCycle,
    PathMismatch { expected: TraversalIds, actual: TraversalIds },
}

/// A node whose stored path disagrees with its parent links
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub id: NodeId,
    pub kind: ViolationKind,
}

/// Paths computed during a backfill, dropped wholesale once `capacity` is hit
struct PathMemo {
    paths: HashMap<NodeId, TraversalIds>,
    capacity: usize,
}

impl PathMemo {
    fn new(capacity: usize) -> Self {
        Self {
            paths: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    fn get(&self, id: NodeId) -> Option<&TraversalIds> {
        self.paths.get(&id)
    }

    fn contains(&self, id: NodeId) -> bool {
        self.paths.contains_key(&id)
    }

    fn insert(&mut self, id: NodeId, path: TraversalIds) {
        if self.paths.len() >= self.capacity {
            self.paths.clear();
        }
        self.paths.insert(id, path);
    }
}

/// Namespace hierarchy over any [`NamespaceStore`]
///
/// Every write keeps `traversal_ids` equal to the parent's path plus the
/// node's own id. A write lands as one atomic batch on the store, so readers
/// never see a half-moved subtree.
pub struct HierarchyEngine<S: NamespaceStore = MemoryStore> {
    store: S,
    config: EngineConfig,
}

impl HierarchyEngine<MemoryStore> {
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }
}

impl HierarchyEngine<SledStore> {
    /// Open (or create) a persistent hierarchy
    pub fn open<P: AsRef<Path>>(path: P, config: EngineConfig) -> Result<Self> {
        let store = SledStore::open(path)?;
        tracing::info!("Opened hierarchy at {:?} ({} nodes)", store.path(), store.len()?);
        Ok(Self::with_config(store, config))
    }
}

impl<S: NamespaceStore> HierarchyEngine<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: S, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Raw store access; writes made here skip path maintenance
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn resolver(&self) -> Resolver<'_, S> {
        Resolver::new(&self.store, &self.config.resolver)
            .with_sorted_reduction_threshold(self.config.sorted_reduction_threshold)
    }

    fn require(&self, id: NodeId) -> Result<NodeRecord> {
        self.store.get(id)?.ok_or(HierarchyError::NodeNotFound(id))
    }

    /// Load records for `ids`, failing on the first unknown id
    pub fn load_nodes(&self, ids: &[NodeId]) -> Result<Vec<NodeRecord>> {
        if ids.is_empty() && self.config.strict_empty_input {
            return Err(HierarchyError::EmptyInput);
        }
        ids.iter().map(|&id| self.require(id)).collect()
    }

    /// SQL a relational store would run for `descendants`
    ///
    /// `None` when the selected strategy walks children instead of running
    /// a plan.
    pub fn explain_descendants(&self, ids: &[NodeId], include_self: bool) -> Result<Option<String>> {
        let nodes = self.load_nodes(ids)?;
        self.resolver()
            .descendants_plan(&nodes, &DescendantOptions::new().include_self(include_self))
            .map(|plan| sql::to_sql(&plan))
            .transpose()
    }

    /// SQL a relational store would run for `ancestors`, ordered by depth
    pub fn explain_ancestors(
        &self,
        ids: &[NodeId],
        include_self: bool,
        upto: &[NodeId],
        order: Order,
    ) -> Result<Option<String>> {
        let nodes = self.load_nodes(ids)?;
        let upto = upto.iter().map(|&id| self.require(id)).collect::<Result<Vec<_>>>()?;
        let options = AncestorOptions::new().include_self(include_self).upto(upto).order(order);
        self.resolver()
            .ancestors_plan(&nodes, &options)
            .map(|plan| -> Result<String> { Ok(sql::with_order(&sql::to_sql(&plan)?, order)) })
            .transpose()
    }

    /// Path `id` should have according to parent links
    ///
    /// `memo` caches computed paths across calls; the climb stops at the
    /// first memoized ancestor.
    fn expected_path(&self, id: NodeId, memo: &mut PathMemo) -> Result<TraversalIds> {
        if let Some(path) = memo.get(id) {
            return Ok(path.clone());
        }

        let chain = {
            let cached = &*memo;
            traversal::walk_up(id, |n| {
                if n != id && cached.contains(n) {
                    return Ok(None);
                }
                let node = self.store.get(n)?.ok_or(HierarchyError::ParentNotFound(n))?;
                Ok(node.parent_id)
            })?
        };

        let mut path: Option<TraversalIds> = None;
        for &n in chain.iter().rev() {
            let current = match memo.get(n) {
                Some(known) => known.clone(),
                None => {
                    let computed = TraversalIds::for_node(n, path.as_ref());
                    memo.insert(n, computed.clone());
                    computed
                }
            };
            path = Some(current);
        }
        path.ok_or(HierarchyError::NodeNotFound(id))
    }
}

/// What is wrong with `node`, judged against parent links in `by_id`
fn check_violation(node: &NodeRecord, by_id: &HashMap<NodeId, &NodeRecord>) -> Option<ViolationKind> {
    if node.traversal_ids.is_empty() {
        return Some(ViolationKind::EmptyPath);
    }

    let chain = traversal::walk_up(node.id, |n| match by_id.get(&n) {
        Some(record) => Ok(record.parent_id),
        None => Err(HierarchyError::ParentNotFound(n)),
    });
    let chain = match chain {
        Ok(chain) => chain,
        Err(HierarchyError::ParentNotFound(parent)) => return Some(ViolationKind::MissingParent { parent }),
        Err(_) => return Some(ViolationKind::ParentCycle),
    };

    let expected = TraversalIds::new(chain.into_iter().rev().collect());
    if expected != node.traversal_ids {
        return Some(ViolationKind::PathMismatch {
            expected,
            actual: node.traversal_ids.clone(),
        });
    }
    None
}

impl<S: NamespaceStore> HierarchyStore for HierarchyEngine<S> {
    fn create_node(&mut self, id: NodeId, parent_id: Option<NodeId>, name: Option<String>) -> Result<NodeRecord> {
        if id == 0 {
            return Err(HierarchyError::InvalidId(id));
        }
        if self.store.get(id)?.is_some() {
            return Err(HierarchyError::DuplicateNode(id));
        }

        let parent_path = match parent_id {
            Some(parent) => Some(
                self.store
                    .get(parent)?
                    .ok_or(HierarchyError::ParentNotFound(parent))?
                    .traversal_ids,
            ),
            None => None,
        };

        let node = NodeRecord {
            id,
            parent_id,
            traversal_ids: TraversalIds::for_node(id, parent_path.as_ref()),
            name,
        };
        self.store.apply(&[Delta::Insert(node.clone())])?;

        debug_log!("create_node: id={} parent={:?} path={}", id, parent_id, node.traversal_ids);
        Ok(node)
    }

    fn reparent(&mut self, id: NodeId, new_parent: Option<NodeId>) -> Result<usize> {
        let node = self.require(id)?;
        if node.parent_id == new_parent {
            return Ok(0);
        }

        let parent_path = match new_parent {
            Some(parent) => {
                let cycle = HierarchyError::Cycle { node: id, new_parent: parent };
                if parent == id {
                    return Err(cycle);
                }
                let parent_node = self.store.get(parent)?.ok_or(HierarchyError::ParentNotFound(parent))?;
                // new parent inside the moved subtree
                if node.traversal_ids.is_prefix_of(&parent_node.traversal_ids) {
                    return Err(cycle);
                }
                Some(parent_node.traversal_ids)
            }
            None => None,
        };

        let old_path = node.traversal_ids.clone();
        let new_path = TraversalIds::for_node(id, parent_path.as_ref());
        let subtree = self.store.scan_range(&old_path.subtree_range(true))?;

        let batch = subtree
            .iter()
            .map(|n| {
                Ok(Delta::Rewrite {
                    id: n.id,
                    parent_id: if n.id == id { new_parent } else { n.parent_id },
                    traversal_ids: n.traversal_ids.rebase(&old_path, &new_path)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        self.store.apply(&batch)?;

        tracing::info!(
            node = id,
            from = %old_path,
            to = %new_path,
            rewritten = batch.len(),
            "Reparented subtree"
        );
        Ok(batch.len())
    }

    fn delete_node(&mut self, id: NodeId, cascade: bool) -> Result<usize> {
        let node = self.require(id)?;
        let subtree = self.store.scan_range(&node.traversal_ids.subtree_range(true))?;

        if subtree.len() > 1 && !cascade {
            return Err(HierarchyError::HasDescendants(id));
        }

        // deepest paths first: children go before their parents
        let batch: Vec<Delta> = subtree.iter().rev().map(|n| Delta::Delete { id: n.id }).collect();
        self.store.apply(&batch)?;

        debug_log!("delete_node: id={} cascade={} removed={}", id, cascade, batch.len());
        if batch.len() > 1 {
            tracing::info!(node = id, removed = batch.len(), "Deleted subtree");
        }
        Ok(batch.len())
    }

    fn get_node(&self, id: NodeId) -> Result<Option<NodeRecord>> {
        self.store.get(id)
    }

    fn list_nodes(&self, filter: PresenceFilter) -> Result<Vec<NodeRecord>> {
        Ok(filter.apply(self.store.scan_all()?))
    }

    fn ancestors(&self, ids: &[NodeId], include_self: bool, upto: &[NodeId], order: Order) -> Result<Vec<NodeRecord>> {
        let nodes = self.load_nodes(ids)?;
        let upto = upto.iter().map(|&id| self.require(id)).collect::<Result<Vec<_>>>()?;
        let options = AncestorOptions::new().include_self(include_self).upto(upto).order(order);
        self.resolver().ancestors_of(&nodes, &options)
    }

    fn descendants(&self, ids: &[NodeId], include_self: bool) -> Result<Vec<NodeRecord>> {
        let nodes = self.load_nodes(ids)?;
        self.resolver()
            .descendants_of(&nodes, &DescendantOptions::new().include_self(include_self))
    }

    fn roots(&self, ids: &[NodeId]) -> Result<Vec<NodeRecord>> {
        let nodes = self.load_nodes(ids)?;
        self.resolver().roots_of(&nodes)
    }

    fn root_ancestor(&self, id: NodeId) -> Result<NodeRecord> {
        let node = self.require(id)?;
        self.resolver().root_ancestor(&node)
    }

    fn hierarchy(&self, id: NodeId) -> Result<Vec<NodeRecord>> {
        let node = self.require(id)?;
        self.resolver().self_and_hierarchy(&node)
    }

    fn children(&self, id: NodeId) -> Result<Vec<NodeRecord>> {
        let node = self.require(id)?;
        self.resolver().children_of(&node)
    }

    fn in_hierarchy(&self, ids: &[NodeId]) -> Result<Vec<NodeRecord>> {
        if ids.is_empty() && self.config.strict_empty_input {
            return Err(HierarchyError::EmptyInput);
        }
        self.resolver().in_hierarchy_of(ids)
    }

    fn is_ancestor_of(&self, ancestor: NodeId, node: NodeId) -> Result<bool> {
        let a = self.require(ancestor)?;
        let n = self.require(node)?;

        if self.config.resolver.enabled(Switch::UseMaterializedPaths, Some(n.root_id())) {
            return Ok(a.traversal_ids.is_ancestor_of(&n.traversal_ids));
        }

        let chain = traversal::walk_up(n.id, |id| Ok(self.require(id)?.parent_id))?;
        Ok(chain.iter().skip(1).any(|&id| id == a.id))
    }

    fn backfill_traversal_ids(&mut self, batch_size: Option<usize>) -> Result<BackfillReport> {
        let batch_size = batch_size.unwrap_or(self.config.backfill_batch_size).max(1);
        let mut report = BackfillReport::default();
        // roughly the paths of one batch plus their ancestors
        let mut memo = PathMemo::new(batch_size.saturating_mul(4));
        let mut cursor = None;

        tracing::info!(batch_size, "Backfilling traversal ids");

        loop {
            let nodes = self.store.scan_ids(cursor, batch_size)?;
            let Some(last) = nodes.last() else {
                break;
            };
            cursor = Some(last.id);

            let mut batch = Vec::new();
            for node in &nodes {
                let expected = self.expected_path(node.id, &mut memo)?;
                if expected != node.traversal_ids {
                    tracing::warn!(
                        node = node.id,
                        stored = %node.traversal_ids,
                        expected = %expected,
                        "Repairing traversal ids"
                    );
                    batch.push(Delta::Rewrite {
                        id: node.id,
                        parent_id: node.parent_id,
                        traversal_ids: expected,
                    });
                }
            }

            self.store.apply(&batch)?;
            report.scanned += nodes.len();
            report.updated += batch.len();
            report.batches += 1;
            debug_log!("backfill batch {}: scanned={} updated={}", report.batches, nodes.len(), batch.len());
        }

        tracing::info!(
            scanned = report.scanned,
            updated = report.updated,
            batches = report.batches,
            "Backfill complete"
        );
        Ok(report)
    }

    fn verify(&self) -> Result<Vec<Violation>> {
        let nodes = self.store.scan_all()?;
        let by_id: HashMap<NodeId, &NodeRecord> = nodes.iter().map(|n| (n.id, n)).collect();

        let mut violations: Vec<Violation> = nodes
            .par_iter()
            .filter_map(|node| {
                check_violation(node, &by_id).map(|kind| Violation { id: node.id, kind })
            })
            .collect();
        violations.sort_by_key(|v| v.id);

        if violations.is_empty() {
            tracing::debug!(nodes = nodes.len(), "Verify: all paths consistent");
        } else {
            tracing::warn!(nodes = nodes.len(), violations = violations.len(), "Verify found inconsistent paths");
        }
        Ok(violations)
    }

    fn flush(&mut self) -> Result<()> {
        self.store.flush()
    }

    fn node_count(&self) -> Result<usize> {
        self.store.len()
    }
}
