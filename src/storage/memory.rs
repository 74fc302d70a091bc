//! In-memory store: ordered maps keyed by id and by path

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;

use super::{Delta, DeltaLog, NamespaceStore, NodeRecord};
use crate::error::{HierarchyError, Result};
use crate::path::{NodeId, PathRange, TraversalIds};

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    nodes: BTreeMap<NodeId, NodeRecord>,
    by_path: BTreeMap<TraversalIds, NodeId>,
    children: HashMap<NodeId, BTreeSet<NodeId>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn link(&mut self, node: &NodeRecord) {
        if let Some(parent) = node.parent_id {
            self.children.entry(parent).or_default().insert(node.id);
        }
    }

    /// Drop the path entry only if it still points at `node`
    fn unindex(&mut self, node: &NodeRecord) {
        if self.by_path.get(&node.traversal_ids) == Some(&node.id) {
            self.by_path.remove(&node.traversal_ids);
        }
    }

    fn unlink(&mut self, node: &NodeRecord) {
        if let Some(parent) = node.parent_id {
            if let Some(set) = self.children.get_mut(&parent) {
                set.remove(&node.id);
                if set.is_empty() {
                    self.children.remove(&parent);
                }
            }
        }
    }

    /// Apply one delta and return the delta that undoes it
    fn apply_one(&mut self, delta: &Delta) -> Result<Delta> {
        match delta {
            Delta::Insert(node) => {
                if self.nodes.contains_key(&node.id) {
                    return Err(HierarchyError::DuplicateNode(node.id));
                }
                if self.by_path.contains_key(&node.traversal_ids) {
                    return Err(HierarchyError::InvalidFormat(format!(
                        "path {} already indexed",
                        node.traversal_ids
                    )));
                }
                self.by_path.insert(node.traversal_ids.clone(), node.id);
                self.link(node);
                self.nodes.insert(node.id, node.clone());
                Ok(Delta::Delete { id: node.id })
            }
            Delta::Delete { id } => {
                let node = self
                    .nodes
                    .remove(id)
                    .ok_or(HierarchyError::NodeNotFound(*id))?;
                self.unindex(&node);
                self.unlink(&node);
                Ok(Delta::Insert(node))
            }
            Delta::Rewrite { id, parent_id, traversal_ids } => {
                let old = self
                    .nodes
                    .get(id)
                    .cloned()
                    .ok_or(HierarchyError::NodeNotFound(*id))?;

                self.unindex(&old);
                self.unlink(&old);

                let mut updated = old.clone();
                updated.parent_id = *parent_id;
                updated.traversal_ids = traversal_ids.clone();

                self.by_path.insert(updated.traversal_ids.clone(), updated.id);
                self.link(&updated);
                self.nodes.insert(updated.id, updated);

                Ok(Delta::Rewrite {
                    id: old.id,
                    parent_id: old.parent_id,
                    traversal_ids: old.traversal_ids,
                })
            }
        }
    }

    fn resolve_paths<'a>(&self, ids: impl Iterator<Item = &'a NodeId>) -> Vec<NodeRecord> {
        ids.filter_map(|id| self.nodes.get(id).cloned()).collect()
    }
}

impl NamespaceStore for MemoryStore {
    fn get(&self, id: NodeId) -> Result<Option<NodeRecord>> {
        Ok(self.nodes.get(&id).cloned())
    }

    fn scan_range(&self, range: &PathRange) -> Result<Vec<NodeRecord>> {
        let lower = if range.include_lower {
            Bound::Included(range.lower.clone())
        } else {
            Bound::Excluded(range.lower.clone())
        };
        let upper = match &range.upper {
            Some(upper) => Bound::Excluded(upper.clone()),
            None => Bound::Unbounded,
        };
        // BTreeMap::range panics on an inverted range
        if let (Bound::Excluded(l) | Bound::Included(l), Bound::Excluded(u)) = (&lower, &upper) {
            if l >= u {
                return Ok(Vec::new());
            }
        }
        Ok(self.resolve_paths(self.by_path.range((lower, upper)).map(|(_, id)| id)))
    }

    fn scan_all(&self) -> Result<Vec<NodeRecord>> {
        Ok(self.resolve_paths(self.by_path.values()))
    }

    fn scan_ids(&self, after: Option<NodeId>, limit: usize) -> Result<Vec<NodeRecord>> {
        let lower = match after {
            Some(id) => Bound::Excluded(id),
            None => Bound::Unbounded,
        };
        Ok(self
            .nodes
            .range((lower, Bound::Unbounded))
            .take(limit)
            .map(|(_, node)| node.clone())
            .collect())
    }

    fn children(&self, parent: NodeId) -> Result<Vec<NodeRecord>> {
        Ok(match self.children.get(&parent) {
            Some(ids) => self.resolve_paths(ids.iter()),
            None => Vec::new(),
        })
    }

    fn apply(&mut self, batch: &[Delta]) -> Result<()> {
        let mut undo = DeltaLog::new();
        for delta in batch {
            match self.apply_one(delta) {
                Ok(inverse) => undo.push(inverse),
                Err(e) => {
                    for inverse in undo.drain().rev() {
                        if let Err(rollback) = self.apply_one(&inverse) {
                            tracing::error!("Rollback of node {} failed: {}", inverse.node_id(), rollback);
                        }
                    }
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.nodes.len())
    }
}
