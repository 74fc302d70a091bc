//! Materialized paths (traversal_ids) and their algebra
//!
//! A path is the ordered list of ids from the root down to the node itself.
//! All hierarchy questions reduce to prefix and range checks over paths:
//!
//! - ancestor of N   = proper prefix of N's path
//! - descendant of N = path inside `[N, N.upper_bound())`
//! - root of N       = first component

pub mod superset;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{HierarchyError, Result};

pub use superset::{reduce_to_superset, reduce_to_superset_sorted};

/// Namespace identifier. `0` is reserved (used as the "no parent" key in stores)
pub type NodeId = u64;

/// Width of one encoded path component in bytes
const COMPONENT_WIDTH: usize = 8;

/// Root-to-self id path of a node
///
/// `Ord` is lexicographic over components, a proper prefix sorting first.
/// That ordering is what makes the range scan for descendants exact.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraversalIds(Vec<NodeId>);

impl TraversalIds {
    pub fn new(ids: Vec<NodeId>) -> Self {
        Self(ids)
    }

    /// assign_path: `parent.traversal_ids + [id]`, or `[id]` for a root
    pub fn for_node(id: NodeId, parent: Option<&TraversalIds>) -> Self {
        let mut ids = match parent {
            Some(p) => Vec::with_capacity(p.0.len() + 1),
            None => Vec::with_capacity(1),
        };
        if let Some(p) = parent {
            ids.extend_from_slice(&p.0);
        }
        ids.push(id);
        Self(ids)
    }

    pub fn as_slice(&self) -> &[NodeId] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<NodeId> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Depth of the node, 1 for roots
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn root(&self) -> Option<NodeId> {
        self.0.first().copied()
    }

    /// Id of the node owning this path
    pub fn last(&self) -> Option<NodeId> {
        self.0.last().copied()
    }

    /// Path of the parent, `None` for roots and empty paths
    pub fn parent_path(&self) -> Option<TraversalIds> {
        if self.0.len() < 2 {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Array containment `path @> [id]`
    pub fn contains(&self, id: NodeId) -> bool {
        self.0.contains(&id)
    }

    /// Array overlap `path && ids`
    pub fn overlaps(&self, ids: &[NodeId]) -> bool {
        self.0.iter().any(|id| ids.contains(id))
    }

    /// Non-strict prefix: true for the path itself
    pub fn is_prefix_of(&self, other: &TraversalIds) -> bool {
        other.0.starts_with(&self.0)
    }

    /// Strict prefix: `self` belongs to a proper ancestor of `other`
    pub fn is_ancestor_of(&self, other: &TraversalIds) -> bool {
        self.0.len() < other.0.len() && self.is_prefix_of(other)
    }

    /// Ids climbed by unnesting the path. Without self the last id is dropped.
    pub fn ancestor_ids(&self, include_self: bool) -> &[NodeId] {
        if include_self || self.0.is_empty() {
            &self.0
        } else {
            &self.0[..self.0.len() - 1]
        }
    }

    /// next_sibling: increment the last component
    ///
    /// `[1, 5]` -> `[1, 6]`. Returns `None` when the last component is
    /// `u64::MAX` or the path is empty.
    pub fn next_sibling(&self) -> Option<TraversalIds> {
        let (last, head) = self.0.split_last()?;
        let next = last.checked_add(1)?;
        let mut ids = head.to_vec();
        ids.push(next);
        Some(Self(ids))
    }

    /// Smallest path that is neither this path nor one of its descendants
    ///
    /// Same as `next_sibling` unless the last component overflows, in which
    /// case the bound moves up to the nearest ancestor that can be
    /// incremented. `None` means the range is unbounded above.
    pub fn upper_bound(&self) -> Option<TraversalIds> {
        self.upper_bound_within(NodeId::MAX)
    }

    /// `upper_bound` for a store whose components never exceed `max`
    pub fn upper_bound_within(&self, max: NodeId) -> Option<TraversalIds> {
        let mut ids = self.0.clone();
        while let Some(last) = ids.pop() {
            if last < max {
                ids.push(last + 1);
                return Some(Self(ids));
            }
        }
        None
    }

    /// Half-open range `[self, upper_bound)` covering self and descendants
    pub fn subtree_range(&self, include_self: bool) -> PathRange {
        PathRange {
            lower: self.clone(),
            upper: self.upper_bound(),
            include_lower: include_self,
        }
    }

    /// Replace `old_prefix` with `new_prefix`, keeping the suffix
    ///
    /// Used when a subtree is moved: every descendant keeps the part of its
    /// path below the moved node.
    pub fn rebase(&self, old_prefix: &TraversalIds, new_prefix: &TraversalIds) -> Result<TraversalIds> {
        if !old_prefix.is_prefix_of(self) {
            return Err(HierarchyError::InvalidFormat(format!(
                "{} is not a prefix of {}",
                old_prefix, self
            )));
        }
        let suffix = &self.0[old_prefix.0.len()..];
        let mut ids = Vec::with_capacity(new_prefix.0.len() + suffix.len());
        ids.extend_from_slice(&new_prefix.0);
        ids.extend_from_slice(suffix);
        Ok(Self(ids))
    }

    /// Search ancestry token: `[1, 2, 3]` -> `"1-2-3-"`
    ///
    /// The trailing separator makes a prefix match on the token of `[1, 2]`
    /// select its subtree without also matching `[1, 20]`.
    pub fn ancestry_string(&self) -> String {
        let mut token = String::new();
        for id in &self.0 {
            token.push_str(&id.to_string());
            token.push('-');
        }
        token
    }

    /// Order-preserving key: big-endian fixed-width components
    ///
    /// Byte order of keys equals `Ord` of paths, so a KV range scan over
    /// keys is a range scan over paths.
    pub fn to_key(&self) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.0.len() * COMPONENT_WIDTH);
        for id in &self.0 {
            key.extend_from_slice(&id.to_be_bytes());
        }
        key
    }

    pub fn from_key(key: &[u8]) -> Result<Self> {
        if key.len() % COMPONENT_WIDTH != 0 {
            return Err(HierarchyError::InvalidFormat(format!(
                "path key length {} is not a multiple of {}",
                key.len(),
                COMPONENT_WIDTH
            )));
        }
        let ids = key
            .chunks_exact(COMPONENT_WIDTH)
            .map(|chunk| {
                let mut bytes = [0u8; COMPONENT_WIDTH];
                bytes.copy_from_slice(chunk);
                NodeId::from_be_bytes(bytes)
            })
            .collect();
        Ok(Self(ids))
    }
}

impl From<Vec<NodeId>> for TraversalIds {
    fn from(ids: Vec<NodeId>) -> Self {
        Self(ids)
    }
}

impl fmt::Display for TraversalIds {
    /// PostgreSQL array literal: `{1,2,3}`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, id) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", id)?;
        }
        write!(f, "}}")
    }
}

/// Lexicographic range over paths
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathRange {
    pub lower: TraversalIds,
    /// Exclusive; `None` = unbounded
    pub upper: Option<TraversalIds>,
    /// `>=` when true, `>` when false
    pub include_lower: bool,
}

impl PathRange {
    pub fn contains(&self, path: &TraversalIds) -> bool {
        let above_lower = if self.include_lower {
            *path >= self.lower
        } else {
            *path > self.lower
        };
        let below_upper = self.upper.as_ref().map_or(true, |upper| path < upper);
        above_lower && below_upper
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(ids: &[NodeId]) -> TraversalIds {
        TraversalIds::new(ids.to_vec())
    }

    #[test]
    fn test_for_node_root_and_child() {
        let root = TraversalIds::for_node(1, None);
        assert_eq!(root, p(&[1]));

        let child = TraversalIds::for_node(2, Some(&root));
        let grandchild = TraversalIds::for_node(3, Some(&child));
        assert_eq!(grandchild, p(&[1, 2, 3]));
        assert_eq!(grandchild.depth(), 3);
        assert_eq!(grandchild.root(), Some(1));
        assert_eq!(grandchild.last(), Some(3));
        assert_eq!(grandchild.parent_path(), Some(child));
    }

    #[test]
    fn test_next_sibling() {
        assert_eq!(p(&[1, 5]).next_sibling(), Some(p(&[1, 6])));
        assert_eq!(p(&[]).next_sibling(), None);
        assert_eq!(p(&[1, u64::MAX]).next_sibling(), None);
    }

    #[test]
    fn test_upper_bound_carries_on_overflow() {
        assert_eq!(p(&[1, 5]).upper_bound(), Some(p(&[1, 6])));
        assert_eq!(p(&[1, u64::MAX]).upper_bound(), Some(p(&[2])));
        assert_eq!(p(&[u64::MAX, u64::MAX]).upper_bound(), None);
    }

    #[test]
    fn test_upper_bound_within_signed_range() {
        let max = i64::MAX as NodeId;
        assert_eq!(p(&[1, 5]).upper_bound_within(max), Some(p(&[1, 6])));
        assert_eq!(p(&[1, max]).upper_bound_within(max), Some(p(&[2])));
        assert_eq!(p(&[max]).upper_bound_within(max), None);
    }

    #[test]
    fn test_ancestry_string() {
        assert_eq!(p(&[1, 2, 3]).ancestry_string(), "1-2-3-");
        assert_eq!(p(&[]).ancestry_string(), "");

        let parent = p(&[1, 2]).ancestry_string();
        assert!(p(&[1, 2, 3]).ancestry_string().starts_with(&parent));
        assert!(!p(&[1, 20]).ancestry_string().starts_with(&parent));
    }

    #[test]
    fn test_range_bound_for_descendants() {
        let range = p(&[1, 5]).subtree_range(true);
        assert!(range.contains(&p(&[1, 5])));
        assert!(range.contains(&p(&[1, 5, 2])));
        assert!(range.contains(&p(&[1, 5, 2, 900])));
        assert!(!range.contains(&p(&[1, 6])));
        assert!(!range.contains(&p(&[1])));
        assert!(!range.contains(&p(&[1, 4, 99])));

        let without_self = p(&[1, 5]).subtree_range(false);
        assert!(!without_self.contains(&p(&[1, 5])));
        assert!(without_self.contains(&p(&[1, 5, 2])));
    }

    #[test]
    fn test_prefix_ordering() {
        // Proper prefix sorts first, then component-wise
        assert!(p(&[1]) < p(&[1, 2]));
        assert!(p(&[1, 2, 3]) < p(&[1, 3]));
        assert!(p(&[1, 9]) < p(&[2]));
    }

    #[test]
    fn test_ancestor_predicates() {
        assert!(p(&[1, 2]).is_ancestor_of(&p(&[1, 2, 3])));
        assert!(!p(&[1, 2]).is_ancestor_of(&p(&[1, 2])));
        assert!(p(&[1, 2]).is_prefix_of(&p(&[1, 2])));
        assert!(!p(&[1, 2]).is_prefix_of(&p(&[1, 20])));
        assert!(p(&[1, 2, 3]).contains(2));
        assert!(p(&[1, 2, 3]).overlaps(&[9, 3]));
        assert!(!p(&[1, 2, 3]).overlaps(&[4]));
    }

    #[test]
    fn test_ancestor_ids() {
        let path = p(&[7, 3, 9]);
        assert_eq!(path.ancestor_ids(true), &[7, 3, 9]);
        assert_eq!(path.ancestor_ids(false), &[7, 3]);
        assert!(p(&[]).ancestor_ids(false).is_empty());
    }

    #[test]
    fn test_rebase() {
        let path = p(&[1, 2, 3, 4]);
        let moved = path.rebase(&p(&[1, 2]), &p(&[5, 6, 2])).unwrap();
        assert_eq!(moved, p(&[5, 6, 2, 3, 4]));

        assert!(path.rebase(&p(&[9]), &p(&[1])).is_err());
    }

    #[test]
    fn test_key_order_matches_path_order() {
        let mut paths = vec![
            p(&[2]),
            p(&[1, 300]),
            p(&[1]),
            p(&[1, 2, 3]),
            p(&[1, 2]),
            p(&[256]),
        ];
        let mut keys: Vec<Vec<u8>> = paths.iter().map(|x| x.to_key()).collect();
        paths.sort();
        keys.sort();

        let decoded: Vec<TraversalIds> = keys
            .iter()
            .map(|k| TraversalIds::from_key(k).unwrap())
            .collect();
        assert_eq!(decoded, paths);
    }

    #[test]
    fn test_from_key_rejects_partial_component() {
        assert!(TraversalIds::from_key(&[0, 1, 2]).is_err());
    }

    #[test]
    fn test_display_as_array_literal() {
        assert_eq!(p(&[1, 2, 3]).to_string(), "{1,2,3}");
        assert_eq!(p(&[]).to_string(), "{}");
    }
}
