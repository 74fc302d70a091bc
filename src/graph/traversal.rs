//! Parent-link traversals
//!
//! Fallbacks that ignore materialized paths and follow `parent_id` edges
//! instead. Also used to rebuild paths when they cannot be trusted.

use std::collections::{HashSet, VecDeque};

use crate::error::{HierarchyError, Result};
use crate::path::NodeId;

/// BFS from start nodes down the children edges
///
/// Start nodes come first, then levels in order. Each node is visited once.
pub fn bfs<F>(start: &[NodeId], mut get_children: F) -> Result<Vec<NodeId>>
where
    F: FnMut(NodeId) -> Result<Vec<NodeId>>,
{
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from_iter(start.iter().copied());
    let mut result = Vec::new();

    while let Some(node) = queue.pop_front() {
        if !visited.insert(node) {
            continue;
        }

        result.push(node);

        for child in get_children(node)? {
            if !visited.contains(&child) {
                queue.push_back(child);
            }
        }
    }

    Ok(result)
}

/// Climb parent links from `start` up to its root
///
/// Returns `[start, parent, grandparent, ..., root]`. A loop in parent links
/// is reported instead of spinning forever.
pub fn walk_up<F>(start: NodeId, mut get_parent: F) -> Result<Vec<NodeId>>
where
    F: FnMut(NodeId) -> Result<Option<NodeId>>,
{
    let mut chain = vec![start];
    let mut visited = HashSet::from([start]);
    let mut current = start;

    while let Some(parent) = get_parent(current)? {
        if !visited.insert(parent) {
            return Err(HierarchyError::ParentLoop(start));
        }
        chain.push(parent);
        current = parent;
    }

    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_bfs_simple_tree() {
        // 1 -> 2 -> 3
        // 1 -> 4
        let children: HashMap<NodeId, Vec<NodeId>> =
            [(1, vec![2, 4]), (2, vec![3]), (3, vec![]), (4, vec![])]
                .into_iter()
                .collect();

        let result = bfs(&[1], |id| Ok(children.get(&id).cloned().unwrap_or_default())).unwrap();

        assert_eq!(result, vec![1, 2, 4, 3]);
    }

    #[test]
    fn test_bfs_overlapping_starts() {
        let children: HashMap<NodeId, Vec<NodeId>> =
            [(1, vec![2]), (2, vec![3])].into_iter().collect();

        let result = bfs(&[1, 2], |id| Ok(children.get(&id).cloned().unwrap_or_default())).unwrap();

        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_walk_up_to_root() {
        let parents: HashMap<NodeId, NodeId> = [(3, 2), (2, 1)].into_iter().collect();
        let chain = walk_up(3, |id| Ok(parents.get(&id).copied())).unwrap();
        assert_eq!(chain, vec![3, 2, 1]);
    }

    #[test]
    fn test_walk_up_detects_loop() {
        let parents: HashMap<NodeId, NodeId> = [(1, 2), (2, 1)].into_iter().collect();
        let result = walk_up(1, |id| Ok(parents.get(&id).copied()));
        assert!(matches!(result, Err(HierarchyError::ParentLoop(1))));
    }
}
