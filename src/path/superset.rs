//! Superset reduction: shrink a batch of paths to its topmost members
//!
//! A path is dropped when another path of the same batch belongs to one of
//! its ancestors. Scanning descendants of the reduced batch covers exactly
//! the same nodes as scanning every input, without overlapping scans.

use std::collections::HashSet;

use super::{NodeId, TraversalIds};

/// Keep paths whose ancestor ids do not end any other path in the batch
///
/// `{[1], [1,2], [1,2,3], [4]}` -> `{[1], [4]}`. Output keeps input order,
/// exact duplicates collapse to one.
pub fn reduce_to_superset(paths: &[TraversalIds]) -> Vec<TraversalIds> {
    let tails: HashSet<NodeId> = paths.iter().filter_map(|p| p.last()).collect();

    let mut seen = HashSet::new();
    paths
        .iter()
        .filter(|p| !p.is_empty())
        .filter(|p| !p.ancestor_ids(false).iter().any(|id| tails.contains(id)))
        .filter(|p| seen.insert((*p).clone()))
        .cloned()
        .collect()
}

/// Sort-based reduction for large batches
///
/// After sorting, a covered path always follows the path covering it, so
/// one pass comparing against the last kept path is enough. Returns paths in
/// lexicographic order.
pub fn reduce_to_superset_sorted(paths: &[TraversalIds]) -> Vec<TraversalIds> {
    let mut sorted: Vec<&TraversalIds> = paths.iter().filter(|p| !p.is_empty()).collect();
    sorted.sort();

    let mut kept: Vec<TraversalIds> = Vec::new();
    for path in sorted {
        match kept.last() {
            Some(top) if top.is_prefix_of(path) => continue,
            _ => kept.push(path.clone()),
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(ids: &[NodeId]) -> TraversalIds {
        TraversalIds::new(ids.to_vec())
    }

    #[test]
    fn test_reduce_drops_covered_paths() {
        let batch = vec![p(&[1]), p(&[1, 2]), p(&[1, 2, 3]), p(&[4])];
        assert_eq!(reduce_to_superset(&batch), vec![p(&[1]), p(&[4])]);
    }

    #[test]
    fn test_reduce_keeps_siblings() {
        let batch = vec![p(&[1, 2]), p(&[1, 3]), p(&[1, 3, 7])];
        assert_eq!(reduce_to_superset(&batch), vec![p(&[1, 2]), p(&[1, 3])]);
    }

    #[test]
    fn test_reduce_collapses_duplicates() {
        let batch = vec![p(&[5, 6]), p(&[5, 6])];
        assert_eq!(reduce_to_superset(&batch), vec![p(&[5, 6])]);
    }

    #[test]
    fn test_reduce_empty_batch() {
        assert!(reduce_to_superset(&[]).is_empty());
        assert!(reduce_to_superset_sorted(&[]).is_empty());
    }

    #[test]
    fn test_sorted_variant_agrees() {
        let batch = vec![
            p(&[4, 8, 9]),
            p(&[1, 2, 3]),
            p(&[1]),
            p(&[4, 8]),
            p(&[10, 11]),
            p(&[1, 2]),
            p(&[10, 12, 13]),
        ];
        let mut by_tails = reduce_to_superset(&batch);
        by_tails.sort();
        assert_eq!(reduce_to_superset_sorted(&batch), by_tails);
        assert_eq!(by_tails, vec![p(&[1]), p(&[4, 8]), p(&[10, 11]), p(&[10, 12, 13])]);
    }
}
