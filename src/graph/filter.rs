//! Parent presence filter

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HierarchyError;
use crate::storage::NodeRecord;

/// Filter on whether a node has a parent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceFilter {
    #[default]
    Any,
    /// Nested nodes only
    Present,
    /// Roots only
    Absent,
}

impl PresenceFilter {
    pub fn matches(self, node: &NodeRecord) -> bool {
        match self {
            PresenceFilter::Any => true,
            PresenceFilter::Present => node.parent_id.is_some(),
            PresenceFilter::Absent => node.parent_id.is_none(),
        }
    }

    pub fn apply(self, nodes: Vec<NodeRecord>) -> Vec<NodeRecord> {
        nodes.into_iter().filter(|n| self.matches(n)).collect()
    }
}

/// Filter `nodes` by a named presence filter
pub fn filter_by_parent(nodes: Vec<NodeRecord>, filter: &str) -> Result<Vec<NodeRecord>, HierarchyError> {
    Ok(filter.parse::<PresenceFilter>()?.apply(nodes))
}

impl FromStr for PresenceFilter {
    type Err = HierarchyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "any" => Ok(PresenceFilter::Any),
            "present" | "nested" => Ok(PresenceFilter::Present),
            "absent" | "none" | "root" => Ok(PresenceFilter::Absent),
            other => Err(HierarchyError::UnsupportedPresenceFilter(other.to_string())),
        }
    }
}

impl fmt::Display for PresenceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PresenceFilter::Any => "any",
            PresenceFilter::Present => "present",
            PresenceFilter::Absent => "absent",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::TraversalIds;

    #[test]
    fn test_parse_aliases() {
        assert_eq!("any".parse::<PresenceFilter>().unwrap(), PresenceFilter::Any);
        assert_eq!("nested".parse::<PresenceFilter>().unwrap(), PresenceFilter::Present);
        assert_eq!("root".parse::<PresenceFilter>().unwrap(), PresenceFilter::Absent);
    }

    #[test]
    fn test_unsupported_filter() {
        let err = "sometimes".parse::<PresenceFilter>().unwrap_err();
        assert!(matches!(err, HierarchyError::UnsupportedPresenceFilter(ref s) if s == "sometimes"));
    }

    #[test]
    fn test_apply() {
        let root = NodeRecord {
            id: 1,
            parent_id: None,
            traversal_ids: TraversalIds::new(vec![1]),
            name: None,
        };
        let child = NodeRecord {
            id: 2,
            parent_id: Some(1),
            traversal_ids: TraversalIds::new(vec![1, 2]),
            name: None,
        };
        let all = vec![root, child];

        assert_eq!(PresenceFilter::Absent.apply(all.clone()).len(), 1);
        assert_eq!(PresenceFilter::Present.apply(all.clone())[0].id, 2);
        assert_eq!(PresenceFilter::Any.apply(all.clone()).len(), 2);

        assert_eq!(filter_by_parent(all.clone(), "none").unwrap()[0].id, 1);
        assert!(filter_by_parent(all, "maybe").is_err());
    }
}
