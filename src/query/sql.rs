//! PostgreSQL rendering of query plans
//!
//! Target schema:
//!
//! ```sql
//! CREATE TABLE namespaces (
//!     id            bigint PRIMARY KEY,
//!     parent_id     bigint REFERENCES namespaces (id),
//!     traversal_ids bigint[] NOT NULL,
//!     name          text
//! );
//! CREATE INDEX ON namespaces USING btree (traversal_ids);
//! CREATE INDEX ON namespaces USING gin (traversal_ids);
//! ```
//!
//! Only integers and array literals built from integers are interpolated,
//! so the output needs no escaping.

use super::Query;
use crate::error::{HierarchyError, Result};
use crate::path::{NodeId, PathRange, TraversalIds};
use crate::resolver::Order;

const TABLE: &str = "namespaces";

/// Largest id a `bigint` column holds
pub const SQL_MAX_ID: NodeId = i64::MAX as NodeId;

fn check_id(id: NodeId) -> Result<NodeId> {
    if id > SQL_MAX_ID {
        return Err(HierarchyError::IdOutOfRange(id));
    }
    Ok(id)
}

fn check_ids(ids: &[NodeId]) -> Result<()> {
    ids.iter().try_for_each(|&id| check_id(id).map(|_| ()))
}

fn check_paths<'q>(paths: impl IntoIterator<Item = &'q TraversalIds>) -> Result<()> {
    paths.into_iter().try_for_each(|p| check_ids(p.as_slice()))
}

fn id_list(ids: &[NodeId]) -> String {
    ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ")
}

fn array_literal(path: &TraversalIds) -> String {
    format!("'{}'::bigint[]", path)
}

fn not_in(column: &str, exclude: &[NodeId]) -> Option<String> {
    if exclude.is_empty() {
        None
    } else {
        Some(format!("{} NOT IN ({})", column, id_list(exclude)))
    }
}

/// Upper bound expressed with `bigint` components only
///
/// A component past `SQL_MAX_ID` cannot be stored, so every path sharing the
/// prefix before it sorts below the bound: carry into that prefix instead.
fn sql_upper(upper: &TraversalIds) -> Option<TraversalIds> {
    let ids = upper.as_slice();
    match ids.iter().position(|&id| id > SQL_MAX_ID) {
        None => Some(upper.clone()),
        Some(at) => TraversalIds::new(ids[..at].to_vec()).upper_bound_within(SQL_MAX_ID),
    }
}

fn range_predicate(range: &PathRange) -> String {
    let op = if range.include_lower { ">=" } else { ">" };
    let lower = format!("{TABLE}.traversal_ids {op} {}", array_literal(&range.lower));
    match range.upper.as_ref().and_then(sql_upper) {
        Some(upper) => format!("({lower} AND {TABLE}.traversal_ids < {})", array_literal(&upper)),
        None => format!("({lower})"),
    }
}

/// `(VALUES (...), (...))` list of paths
fn values_rows(paths: &[TraversalIds], with_base_id: bool) -> String {
    paths
        .iter()
        .map(|p| match (with_base_id, p.last()) {
            (true, Some(base)) => format!("({}, {})", base, array_literal(p)),
            _ => format!("({})", array_literal(p)),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn empty_select() -> String {
    format!("SELECT {TABLE}.* FROM {TABLE} WHERE FALSE")
}

/// Render a plan as a single `SELECT` over `namespaces`
///
/// Fails with `IdOutOfRange` when an id does not fit `bigint`.
pub fn to_sql(query: &Query) -> Result<String> {
    let sql = match query {
        Query::ById { ids } => {
            check_ids(ids)?;
            if ids.is_empty() {
                return Ok(empty_select());
            }
            format!("SELECT {TABLE}.* FROM {TABLE} WHERE {TABLE}.id IN ({})", id_list(ids))
        }

        Query::ContainmentScan { ids, exclude } => {
            check_ids(ids)?;
            check_ids(exclude)?;
            if ids.is_empty() {
                return Ok(empty_select());
            }
            let contains = ids
                .iter()
                .map(|id| format!("{TABLE}.traversal_ids @> '{{{}}}'", id))
                .collect::<Vec<_>>()
                .join(" OR ");
            let mut sql = format!("SELECT DISTINCT {TABLE}.* FROM {TABLE} WHERE ({contains})");
            if let Some(clause) = not_in(&format!("{TABLE}.id"), exclude) {
                sql.push_str(" AND ");
                sql.push_str(&clause);
            }
            sql
        }

        Query::RangeScan { ranges, exclude } => {
            check_paths(ranges.iter().map(|r| &r.lower))?;
            check_ids(exclude)?;
            if ranges.is_empty() {
                return Ok(empty_select());
            }
            let predicates = ranges.iter().map(range_predicate).collect::<Vec<_>>().join(" OR ");
            let mut sql = format!("SELECT {TABLE}.* FROM {TABLE} WHERE ({predicates})");
            if let Some(clause) = not_in(&format!("{TABLE}.id"), exclude) {
                sql.push_str(" AND ");
                sql.push_str(&clause);
            }
            sql
        }

        Query::UnnestJoin { paths, include_self, exclude } => {
            check_paths(paths)?;
            check_ids(exclude)?;
            if paths.is_empty() {
                return Ok(empty_select());
            }
            let unnested = if *include_self {
                "base.traversal_ids".to_string()
            } else {
                "base.traversal_ids[1:array_length(base.traversal_ids, 1) - 1]".to_string()
            };
            let mut sql = format!(
                "SELECT {TABLE}.* FROM {TABLE} INNER JOIN (SELECT DISTINCT unnest({unnested}) AS id \
                 FROM (VALUES {}) AS base(traversal_ids)) AS ancestors ON ancestors.id = {TABLE}.id",
                values_rows(paths, false)
            );
            if let Some(clause) = not_in(&format!("{TABLE}.id"), exclude) {
                sql.push_str(" WHERE ");
                sql.push_str(&clause);
            }
            sql
        }

        Query::UnnestPerRow { paths, include_self, exclude } => {
            check_paths(paths)?;
            check_ids(exclude)?;
            if paths.is_empty() {
                return Ok(empty_select());
            }
            let mut sql = format!(
                "SELECT DISTINCT {TABLE}.* FROM (VALUES {}) AS base(id, traversal_ids) \
                 CROSS JOIN LATERAL unnest(base.traversal_ids) AS ancestors(id) \
                 INNER JOIN {TABLE} ON {TABLE}.id = ancestors.id",
                values_rows(paths, true)
            );
            let mut conditions = Vec::new();
            if !*include_self {
                conditions.push("base.id <> ancestors.id".to_string());
            }
            if let Some(clause) = not_in("ancestors.id", exclude) {
                conditions.push(clause);
            }
            if !conditions.is_empty() {
                sql.push_str(" WHERE ");
                sql.push_str(&conditions.join(" AND "));
            }
            sql
        }

        Query::Overlap { ids } => {
            check_ids(ids)?;
            if ids.is_empty() {
                return Ok(empty_select());
            }
            let ids = ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(",");
            format!("SELECT {TABLE}.* FROM {TABLE} WHERE {TABLE}.traversal_ids && '{{{ids}}}'::bigint[]")
        }

        Query::ChildrenOf { parent } => {
            format!("SELECT {TABLE}.* FROM {TABLE} WHERE {TABLE}.parent_id = {}", check_id(*parent)?)
        }
    };
    Ok(sql)
}

/// Wrap a rendered plan with depth ordering (`id` breaks ties)
pub fn with_order(sql: &str, order: Order) -> String {
    let direction = match order {
        Order::None => return sql.to_string(),
        Order::Asc => "ASC",
        Order::Desc => "DESC",
    };
    format!(
        "SELECT hierarchy.*, array_length(hierarchy.traversal_ids, 1) AS depth FROM ({sql}) AS hierarchy \
         ORDER BY depth {direction}, hierarchy.id ASC"
    )
}
