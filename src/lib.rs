//! NSDB - namespace hierarchy index over materialized paths
//!
//! # Architecture
//!
//! - **traversal_ids**: every node stores the id path from its root down to itself
//! - **Resolvers**: ancestors, descendants, roots and the full hierarchy,
//!   each with path-based strategies and a parent-walk fallback
//! - **Strategy switches**: per-root toggles choose the algorithm at query time
//! - **Stores**: in-memory `BTreeMap`s or a sled database with path-ordered keys
//! - **Engine worker**: one thread owns the engine, writes are serialized
//!
//! # Usage example
//!
//! ```no_run
//! use nsdb::{HierarchyEngine, HierarchyStore};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut engine = HierarchyEngine::in_memory();
//!
//! engine.create_node(1, None, Some("acme".into()))?;
//! engine.create_node(2, Some(1), None)?;
//! engine.create_node(3, Some(2), None)?;
//!
//! // [1, 2, 3]
//! let node = engine.get_node(3)?.expect("created above");
//! println!("path of 3: {}", node.traversal_ids);
//!
//! // Поддерево одним range scan
//! let below = engine.descendants(&[1], false)?;
//! println!("Found {} descendants", below.len());
//!
//! // Move 3 to the top level, its subtree follows
//! engine.reparent(3, None)?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod graph;
pub mod path;
pub mod query;
pub mod resolver;
pub mod storage;
pub mod worker;

pub use error::{HierarchyError, Result};
pub use graph::{HierarchyEngine, HierarchyStore, PresenceFilter};
pub use path::{NodeId, TraversalIds};
pub use resolver::{EngineConfig, Resolver, ResolverConfig, StrategySelector, Switch};
pub use storage::{MemoryStore, NamespaceStore, NodeRecord, SledStore};
pub use worker::EngineHandle;
