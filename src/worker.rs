//! Engine Worker - single-threaded command processor for HierarchyEngine
//!
//! All requests go through one worker thread that owns the engine, so writes
//! are serialized and a reader never observes a reparent half applied.
//!
//! Architecture:
//! ```text
//! Client thread(s)      Channel                   Worker Thread
//!     │                    │                           │
//!     ├─ reparent() ──────►│ Command::Reparent ───────►│ engine.reparent()
//!     ├─ descendants() ───►│ Command::Descendants ────►│ engine.descendants()
//!     ├─ flush() ─────────►│ Command::Flush ──────────►│ engine.flush()
//!     │◄───────────────────│ Result<T> ◄───────────────│
//! ```

use std::path::Path;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use crate::error::{HierarchyError, Result};
use crate::graph::{BackfillReport, HierarchyEngine, HierarchyStore, PresenceFilter, Violation};
use crate::path::NodeId;
use crate::resolver::{EngineConfig, Order};
use crate::storage::{MemoryStore, NamespaceStore, NodeRecord, SledStore};

/// Engine over a store chosen at startup
pub type DynEngine = HierarchyEngine<Box<dyn NamespaceStore + Send>>;

type Reply<T> = Sender<Result<T>>;

/// Commands that can be sent to the engine worker
pub enum Command {
    // Write operations
    CreateNode {
        id: NodeId,
        parent_id: Option<NodeId>,
        name: Option<String>,
        response_tx: Reply<NodeRecord>,
    },
    Reparent {
        id: NodeId,
        new_parent: Option<NodeId>,
        response_tx: Reply<usize>,
    },
    DeleteNode {
        id: NodeId,
        cascade: bool,
        response_tx: Reply<usize>,
    },

    // Read operations
    GetNode {
        id: NodeId,
        response_tx: Reply<Option<NodeRecord>>,
    },
    ListNodes {
        filter: PresenceFilter,
        response_tx: Reply<Vec<NodeRecord>>,
    },
    Ancestors {
        ids: Vec<NodeId>,
        include_self: bool,
        upto: Vec<NodeId>,
        order: Order,
        response_tx: Reply<Vec<NodeRecord>>,
    },
    Descendants {
        ids: Vec<NodeId>,
        include_self: bool,
        response_tx: Reply<Vec<NodeRecord>>,
    },
    Roots {
        ids: Vec<NodeId>,
        response_tx: Reply<Vec<NodeRecord>>,
    },
    RootAncestor {
        id: NodeId,
        response_tx: Reply<NodeRecord>,
    },
    Hierarchy {
        id: NodeId,
        response_tx: Reply<Vec<NodeRecord>>,
    },
    Children {
        id: NodeId,
        response_tx: Reply<Vec<NodeRecord>>,
    },
    InHierarchy {
        ids: Vec<NodeId>,
        response_tx: Reply<Vec<NodeRecord>>,
    },
    IsAncestor {
        ancestor: NodeId,
        node: NodeId,
        response_tx: Reply<bool>,
    },
    ExplainAncestors {
        ids: Vec<NodeId>,
        include_self: bool,
        upto: Vec<NodeId>,
        order: Order,
        response_tx: Reply<Option<String>>,
    },
    ExplainDescendants {
        ids: Vec<NodeId>,
        include_self: bool,
        response_tx: Reply<Option<String>>,
    },

    // Maintenance
    Backfill {
        batch_size: Option<usize>,
        response_tx: Reply<BackfillReport>,
    },
    Verify {
        response_tx: Reply<Vec<Violation>>,
    },
    NodeCount {
        response_tx: Reply<usize>,
    },

    // Control operations
    Flush {
        response_tx: Reply<()>,
    },
    Shutdown,
}

/// Handle to communicate with the engine worker
pub struct EngineHandle {
    command_tx: Sender<Command>,
    worker_handle: Option<JoinHandle<()>>,
}

impl EngineHandle {
    /// Spawn a worker over a fresh in-memory store
    pub fn in_memory(config: EngineConfig) -> Self {
        let store: Box<dyn NamespaceStore + Send> = Box::new(MemoryStore::new());
        Self::spawn(HierarchyEngine::with_config(store, config))
    }

    /// Spawn a worker over a sled database at `path`
    pub fn open<P: AsRef<Path>>(path: P, config: EngineConfig) -> Result<Self> {
        let sled = SledStore::open(path)?;
        tracing::info!("Opened {:?} with {} nodes", sled.path(), sled.len()?);
        let store: Box<dyn NamespaceStore + Send> = Box::new(sled);
        Ok(Self::spawn(HierarchyEngine::with_config(store, config)))
    }

    pub fn spawn(engine: DynEngine) -> Self {
        let (command_tx, command_rx) = unbounded::<Command>();

        let worker_handle = thread::spawn(move || {
            worker_loop(engine, command_rx);
        });

        Self {
            command_tx,
            worker_handle: Some(worker_handle),
        }
    }

    /// Send a command and wait for its reply
    fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (response_tx, response_rx) = bounded(1);
        self.command_tx
            .send(build(response_tx))
            .map_err(|_| HierarchyError::WorkerStopped)?;
        response_rx.recv().map_err(|_| HierarchyError::WorkerStopped)?
    }

    // =========================================================================
    // Write operations
    // =========================================================================

    pub fn create_node(&self, id: NodeId, parent_id: Option<NodeId>, name: Option<String>) -> Result<NodeRecord> {
        self.request(|response_tx| Command::CreateNode { id, parent_id, name, response_tx })
    }

    pub fn reparent(&self, id: NodeId, new_parent: Option<NodeId>) -> Result<usize> {
        self.request(|response_tx| Command::Reparent { id, new_parent, response_tx })
    }

    pub fn delete_node(&self, id: NodeId, cascade: bool) -> Result<usize> {
        self.request(|response_tx| Command::DeleteNode { id, cascade, response_tx })
    }

    // =========================================================================
    // Read operations
    // =========================================================================

    pub fn get_node(&self, id: NodeId) -> Result<Option<NodeRecord>> {
        self.request(|response_tx| Command::GetNode { id, response_tx })
    }

    pub fn list_nodes(&self, filter: PresenceFilter) -> Result<Vec<NodeRecord>> {
        self.request(|response_tx| Command::ListNodes { filter, response_tx })
    }

    pub fn ancestors(&self, ids: Vec<NodeId>, include_self: bool, upto: Vec<NodeId>, order: Order) -> Result<Vec<NodeRecord>> {
        self.request(|response_tx| Command::Ancestors {
            ids,
            include_self,
            upto,
            order,
            response_tx,
        })
    }

    pub fn descendants(&self, ids: Vec<NodeId>, include_self: bool) -> Result<Vec<NodeRecord>> {
        self.request(|response_tx| Command::Descendants { ids, include_self, response_tx })
    }

    pub fn roots(&self, ids: Vec<NodeId>) -> Result<Vec<NodeRecord>> {
        self.request(|response_tx| Command::Roots { ids, response_tx })
    }

    pub fn root_ancestor(&self, id: NodeId) -> Result<NodeRecord> {
        self.request(|response_tx| Command::RootAncestor { id, response_tx })
    }

    pub fn hierarchy(&self, id: NodeId) -> Result<Vec<NodeRecord>> {
        self.request(|response_tx| Command::Hierarchy { id, response_tx })
    }

    pub fn children(&self, id: NodeId) -> Result<Vec<NodeRecord>> {
        self.request(|response_tx| Command::Children { id, response_tx })
    }

    pub fn in_hierarchy(&self, ids: Vec<NodeId>) -> Result<Vec<NodeRecord>> {
        self.request(|response_tx| Command::InHierarchy { ids, response_tx })
    }

    pub fn is_ancestor_of(&self, ancestor: NodeId, node: NodeId) -> Result<bool> {
        self.request(|response_tx| Command::IsAncestor { ancestor, node, response_tx })
    }

    pub fn explain_ancestors(&self, ids: Vec<NodeId>, include_self: bool, upto: Vec<NodeId>, order: Order) -> Result<Option<String>> {
        self.request(|response_tx| Command::ExplainAncestors {
            ids,
            include_self,
            upto,
            order,
            response_tx,
        })
    }

    pub fn explain_descendants(&self, ids: Vec<NodeId>, include_self: bool) -> Result<Option<String>> {
        self.request(|response_tx| Command::ExplainDescendants { ids, include_self, response_tx })
    }

    // =========================================================================
    // Maintenance and control
    // =========================================================================

    pub fn backfill(&self, batch_size: Option<usize>) -> Result<BackfillReport> {
        self.request(|response_tx| Command::Backfill { batch_size, response_tx })
    }

    pub fn verify(&self) -> Result<Vec<Violation>> {
        self.request(|response_tx| Command::Verify { response_tx })
    }

    pub fn node_count(&self) -> Result<usize> {
        self.request(|response_tx| Command::NodeCount { response_tx })
    }

    pub fn flush(&self) -> Result<()> {
        self.request(|response_tx| Command::Flush { response_tx })
    }

    pub fn shutdown(&self) {
        let _ = self.command_tx.send(Command::Shutdown);
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        let _ = self.command_tx.send(Command::Shutdown);
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}

/// Worker loop - processes commands sequentially
fn worker_loop(mut engine: DynEngine, command_rx: Receiver<Command>) {
    tracing::debug!("Engine worker started");

    while let Ok(command) = command_rx.recv() {
        match command {
            Command::CreateNode { id, parent_id, name, response_tx } => {
                let _ = response_tx.send(engine.create_node(id, parent_id, name));
            }
            Command::Reparent { id, new_parent, response_tx } => {
                let _ = response_tx.send(engine.reparent(id, new_parent));
            }
            Command::DeleteNode { id, cascade, response_tx } => {
                let _ = response_tx.send(engine.delete_node(id, cascade));
            }

            Command::GetNode { id, response_tx } => {
                let _ = response_tx.send(engine.get_node(id));
            }
            Command::ListNodes { filter, response_tx } => {
                let _ = response_tx.send(engine.list_nodes(filter));
            }
            Command::Ancestors { ids, include_self, upto, order, response_tx } => {
                let _ = response_tx.send(engine.ancestors(&ids, include_self, &upto, order));
            }
            Command::Descendants { ids, include_self, response_tx } => {
                let _ = response_tx.send(engine.descendants(&ids, include_self));
            }
            Command::Roots { ids, response_tx } => {
                let _ = response_tx.send(engine.roots(&ids));
            }
            Command::RootAncestor { id, response_tx } => {
                let _ = response_tx.send(engine.root_ancestor(id));
            }
            Command::Hierarchy { id, response_tx } => {
                let _ = response_tx.send(engine.hierarchy(id));
            }
            Command::Children { id, response_tx } => {
                let _ = response_tx.send(engine.children(id));
            }
            Command::InHierarchy { ids, response_tx } => {
                let _ = response_tx.send(engine.in_hierarchy(&ids));
            }
            Command::IsAncestor { ancestor, node, response_tx } => {
                let _ = response_tx.send(engine.is_ancestor_of(ancestor, node));
            }
            Command::ExplainAncestors { ids, include_self, upto, order, response_tx } => {
                let _ = response_tx.send(engine.explain_ancestors(&ids, include_self, &upto, order));
            }
            Command::ExplainDescendants { ids, include_self, response_tx } => {
                let _ = response_tx.send(engine.explain_descendants(&ids, include_self));
            }

            Command::Backfill { batch_size, response_tx } => {
                let _ = response_tx.send(engine.backfill_traversal_ids(batch_size));
            }
            Command::Verify { response_tx } => {
                let _ = response_tx.send(engine.verify());
            }
            Command::NodeCount { response_tx } => {
                let _ = response_tx.send(engine.node_count());
            }

            Command::Flush { response_tx } => {
                let _ = response_tx.send(engine.flush());
            }
            Command::Shutdown => {
                if let Err(e) = engine.flush() {
                    tracing::error!("Flush on shutdown failed: {}", e);
                }
                break;
            }
        }
    }

    tracing::debug!("Engine worker stopped");
}
