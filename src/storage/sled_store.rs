//! Persistent store on top of sled
//!
//! Three trees:
//! - `by_id`:     id (BE)              -> bincode(NodeRecord)
//! - `by_path`:   path key (BE comps)  -> id (BE)
//! - `by_parent`: parent (BE) | id (BE) -> ()
//!
//! Path keys sort exactly like paths, so descendant ranges are plain sled
//! range scans. Batches run in one multi-tree transaction.

use std::ops::Bound;
use std::path::{Path, PathBuf};

use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionalTree};
use sled::{Transactional, Tree};

use super::{Delta, NamespaceStore, NodeRecord};
use crate::error::{HierarchyError, Result};
use crate::path::{NodeId, PathRange};

/// Parent key used for roots
const ROOT_PARENT: NodeId = 0;

/// Normalize database path ensuring .nsdb extension
///
/// Examples:
/// - `/path/to/db` -> `/path/to/db.nsdb`
/// - `/path/to/db.db` -> `/path/to/db.nsdb`
/// - `/path/to/db.nsdb` -> `/path/to/db.nsdb` (unchanged)
fn normalize_db_path<P: AsRef<Path>>(path: P) -> PathBuf {
    let path = path.as_ref();

    if path.extension().and_then(|s| s.to_str()) == Some("nsdb") {
        return path.to_path_buf();
    }

    if path.extension().is_some() {
        return path.with_extension("nsdb");
    }

    let mut new_path = path.to_path_buf();
    let new_filename = format!(
        "{}.nsdb",
        path.file_name().and_then(|s| s.to_str()).unwrap_or("db")
    );
    new_path.set_file_name(new_filename);
    new_path
}

fn id_key(id: NodeId) -> Vec<u8> {
    id.to_be_bytes().to_vec()
}

fn parent_key(parent: Option<NodeId>, id: NodeId) -> Vec<u8> {
    let mut key = Vec::with_capacity(16);
    key.extend_from_slice(&parent.unwrap_or(ROOT_PARENT).to_be_bytes());
    key.extend_from_slice(&id.to_be_bytes());
    key
}

fn decode_id(bytes: &[u8]) -> Result<NodeId> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| HierarchyError::InvalidFormat(format!("invalid id length {}", bytes.len())))?;
    Ok(NodeId::from_be_bytes(raw))
}

type TxResult<T> = std::result::Result<T, ConflictableTransactionError<HierarchyError>>;

fn abort<T>(e: HierarchyError) -> TxResult<T> {
    Err(ConflictableTransactionError::Abort(e))
}

/// Drop the path entry only if it still points at `node`
fn tx_unindex(paths: &TransactionalTree, node: &NodeRecord) -> TxResult<()> {
    let key = node.traversal_ids.to_key();
    if paths.get(key.clone())?.as_deref() == Some(&id_key(node.id)[..]) {
        paths.remove(key)?;
    }
    Ok(())
}

/// Persistent node store
pub struct SledStore {
    path: PathBuf,
    db: sled::Db,
    by_id: Tree,
    by_path: Tree,
    by_parent: Tree,
}

impl SledStore {
    /// Open or create a store at `path` (normalized to `.nsdb`)
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = normalize_db_path(path);
        let db = sled::open(&path)
            .map_err(|e| HierarchyError::Store(format!("Failed to open sled: {}", e)))?;

        let by_id = db.open_tree("by_id")?;
        let by_path = db.open_tree("by_path")?;
        let by_parent = db.open_tree("by_parent")?;

        tracing::info!("Opened store at {:?}: {} nodes", path, by_id.len());

        Ok(Self {
            path,
            db,
            by_id,
            by_path,
            by_parent,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self, id: NodeId) -> Result<Option<NodeRecord>> {
        match self.by_id.get(id_key(id))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Resolve path-index entries to records
    fn collect_paths(&self, iter: sled::Iter, skip_key: Option<&[u8]>) -> Result<Vec<NodeRecord>> {
        let mut result = Vec::new();
        for entry in iter {
            let (key, value) = entry?;
            if skip_key.map_or(false, |skip| key.as_ref() == skip) {
                continue;
            }
            let id = decode_id(&value)?;
            match self.load(id)? {
                Some(node) => result.push(node),
                None => {
                    return Err(HierarchyError::InvalidFormat(format!(
                        "path index points to missing node {}",
                        id
                    )))
                }
            }
        }
        Ok(result)
    }
}

fn tx_load(ids: &TransactionalTree, id: NodeId) -> TxResult<NodeRecord> {
    match ids.get(id_key(id))? {
        Some(bytes) => match bincode::deserialize::<NodeRecord>(&bytes) {
            Ok(node) => Ok(node),
            Err(e) => abort(e.into()),
        },
        None => abort(HierarchyError::NodeNotFound(id)),
    }
}

fn tx_store(ids: &TransactionalTree, node: &NodeRecord) -> TxResult<()> {
    let value = match bincode::serialize(node) {
        Ok(value) => value,
        Err(e) => return abort(e.into()),
    };
    ids.insert(id_key(node.id), value)?;
    Ok(())
}

impl NamespaceStore for SledStore {
    fn get(&self, id: NodeId) -> Result<Option<NodeRecord>> {
        self.load(id)
    }

    fn scan_range(&self, range: &PathRange) -> Result<Vec<NodeRecord>> {
        let lower = range.lower.to_key();
        let iter = match &range.upper {
            Some(upper) => {
                if range.lower >= *upper {
                    return Ok(Vec::new());
                }
                self.by_path.range(lower.clone()..upper.to_key())
            }
            None => self.by_path.range(lower.clone()..),
        };
        let skip = if range.include_lower { None } else { Some(lower.as_slice()) };
        self.collect_paths(iter, skip)
    }

    fn scan_all(&self) -> Result<Vec<NodeRecord>> {
        self.collect_paths(self.by_path.iter(), None)
    }

    fn scan_ids(&self, after: Option<NodeId>, limit: usize) -> Result<Vec<NodeRecord>> {
        let iter = match after {
            Some(id) => self
                .by_id
                .range::<Vec<u8>, _>((Bound::Excluded(id_key(id)), Bound::Unbounded)),
            None => self.by_id.iter(),
        };
        let mut result = Vec::new();
        for entry in iter.take(limit) {
            let (_, value) = entry?;
            result.push(bincode::deserialize(&value)?);
        }
        Ok(result)
    }

    fn children(&self, parent: NodeId) -> Result<Vec<NodeRecord>> {
        let mut result = Vec::new();
        for entry in self.by_parent.scan_prefix(parent.to_be_bytes()) {
            let (key, _) = entry?;
            let id = decode_id(&key[8..])?;
            if let Some(node) = self.load(id)? {
                result.push(node);
            }
        }
        Ok(result)
    }

    fn apply(&mut self, batch: &[Delta]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let result = (&self.by_id, &self.by_path, &self.by_parent).transaction(|(ids, paths, parents)| {
            for delta in batch {
                match delta {
                    Delta::Insert(node) => {
                        if ids.get(id_key(node.id))?.is_some() {
                            return abort(HierarchyError::DuplicateNode(node.id));
                        }
                        let path_key = node.traversal_ids.to_key();
                        if paths.get(path_key.clone())?.is_some() {
                            return abort(HierarchyError::InvalidFormat(format!(
                                "path {} already indexed",
                                node.traversal_ids
                            )));
                        }
                        tx_store(ids, node)?;
                        paths.insert(path_key, id_key(node.id))?;
                        parents.insert(parent_key(node.parent_id, node.id), Vec::new())?;
                    }
                    Delta::Delete { id } => {
                        let node = tx_load(ids, *id)?;
                        ids.remove(id_key(*id))?;
                        tx_unindex(paths, &node)?;
                        parents.remove(parent_key(node.parent_id, node.id))?;
                    }
                    Delta::Rewrite { id, parent_id, traversal_ids } => {
                        let mut node = tx_load(ids, *id)?;
                        tx_unindex(paths, &node)?;
                        parents.remove(parent_key(node.parent_id, node.id))?;

                        node.parent_id = *parent_id;
                        node.traversal_ids = traversal_ids.clone();

                        tx_store(ids, &node)?;
                        paths.insert(node.traversal_ids.to_key(), id_key(node.id))?;
                        parents.insert(parent_key(node.parent_id, node.id), Vec::new())?;
                    }
                }
            }
            Ok(())
        });

        match result {
            Ok(()) => Ok(()),
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(e.into()),
        }
    }

    fn len(&self) -> Result<usize> {
        Ok(self.by_id.len())
    }

    fn flush(&mut self) -> Result<()> {
        let bytes = self.db.flush()?;
        tracing::debug!("Flushed {} bytes to {:?}", bytes, self.path);
        Ok(())
    }
}
