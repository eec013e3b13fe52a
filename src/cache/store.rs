//! Store Module
//!
//! Persistent key-value storage on top of sled. Each logical cache lives in
//! its own namespace (a sled tree); multi-record updates go through
//! [`Namespace::transact`], which commits when the closure returns `Ok` and
//! discards every write when it returns `Err` or unwinds.

use std::path::Path;

use bytes::Bytes;
use sled::transaction::{ConflictableTransactionResult, TransactionError, TransactionalTree};
use tracing::info;

use crate::error::{CdnError, Result};

/// Tree sled creates implicitly; never exposed as a namespace.
const SLED_DEFAULT_TREE: &[u8] = b"__sled__default";

// == Store ==
/// Handle to the embedded database. Cheap to clone, safe to share.
#[derive(Clone, Debug)]
pub struct Store {
    db: sled::Db,
}

impl Store {
    /// Opens (or creates) the database at `path`.
    ///
    /// Creates the parent directory if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CdnError::Store(format!("Failed to create directory: {}", e)))?;
        }

        let db = sled::open(path)?;
        info!(path = %path.display(), recovered = db.was_recovered(), "store opened");
        Ok(Self { db })
    }

    /// Opens a throwaway database that is deleted when the last handle drops.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Opens the named namespace, creating it on first use.
    pub fn namespace(&self, name: &str) -> Result<Namespace> {
        let tree = self.db.open_tree(name)?;
        Ok(Namespace { tree })
    }

    /// Names of every namespace present in the database.
    pub fn namespace_names(&self) -> Vec<String> {
        self.db
            .tree_names()
            .into_iter()
            .filter(|name| name.as_ref() != SLED_DEFAULT_TREE)
            .map(|name| String::from_utf8_lossy(&name).into_owned())
            .collect()
    }

    /// Writes all dirty buffers to disk.
    pub fn flush(&self) -> Result<usize> {
        Ok(self.db.flush()?)
    }
}

// == Namespace ==
/// A named, isolated key space inside the store.
#[derive(Clone, Debug)]
pub struct Namespace {
    tree: sled::Tree,
}

impl Namespace {
    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<Option<Bytes>> {
        Ok(self
            .tree
            .get(key)?
            .map(|value| Bytes::copy_from_slice(&value)))
    }

    pub fn insert(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        self.tree.insert(key.as_ref(), value.as_ref())?;
        Ok(())
    }

    /// Removes `key`; returns whether it was present.
    pub fn remove(&self, key: impl AsRef<[u8]>) -> Result<bool> {
        Ok(self.tree.remove(key)?.is_some())
    }

    /// Every key in the namespace, in byte order.
    pub fn keys(&self) -> Result<Vec<Vec<u8>>> {
        self.tree
            .iter()
            .keys()
            .map(|key| key.map(|k| k.to_vec()).map_err(CdnError::from))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    // == Transact ==
    /// Runs `f` as one serializable transaction over this namespace.
    ///
    /// `f` may be re-run by sled on conflict, so it must not have side effects
    /// outside the transactional tree. Returning
    /// `ConflictableTransactionError::Abort` rolls back and surfaces the inner
    /// error.
    pub fn transact<T, F>(&self, f: F) -> Result<T>
    where
        F: Fn(&TransactionalTree) -> ConflictableTransactionResult<T, CdnError>,
    {
        self.tree.transaction(f).map_err(|err| match err {
            TransactionError::Abort(inner) => inner,
            TransactionError::Storage(storage) => CdnError::from(storage),
        })
    }
}
