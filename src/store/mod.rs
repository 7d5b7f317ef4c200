//! Persistent lookup store.
//!
//! A single sled environment holds every index as a named tree. Writes are
//! staged in a [`WriteBatch`] and become visible only through
//! [`LookupStore::commit`], which applies all staged indexes inside one
//! multi-tree transaction and then flushes to disk. A batch that is dropped
//! without being committed leaves no trace.
//!
//! # Index layout
//!
//! - `{primary}_to_ids`: primary identifier -> bincode-encoded [`LinkedIds`]
//! - `{secondary}_to_{primary}`: secondary identifier -> primary identifier
//!
//! # Concurrency
//!
//! The store is written by one loader at a time. `get` and `size` are meant
//! to be called between loads, never while another writer holds a batch.

pub mod error;

pub use error::StoreError;

use crate::models::LinkedIds;
use sled::transaction::TransactionError;
use sled::{Batch, Db, Transactional, Tree};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::path::{Path, PathBuf};

/// Name of the tree sled creates for itself; never exposed as an index.
const DEFAULT_TREE: &[u8] = b"__sled__default";

/// Options used when opening the storage environment.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub cache_capacity_bytes: u64,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache_capacity_bytes: 256 * 1024 * 1024,
        }
    }

    pub fn with_cache_capacity_mb(mut self, megabytes: u64) -> Self {
        self.cache_capacity_bytes = megabytes * 1024 * 1024;
        self
    }
}

/// Writes staged for one transaction, grouped by index.
///
/// Within a batch the last `put` for a key wins.
#[derive(Debug, Default)]
pub struct WriteBatch {
    indexes: BTreeMap<String, Batch>,
    puts: usize,
}

impl WriteBatch {
    /// Stage an upsert of `key -> value` into `index`.
    pub fn put(&mut self, index: &str, key: &[u8], value: &[u8]) {
        if !self.indexes.contains_key(index) {
            self.indexes.insert(index.to_string(), Batch::default());
        }
        if let Some(batch) = self.indexes.get_mut(index) {
            batch.insert(key, value);
        }
        self.puts += 1;
    }

    /// Number of `put` calls staged so far.
    pub fn puts(&self) -> usize {
        self.puts
    }

    /// Indexes touched by this batch, in name order.
    pub fn index_names(&self) -> impl Iterator<Item = &str> {
        self.indexes.keys().map(String::as_str)
    }
}

/// What a successful commit wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub indexes: usize,
    pub puts: usize,
    pub flushed_bytes: usize,
}

/// Handle on the storage environment shared by all indexes.
pub struct LookupStore {
    db: Db,
    path: PathBuf,
}

impl LookupStore {
    /// Open or create a store at `path` with default settings.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with(&StoreConfig::new(path.as_ref()))
    }

    pub fn open_with(config: &StoreConfig) -> Result<Self, StoreError> {
        log::debug!(
            "opening lookup store at {} (cache {} bytes)",
            config.path.display(),
            config.cache_capacity_bytes
        );

        let db = sled::Config::new()
            .path(&config.path)
            .cache_capacity(config.cache_capacity_bytes)
            .flush_every_ms(None)
            .open()
            .map_err(|source| StoreError::Open {
                path: config.path.clone(),
                source,
            })?;

        Ok(Self {
            db,
            path: config.path.clone(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start a new write transaction. Nothing is written until [`commit`](Self::commit).
    pub fn begin_batch(&self) -> WriteBatch {
        WriteBatch::default()
    }

    /// Atomically apply every write staged in `batch` and flush it to disk.
    ///
    /// Either all indexes receive the batch or none do.
    pub fn commit(&self, batch: WriteBatch) -> Result<CommitSummary, StoreError> {
        let WriteBatch { indexes, puts } = batch;

        let mut trees: Vec<Tree> = Vec::with_capacity(indexes.len());
        let mut staged: Vec<Batch> = Vec::with_capacity(indexes.len());
        for (name, index_batch) in indexes {
            trees.push(self.db.open_tree(name.as_bytes())?);
            staged.push(index_batch);
        }

        if !trees.is_empty() {
            let outcome: Result<(), TransactionError<Infallible>> =
                trees.as_slice().transaction(|views| {
                    for (view, index_batch) in views.iter().zip(staged.iter()) {
                        view.apply_batch(index_batch)?;
                    }
                    Ok(())
                });

            match outcome {
                Ok(()) => {}
                Err(TransactionError::Storage(err)) => return Err(StoreError::Storage(err)),
                Err(TransactionError::Abort(never)) => match never {},
            }
        }

        let flushed_bytes = self.db.flush()?;

        log::trace!(
            "committed {} puts across {} indexes ({} bytes flushed)",
            puts,
            trees.len(),
            flushed_bytes
        );

        Ok(CommitSummary {
            indexes: trees.len(),
            puts,
            flushed_bytes,
        })
    }

    /// Number of entries in `index`. Unknown indexes are empty.
    pub fn size(&self, index: &str) -> Result<usize, StoreError> {
        match self.existing_tree(index)? {
            Some(tree) => Ok(tree.len()),
            None => Ok(0),
        }
    }

    /// Raw value stored under `key` in `index`.
    pub fn get(&self, index: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let Some(tree) = self.existing_tree(index)? else {
            return Ok(None);
        };
        Ok(tree.get(key)?.map(|value| value.to_vec()))
    }

    /// Value of a secondary index, decoded as the primary identifier.
    pub fn get_str(&self, index: &str, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .get(index, key.as_bytes())?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// Value of a primary (`*_to_ids`) index, decoded as [`LinkedIds`].
    pub fn get_linked(&self, index: &str, key: &str) -> Result<Option<LinkedIds>, StoreError> {
        match self.get(index, key.as_bytes())? {
            Some(bytes) => LinkedIds::decode(&bytes)
                .map(Some)
                .map_err(|err| StoreError::decode(index, err)),
            None => Ok(None),
        }
    }

    /// Names of all indexes present in the environment.
    pub fn index_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .db
            .tree_names()
            .into_iter()
            .filter(|name| &name[..] != DEFAULT_TREE)
            .map(|name| String::from_utf8_lossy(&name).into_owned())
            .collect();
        names.sort();
        names
    }

    fn existing_tree(&self, index: &str) -> Result<Option<Tree>, StoreError> {
        let exists = self
            .db
            .tree_names()
            .iter()
            .any(|name| &name[..] == index.as_bytes());

        if exists {
            Ok(Some(self.db.open_tree(index.as_bytes())?))
        } else {
            Ok(None)
        }
    }
}
