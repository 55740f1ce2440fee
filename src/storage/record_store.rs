//! Record Store - committed version holder
//!
//! Holds the current `Arc<StoreVersion>`. Readers clone the Arc and never
//! block on writers; commit builds the next version off to the side and swaps
//! the pointer under a write lock held only for the swap.
//!
//! Commits (and DDL) are serialized by `commit_lock`.

use super::{StagedWrite, StoreVersion, Table, Version, WriteSet};
use crate::index::{IndexBuffer, IndexManager};
use crate::types::RecordSchema;
use crate::{Result, StorageError};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::sync::Arc;

pub struct RecordStore {
    /// Last committed version
    current: RwLock<Arc<StoreVersion>>,

    /// Serializes version producers (commit, declare_type, declare_index)
    commit_lock: Mutex<()>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(StoreVersion::default())),
            commit_lock: Mutex::new(()),
        }
    }

    /// Last committed version (snapshot for readers)
    pub fn snapshot(&self) -> Arc<StoreVersion> {
        self.current.read().clone()
    }

    pub fn version(&self) -> Version {
        self.current.read().version
    }

    /// Sum of serialized field sizes over committed records
    pub fn size_estimate(&self) -> u64 {
        self.snapshot().size_bytes()
    }

    pub(crate) fn lock_commits(&self) -> MutexGuard<'_, ()> {
        self.commit_lock.lock()
    }

    /// Publish a new version. Caller holds the commit lock.
    pub(crate) fn install(&self, next: StoreVersion) -> Arc<StoreVersion> {
        let next = Arc::new(next);
        *self.current.write() = next.clone();
        next
    }

    /// Apply staged writes and index deltas on top of `base`
    pub(crate) fn build_next(base: &StoreVersion, writes: &WriteSet, indexes: &IndexBuffer) -> StoreVersion {
        let mut next = base.clone();
        next.version = base.version + 1;

        for (key, write) in writes.iter() {
            let Some(table) = next.table_mut(&key.type_name) else {
                continue;
            };
            match write {
                StagedWrite::Put(record) => table.put(record.clone()),
                StagedWrite::Delete => {
                    table.remove(key.id);
                }
            }
        }

        IndexManager::apply(&mut next, indexes);
        next
    }

    /// Add an empty table for a new record type
    pub(crate) fn create_table(&self, schema: Arc<RecordSchema>) -> Result<Version> {
        let _guard = self.lock_commits();
        let base = self.snapshot();
        if base.tables.contains_key(&schema.name) {
            return Err(StorageError::InvalidData(format!(
                "record type '{}' already declared",
                schema.name
            )));
        }

        let mut next = (*base).clone();
        next.version = base.version + 1;
        next.tables
            .insert(schema.name.clone(), Arc::new(Table::new(schema)));
        Ok(self.install(next).version)
    }

    /// Build and publish an index over committed rows
    pub(crate) fn declare_index(&self, type_name: &str, field: &str) -> Result<bool> {
        let _guard = self.lock_commits();
        let base = self.snapshot();
        let mut next = (*base).clone();
        next.version = base.version + 1;
        if !IndexManager::declare(&mut next, type_name, field)? {
            return Ok(false);
        }
        self.install(next);
        Ok(true)
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}
