//! Transaction-local staged writes
//!
//! The write set overlays a base `StoreVersion`: reads inside the transaction
//! see staged puts and deletes first, then fall back to the base.

use super::{RecordKey, StoreVersion};
use crate::types::{Record, RecordId};
use ahash::AHashMap;
use std::sync::Arc;

/// Pending change for one record
#[derive(Debug, Clone)]
pub enum StagedWrite {
    /// Insert or replace
    Put(Arc<Record>),
    /// Delete
    Delete,
}

/// Staged writes keyed by record address
#[derive(Debug, Default)]
pub struct WriteSet {
    entries: AHashMap<RecordKey, StagedWrite>,
}

impl WriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Staged entry for a record, if this transaction touched it
    pub fn staged(&self, type_name: &str, id: RecordId) -> Option<&StagedWrite> {
        self.entries.get(&RecordKey::new(type_name, id))
    }

    /// Record as seen by this transaction: staged state first, then base
    pub fn visible(&self, base: &StoreVersion, type_name: &str, id: RecordId) -> Option<Arc<Record>> {
        match self.staged(type_name, id) {
            Some(StagedWrite::Put(record)) => Some(record.clone()),
            Some(StagedWrite::Delete) => None,
            None => base.get(type_name, id).cloned(),
        }
    }

    pub fn put(&mut self, record: Arc<Record>) {
        let key = RecordKey::new(record.type_name.clone(), record.id);
        self.entries.insert(key, StagedWrite::Put(record));
    }

    pub fn delete(&mut self, type_name: &str, id: RecordId) {
        self.entries
            .insert(RecordKey::new(type_name, id), StagedWrite::Delete);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RecordKey, &StagedWrite)> {
        self.entries.iter()
    }

    /// Addresses touched by this transaction
    pub fn keys(&self) -> impl Iterator<Item = &RecordKey> {
        self.entries.keys()
    }

    /// Staged records (puts only)
    pub fn puts(&self) -> impl Iterator<Item = &Arc<Record>> {
        self.entries.values().filter_map(|w| match w {
            StagedWrite::Put(record) => Some(record),
            StagedWrite::Delete => None,
        })
    }
}
