//! Record storage
//!
//! Committed data lives in an immutable `StoreVersion`: one `Arc<Table>` per
//! record type, each owning its rows, byte total and secondary indexes.
//! Commit produces a new version (copy-on-write at table granularity) and
//! swaps it in atomically; readers keep whatever version they cloned.

mod record_store;
mod write_set;

pub use record_store::RecordStore;
pub use write_set::{StagedWrite, WriteSet};

use crate::index::FieldIndex;
use crate::types::{Record, RecordId, RecordSchema};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Monotonic committed-version number
pub type Version = u64;

/// Fully qualified record address: (type, id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub type_name: String,
    pub id: RecordId,
}

impl RecordKey {
    pub fn new(type_name: impl Into<String>, id: RecordId) -> Self {
        Self {
            type_name: type_name.into(),
            id,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.type_name, self.id)
    }
}

/// All committed records of one type
#[derive(Debug, Clone)]
pub struct Table {
    pub(crate) schema: Arc<RecordSchema>,
    /// Rows ordered by id (ids are assigned monotonically)
    pub(crate) rows: BTreeMap<RecordId, Arc<Record>>,
    /// Sum of `Record::encoded_size` over rows
    pub(crate) bytes: u64,
    /// field name -> index
    pub(crate) indexes: AHashMap<String, Arc<FieldIndex>>,
}

impl Table {
    pub(crate) fn new(schema: Arc<RecordSchema>) -> Self {
        Self {
            schema,
            rows: BTreeMap::new(),
            bytes: 0,
            indexes: AHashMap::new(),
        }
    }

    pub fn schema(&self) -> &Arc<RecordSchema> {
        &self.schema
    }

    pub fn get(&self, id: RecordId) -> Option<&Arc<Record>> {
        self.rows.get(&id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes
    }

    pub fn index(&self, field: &str) -> Option<&Arc<FieldIndex>> {
        self.indexes.get(field)
    }

    /// Names of indexed fields
    pub fn indexed_fields(&self) -> impl Iterator<Item = &str> {
        self.indexes.keys().map(String::as_str)
    }

    pub(crate) fn put(&mut self, record: Arc<Record>) {
        self.bytes += record.encoded_size();
        if let Some(old) = self.rows.insert(record.id, record) {
            self.bytes -= old.encoded_size();
        }
    }

    pub(crate) fn remove(&mut self, id: RecordId) -> Option<Arc<Record>> {
        let old = self.rows.remove(&id)?;
        self.bytes -= old.encoded_size();
        Some(old)
    }
}

/// One immutable committed state of every table
#[derive(Debug, Clone, Default)]
pub struct StoreVersion {
    pub(crate) version: Version,
    pub(crate) tables: AHashMap<String, Arc<Table>>,
}

impl StoreVersion {
    pub fn version(&self) -> Version {
        self.version
    }

    pub fn table(&self, type_name: &str) -> Option<&Arc<Table>> {
        self.tables.get(type_name)
    }

    pub fn get(&self, type_name: &str, id: RecordId) -> Option<&Arc<Record>> {
        self.tables.get(type_name)?.get(id)
    }

    pub fn contains(&self, type_name: &str, id: RecordId) -> bool {
        self.get(type_name, id).is_some()
    }

    /// Estimated storage footprint over all tables
    pub fn size_bytes(&self) -> u64 {
        self.tables.values().map(|t| t.bytes).sum()
    }

    /// Total record count over all tables
    pub fn record_count(&self) -> usize {
        self.tables.values().map(|t| t.len()).sum()
    }

    pub(crate) fn table_mut(&mut self, type_name: &str) -> Option<&mut Table> {
        self.tables.get_mut(type_name).map(Arc::make_mut)
    }
}

/// Read access to records by address
///
/// Implemented by committed versions and by open transactions (which overlay
/// their staged writes). Relationship resolution and predicate evaluation go
/// through this seam.
pub trait RecordSource {
    fn fetch(&self, type_name: &str, id: RecordId) -> Option<Arc<Record>>;

    fn schema(&self, type_name: &str) -> Option<Arc<RecordSchema>>;
}

impl RecordSource for StoreVersion {
    fn fetch(&self, type_name: &str, id: RecordId) -> Option<Arc<Record>> {
        self.get(type_name, id).cloned()
    }

    fn schema(&self, type_name: &str) -> Option<Arc<RecordSchema>> {
        self.table(type_name).map(|t| t.schema.clone())
    }
}

impl<T: RecordSource + ?Sized> RecordSource for &T {
    fn fetch(&self, type_name: &str, id: RecordId) -> Option<Arc<Record>> {
        (**self).fetch(type_name, id)
    }

    fn schema(&self, type_name: &str) -> Option<Arc<RecordSchema>> {
        (**self).schema(type_name)
    }
}

impl<T: RecordSource + ?Sized> RecordSource for Arc<T> {
    fn fetch(&self, type_name: &str, id: RecordId) -> Option<Arc<Record>> {
        (**self).fetch(type_name, id)
    }

    fn schema(&self, type_name: &str) -> Option<Arc<RecordSchema>> {
        (**self).schema(type_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldType;

    fn user_table() -> Table {
        Table::new(Arc::new(RecordSchema::new("User").field("name", FieldType::Text)))
    }

    #[test]
    fn test_table_byte_accounting() {
        let mut table = user_table();
        let a = Arc::new(Record::new("User").with_id(1).with("name", "Ann"));
        let b = Arc::new(Record::new("User").with_id(1).with("name", "Annabelle"));

        table.put(a.clone());
        assert_eq!(table.size_bytes(), a.encoded_size());

        table.put(b.clone());
        assert_eq!(table.len(), 1);
        assert_eq!(table.size_bytes(), b.encoded_size());

        table.remove(1);
        assert_eq!(table.size_bytes(), 0);
        assert!(table.remove(1).is_none());
    }

    #[test]
    fn test_table_mut_copies_shared_table() {
        let mut v1 = StoreVersion::default();
        v1.tables.insert("User".into(), Arc::new(user_table()));

        let mut v2 = v1.clone();
        v2.version = 1;
        v2.table_mut("User")
            .unwrap()
            .put(Arc::new(Record::new("User").with_id(1).with("name", "Ann")));

        assert!(v1.get("User", 1).is_none());
        assert!(v2.contains("User", 1));
        assert_eq!(v1.record_count(), 0);
        assert_eq!(v2.record_count(), 1);
    }

    #[test]
    fn test_record_key_display() {
        assert_eq!(RecordKey::new("User", 7).to_string(), "User#7");
    }
}
