//! Index maintenance
//!
//! Transactions never touch committed indexes. Each create/update/delete
//! appends add/remove deltas to the transaction's `IndexBuffer`; an update
//! stages the stale-key removal and the new-key insertion together, so an
//! abort discards both. `IndexManager::apply` replays the buffer onto the next
//! store version during commit.

use super::{FieldIndex, IndexKey};
use crate::storage::{StoreVersion, Table};
use crate::types::{Record, RecordId, Value};
use crate::{Result, StorageError};
use roaring::RoaringTreemap;
use std::sync::Arc;

/// Index delta operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOp {
    Add,
    Remove,
}

/// One staged index change
#[derive(Debug, Clone)]
pub struct IndexDelta {
    pub type_name: String,
    pub field: String,
    pub key: IndexKey,
    pub id: RecordId,
    pub op: IndexOp,
}

/// Transaction-local index changes, in staging order
#[derive(Debug, Default)]
pub struct IndexBuffer {
    deltas: Vec<IndexDelta>,
}

impl IndexBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    pub fn clear(&mut self) {
        self.deltas.clear();
    }

    pub fn deltas(&self) -> &[IndexDelta] {
        &self.deltas
    }

    /// Stage index entries for a new record
    pub fn on_insert(&mut self, table: &Table, record: &Record) {
        for field in table.indexed_fields() {
            self.push(record, field, record.get(field), IndexOp::Add);
        }
    }

    /// Stage the stale-entry removal and new-entry insertion for an update
    pub fn on_update(&mut self, table: &Table, old: &Record, new: &Record) {
        for field in table.indexed_fields() {
            let (before, after) = (old.get(field), new.get(field));
            if IndexKey::from_value(before) == IndexKey::from_value(after) {
                continue;
            }
            self.push(old, field, before, IndexOp::Remove);
            self.push(new, field, after, IndexOp::Add);
        }
    }

    /// Stage removal of a deleted record's entries
    pub fn on_delete(&mut self, table: &Table, record: &Record) {
        for field in table.indexed_fields() {
            self.push(record, field, record.get(field), IndexOp::Remove);
        }
    }

    fn push(&mut self, record: &Record, field: &str, value: &Value, op: IndexOp) {
        if let Some(key) = IndexKey::from_value(value) {
            self.deltas.push(IndexDelta {
                type_name: record.type_name.clone(),
                field: field.to_string(),
                key,
                id: record.id,
                op,
            });
        }
    }
}

/// Declares, maintains and reads committed indexes
pub struct IndexManager;

impl IndexManager {
    /// Add an index on `type_name.field` to `version`, built from its rows
    ///
    /// Returns false when the index already exists.
    pub fn declare(version: &mut StoreVersion, type_name: &str, field: &str) -> Result<bool> {
        let table = version
            .table(type_name)
            .ok_or_else(|| StorageError::InvalidData(format!("unknown record type '{}'", type_name)))?;
        if table.schema.field_def(field).is_none() {
            return Err(StorageError::InvalidData(format!(
                "unknown field '{}' for type '{}'",
                field, type_name
            )));
        }
        if table.indexes.contains_key(field) {
            return Ok(false);
        }

        let index = Self::build(table, field);
        if let Some(table) = version.table_mut(type_name) {
            table.indexes.insert(field.to_string(), Arc::new(index));
        }
        Ok(true)
    }

    /// Build an index over every committed row of a table
    pub fn build(table: &Table, field: &str) -> FieldIndex {
        let mut index = FieldIndex::new();
        for (id, record) in &table.rows {
            if let Some(key) = IndexKey::from_value(record.get(field)) {
                index.add(key, *id);
            }
        }
        index
    }

    /// Replay staged deltas onto `version` (copy-on-write per touched index)
    pub fn apply(version: &mut StoreVersion, buffer: &IndexBuffer) {
        for delta in &buffer.deltas {
            let Some(table) = version.table_mut(&delta.type_name) else {
                continue;
            };
            let Some(index) = table.indexes.get_mut(&delta.field) else {
                continue;
            };
            let index = Arc::make_mut(index);
            match delta.op {
                IndexOp::Add => index.add(delta.key.clone(), delta.id),
                IndexOp::Remove => index.remove(&delta.key, delta.id),
            }
        }
    }

    /// Ids of `type_name` records whose `field` equals `value`
    ///
    /// None when the field is not indexed; an empty bitmap when it is indexed
    /// but nothing matches.
    pub fn lookup(
        version: &StoreVersion,
        type_name: &str,
        field: &str,
        value: &Value,
    ) -> Option<RoaringTreemap> {
        let index = version.table(type_name)?.index(field)?;
        Some(index.lookup(value).cloned().unwrap_or_default())
    }
}
