//! Secondary equality indexes
//!
//! One `FieldIndex` per (record type, field): value key -> bitmap of record ids.
//! Committed indexes live inside `Table`s; transactions stage their changes in
//! an `IndexBuffer` that is applied at commit (see `manager`).

mod manager;

pub use manager::{IndexBuffer, IndexDelta, IndexManager, IndexOp};

use crate::types::{RecordId, Value};
use ahash::AHashMap;
use roaring::RoaringTreemap;

/// Hashable form of an indexable value
///
/// Numbers are normalised so that `Integer(3)` and `Float(3.0)` share a key,
/// matching predicate equality. `Null` and NaN have no key: they never
/// compare equal, so they are never indexed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexKey {
    Bool(bool),
    Int(i64),
    FloatBits(u64),
    Text(String),
}

impl IndexKey {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(IndexKey::Bool(*b)),
            Value::Integer(i) => Some(IndexKey::Int(*i)),
            Value::Text(s) => Some(IndexKey::Text(s.clone())),
            Value::Float(f) => {
                if f.is_nan() {
                    None
                } else if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 {
                    // also folds -0.0 into Int(0)
                    Some(IndexKey::Int(*f as i64))
                } else {
                    Some(IndexKey::FloatBits(f.to_bits()))
                }
            }
        }
    }
}

/// Equality index over one field
#[derive(Debug, Clone, Default)]
pub struct FieldIndex {
    entries: AHashMap<IndexKey, RoaringTreemap>,
}

impl FieldIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: IndexKey, id: RecordId) {
        self.entries.entry(key).or_insert_with(RoaringTreemap::new).insert(id);
    }

    pub fn remove(&mut self, key: &IndexKey, id: RecordId) {
        if let Some(ids) = self.entries.get_mut(key) {
            ids.remove(id);
            if ids.is_empty() {
                self.entries.remove(key);
            }
        }
    }

    /// Ids whose field equals `value` (None when no record has it)
    pub fn lookup(&self, value: &Value) -> Option<&RoaringTreemap> {
        IndexKey::from_value(value).and_then(|key| self.entries.get(&key))
    }

    /// Number of ids stored under `value`
    pub fn cardinality(&self, value: &Value) -> u64 {
        self.lookup(value).map_or(0, |ids| ids.len())
    }

    /// Number of distinct keys
    pub fn distinct_keys(&self) -> usize {
        self.entries.len()
    }

    /// Total indexed ids
    pub fn total_entries(&self) -> u64 {
        self.entries.values().map(|ids| ids.len()).sum()
    }
}
