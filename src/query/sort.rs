//! Sort specifications
//!
//! Comparator chain: primary key first, later keys break ties, record id
//! last. Nulls and NaN sort after every other value in both directions.

use crate::types::{Record, RecordSchema, Value};
use crate::{Result, StorageError};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: Direction,
}

/// Ordered sequence of sort keys (empty = id order)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSpec {
    pub keys: Vec<SortKey>,
}

impl SortSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by(field: &str, direction: Direction) -> Self {
        Self::new().then_by(field, direction)
    }

    pub fn then_by(mut self, field: &str, direction: Direction) -> Self {
        self.keys.push(SortKey {
            field: field.to_string(),
            direction,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn validate(&self, schema: &RecordSchema) -> Result<()> {
        for key in &self.keys {
            if schema.field_def(&key.field).is_none() {
                return Err(StorageError::InvalidPredicate(format!(
                    "cannot sort by unknown field '{}.{}'",
                    schema.name, key.field
                )));
            }
        }
        Ok(())
    }

    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        for key in &self.keys {
            let (x, y) = (a.get(&key.field), b.get(&key.field));
            let ordering = match (sorts_last(x), sorts_last(y)) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => {
                    let ordering = x.partial_cmp(y).unwrap_or(Ordering::Equal);
                    match key.direction {
                        Direction::Ascending => ordering,
                        Direction::Descending => ordering.reverse(),
                    }
                }
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        a.id.cmp(&b.id)
    }

    /// Stable in-place sort
    pub fn sort<R: AsRef<Record>>(&self, records: &mut [R]) {
        records.sort_by(|a, b| self.compare(a.as_ref(), b.as_ref()));
    }
}

/// Values with no place in the field's order
fn sorts_last(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Float(f) => f.is_nan(),
        _ => false,
    }
}
