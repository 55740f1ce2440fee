/// Type registry: declared record schemas and per-type id allocation
use crate::error::{Result, StorageError};
use crate::types::{RecordId, RecordSchema, UNASSIGNED_ID};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Registry entry for one record type
struct TypeEntry {
    schema: Arc<RecordSchema>,
    /// Next id to hand out (ids start at 1; 0 is UNASSIGNED_ID)
    next_id: AtomicU64,
}

/// Type registry for managing record schemas
///
/// Ids are allocated eagerly and never reused, also when the allocating
/// transaction aborts.
pub struct TypeRegistry {
    types: DashMap<String, Arc<TypeEntry>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self {
            types: DashMap::new(),
        }
    }

    /// Register a new record type
    pub fn register(&self, schema: RecordSchema) -> Result<Arc<RecordSchema>> {
        schema.validate().map_err(StorageError::InvalidData)?;

        let schema = Arc::new(schema);
        match self.types.entry(schema.name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(StorageError::InvalidData(format!(
                "record type '{}' already declared",
                schema.name
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(TypeEntry {
                    schema: schema.clone(),
                    next_id: AtomicU64::new(1),
                }));
                Ok(schema)
            }
        }
    }

    /// Forget a type (used to roll back a half-finished declaration)
    pub(crate) fn unregister(&self, type_name: &str) {
        self.types.remove(type_name);
    }

    pub fn schema(&self, type_name: &str) -> Option<Arc<RecordSchema>> {
        self.types.get(type_name).map(|e| e.schema.clone())
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Declared type names, sorted
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Allocate the next id for a type
    pub fn allocate_id(&self, type_name: &str) -> Result<RecordId> {
        let entry = self.entry(type_name)?;
        Ok(entry.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Note a caller-supplied id so later allocations skip past it
    pub fn observe_id(&self, type_name: &str, id: RecordId) -> Result<()> {
        if id == UNASSIGNED_ID {
            return Ok(());
        }
        let entry = self.entry(type_name)?;
        entry.next_id.fetch_max(id.saturating_add(1), Ordering::SeqCst);
        Ok(())
    }

    fn entry(&self, type_name: &str) -> Result<Arc<TypeEntry>> {
        self.types
            .get(type_name)
            .map(|e| e.value().clone())
            .ok_or_else(|| StorageError::InvalidData(format!("unknown record type '{}'", type_name)))
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
