//! Bulk operations and committed-state reads
//!
//! Every bulk operation wraps its writes in transactions of its own; in
//! single-writer mode they fail with `WriterBusy` while another transaction
//! is open.

use super::core::Database;
use crate::query::Query;
use crate::relation::{self, Resolved};
use crate::storage::StoreVersion;
use crate::types::{Record, RecordId};
use crate::{Result, StorageError};
use std::sync::Arc;

impl Database {
    /// Insert `records` in one transaction
    ///
    /// All or nothing: the first failing insert (or a failing commit) aborts
    /// the batch and nothing becomes visible.
    ///
    /// # Example
    /// ```ignore
    /// let users = (0..100_000).map(|i| Record::new("User").with("age", 18 + i % 70));
    /// let created = db.create_many(users)?;
    /// ```
    pub fn create_many(&self, records: impl IntoIterator<Item = Record>) -> Result<usize> {
        let mut txn = self.begin()?;
        let mut created = 0;
        for record in records {
            txn.insert(record)?;
            created += 1;
        }
        txn.commit()?;
        tracing::debug!(created, "bulk create committed");
        Ok(created)
    }

    /// Insert `records` committing every `chunk` records
    ///
    /// Each chunk is atomic on its own; chunks committed before a failure
    /// stay committed.
    pub fn create_many_chunked(
        &self,
        records: impl IntoIterator<Item = Record>,
        chunk: usize,
    ) -> Result<usize> {
        if chunk == 0 {
            return Err(StorageError::InvalidData("chunk size must be > 0".into()));
        }

        let mut created = 0;
        let mut chunks = 0;
        let mut txn = self.begin()?;
        let mut staged = 0;
        for record in records {
            txn.insert(record)?;
            staged += 1;
            if staged == chunk {
                txn.commit()?;
                created += staged;
                chunks += 1;
                staged = 0;
                txn = self.begin()?;
            }
        }
        txn.commit()?;
        created += staged;
        if staged > 0 {
            chunks += 1;
        }
        tracing::debug!(created, chunks, "chunked create committed");
        Ok(created)
    }

    /// Committed record by id
    pub fn get(&self, type_name: &str, id: RecordId) -> Result<Arc<Record>> {
        self.store
            .snapshot()
            .get(type_name, id)
            .cloned()
            .ok_or_else(|| StorageError::not_found(type_name, id))
    }

    /// Follow a relation on the last committed version
    ///
    /// # Example
    /// ```ignore
    /// let student = db.get("Student", 7)?;
    /// if let Resolved::One(Some(school)) = db.resolve(&student, "school")? {
    ///     println!("{}", school.get("name"));
    /// }
    /// ```
    pub fn resolve(&self, record: &Record, relation: &str) -> Result<Resolved<Arc<StoreVersion>>> {
        relation::resolve(self.store.snapshot(), record, relation)
    }

    /// Apply `mutator` to every record matching `query`, in one transaction
    ///
    /// Returns the number of records updated. A record whose relationship
    /// cannot be followed while matching fails the whole update.
    pub fn update_where(&self, query: &Query, mut mutator: impl FnMut(&mut Record)) -> Result<usize> {
        let mut txn = self.begin()?;
        let ids = self.matching_ids(query, txn.snapshot().clone())?;

        for id in &ids {
            txn.update(&query.type_name, *id, &mut mutator)?;
        }
        txn.commit()?;
        tracing::debug!(type_name = %query.type_name, updated = ids.len(), "bulk update committed");
        Ok(ids.len())
    }

    /// Delete every record of `type_name`, in one transaction
    ///
    /// Links held by other types are left in place and report
    /// `DanglingReference` when followed.
    pub fn delete_all(&self, type_name: &str) -> Result<usize> {
        let mut txn = self.begin()?;
        let ids: Vec<RecordId> = txn
            .snapshot()
            .table(type_name)
            .ok_or_else(|| StorageError::InvalidData(format!("unknown record type '{}'", type_name)))?
            .rows
            .keys()
            .copied()
            .collect();

        for id in &ids {
            txn.delete(type_name, *id)?;
        }
        txn.commit()?;
        tracing::debug!(type_name, deleted = ids.len(), "bulk delete committed");
        Ok(ids.len())
    }

    fn matching_ids(&self, query: &Query, version: Arc<StoreVersion>) -> Result<Vec<RecordId>> {
        self.query_at(query, version)?
            .map(|record| record.map(|r| r.id))
            .collect()
    }
}
