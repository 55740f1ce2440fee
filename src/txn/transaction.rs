//! Write transactions
//!
//! A `Transaction` reads from the snapshot it was admitted with, overlaid by
//! its own staged writes. Nothing is visible to other readers until `commit`
//! publishes a new version. Any failed mutation (or failed commit) aborts the
//! transaction; later calls return `NoActiveTransaction`.

use super::coordinator::{TransactionCoordinator, TransactionId, TransactionState};
use crate::catalog::TypeRegistry;
use crate::config::DBConfig;
use crate::index::IndexBuffer;
use crate::relation::{self, Resolved};
use crate::storage::{RecordSource, RecordStore, StoreVersion, Table, Version, WriteSet};
use crate::types::{Link, Record, RecordId, RecordSchema, UNASSIGNED_ID};
use crate::{Result, StorageError};
use std::sync::Arc;

pub struct Transaction {
    txn_id: TransactionId,
    state: TransactionState,

    /// Committed state this transaction reads
    snapshot: Arc<StoreVersion>,

    writes: WriteSet,
    index_buffer: IndexBuffer,

    store: Arc<RecordStore>,
    coordinator: Arc<TransactionCoordinator>,
    registry: Arc<TypeRegistry>,

    max_staged_writes: Option<usize>,
}

impl Transaction {
    pub(crate) fn begin(
        store: Arc<RecordStore>,
        coordinator: Arc<TransactionCoordinator>,
        registry: Arc<TypeRegistry>,
        config: &DBConfig,
    ) -> Result<Self> {
        let (txn_id, snapshot) = coordinator.begin(|| store.snapshot())?;
        tracing::trace!(txn_id, version = snapshot.version(), "transaction started");
        Ok(Self {
            txn_id,
            state: TransactionState::Open,
            snapshot,
            writes: WriteSet::new(),
            index_buffer: IndexBuffer::new(),
            store,
            coordinator,
            registry,
            max_staged_writes: config.max_staged_writes,
        })
    }

    pub fn id(&self) -> TransactionId {
        self.txn_id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == TransactionState::Open
    }

    /// Committed state this transaction started from (without its writes)
    pub fn snapshot(&self) -> &Arc<StoreVersion> {
        &self.snapshot
    }

    pub fn start_version(&self) -> Version {
        self.snapshot.version()
    }

    /// Number of records touched so far
    pub fn staged_writes(&self) -> usize {
        self.writes.len()
    }

    /// Stage a new record and return its id
    ///
    /// A record with `UNASSIGNED_ID` gets the next id of its type; an explicit
    /// id must not be visible to this transaction already.
    ///
    /// ```ignore
    /// let mut txn = db.begin()?;
    /// let id = txn.insert(Record::new("User").with("firstName", "Jane").with("age", 42))?;
    /// txn.commit()?;
    /// ```
    pub fn insert(&mut self, record: Record) -> Result<RecordId> {
        self.ensure_open()?;
        let result = self.stage_insert(record);
        self.abort_on_error(result)
    }

    /// Record as seen by this transaction
    ///
    /// `NotFound` leaves the transaction open.
    pub fn get(&self, type_name: &str, id: RecordId) -> Result<Arc<Record>> {
        self.ensure_open()?;
        self.visible(type_name, id)
            .ok_or_else(|| StorageError::not_found(type_name, id))
    }

    /// Modify a record in place
    ///
    /// The closure may change fields and links but not the id or type.
    pub fn update(&mut self, type_name: &str, id: RecordId, f: impl FnOnce(&mut Record)) -> Result<()> {
        self.modify(type_name, id, |record| {
            f(record);
            Ok(())
        })
    }

    pub fn delete(&mut self, type_name: &str, id: RecordId) -> Result<()> {
        self.ensure_open()?;
        let result = self.stage_delete(type_name, id);
        self.abort_on_error(result)
    }

    /// Point a to-one relation at `target`, or add `target` to a to-many one
    ///
    /// The target is checked when the transaction commits.
    pub fn link(&mut self, type_name: &str, id: RecordId, relation: &str, target: RecordId) -> Result<()> {
        self.modify(type_name, id, |record| match link_mut(record, relation)? {
            Link::ToOne(slot) => {
                *slot = Some(target);
                Ok(())
            }
            Link::ToMany(targets) => {
                targets.insert(target);
                Ok(())
            }
        })
    }

    /// Remove `target` from a relation (no-op when it is not linked)
    pub fn unlink(&mut self, type_name: &str, id: RecordId, relation: &str, target: RecordId) -> Result<()> {
        self.modify(type_name, id, |record| {
            match link_mut(record, relation)? {
                Link::ToOne(slot) => {
                    if *slot == Some(target) {
                        *slot = None;
                    }
                }
                Link::ToMany(targets) => {
                    targets.remove(&target);
                }
            }
            Ok(())
        })
    }

    /// Empty a relation
    pub fn clear_link(&mut self, type_name: &str, id: RecordId, relation: &str) -> Result<()> {
        self.modify(type_name, id, |record| {
            let link = link_mut(record, relation)?;
            *link = Link::empty(link.kind());
            Ok(())
        })
    }

    /// Follow a relation, seeing this transaction's staged writes
    pub fn resolve(&self, record: &Record, relation: &str) -> Result<Resolved<&Self>> {
        self.ensure_open()?;
        relation::resolve(self, record, relation)
    }

    /// Validate and publish staged writes
    ///
    /// Returns the committed version. On failure the transaction is aborted
    /// and nothing it staged becomes visible.
    pub fn commit(&mut self) -> Result<Version> {
        self.ensure_open()?;

        if self.writes.is_empty() {
            self.finish(TransactionState::Committed);
            return Ok(self.store.version());
        }

        match self.publish() {
            Ok(version) => {
                tracing::debug!(
                    txn_id = self.txn_id,
                    version,
                    writes = self.writes.len(),
                    index_deltas = self.index_buffer.len(),
                    "transaction committed"
                );
                self.writes.clear();
                self.index_buffer.clear();
                self.finish(TransactionState::Committed);
                Ok(version)
            }
            Err(err) => {
                self.abort_internal();
                Err(err)
            }
        }
    }

    /// Discard staged writes
    pub fn abort(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.abort_internal();
        Ok(())
    }

    fn publish(&self) -> Result<Version> {
        let _guard = self.store.lock_commits();
        let latest = self.store.snapshot();

        self.coordinator
            .validate(self.snapshot.version(), &self.writes)?;
        relation::validate_links(&latest, &self.writes)?;

        let next = RecordStore::build_next(&latest, &self.writes, &self.index_buffer);
        let installed = self.store.install(next);
        self.coordinator
            .record_commit(installed.version(), &self.writes);
        Ok(installed.version())
    }

    fn stage_insert(&mut self, mut record: Record) -> Result<RecordId> {
        let table = self.table(&record.type_name)?;
        normalize(&table.schema, &mut record)?;

        if record.id == UNASSIGNED_ID {
            record.id = self.registry.allocate_id(&record.type_name)?;
        } else {
            if self.visible(&record.type_name, record.id).is_some() {
                return Err(StorageError::duplicate(&record.type_name, record.id));
            }
            self.registry.observe_id(&record.type_name, record.id)?;
        }

        self.check_capacity(&record.type_name, record.id)?;
        let id = record.id;
        self.index_buffer.on_insert(&table, &record);
        self.writes.put(Arc::new(record));
        Ok(id)
    }

    fn stage_delete(&mut self, type_name: &str, id: RecordId) -> Result<()> {
        let table = self.table(type_name)?;
        let old = self
            .visible(type_name, id)
            .ok_or_else(|| StorageError::not_found(type_name, id))?;
        self.check_capacity(type_name, id)?;
        self.index_buffer.on_delete(&table, &old);
        self.writes.delete(type_name, id);
        Ok(())
    }

    fn modify(
        &mut self,
        type_name: &str,
        id: RecordId,
        f: impl FnOnce(&mut Record) -> Result<()>,
    ) -> Result<()> {
        self.ensure_open()?;
        let result = self.stage_update(type_name, id, f);
        self.abort_on_error(result)
    }

    fn stage_update(
        &mut self,
        type_name: &str,
        id: RecordId,
        f: impl FnOnce(&mut Record) -> Result<()>,
    ) -> Result<()> {
        let table = self.table(type_name)?;
        let old = self
            .visible(type_name, id)
            .ok_or_else(|| StorageError::not_found(type_name, id))?;

        let mut new = (*old).clone();
        f(&mut new)?;
        if new.id != id || new.type_name != type_name {
            return Err(StorageError::InvalidData(format!(
                "update may not change the address of {}#{}",
                type_name, id
            )));
        }
        normalize(&table.schema, &mut new)?;

        self.check_capacity(type_name, id)?;
        self.index_buffer.on_update(&table, &old, &new);
        self.writes.put(Arc::new(new));
        Ok(())
    }

    fn table(&self, type_name: &str) -> Result<Arc<Table>> {
        self.snapshot
            .table(type_name)
            .cloned()
            .ok_or_else(|| StorageError::InvalidData(format!("unknown record type '{}'", type_name)))
    }

    fn visible(&self, type_name: &str, id: RecordId) -> Option<Arc<Record>> {
        self.writes.visible(&self.snapshot, type_name, id)
    }

    fn check_capacity(&self, type_name: &str, id: RecordId) -> Result<()> {
        let Some(max) = self.max_staged_writes else {
            return Ok(());
        };
        if self.writes.len() >= max && self.writes.staged(type_name, id).is_none() {
            return Err(StorageError::ResourceExhausted(format!(
                "transaction {} exceeds {} staged writes",
                self.txn_id, max
            )));
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state != TransactionState::Open {
            return Err(StorageError::NoActiveTransaction);
        }
        Ok(())
    }

    fn abort_on_error<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.abort_internal();
        }
        result
    }

    fn abort_internal(&mut self) {
        if self.state != TransactionState::Open {
            return;
        }
        tracing::trace!(txn_id = self.txn_id, writes = self.writes.len(), "transaction aborted");
        self.writes.clear();
        self.index_buffer.clear();
        self.finish(TransactionState::Aborted);
    }

    fn finish(&mut self, state: TransactionState) {
        self.state = state;
        self.coordinator.finish(self.txn_id, state);
    }
}

impl RecordSource for Transaction {
    fn fetch(&self, type_name: &str, id: RecordId) -> Option<Arc<Record>> {
        self.visible(type_name, id)
    }

    fn schema(&self, type_name: &str) -> Option<Arc<RecordSchema>> {
        self.snapshot.schema(type_name)
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state == TransactionState::Open {
            tracing::trace!(txn_id = self.txn_id, "open transaction dropped");
            self.abort_internal();
        }
    }
}

fn normalize(schema: &RecordSchema, record: &mut Record) -> Result<()> {
    schema.normalize(record).map_err(StorageError::InvalidData)
}

fn link_mut<'a>(record: &'a mut Record, relation: &str) -> Result<&'a mut Link> {
    let type_name = &record.type_name;
    record.links.get_mut(relation).ok_or_else(|| {
        StorageError::InvalidData(format!("unknown relation '{}.{}'", type_name, relation))
    })
}
