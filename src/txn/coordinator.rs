//! Transaction Coordinator
//!
//! Manages writer admission and commit validation:
//! - SingleWriter: one open write transaction at a time (`WriterBusy` otherwise)
//! - MultiWriter: optimistic; at commit, a transaction's write set is checked
//!   against the write sets of transactions that committed after it began

use crate::config::{DBConfig, WriterMode};
use crate::storage::{RecordKey, StoreVersion, Version, WriteSet};
use crate::{Result, StorageError};
use ahash::AHashSet;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Transaction ID
pub type TransactionId = u64;

/// Transaction state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Open,
    Committed,
    Aborted,
}

/// Write set of one committed transaction (for conflict detection)
struct CommittedWrites {
    version: Version,
    keys: AHashSet<RecordKey>,
}

#[derive(Default)]
struct CommitHistory {
    entries: VecDeque<CommittedWrites>,
    /// Entries at or below this version were dropped for space; transactions
    /// that started before it can no longer be validated.
    pruned_through: Version,
}

/// Transaction Coordinator
pub struct TransactionCoordinator {
    mode: WriterMode,

    /// Transaction ID generator
    txn_id_gen: AtomicU64,

    /// Open write transactions -> start version
    active: Mutex<BTreeMap<TransactionId, Version>>,

    /// Recently committed write sets (MultiWriter only)
    history: Mutex<CommitHistory>,

    history_limit: usize,

    committed: AtomicU64,
    aborted: AtomicU64,
}

impl TransactionCoordinator {
    pub fn new(config: &DBConfig) -> Self {
        Self {
            mode: config.writer_mode,
            // Start at 1 so 0 can be used as "no transaction"
            txn_id_gen: AtomicU64::new(1),
            active: Mutex::new(BTreeMap::new()),
            history: Mutex::new(CommitHistory::default()),
            history_limit: config.conflict_history_limit.max(1),
            committed: AtomicU64::new(0),
            aborted: AtomicU64::new(0),
        }
    }

    pub fn mode(&self) -> WriterMode {
        self.mode
    }

    /// Admit a new write transaction
    ///
    /// `snapshot` is taken while admission is locked, so it cannot interleave
    /// with index declaration (see `with_no_writers`).
    pub fn begin(
        &self,
        snapshot: impl FnOnce() -> Arc<StoreVersion>,
    ) -> Result<(TransactionId, Arc<StoreVersion>)> {
        let mut active = self.active.lock();
        if self.mode == WriterMode::SingleWriter && !active.is_empty() {
            return Err(StorageError::WriterBusy);
        }

        let txn_id = self.txn_id_gen.fetch_add(1, Ordering::SeqCst);
        let snapshot = snapshot();
        active.insert(txn_id, snapshot.version());
        Ok((txn_id, snapshot))
    }

    /// Check a write set against commits made since `start_version`
    ///
    /// Caller holds the store's commit lock.
    pub fn validate(&self, start_version: Version, writes: &WriteSet) -> Result<()> {
        if self.mode == WriterMode::SingleWriter || writes.is_empty() {
            return Ok(());
        }

        let history = self.history.lock();
        if start_version < history.pruned_through {
            // history no longer covers this transaction; assume the worst
            if let Some(key) = writes.keys().next() {
                return Err(conflict(key));
            }
        }

        for entry in history.entries.iter().filter(|e| e.version > start_version) {
            if let Some(key) = writes.keys().find(|k| entry.keys.contains(*k)) {
                return Err(conflict(key));
            }
        }
        Ok(())
    }

    /// Remember a commit's write set. Caller holds the store's commit lock.
    pub fn record_commit(&self, version: Version, writes: &WriteSet) {
        if self.mode == WriterMode::SingleWriter {
            return;
        }

        let min_start = self.active.lock().values().min().copied();
        let mut history = self.history.lock();
        history.entries.push_back(CommittedWrites {
            version,
            keys: writes.keys().cloned().collect(),
        });

        // no open transaction started before these entries
        match min_start {
            Some(min_start) => {
                while history.entries.front().is_some_and(|e| e.version <= min_start) {
                    history.entries.pop_front();
                }
            }
            None => history.entries.clear(),
        }

        while history.entries.len() > self.history_limit {
            if let Some(dropped) = history.entries.pop_front() {
                history.pruned_through = history.pruned_through.max(dropped.version);
            }
        }
    }

    /// Release a transaction's admission slot
    pub fn finish(&self, txn_id: TransactionId, state: TransactionState) {
        if self.active.lock().remove(&txn_id).is_none() {
            return;
        }
        match state {
            TransactionState::Committed => self.committed.fetch_add(1, Ordering::Relaxed),
            _ => self.aborted.fetch_add(1, Ordering::Relaxed),
        };
    }

    /// Run `f` while no write transaction is open, blocking new admissions
    pub fn with_no_writers<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let active = self.active.lock();
        if !active.is_empty() {
            return Err(StorageError::WriterBusy);
        }
        let result = f();
        drop(active);
        result
    }

    /// Get statistics
    pub fn stats(&self) -> TransactionCoordinatorStats {
        TransactionCoordinatorStats {
            active_transactions: self.active.lock().len() as u64,
            total_committed: self.committed.load(Ordering::Relaxed),
            total_aborted: self.aborted.load(Ordering::Relaxed),
            retained_commit_sets: self.history.lock().entries.len(),
        }
    }
}

fn conflict(key: &RecordKey) -> StorageError {
    StorageError::ConflictDetected {
        type_name: key.type_name.clone(),
        id: key.id,
    }
}

/// Transaction coordinator statistics
#[derive(Debug, Clone)]
pub struct TransactionCoordinatorStats {
    pub active_transactions: u64,
    pub total_committed: u64,
    pub total_aborted: u64,
    pub retained_commit_sets: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Record;

    fn snapshot_at(version: Version) -> impl FnOnce() -> Arc<StoreVersion> {
        move || {
            Arc::new(StoreVersion {
                version,
                ..Default::default()
            })
        }
    }

    fn writes(ids: &[u64]) -> WriteSet {
        let mut set = WriteSet::new();
        for id in ids {
            set.put(Arc::new(Record::new("User").with_id(*id)));
        }
        set
    }

    #[test]
    fn test_single_writer_admission() {
        let coord = TransactionCoordinator::new(&DBConfig::default());
        let (t1, _) = coord.begin(snapshot_at(0)).unwrap();
        assert!(matches!(coord.begin(snapshot_at(0)), Err(StorageError::WriterBusy)));

        coord.finish(t1, TransactionState::Aborted);
        let (t2, _) = coord.begin(snapshot_at(0)).unwrap();
        assert!(t2 > t1);
        coord.finish(t2, TransactionState::Committed);

        let stats = coord.stats();
        assert_eq!(stats.active_transactions, 0);
        assert_eq!(stats.total_committed, 1);
        assert_eq!(stats.total_aborted, 1);
    }

    #[test]
    fn test_finish_is_idempotent() {
        let coord = TransactionCoordinator::new(&DBConfig::default());
        let (t1, _) = coord.begin(snapshot_at(0)).unwrap();
        coord.finish(t1, TransactionState::Committed);
        coord.finish(t1, TransactionState::Aborted);
        assert_eq!(coord.stats().total_aborted, 0);
    }

    #[test]
    fn test_multi_writer_conflict() {
        let coord = TransactionCoordinator::new(&DBConfig::for_concurrent());
        let (t1, s1) = coord.begin(snapshot_at(0)).unwrap();
        let (t2, s2) = coord.begin(snapshot_at(0)).unwrap();

        let w1 = writes(&[1, 2]);
        coord.validate(s1.version(), &w1).unwrap();
        coord.record_commit(1, &w1);
        coord.finish(t1, TransactionState::Committed);

        let err = coord.validate(s2.version(), &writes(&[2, 3])).unwrap_err();
        assert!(matches!(err, StorageError::ConflictDetected { id: 2, .. }));
        assert!(coord.validate(s2.version(), &writes(&[3])).is_ok());
        coord.finish(t2, TransactionState::Aborted);
    }

    #[test]
    fn test_history_pruned_when_no_readers_need_it() {
        let coord = TransactionCoordinator::new(&DBConfig::for_concurrent());
        let (t1, _) = coord.begin(snapshot_at(0)).unwrap();
        coord.record_commit(1, &writes(&[1]));
        coord.finish(t1, TransactionState::Committed);
        assert_eq!(coord.stats().retained_commit_sets, 1);

        let (t2, _) = coord.begin(snapshot_at(1)).unwrap();
        coord.record_commit(2, &writes(&[2]));
        coord.finish(t2, TransactionState::Committed);
        // t2 started at version 1, so the version-1 entry is no longer needed
        assert_eq!(coord.stats().retained_commit_sets, 1);
    }

    #[test]
    fn test_pruned_history_forces_conflict() {
        let config = DBConfig {
            conflict_history_limit: 1,
            ..DBConfig::for_concurrent()
        };
        let coord = TransactionCoordinator::new(&config);
        let (old, s_old) = coord.begin(snapshot_at(0)).unwrap();

        coord.record_commit(1, &writes(&[10]));
        coord.record_commit(2, &writes(&[11]));

        let err = coord.validate(s_old.version(), &writes(&[99])).unwrap_err();
        assert!(matches!(err, StorageError::ConflictDetected { .. }));
        coord.finish(old, TransactionState::Aborted);
    }

    #[test]
    fn test_with_no_writers() {
        let coord = TransactionCoordinator::new(&DBConfig::for_concurrent());
        assert_eq!(coord.with_no_writers(|| Ok(7)).unwrap(), 7);

        let (t1, _) = coord.begin(snapshot_at(0)).unwrap();
        assert!(matches!(
            coord.with_no_writers(|| Ok(())),
            Err(StorageError::WriterBusy)
        ));
        coord.finish(t1, TransactionState::Aborted);
    }
}
