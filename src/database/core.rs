//! Database Core - `Database` structure and declarations
//!
//! This module contains:
//! - `Database` struct definition
//! - `new()` / `with_config()`
//! - record type and index declaration
//! - transaction entry point and statistics

use crate::catalog::TypeRegistry;
use crate::config::{DBConfig, WriterMode};
use crate::query::{ExecutionEngine, QueryPlanner};
use crate::storage::{RecordStore, StoreVersion, Version};
use crate::txn::{Transaction, TransactionCoordinator};
use crate::types::RecordSchema;
use crate::{Result, StorageError};
use std::sync::Arc;

/// Database statistics
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    /// Last committed version
    pub version: Version,
    pub record_types: usize,
    pub total_records: usize,
    /// Declared (type, field) indexes
    pub indexes: usize,
    /// Estimated storage footprint in bytes
    pub storage_bytes: u64,
    pub active_transactions: u64,
    pub total_committed: u64,
    pub total_aborted: u64,
    pub writer_mode: WriterMode,
}

/// In-memory object store
///
/// Cheap to share behind an `Arc`; readers never wait for writers.
///
/// # Example
/// ```ignore
/// let db = Database::new();
/// db.declare_type(
///     RecordSchema::new("User")
///         .field("firstName", FieldType::Text)
///         .field("age", FieldType::Integer),
/// )?;
/// db.declare_index("User", "firstName")?;
///
/// let mut txn = db.begin()?;
/// txn.insert(Record::new("User").with("firstName", "Jane").with("age", 42))?;
/// txn.commit()?;
/// ```
pub struct Database {
    pub(crate) config: DBConfig,

    /// Committed versions
    pub(crate) store: Arc<RecordStore>,

    /// Writer admission and conflict detection
    pub(crate) coordinator: Arc<TransactionCoordinator>,

    /// Declared types and id counters
    pub(crate) registry: Arc<TypeRegistry>,

    pub(crate) planner: QueryPlanner,
    pub(crate) engine: ExecutionEngine,
}

impl Database {
    /// Create an empty database with the default configuration
    pub fn new() -> Self {
        Self::build(DBConfig::default())
    }

    /// Create an empty database with a validated configuration
    pub fn with_config(config: DBConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: DBConfig) -> Self {
        tracing::debug!(
            writer_mode = config.writer_mode.description(),
            parallel_scan_threshold = config.parallel_scan_threshold,
            "database created"
        );
        Self {
            store: Arc::new(RecordStore::new()),
            coordinator: Arc::new(TransactionCoordinator::new(&config)),
            registry: Arc::new(TypeRegistry::new()),
            planner: QueryPlanner::new(),
            engine: ExecutionEngine::new(config.parallel_scan_threshold),
            config,
        }
    }

    pub fn config(&self) -> &DBConfig {
        &self.config
    }

    /// Declare a record type
    ///
    /// Relation targets may be declared later (or be the type itself);
    /// queries through an undeclared target fail with `InvalidPredicate`.
    pub fn declare_type(&self, schema: RecordSchema) -> Result<Arc<RecordSchema>> {
        let schema = self.registry.register(schema)?;
        if let Err(err) = self.store.create_table(schema.clone()) {
            self.registry.unregister(&schema.name);
            return Err(err);
        }
        tracing::debug!(
            type_name = %schema.name,
            fields = schema.fields.len(),
            relations = schema.relations.len(),
            "record type declared"
        );
        Ok(schema)
    }

    /// Schema of a declared type
    pub fn schema(&self, type_name: &str) -> Option<Arc<RecordSchema>> {
        self.registry.schema(type_name)
    }

    /// Declared type names, sorted
    pub fn type_names(&self) -> Vec<String> {
        self.registry.type_names()
    }

    /// Declare an equality index on `type_name.field` and build it over the
    /// committed records
    ///
    /// Returns `false` if the index already existed. Fails with `WriterBusy`
    /// while any write transaction is open.
    pub fn declare_index(&self, type_name: &str, field: &str) -> Result<bool> {
        let schema = self.registry.schema(type_name).ok_or_else(|| {
            StorageError::InvalidData(format!("unknown record type '{}'", type_name))
        })?;
        if schema.field_def(field).is_none() {
            return Err(StorageError::InvalidData(format!(
                "cannot index unknown field '{}.{}'",
                type_name, field
            )));
        }

        let created = self
            .coordinator
            .with_no_writers(|| self.store.declare_index(type_name, field))?;
        if created {
            let snapshot = self.store.snapshot();
            let keys = snapshot
                .table(type_name)
                .and_then(|t| t.index(field))
                .map_or(0, |index| index.distinct_keys());
            tracing::debug!(type_name, field, distinct_keys = keys, "index declared");
        }
        Ok(created)
    }

    /// Begin a write transaction
    ///
    /// In single-writer mode this fails with `WriterBusy` while another
    /// transaction is open.
    pub fn begin(&self) -> Result<Transaction> {
        Transaction::begin(
            self.store.clone(),
            self.coordinator.clone(),
            self.registry.clone(),
            &self.config,
        )
    }

    /// Last committed version, for consistent multi-step reads
    pub fn snapshot(&self) -> Arc<StoreVersion> {
        self.store.snapshot()
    }

    /// Estimated storage footprint of committed records in bytes
    pub fn storage_size(&self) -> u64 {
        self.store.size_estimate()
    }

    /// Get database statistics
    ///
    /// # Example
    /// ```ignore
    /// let stats = db.stats();
    /// println!("records: {}, committed: {}", stats.total_records, stats.total_committed);
    /// ```
    pub fn stats(&self) -> DatabaseStats {
        let snapshot = self.store.snapshot();
        let txn = self.coordinator.stats();
        DatabaseStats {
            version: snapshot.version(),
            record_types: snapshot.tables.len(),
            total_records: snapshot.record_count(),
            indexes: snapshot.tables.values().map(|t| t.indexes.len()).sum(),
            storage_bytes: snapshot.size_bytes(),
            active_transactions: txn.active_transactions,
            total_committed: txn.total_committed,
            total_aborted: txn.total_aborted,
            writer_mode: self.coordinator.mode(),
        }
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}
