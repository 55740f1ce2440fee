//! recordb - embedded in-memory object store
//!
//! Typed records with declared fields and relationships, held in memory and
//! queried through composable predicates.
//!
//! ## Architecture
//! - Storage: copy-on-write committed versions (`Arc<StoreVersion>`), swapped
//!   atomically on commit; readers work on snapshots and never block
//! - Index: per-field equality indexes over roaring bitmaps, maintained at commit
//! - Query: predicate trees, index-intersection planner, lazy cursor executor
//! - Transactions: single-writer (default) or optimistic multi-writer, with
//!   link validation at commit
//! - Workload: the Users / Students benchmark scenarios run by `recordb-bench`

pub mod catalog;
pub mod config;
pub mod database;
pub mod index;
pub mod query;
pub mod relation;
pub mod storage;
pub mod txn;
pub mod types;
pub mod workload;

mod error;

pub use config::{DBConfig, WriterMode};
pub use error::{Result, StorageError};

pub use database::{Database, DatabaseStats};
pub use query::{CompareOp, Cursor, Direction, Predicate, Query};
pub use relation::Resolved;
pub use txn::{Transaction, TransactionState};
pub use types::{FieldType, Link, Record, RecordId, RecordSchema, Value};
