//! Error types for the recordb engine

use crate::types::{Record, RecordId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Duplicate id: {type_name}#{id} already exists")]
    DuplicateId { type_name: String, id: RecordId },

    #[error("Not found: {type_name}#{id}")]
    NotFound { type_name: String, id: RecordId },

    #[error("No active transaction")]
    NoActiveTransaction,

    #[error("Conflict detected: {type_name}#{id} was modified by a concurrent commit")]
    ConflictDetected { type_name: String, id: RecordId },

    #[error("Dangling reference: {source_type}#{source_id}.{relation} -> {target_type}#{target_id}")]
    DanglingReference {
        source_type: String,
        source_id: RecordId,
        relation: String,
        target_type: String,
        target_id: RecordId,
    },

    #[error("Invalid predicate: {0}")]
    InvalidPredicate(String),

    #[error("Another write transaction is already open")]
    WriterBusy,

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub(crate) fn not_found(type_name: &str, id: RecordId) -> Self {
        StorageError::NotFound { type_name: type_name.to_string(), id }
    }

    pub(crate) fn duplicate(type_name: &str, id: RecordId) -> Self {
        StorageError::DuplicateId { type_name: type_name.to_string(), id }
    }

    pub(crate) fn dangling(source: &Record, relation: &str, target_type: &str, target_id: RecordId) -> Self {
        StorageError::DanglingReference {
            source_type: source.type_name.clone(),
            source_id: source.id,
            relation: relation.to_string(),
            target_type: target_type.to_string(),
            target_id,
        }
    }
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Config(err.to_string())
    }
}
