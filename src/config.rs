//! Database configuration
//!
//! Controls writer admission, staged-write limits and scan parallelism.
//! Configs can be built in code (presets) or loaded from a JSON file.

use crate::{Result, StorageError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Writer admission policy
///
/// - SingleWriter: at most one open write transaction; `begin` fails with
///   `WriterBusy` while another is open. Matches single-threaded bulk import.
/// - MultiWriter: any number of open writers; overlapping writes are detected
///   at commit time and the later committer fails with `ConflictDetected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WriterMode {
    #[default]
    SingleWriter,
    MultiWriter,
}

impl WriterMode {
    /// Human readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::SingleWriter => "single writer, many readers",
            Self::MultiWriter => "optimistic multi-writer",
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DBConfig {
    /// Writer admission policy
    pub writer_mode: WriterMode,

    /// Upper bound on staged writes per transaction (None = unbounded)
    ///
    /// Exceeding it fails the write with `ResourceExhausted` and aborts the
    /// transaction. Callers bound peak memory by choosing smaller batches.
    pub max_staged_writes: Option<usize>,

    /// Candidate count above which full-scan filtering runs on the rayon pool
    pub parallel_scan_threshold: usize,

    /// Max committed write sets retained for conflict detection (MultiWriter)
    pub conflict_history_limit: usize,
}

impl Default for DBConfig {
    fn default() -> Self {
        Self {
            writer_mode: WriterMode::SingleWriter,
            max_staged_writes: None,
            parallel_scan_threshold: 50_000,
            conflict_history_limit: 1024,
        }
    }
}

impl DBConfig {
    /// Bulk import / benchmark configuration
    pub fn for_benchmark() -> Self {
        Self {
            parallel_scan_threshold: 20_000,
            ..Default::default()
        }
    }

    /// Small limits, sequential scans (deterministic tests)
    pub fn for_testing() -> Self {
        Self {
            max_staged_writes: Some(1_000_000),
            parallel_scan_threshold: usize::MAX,
            conflict_history_limit: 64,
            ..Default::default()
        }
    }

    /// Several concurrent writers with optimistic conflict detection
    pub fn for_concurrent() -> Self {
        Self {
            writer_mode: WriterMode::MultiWriter,
            ..Default::default()
        }
    }

    /// Parse a config from JSON text. Missing keys take default values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: DBConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_staged_writes == Some(0) {
            return Err(StorageError::Config("max_staged_writes must be > 0".into()));
        }
        if self.parallel_scan_threshold == 0 {
            return Err(StorageError::Config("parallel_scan_threshold must be > 0".into()));
        }
        if self.writer_mode == WriterMode::MultiWriter && self.conflict_history_limit == 0 {
            return Err(StorageError::Config(
                "conflict_history_limit must be > 0 in MultiWriter mode".into(),
            ));
        }
        Ok(())
    }
}
