//! Benchmark workloads
//!
//! Two scenarios exercise the whole engine:
//! - `users`: many flat records, an indexed equality query with a sort, a
//!   bulk rename
//! - `students`: schools, students and grades linked by relationships,
//!   relationship predicates and updates through links
//!
//! Data is generated from a seeded RNG so runs are reproducible.

mod report;
pub mod students;
pub mod users;

pub use report::{format_bytes, format_count, PhaseReport, Report};

use crate::types::RecordSchema;
use crate::{Database, Result};

/// Knobs shared by every scenario
#[derive(Debug, Clone)]
pub struct ScenarioOptions {
    /// Number of top-level records (users or students)
    pub count: usize,
    /// Commit every `chunk` records instead of one big transaction
    pub chunk: Option<usize>,
    pub seed: u64,
    /// Declare the scenario's equality indexes before loading
    pub indexes: bool,
}

impl ScenarioOptions {
    pub fn new(count: usize) -> Self {
        Self {
            count,
            chunk: None,
            seed: 42,
            indexes: true,
        }
    }
}

/// Declare `schema` unless a type of that name exists already
pub(crate) fn ensure_type(db: &Database, schema: RecordSchema) -> Result<()> {
    if db.schema(&schema.name).is_none() {
        db.declare_type(schema)?;
    }
    Ok(())
}
