//! Queries over the last committed version
//!
//! Each call takes its own snapshot: a cursor keeps reading the version it
//! started on even if later transactions commit.

use super::core::Database;
use crate::query::{Cursor, Query, QueryPlan, QueryPlanner};
use crate::storage::StoreVersion;
use crate::Result;
use std::sync::Arc;

impl Database {
    /// Run a query
    ///
    /// Unsorted results come in ascending id order. A record whose
    /// relationship cannot be followed is yielded as `Err` and iteration
    /// continues.
    ///
    /// # Example
    /// ```ignore
    /// let janes = Query::new("User")
    ///     .filter(Predicate::eq("firstName", "Jane"))
    ///     .sort_by("age", Direction::Ascending);
    /// for user in db.query(&janes)? {
    ///     let user = user?;
    ///     println!("{} {}", user.get("firstName"), user.get("age"));
    /// }
    /// ```
    pub fn query(&self, query: &Query) -> Result<Cursor> {
        self.query_at(query, self.store.snapshot())
    }

    /// Run a query against a specific version, e.g. a transaction's snapshot
    pub fn query_at(&self, query: &Query, version: Arc<StoreVersion>) -> Result<Cursor> {
        let plan = self.planner.plan(query, &version)?;
        self.engine.execute(plan, version)
    }

    /// Run a query ignoring declared indexes
    pub fn query_full_scan(&self, query: &Query) -> Result<Cursor> {
        let snapshot = self.store.snapshot();
        let plan = QueryPlanner::without_indexes().plan(query, &snapshot)?;
        self.engine.execute(plan, snapshot)
    }

    /// Number of matching records
    pub fn count(&self, query: &Query) -> Result<usize> {
        let snapshot = self.store.snapshot();
        let plan = self.planner.plan(query, &snapshot)?;
        self.engine.count(&plan, &snapshot)
    }

    /// Plan a query without running it
    pub fn plan(&self, query: &Query) -> Result<QueryPlan> {
        self.planner.plan(query, &self.store.snapshot())
    }

    /// Human readable plan
    pub fn explain(&self, query: &Query) -> Result<String> {
        Ok(self.plan(query)?.explain())
    }
}
