//! Query execution engine
//!
//! Runs a `QueryPlan` against one committed version. Unsorted results are
//! streamed lazily in ascending id order; sorted results are materialized,
//! filtered (in parallel above the configured threshold), sorted and then
//! streamed from the buffer.

use super::planner::{AccessPath, IndexProbe, QueryPlan};
use super::predicate::Predicate;
use crate::storage::{StoreVersion, Table};
use crate::types::{Record, RecordId};
use crate::{Result, StorageError};
use rayon::prelude::*;
use roaring::RoaringTreemap;
use std::sync::Arc;

/// Volcano-style execution engine
#[derive(Debug, Clone)]
pub struct ExecutionEngine {
    /// Candidate count at which filtering fans out over rayon
    parallel_threshold: usize,
}

impl ExecutionEngine {
    pub fn new(parallel_threshold: usize) -> Self {
        Self { parallel_threshold }
    }

    /// Start executing `plan` against `version`
    pub fn execute(&self, plan: QueryPlan, version: Arc<StoreVersion>) -> Result<Cursor> {
        let table = table_of(&version, &plan.type_name)?;
        let source = match &plan.access {
            AccessPath::FullScan { .. } => Source::Scan { next: Some(0) },
            AccessPath::IndexIntersection { probes } => {
                Source::Ids(candidate_ids(&table, probes).into_iter())
            }
        };

        let mut cursor = Cursor {
            version,
            table,
            source,
            residual: plan.residual,
            remaining: plan.limit,
        };

        if plan.sort.is_empty() {
            return Ok(cursor);
        }

        // sorted: materialize every match, then order and cap
        let candidates = cursor.drain_candidates();
        let (mut matched, errors) = self.filter(&cursor.version, cursor.residual.as_ref(), candidates);
        plan.sort.sort(&mut matched);

        let mut buffered: Vec<Result<Arc<Record>>> = matched.into_iter().map(Ok).collect();
        buffered.extend(errors.into_iter().map(Err));
        if let Some(limit) = plan.limit {
            buffered.truncate(limit);
        }

        cursor.source = Source::Buffered(buffered.into_iter());
        cursor.residual = None;
        cursor.remaining = None;
        Ok(cursor)
    }

    /// Number of matching records (capped by the plan's limit)
    ///
    /// Fails with the first evaluation error, if any.
    pub fn count(&self, plan: &QueryPlan, version: &Arc<StoreVersion>) -> Result<usize> {
        let table = table_of(version, &plan.type_name)?;
        let total = match (&plan.access, &plan.residual) {
            (AccessPath::FullScan { .. }, None) => table.len(),
            (AccessPath::IndexIntersection { probes }, None) => {
                candidate_ids(&table, probes).len() as usize
            }
            (access, Some(residual)) => {
                let candidates: Vec<Arc<Record>> = match access {
                    AccessPath::FullScan { .. } => table.rows.values().cloned().collect(),
                    AccessPath::IndexIntersection { probes } => candidate_ids(&table, probes)
                        .iter()
                        .filter_map(|id| table.get(id).cloned())
                        .collect(),
                };
                let (matched, errors) = self.filter(version, Some(residual), candidates);
                if let Some(err) = errors.into_iter().next() {
                    return Err(err);
                }
                matched.len()
            }
        };
        Ok(plan.limit.map_or(total, |limit| total.min(limit)))
    }

    /// Split candidates into matches and evaluation errors, preserving order
    fn filter(
        &self,
        version: &StoreVersion,
        residual: Option<&Predicate>,
        candidates: Vec<Arc<Record>>,
    ) -> (Vec<Arc<Record>>, Vec<StorageError>) {
        let Some(residual) = residual else {
            return (candidates, Vec::new());
        };

        let outcomes: Vec<Result<Option<Arc<Record>>>> = if candidates.len() >= self.parallel_threshold {
            tracing::trace!(candidates = candidates.len(), "parallel filter");
            candidates
                .into_par_iter()
                .map(|record| keep_if(residual, record, version))
                .collect()
        } else {
            candidates
                .into_iter()
                .map(|record| keep_if(residual, record, version))
                .collect()
        };

        let mut matched = Vec::new();
        let mut errors = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(Some(record)) => matched.push(record),
                Ok(None) => {}
                Err(err) => errors.push(err),
            }
        }
        (matched, errors)
    }
}

fn keep_if(predicate: &Predicate, record: Arc<Record>, version: &StoreVersion) -> Result<Option<Arc<Record>>> {
    Ok(predicate.evaluate(&record, version)?.then_some(record))
}

fn table_of(version: &StoreVersion, type_name: &str) -> Result<Arc<Table>> {
    version
        .table(type_name)
        .cloned()
        .ok_or_else(|| StorageError::InvalidData(format!("unknown record type '{}'", type_name)))
}

/// Intersect the probes' posting lists, smallest first
fn candidate_ids(table: &Table, probes: &[IndexProbe]) -> RoaringTreemap {
    let mut acc: Option<RoaringTreemap> = None;
    for probe in probes {
        let mut ids = RoaringTreemap::new();
        if let Some(index) = table.index(&probe.field) {
            for value in &probe.values {
                if let Some(posting) = index.lookup(value) {
                    ids |= posting;
                }
            }
        }
        let next = match acc {
            None => ids,
            Some(prev) => prev & ids,
        };
        if next.is_empty() {
            return next;
        }
        acc = Some(next);
    }
    acc.unwrap_or_else(RoaringTreemap::new)
}

enum Source {
    /// Ascending walk over table rows; `next` is the lowest id not yet visited
    Scan { next: Option<RecordId> },
    /// Index candidates (ascending)
    Ids(roaring::treemap::IntoIter),
    /// Already filtered and ordered
    Buffered(std::vec::IntoIter<Result<Arc<Record>>>),
}

/// Lazy query result
///
/// Holds the version it reads, so later commits do not affect it. Yields
/// one `Err` per record whose relationship could not be followed; iteration
/// continues past it.
pub struct Cursor {
    version: Arc<StoreVersion>,
    table: Arc<Table>,
    source: Source,
    residual: Option<Predicate>,
    remaining: Option<usize>,
}

impl Cursor {
    /// Version this cursor reads
    pub fn version(&self) -> &Arc<StoreVersion> {
        &self.version
    }

    /// Collect matching records, failing on the first error
    pub fn into_records(self) -> Result<Vec<Arc<Record>>> {
        self.collect()
    }

    fn next_candidate(&mut self) -> Option<Arc<Record>> {
        loop {
            match &mut self.source {
                Source::Scan { next } => {
                    let from = (*next)?;
                    let (id, record) = self.table.rows.range(from..).next()?;
                    *next = id.checked_add(1);
                    return Some(record.clone());
                }
                Source::Ids(ids) => {
                    let id = ids.next()?;
                    if let Some(record) = self.table.get(id) {
                        return Some(record.clone());
                    }
                }
                Source::Buffered(_) => return None,
            }
        }
    }

    fn drain_candidates(&mut self) -> Vec<Arc<Record>> {
        std::iter::from_fn(|| self.next_candidate()).collect()
    }

    fn take_slot(&mut self) {
        if let Some(n) = &mut self.remaining {
            *n = n.saturating_sub(1);
        }
    }
}

impl Iterator for Cursor {
    type Item = Result<Arc<Record>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == Some(0) {
            return None;
        }
        if let Source::Buffered(items) = &mut self.source {
            return items.next();
        }

        loop {
            let record = self.next_candidate()?;
            let outcome = match &self.residual {
                None => Ok(true),
                Some(residual) => residual.evaluate(&record, &*self.version),
            };
            match outcome {
                Ok(false) => continue,
                Ok(true) => {
                    self.take_slot();
                    return Some(Ok(record));
                }
                Err(err) => {
                    self.take_slot();
                    return Some(Err(err));
                }
            }
        }
    }
}
