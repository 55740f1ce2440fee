//! Query planner
//!
//! Splits the predicate into top-level conjuncts. Equality (and IN) terms on
//! indexed fields become index probes, ordered by estimated result size so
//! the executor intersects the smallest set first. Everything else (OR,
//! comparisons, relationship terms, unindexed fields) stays in the residual
//! filter applied to the candidates.

use super::predicate::Predicate;
use super::sort::SortSpec;
use super::Query;
use crate::storage::{StoreVersion, Table};
use crate::types::Value;
use crate::{Result, StorageError};
use std::fmt::Write as _;

/// Index probe for one conjunct
#[derive(Debug, Clone)]
pub struct IndexProbe {
    pub field: String,
    /// Union of these keys (one for `=`, several for `IN`)
    pub values: Vec<Value>,
    pub estimated_rows: u64,
}

/// How candidate ids are produced
#[derive(Debug, Clone)]
pub enum AccessPath {
    /// Every row of the table
    FullScan { estimated_rows: u64 },
    /// Intersection of index probes, smallest first
    IndexIntersection { probes: Vec<IndexProbe> },
}

/// Execution plan for one query
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub type_name: String,
    pub access: AccessPath,
    /// Filter applied to each candidate (None = candidates all match)
    pub residual: Option<Predicate>,
    pub sort: SortSpec,
    pub limit: Option<usize>,
}

impl QueryPlan {
    pub fn uses_index(&self) -> bool {
        matches!(self.access, AccessPath::IndexIntersection { .. })
    }

    /// Human readable plan
    pub fn explain(&self) -> String {
        let mut out = String::new();
        match &self.access {
            AccessPath::FullScan { estimated_rows } => {
                let _ = writeln!(out, "SCAN {} (~{} rows)", self.type_name, estimated_rows);
            }
            AccessPath::IndexIntersection { probes } => {
                for (i, probe) in probes.iter().enumerate() {
                    let verb = if i == 0 { "INDEX LOOKUP" } else { "INTERSECT" };
                    let _ = writeln!(
                        out,
                        "{} {}.{} IN {:?} (~{} rows)",
                        verb, self.type_name, probe.field, probe.values, probe.estimated_rows
                    );
                }
            }
        }
        if let Some(residual) = &self.residual {
            let _ = writeln!(out, "FILTER {}", residual);
        }
        if !self.sort.is_empty() {
            let keys: Vec<String> = self
                .sort
                .keys
                .iter()
                .map(|k| format!("{} {:?}", k.field, k.direction))
                .collect();
            let _ = writeln!(out, "SORT {}", keys.join(", "));
        }
        if let Some(limit) = self.limit {
            let _ = writeln!(out, "LIMIT {}", limit);
        }
        out
    }
}

/// Query planner - converts queries to execution plans
#[derive(Debug, Clone)]
pub struct QueryPlanner {
    /// Use declared indexes when possible
    enable_indexes: bool,
}

impl QueryPlanner {
    pub fn new() -> Self {
        Self {
            enable_indexes: true,
        }
    }

    /// Always full-scan (used to cross-check index results)
    pub fn without_indexes() -> Self {
        Self {
            enable_indexes: false,
        }
    }

    pub fn plan(&self, query: &Query, version: &StoreVersion) -> Result<QueryPlan> {
        let table = version.table(&query.type_name).ok_or_else(|| {
            StorageError::InvalidData(format!("unknown record type '{}'", query.type_name))
        })?;
        query.predicate.validate(&table.schema, version)?;
        query.sort.validate(&table.schema)?;

        let mut conjuncts = Vec::new();
        flatten_and(&query.predicate, &mut conjuncts);

        let mut probes = Vec::new();
        let mut residual = Vec::new();
        for term in conjuncts {
            match self.probe_for(table, term) {
                Some(probe) => probes.push(probe),
                None => residual.push(term.clone()),
            }
        }
        probes.sort_by_key(|p| p.estimated_rows);

        let access = if probes.is_empty() {
            AccessPath::FullScan {
                estimated_rows: table.len() as u64,
            }
        } else {
            AccessPath::IndexIntersection { probes }
        };
        let residual = match residual.len() {
            0 => None,
            1 => residual.pop(),
            _ => Some(Predicate::And(residual)),
        };

        tracing::trace!(type_name = %query.type_name, uses_index = matches!(access, AccessPath::IndexIntersection { .. }), "query planned");

        Ok(QueryPlan {
            type_name: query.type_name.clone(),
            access,
            residual,
            sort: query.sort.clone(),
            limit: query.limit,
        })
    }

    fn probe_for(&self, table: &Table, term: &Predicate) -> Option<IndexProbe> {
        if !self.enable_indexes {
            return None;
        }
        let (field, values) = match term {
            Predicate::Equals { field, value } => (field, vec![value.clone()]),
            Predicate::In { field, values } => (field, values.clone()),
            _ => return None,
        };
        let index = table.index(field)?;
        let estimated_rows = values.iter().map(|v| index.cardinality(v)).sum();
        Some(IndexProbe {
            field: field.clone(),
            values,
            estimated_rows,
        })
    }
}

impl Default for QueryPlanner {
    fn default() -> Self {
        Self::new()
    }
}

fn flatten_and<'a>(predicate: &'a Predicate, out: &mut Vec<&'a Predicate>) {
    match predicate {
        Predicate::All => {}
        Predicate::And(terms) => terms.iter().for_each(|t| flatten_and(t, out)),
        other => out.push(other),
    }
}
