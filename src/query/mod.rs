//! Query layer: predicates, planning and execution

mod executor;
mod planner;
mod predicate;
mod sort;

pub use executor::{Cursor, ExecutionEngine};
pub use planner::{AccessPath, IndexProbe, QueryPlan, QueryPlanner};
pub use predicate::{CompareOp, Predicate};
pub use sort::{Direction, SortKey, SortSpec};

/// Query over one record type
///
/// ```ignore
/// let query = Query::new("User")
///     .filter(Predicate::eq("firstName", "Jane"))
///     .sort_by("age", Direction::Descending)
///     .limit(10);
/// for user in db.query(&query)? {
///     println!("{:?}", user?);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Query {
    pub type_name: String,
    pub predicate: Predicate,
    pub sort: SortSpec,
    pub limit: Option<usize>,
}

impl Query {
    /// Every record of `type_name`, in id order
    pub fn new(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            predicate: Predicate::All,
            sort: SortSpec::new(),
            limit: None,
        }
    }

    /// AND `predicate` into the filter
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = std::mem::replace(&mut self.predicate, Predicate::All).and(predicate);
        self
    }

    pub fn sort_by(mut self, field: &str, direction: Direction) -> Self {
        self.sort = SortSpec::by(field, direction);
        self
    }

    pub fn then_by(mut self, field: &str, direction: Direction) -> Self {
        self.sort = std::mem::take(&mut self.sort).then_by(field, direction);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}
