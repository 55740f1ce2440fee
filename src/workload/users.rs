//! Users scenario: flat records, indexed lookup, bulk rename

use super::{ensure_type, format_count, Report, ScenarioOptions};
use crate::query::{Direction, Predicate, Query};
use crate::types::{FieldType, Record, RecordSchema};
use crate::{Database, Result, StorageError};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

pub const USER: &str = "User";

pub const FIRST_NAMES: [&str; 20] = [
    "Jane", "Wendy", "Alice", "Bob", "Charlie", "Diana", "Ethan", "Fiona", "George", "Hannah",
    "Isaac", "Julia", "Kevin", "Laura", "Michael", "Nina", "Oscar", "Paula", "Quentin", "Rachel",
];

pub const LAST_NAMES: [&str; 12] = [
    "Smith", "Jones", "Taylor", "Brown", "Williams", "Wilson", "Johnson", "Davies", "Robinson",
    "Wright", "Thompson", "Evans",
];

pub const MIN_AGE: i64 = 18;
pub const MAX_AGE: i64 = 90;

pub fn user_schema() -> RecordSchema {
    RecordSchema::new(USER)
        .field("firstName", FieldType::Text)
        .field("lastName", FieldType::Text)
        .field("age", FieldType::Integer)
}

/// Random user (id left for the store to assign)
pub fn random_user(rng: &mut impl Rng) -> Record {
    let first = FIRST_NAMES.choose(rng).copied().unwrap_or("Jane");
    let last = LAST_NAMES.choose(rng).copied().unwrap_or("Smith");
    Record::new(USER)
        .with("firstName", first)
        .with("lastName", last)
        .with("age", rng.gen_range(MIN_AGE..=MAX_AGE))
}

pub fn generate_users(count: usize, seed: u64) -> Vec<Record> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count).map(|_| random_user(&mut rng)).collect()
}

/// Query for every Jane, youngest first
pub fn janes_by_age() -> Query {
    Query::new(USER)
        .filter(Predicate::eq("firstName", "Jane"))
        .sort_by("age", Direction::Ascending)
}

/// Run the Users scenario
///
/// Leftover users are cleared untimed first. Phases: instantiate, create,
/// fetch Janes in age order, rename Janes to Wendy, measure size, delete all.
pub fn run(db: &Database, options: &ScenarioOptions) -> Result<Report> {
    ensure_type(db, user_schema())?;
    if options.indexes {
        db.declare_index(USER, "firstName")?;
    }

    let removed = db.delete_all(USER)?;
    tracing::debug!(removed, "previous users cleared");

    let mut report = Report::new(format!("{} simple objects", format_count(options.count as u64)));

    let users = report.phase("User instantiation", || {
        Ok(generate_users(options.count, options.seed))
    })?;

    let created = report.phase("Create users", || match options.chunk {
        Some(chunk) => db.create_many_chunked(users, chunk),
        None => db.create_many(users),
    })?;
    report.note(format!("{} users", format_count(created as u64)));

    let janes = report.phase("Fetch users named `Jane` in age order", || {
        db.query(&janes_by_age())?.into_records()
    })?;
    if janes.windows(2).any(|w| w[0].get("age") > w[1].get("age")) {
        return Err(StorageError::InvalidData("Janes are not in age order".into()));
    }
    report.note(format!("{} Janes", format_count(janes.len() as u64)));

    let renamed = report.phase("Rename users named `Jane` to `Wendy`", || {
        db.update_where(&Query::new(USER).filter(Predicate::eq("firstName", "Jane")), |user| {
            user.set("firstName", "Wendy")
        })
    })?;
    report.note(format!("{} renamed", format_count(renamed as u64)));

    report.record_size(db.storage_size());

    let deleted = report.phase("Delete all users", || db.delete_all(USER))?;
    report.note(format!("{} deleted", format_count(deleted as u64)));

    Ok(report)
}
