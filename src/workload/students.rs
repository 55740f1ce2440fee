//! Students scenario: linked records and relationship predicates
//!
//! Schools own students (to-one `school`), students own one grade per
//! subject (to-many `grades`).

use super::{ensure_type, format_count, Report, ScenarioOptions};
use crate::query::{Predicate, Query};
use crate::types::{FieldType, Link, Record, RecordId, RecordSchema};
use crate::{Database, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

pub const SCHOOL: &str = "School";
pub const STUDENT: &str = "Student";
pub const GRADE: &str = "Grade";

pub const DEFAULT_SCHOOL_COUNT: usize = 100;

pub const FIRST_SCHOOL: &str = "Falconwood College";
pub const FIRST_SCHOOL_LOCATION: &str = "Falconwood";

pub const SUBJECTS: [&str; 8] = [
    "maths", "physics", "chemistry", "biology", "english", "history", "geography", "french",
];

/// Best first
pub const GRADES: [&str; 7] = ["A*", "A", "B", "C", "D", "E", "F"];

pub const SCHOOL_TYPES: [&str; 4] = ["comprehensive", "grammar", "academy", "independent"];

const PLACES: [&str; 12] = [
    "Ashford", "Brookvale", "Castlemere", "Dunmore", "Elmstead", "Fairhaven", "Glenrock",
    "Highbury", "Ivydale", "Kingsbridge", "Larkhill", "Millbrook",
];

const SCHOOL_SUFFIXES: [&str; 5] = ["Academy", "High School", "College", "Grammar", "School"];

const FIRST_NAMES: [&str; 12] = [
    "Amara", "Ben", "Chloe", "Dev", "Ella", "Finn", "Grace", "Harry", "Isla", "Jack", "Maya",
    "Noah",
];

const LAST_NAMES: [&str; 10] = [
    "Patel", "Khan", "Murphy", "Clarke", "Walker", "Hughes", "Green", "Hall", "Lewis", "Young",
];

pub fn school_schema() -> RecordSchema {
    RecordSchema::new(SCHOOL)
        .field("name", FieldType::Text)
        .field("location", FieldType::Text)
        .field("type", FieldType::Text)
}

pub fn grade_schema() -> RecordSchema {
    RecordSchema::new(GRADE)
        .field("subject", FieldType::Text)
        .field("grade", FieldType::Text)
}

pub fn student_schema() -> RecordSchema {
    RecordSchema::new(STUDENT)
        .field("firstName", FieldType::Text)
        .field("lastName", FieldType::Text)
        .to_one("school", SCHOOL)
        .to_many("grades", GRADE)
}

/// Schools plus students grouped by school index, before any id exists
#[derive(Debug, Clone)]
pub struct Cohort {
    pub schools: Vec<Record>,
    pub students: Vec<StudentSeed>,
}

#[derive(Debug, Clone)]
pub struct StudentSeed {
    pub first_name: String,
    pub last_name: String,
    /// Index into `Cohort::schools`
    pub school: usize,
    /// (subject, grade), one per subject
    pub grades: Vec<(&'static str, &'static str)>,
}

impl Cohort {
    /// `count / school_count` students at each school
    pub fn generate(count: usize, school_count: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let school_count = school_count.max(1);

        let mut schools = vec![school(FIRST_SCHOOL, FIRST_SCHOOL_LOCATION, "comprehensive")];
        while schools.len() < school_count {
            let place = pick(&mut rng, &PLACES);
            let name = format!("{} {}", place, pick(&mut rng, &SCHOOL_SUFFIXES));
            schools.push(school(&name, place, pick(&mut rng, &SCHOOL_TYPES)));
        }

        let per_school = count / school_count;
        let mut students = Vec::with_capacity(per_school * school_count);
        for index in 0..school_count {
            for _ in 0..per_school {
                students.push(StudentSeed {
                    first_name: pick(&mut rng, &FIRST_NAMES).to_string(),
                    last_name: pick(&mut rng, &LAST_NAMES).to_string(),
                    school: index,
                    grades: SUBJECTS
                        .iter()
                        .map(|subject| (*subject, pick(&mut rng, &GRADES)))
                        .collect(),
                });
            }
        }

        Self { schools, students }
    }

    pub fn grade_count(&self) -> usize {
        self.students.iter().map(|s| s.grades.len()).sum()
    }
}

fn school(name: &str, location: &str, kind: &str) -> Record {
    Record::new(SCHOOL)
        .with("name", name)
        .with("location", location)
        .with("type", kind)
}

fn pick(rng: &mut impl Rng, options: &[&'static str]) -> &'static str {
    options.choose(rng).copied().unwrap_or_default()
}

/// Insert a cohort: schools first, then each student with their grades
///
/// With `chunk`, commits after every `chunk` students; otherwise everything
/// lands in one transaction.
pub fn create_cohort(db: &Database, cohort: Cohort, chunk: Option<usize>) -> Result<usize> {
    let chunk = chunk.unwrap_or(usize::MAX).max(1);
    let mut txn = db.begin()?;

    let mut school_ids = Vec::with_capacity(cohort.schools.len());
    for school in cohort.schools {
        school_ids.push(txn.insert(school)?);
    }

    let mut created = 0;
    let mut staged = 0;
    for seed in cohort.students {
        let mut grade_ids = Vec::with_capacity(seed.grades.len());
        for (subject, grade) in seed.grades {
            grade_ids.push(txn.insert(
                Record::new(GRADE).with("subject", subject).with("grade", grade),
            )?);
        }
        txn.insert(
            Record::new(STUDENT)
                .with("firstName", seed.first_name)
                .with("lastName", seed.last_name)
                .with_one("school", school_ids.get(seed.school).copied())
                .with_many("grades", grade_ids),
        )?;

        created += 1;
        staged += 1;
        if staged == chunk {
            txn.commit()?;
            staged = 0;
            txn = db.begin()?;
        }
    }
    txn.commit()?;
    Ok(created)
}

/// Students with an A* in physics
pub fn a_star_in_physics() -> Query {
    Query::new(STUDENT).filter(Predicate::any_related(
        "grades",
        Predicate::eq("subject", "physics").and(Predicate::eq("grade", "A*")),
    ))
}

/// Students at Falconwood College with a maths grade
pub fn falconwood_maths_students() -> Query {
    Query::new(STUDENT).filter(
        Predicate::related("school", Predicate::eq("name", FIRST_SCHOOL))
            .and(Predicate::any_related("grades", Predicate::eq("subject", "maths"))),
    )
}

/// Set every grade of every Falconwood maths student to F
///
/// Returns (students, grades) updated.
pub fn fail_cheating_maths_students(db: &Database) -> Result<(usize, usize)> {
    let mut txn = db.begin()?;
    let cheaters = db
        .query_at(&falconwood_maths_students(), txn.snapshot().clone())?
        .into_records()?;

    let mut failed = 0;
    for student in &cheaters {
        let grade_ids: Vec<RecordId> = student.link("grades").map(Link::targets).unwrap_or_default();
        for id in grade_ids {
            txn.update(GRADE, id, |grade| grade.set("grade", "F"))?;
            failed += 1;
        }
    }
    txn.commit()?;
    Ok((cheaters.len(), failed))
}

/// Delete students, then their grades and schools
pub fn delete_all(db: &Database) -> Result<usize> {
    Ok(db.delete_all(STUDENT)? + db.delete_all(GRADE)? + db.delete_all(SCHOOL)?)
}

/// Run the Students scenario
///
/// Leftover records are cleared untimed first. Phases: instantiate, create,
/// read A* physics students, fail the cheating maths students, measure size,
/// delete all.
pub fn run(db: &Database, options: &ScenarioOptions) -> Result<Report> {
    ensure_type(db, school_schema())?;
    ensure_type(db, grade_schema())?;
    ensure_type(db, student_schema())?;
    if options.indexes {
        db.declare_index(SCHOOL, "name")?;
        db.declare_index(GRADE, "subject")?;
        db.declare_index(GRADE, "grade")?;
    }

    let removed = delete_all(db)?;
    tracing::debug!(removed, "previous students cleared");

    let mut report = Report::new(format!("{} complex objects", format_count(options.count as u64)));

    let cohort = report.phase("Student instantiation", || {
        Ok(Cohort::generate(options.count, DEFAULT_SCHOOL_COUNT, options.seed))
    })?;
    let grades = cohort.grade_count();

    let created = report.phase("Create students", || create_cohort(db, cohort, options.chunk))?;
    report.note(format!(
        "{} students, {} grades",
        format_count(created as u64),
        format_count(grades as u64)
    ));

    let stars = report.phase("Read students with A* in Physics", || db.count(&a_star_in_physics()))?;
    report.note(format!("{} students with an A* in Physics", format_count(stars as u64)));

    let (students, failed) =
        report.phase("Fail the cheating Maths students", || fail_cheating_maths_students(db))?;
    report.note(format!(
        "{} students, {} grades set to F",
        format_count(students as u64),
        format_count(failed as u64)
    ));

    report.record_size(db.storage_size());

    let deleted = report.phase("Delete all students", || delete_all(db))?;
    report.note(format!("{} deleted", format_count(deleted as u64)));

    Ok(report)
}
