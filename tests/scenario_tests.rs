//! End-to-end workload scenarios

use recordb::query::{Predicate, Query};
use recordb::workload::users::{self, USER};
use recordb::{DBConfig, Database, Record, StorageError};

fn users_db(config: DBConfig) -> Database {
    let db = Database::with_config(config).unwrap();
    db.declare_type(users::user_schema()).unwrap();
    db.declare_index(USER, "firstName").unwrap();
    db
}

fn by_name(name: &str) -> Query {
    Query::new(USER).filter(Predicate::eq("firstName", name))
}

#[test]
fn test_hundred_thousand_users_rename_janes() {
    // benchmark preset: full scans above 20k candidates run in parallel
    let db = users_db(DBConfig::for_benchmark());
    let created = db.create_many(users::generate_users(100_000, 2024)).unwrap();
    assert_eq!(created, 100_000);
    assert_eq!(db.count(&Query::new(USER)).unwrap(), 100_000);

    let janes = db.query(&users::janes_by_age()).unwrap().into_records().unwrap();
    assert!(!janes.is_empty());
    assert!(janes.iter().all(|u| u.get("firstName").as_text() == Some("Jane")));
    assert!(janes
        .windows(2)
        .all(|w| w[0].get("age").as_integer() <= w[1].get("age").as_integer()));

    let wendys_before = db.count(&by_name("Wendy")).unwrap();
    let renamed = db
        .update_where(&by_name("Jane"), |u| u.set("firstName", "Wendy"))
        .unwrap();
    assert_eq!(renamed, janes.len());

    assert_eq!(db.count(&by_name("Jane")).unwrap(), 0);
    assert_eq!(db.count(&by_name("Wendy")).unwrap(), wendys_before + janes.len());
    // the index and a full scan agree after the rename
    assert_eq!(
        db.query_full_scan(&by_name("Wendy")).unwrap().count(),
        wendys_before + janes.len()
    );

    assert_eq!(db.delete_all(USER).unwrap(), 100_000);
    assert_eq!(db.query(&Query::new(USER)).unwrap().count(), 0);
    assert_eq!(db.query(&by_name("Wendy")).unwrap().count(), 0);
    assert_eq!(db.storage_size(), 0);
}

#[test]
fn test_chunked_and_single_batch_store_the_same() {
    let single = users_db(DBConfig::for_testing());
    let chunked = users_db(DBConfig::for_testing());
    single.create_many(users::generate_users(2_500, 9)).unwrap();
    chunked
        .create_many_chunked(users::generate_users(2_500, 9), 1_000)
        .unwrap();

    assert_eq!(single.storage_size(), chunked.storage_size());
    assert_eq!(
        single.count(&by_name("Jane")).unwrap(),
        chunked.count(&by_name("Jane")).unwrap()
    );
    assert!(chunked.stats().total_committed >= 3);
}

#[test]
fn test_student_linked_to_school_deleted_in_same_transaction() {
    let db = Database::with_config(DBConfig::for_testing()).unwrap();
    for schema in [
        recordb::workload::students::school_schema(),
        recordb::workload::students::grade_schema(),
        recordb::workload::students::student_schema(),
    ] {
        db.declare_type(schema).unwrap();
    }

    let mut txn = db.begin().unwrap();
    let school = txn
        .insert(
            Record::new("School")
                .with("name", "Falconwood College")
                .with("location", "Falconwood")
                .with("type", "comprehensive"),
        )
        .unwrap();
    txn.insert(
        Record::new("Student")
            .with("firstName", "Jane")
            .with("lastName", "Smith")
            .with_one("school", Some(school)),
    )
    .unwrap();
    txn.delete("School", school).unwrap();

    let err = txn.commit().unwrap_err();
    assert!(matches!(
        err,
        StorageError::DanglingReference { ref relation, target_id, .. }
            if relation == "school" && target_id == school
    ));
    assert!(!txn.is_open());
    assert_eq!(db.count(&Query::new("School")).unwrap(), 0);
    assert_eq!(db.count(&Query::new("Student")).unwrap(), 0);
}

#[test]
fn test_students_scenario_end_to_end() {
    let db = Database::with_config(DBConfig::for_testing()).unwrap();
    let options = recordb::workload::ScenarioOptions {
        chunk: Some(250),
        ..recordb::workload::ScenarioOptions::new(1_000)
    };
    let report = recordb::workload::students::run(&db, &options).unwrap();

    let create = report.phase_named("Create students").unwrap();
    assert_eq!(create.detail.as_deref(), Some("1,000 students, 8,000 grades"));
    assert!(report.to_string().contains("Fail the cheating Maths students"));
    assert_eq!(db.stats().total_records, 0);
}
