//! Transaction, relationship and isolation behaviour through the public API

use std::sync::Arc;
use std::thread;

use recordb::query::{CompareOp, Direction, Predicate, Query};
use recordb::types::RecordSchema;
use recordb::{DBConfig, Database, FieldType, Record, Resolved, StorageError, TransactionState, Value};

fn school_db(config: DBConfig) -> Database {
    let db = Database::with_config(config).unwrap();
    db.declare_type(
        RecordSchema::new("School")
            .field("name", FieldType::Text)
            .optional_field("founded", FieldType::Integer),
    )
    .unwrap();
    db.declare_type(
        RecordSchema::new("Student")
            .field("firstName", FieldType::Text)
            .field("score", FieldType::Float)
            .to_one("school", "School")
            .to_many("friends", "Student"),
    )
    .unwrap();
    db
}

fn db() -> Database {
    school_db(DBConfig::for_testing())
}

fn school(name: &str) -> Record {
    Record::new("School").with("name", name)
}

fn student(name: &str) -> Record {
    Record::new("Student").with("firstName", name).with("score", 1.5)
}

#[test]
fn test_insert_get_round_trip() {
    let db = db();
    let mut txn = db.begin().unwrap();
    let id = txn.insert(school("Falconwood College").with("founded", 1901)).unwrap();
    txn.commit().unwrap();

    let stored = db.get("School", id).unwrap();
    assert_eq!(stored.id, id);
    assert_eq!(stored.get("name"), &Value::from("Falconwood College"));
    assert_eq!(stored.get("founded"), &Value::Integer(1901));
}

#[test]
fn test_missing_optional_field_is_null_and_int_widens() {
    let db = db();
    let mut txn = db.begin().unwrap();
    let school_id = txn.insert(school("Hillside")).unwrap();
    let student_id = txn
        .insert(Record::new("Student").with("firstName", "Jane").with("score", 7))
        .unwrap();
    txn.commit().unwrap();

    assert!(db.get("School", school_id).unwrap().get("founded").is_null());
    assert_eq!(db.get("Student", student_id).unwrap().get("score"), &Value::Float(7.0));
}

#[test]
fn test_schema_violation_aborts() {
    let db = db();
    let mut txn = db.begin().unwrap();
    txn.insert(school("Kept until abort")).unwrap();

    let err = txn
        .insert(Record::new("School").with("name", "x").with("colour", "red"))
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidData(_)));
    assert_eq!(txn.state(), TransactionState::Aborted);
    assert!(matches!(
        txn.insert(school("again")),
        Err(StorageError::NoActiveTransaction)
    ));
    assert_eq!(db.count(&Query::new("School")).unwrap(), 0);

    let mut txn = db.begin().unwrap();
    assert!(matches!(
        txn.insert(Record::new("School").with("name", 12)),
        Err(StorageError::InvalidData(_))
    ));
}

#[test]
fn test_read_your_writes_and_isolation() {
    let db = db();
    let mut txn = db.begin().unwrap();
    let id = txn.insert(school("Hillside")).unwrap();

    assert_eq!(txn.get("School", id).unwrap().get("name").as_text(), Some("Hillside"));
    assert!(matches!(db.get("School", id), Err(StorageError::NotFound { .. })));

    txn.update("School", id, |s| s.set("name", "Hillside Academy")).unwrap();
    assert_eq!(
        txn.get("School", id).unwrap().get("name").as_text(),
        Some("Hillside Academy")
    );

    txn.commit().unwrap();
    assert_eq!(
        db.get("School", id).unwrap().get("name").as_text(),
        Some("Hillside Academy")
    );
}

#[test]
fn test_not_found_does_not_abort() {
    let db = db();
    let mut txn = db.begin().unwrap();
    assert!(matches!(txn.get("School", 99), Err(StorageError::NotFound { .. })));
    assert!(txn.is_open());
    txn.insert(school("Still open")).unwrap();
    txn.commit().unwrap();

    let mut txn = db.begin().unwrap();
    assert!(matches!(txn.delete("School", 99), Err(StorageError::NotFound { .. })));
    assert!(!txn.is_open());
}

#[test]
fn test_finished_transaction_rejects_everything() {
    let db = db();
    let mut txn = db.begin().unwrap();
    txn.insert(school("A")).unwrap();
    txn.commit().unwrap();

    assert!(matches!(txn.commit(), Err(StorageError::NoActiveTransaction)));
    assert!(matches!(txn.abort(), Err(StorageError::NoActiveTransaction)));
    assert!(matches!(txn.get("School", 1), Err(StorageError::NoActiveTransaction)));

    let mut txn = db.begin().unwrap();
    txn.abort().unwrap();
    assert!(matches!(txn.insert(school("B")), Err(StorageError::NoActiveTransaction)));
}

#[test]
fn test_duplicate_explicit_id() {
    let db = db();
    let mut txn = db.begin().unwrap();
    txn.insert(school("A").with_id(5)).unwrap();
    txn.commit().unwrap();

    let mut txn = db.begin().unwrap();
    let err = txn.insert(school("B").with_id(5)).unwrap_err();
    assert!(matches!(err, StorageError::DuplicateId { id: 5, .. }));
    assert!(!txn.is_open());

    // allocation continues past the explicit id
    let mut txn = db.begin().unwrap();
    assert_eq!(txn.insert(school("C")).unwrap(), 6);
}

#[test]
fn test_update_cannot_move_record() {
    let db = db();
    let mut txn = db.begin().unwrap();
    let id = txn.insert(school("A")).unwrap();
    let err = txn.update("School", id, |s| s.id = 1_000).unwrap_err();
    assert!(matches!(err, StorageError::InvalidData(_)));
    assert!(!txn.is_open());
}

#[test]
fn test_sequential_commits_are_atomic() {
    let db = db();
    let mut t1 = db.begin().unwrap();
    let a = t1.insert(school("A")).unwrap();
    t1.insert(school("B")).unwrap();
    t1.commit().unwrap();

    let mut t2 = db.begin().unwrap();
    t2.delete("School", a).unwrap();
    t2.insert(school("C")).unwrap();
    t2.commit().unwrap();

    let names: Vec<String> = db
        .query(&Query::new("School"))
        .unwrap()
        .map(|r| r.unwrap().get("name").to_string())
        .collect();
    assert_eq!(names, vec!["B", "C"]);
}

#[test]
fn test_single_writer_busy_until_dropped() {
    let db = db();
    let txn = db.begin().unwrap();
    assert!(matches!(db.begin(), Err(StorageError::WriterBusy)));
    drop(txn);

    let mut txn = db.begin().unwrap();
    txn.insert(school("A")).unwrap();
    drop(txn);
    assert_eq!(db.stats().total_records, 0);
    assert_eq!(db.stats().total_aborted, 2);
}

#[test]
fn test_multi_writer_conflict_detection() {
    let db = school_db(DBConfig::for_concurrent());
    db.create_many(vec![school("Shared")]).unwrap();
    let id = 1;

    let mut t1 = db.begin().unwrap();
    let mut t2 = db.begin().unwrap();
    let mut t3 = db.begin().unwrap();

    t1.update("School", id, |s| s.set("name", "First")).unwrap();
    t2.update("School", id, |s| s.set("name", "Second")).unwrap();
    t3.insert(school("Unrelated")).unwrap();

    t1.commit().unwrap();
    let err = t2.commit().unwrap_err();
    assert!(matches!(err, StorageError::ConflictDetected { id: 1, .. }));
    assert_eq!(t2.state(), TransactionState::Aborted);
    t3.commit().unwrap();

    assert_eq!(db.get("School", id).unwrap().get("name").as_text(), Some("First"));
    assert_eq!(db.count(&Query::new("School")).unwrap(), 2);
}

#[test]
fn test_link_to_missing_target_fails_commit() {
    let db = db();
    let mut txn = db.begin().unwrap();
    txn.insert(student("Jane").with_one("school", Some(42))).unwrap();
    let err = txn.commit().unwrap_err();
    assert!(matches!(
        err,
        StorageError::DanglingReference { target_id: 42, .. }
    ));
    assert_eq!(db.stats().total_records, 0);
}

#[test]
fn test_link_unlink_and_resolve() {
    let db = db();
    let mut txn = db.begin().unwrap();
    let hillside = txn.insert(school("Hillside")).unwrap();
    let jane = txn.insert(student("Jane")).unwrap();
    let wendy = txn.insert(student("Wendy")).unwrap();
    let bob = txn.insert(student("Bob")).unwrap();

    txn.link("Student", jane, "school", hillside).unwrap();
    txn.link("Student", jane, "friends", wendy).unwrap();
    txn.link("Student", jane, "friends", bob).unwrap();
    // cycle back to jane
    txn.link("Student", wendy, "friends", jane).unwrap();
    txn.unlink("Student", jane, "friends", bob).unwrap();

    let staged = txn.get("Student", jane).unwrap();
    match txn.resolve(&staged, "school").unwrap() {
        Resolved::One(Some(s)) => assert_eq!(s.id, hillside),
        _ => panic!("expected a school"),
    }
    txn.commit().unwrap();

    let jane_rec = db.get("Student", jane).unwrap();
    let friends = db.resolve(&jane_rec, "friends").unwrap().into_records().unwrap();
    assert_eq!(friends.iter().map(|f| f.id).collect::<Vec<_>>(), vec![wendy]);

    let wendy_rec = db.get("Student", wendy).unwrap();
    let back = db.resolve(&wendy_rec, "friends").unwrap().into_records().unwrap();
    assert_eq!(back[0].id, jane);

    let mut txn = db.begin().unwrap();
    txn.clear_link("Student", jane, "school").unwrap();
    assert!(matches!(
        txn.link("Student", jane, "mentor", 1),
        Err(StorageError::InvalidData(_))
    ));
}

#[test]
fn test_deleted_target_reports_dangling_on_read() {
    let db = db();
    let mut txn = db.begin().unwrap();
    let hillside = txn.insert(school("Hillside")).unwrap();
    let falconwood = txn.insert(school("Falconwood College")).unwrap();
    let jane = txn.insert(student("Jane").with_one("school", Some(hillside))).unwrap();
    let wendy = txn.insert(student("Wendy").with_one("school", Some(falconwood))).unwrap();
    txn.commit().unwrap();

    // deleting a linked target later is allowed
    let mut txn = db.begin().unwrap();
    txn.delete("School", hillside).unwrap();
    txn.commit().unwrap();

    let jane_rec = db.get("Student", jane).unwrap();
    assert!(matches!(
        db.resolve(&jane_rec, "school"),
        Err(StorageError::DanglingReference { target_id, .. }) if target_id == hillside
    ));

    let query = Query::new("Student").filter(Predicate::related(
        "school",
        Predicate::contains("name", "College"),
    ));
    let results: Vec<_> = db.query(&query).unwrap().collect();
    assert_eq!(results.len(), 2);
    assert!(matches!(
        &results[0],
        Err(StorageError::DanglingReference { source_id, .. }) if *source_id == jane
    ));
    assert_eq!(results[1].as_ref().unwrap().id, wendy);
    assert!(matches!(db.count(&query), Err(StorageError::DanglingReference { .. })));
}

#[test]
fn test_staged_write_limit() {
    let config = DBConfig {
        max_staged_writes: Some(2),
        ..DBConfig::for_testing()
    };
    let db = school_db(config);
    let mut txn = db.begin().unwrap();
    let a = txn.insert(school("A")).unwrap();
    txn.insert(school("B")).unwrap();
    // rewriting a staged record does not count twice
    txn.update("School", a, |s| s.set("name", "AA")).unwrap();
    assert!(matches!(
        txn.insert(school("C")),
        Err(StorageError::ResourceExhausted(_))
    ));
    assert!(!txn.is_open());
    assert_eq!(db.stats().total_records, 0);
}

#[test]
fn test_invalid_predicates() {
    let db = db();
    let bad = [
        Query::new("School").filter(Predicate::eq("colour", "red")),
        Query::new("School").filter(Predicate::eq("name", 3)),
        Query::new("School").filter(Predicate::contains("founded", "19")),
        Query::new("School").filter(Predicate::cmp("founded", CompareOp::Gt, Value::Null)),
        Query::new("Student").filter(Predicate::any_related("school", Predicate::All)),
    ];
    for query in &bad {
        assert!(
            matches!(db.query(query), Err(StorageError::InvalidPredicate(_))),
            "expected rejection of {}",
            query.predicate
        );
    }
}

#[test]
fn test_readers_run_while_writer_is_open() {
    let db = Arc::new(db());
    db.create_many((0..100).map(|i| school(&format!("School {i}"))))
        .unwrap();

    let mut txn = db.begin().unwrap();
    txn.insert(school("Uncommitted")).unwrap();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let db = Arc::clone(&db);
            thread::spawn(move || db.count(&Query::new("School")).unwrap())
        })
        .collect();
    for reader in readers {
        assert_eq!(reader.join().unwrap(), 100);
    }

    txn.commit().unwrap();
    assert_eq!(db.count(&Query::new("School")).unwrap(), 101);
}

#[test]
fn test_sorting_float_field_with_nan() {
    let db = Database::with_config(DBConfig::for_testing()).unwrap();
    db.declare_type(RecordSchema::new("Reading").field("x", FieldType::Float))
        .unwrap();
    db.create_many((0..2_000u32).map(|i| {
        let x = if i % 3 == 0 { f64::NAN } else { f64::from(i % 50) };
        Record::new("Reading").with("x", x)
    }))
    .unwrap();

    let query = Query::new("Reading").sort_by("x", Direction::Ascending);
    let readings = db.query(&query).unwrap().into_records().unwrap();
    assert_eq!(readings.len(), 2_000);

    let xs: Vec<f64> = readings
        .iter()
        .map(|r| match r.get("x") {
            Value::Float(f) => *f,
            other => panic!("unexpected value {:?}", other),
        })
        .collect();
    let ordered = xs.iter().take_while(|x| !x.is_nan()).count();
    assert_eq!(ordered, 1_333);
    assert!(xs[..ordered].windows(2).all(|w| w[0] <= w[1]));
    assert!(xs[ordered..].iter().all(|x| x.is_nan()));
}

mod logging {
    use super::*;
    use parking_lot::Mutex;
    use std::fmt;
    use tracing::field::{Field, Visit};
    use tracing::{Event, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    #[derive(Clone, Default)]
    struct FieldNames(Arc<Mutex<Vec<String>>>);

    struct Names<'a>(&'a mut Vec<String>);

    impl Visit for Names<'_> {
        fn record_debug(&mut self, field: &Field, _value: &dyn fmt::Debug) {
            self.0.push(field.name().to_string());
        }
    }

    impl<S: Subscriber> Layer<S> for FieldNames {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let mut names = Vec::new();
            event.record(&mut Names(&mut names));
            self.0.lock().extend(names);
        }
    }

    #[test]
    fn test_failures_are_returned_not_logged() {
        let names = FieldNames::default();
        let subscriber = tracing_subscriber::registry().with(names.clone());

        tracing::subscriber::with_default(subscriber, || {
            let db = db();
            let mut txn = db.begin().unwrap();
            txn.insert(student("Jane").with_one("school", Some(42))).unwrap();
            assert!(matches!(txn.commit(), Err(StorageError::DanglingReference { .. })));

            let mut txn = db.begin().unwrap();
            assert!(txn.delete("School", 7).is_err());
        });

        let names = names.0.lock();
        assert!(names.iter().any(|n| n == "txn_id"));
        assert!(!names.iter().any(|n| n == "error"));
    }
}
