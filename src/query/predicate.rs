//! Predicates over record fields and relationships
//!
//! A predicate is a tree of tagged variants evaluated by a small recursive
//! interpreter. Relationship terms look up linked records by id through a
//! `RecordSource`; a link whose target is missing surfaces as
//! `DanglingReference` instead of evaluating to false.

use crate::storage::RecordSource;
use crate::types::{FieldType, Link, Record, RecordSchema, RelationKind, Value};
use crate::{Result, StorageError};
use std::cmp::Ordering;
use std::fmt;

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Ne,
}

impl CompareOp {
    fn test(&self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
            CompareOp::Ne => ordering != Ordering::Equal,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Ne => "!=",
        }
    }
}

/// Boolean filter over one record type
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Always true
    All,
    /// field = value
    Equals { field: String, value: Value },
    /// field <op> value
    Compare { field: String, op: CompareOp, value: Value },
    /// Text field contains a substring
    Contains { field: String, needle: String },
    /// field is one of the values
    In { field: String, values: Vec<Value> },
    /// The to-one target exists and satisfies the nested predicate
    Related { relation: String, predicate: Box<Predicate> },
    /// Some to-many target satisfies the nested predicate
    AnyRelated { relation: String, predicate: Box<Predicate> },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Predicate::Equals {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn cmp(field: &str, op: CompareOp, value: impl Into<Value>) -> Self {
        Predicate::Compare {
            field: field.to_string(),
            op,
            value: value.into(),
        }
    }

    pub fn contains(field: &str, needle: &str) -> Self {
        Predicate::Contains {
            field: field.to_string(),
            needle: needle.to_string(),
        }
    }

    pub fn one_of<V: Into<Value>>(field: &str, values: impl IntoIterator<Item = V>) -> Self {
        Predicate::In {
            field: field.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn related(relation: &str, predicate: Predicate) -> Self {
        Predicate::Related {
            relation: relation.to_string(),
            predicate: Box::new(predicate),
        }
    }

    pub fn any_related(relation: &str, predicate: Predicate) -> Self {
        Predicate::AnyRelated {
            relation: relation.to_string(),
            predicate: Box::new(predicate),
        }
    }

    /// `self AND other`, flattening nested conjunctions
    pub fn and(self, other: Predicate) -> Self {
        match (self, other) {
            (Predicate::All, p) | (p, Predicate::All) => p,
            (Predicate::And(mut a), Predicate::And(b)) => {
                a.extend(b);
                Predicate::And(a)
            }
            (Predicate::And(mut a), p) => {
                a.push(p);
                Predicate::And(a)
            }
            (p, Predicate::And(mut b)) => {
                b.insert(0, p);
                Predicate::And(b)
            }
            (a, b) => Predicate::And(vec![a, b]),
        }
    }

    /// `self OR other`
    pub fn or(self, other: Predicate) -> Self {
        match (self, other) {
            (Predicate::Or(mut a), p) => {
                a.push(p);
                Predicate::Or(a)
            }
            (a, b) => Predicate::Or(vec![a, b]),
        }
    }

    /// Check field names, relation names and literal types against the schema
    pub fn validate(&self, schema: &RecordSchema, source: &dyn RecordSource) -> Result<()> {
        match self {
            Predicate::All => Ok(()),
            Predicate::Equals { field, value } | Predicate::Compare { field, value, .. } => {
                check_literal(schema, field, value)
            }
            Predicate::In { field, values } => {
                values.iter().try_for_each(|v| check_literal(schema, field, v))
            }
            Predicate::Contains { field, .. } => {
                let def = field_def(schema, field)?;
                if def != FieldType::Text {
                    return Err(StorageError::InvalidPredicate(format!(
                        "CONTAINS needs a Text field, '{}.{}' is {:?}",
                        schema.name, field, def
                    )));
                }
                Ok(())
            }
            Predicate::Related { relation, predicate } => {
                let target = relation_target(schema, relation, RelationKind::ToOne, source)?;
                predicate.validate(&target, source)
            }
            Predicate::AnyRelated { relation, predicate } => {
                let target = relation_target(schema, relation, RelationKind::ToMany, source)?;
                predicate.validate(&target, source)
            }
            Predicate::And(terms) | Predicate::Or(terms) => {
                terms.iter().try_for_each(|t| t.validate(schema, source))
            }
        }
    }

    /// Evaluate against one record
    pub fn evaluate(&self, record: &Record, source: &dyn RecordSource) -> Result<bool> {
        match self {
            Predicate::All => Ok(true),
            Predicate::Equals { field, value } => Ok(record.get(field).matches(value)),
            Predicate::Compare { field, op, value } => Ok(record
                .get(field)
                .partial_cmp(value)
                .is_some_and(|ordering| op.test(ordering))),
            Predicate::Contains { field, needle } => Ok(record
                .get(field)
                .as_text()
                .is_some_and(|text| text.contains(needle.as_str()))),
            Predicate::In { field, values } => {
                let actual = record.get(field);
                Ok(values.iter().any(|v| actual.matches(v)))
            }
            Predicate::Related { relation, predicate } => {
                let target_type = target_type(record, relation, source)?;
                match record.link(relation) {
                    Some(Link::ToOne(Some(id))) => {
                        let target = fetch_target(record, relation, &target_type, *id, source)?;
                        predicate.evaluate(&target, source)
                    }
                    _ => Ok(false),
                }
            }
            Predicate::AnyRelated { relation, predicate } => {
                let target_type = target_type(record, relation, source)?;
                let Some(Link::ToMany(ids)) = record.link(relation) else {
                    return Ok(false);
                };
                for id in ids {
                    let target = fetch_target(record, relation, &target_type, *id, source)?;
                    if predicate.evaluate(&target, source)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Predicate::And(terms) => {
                for term in terms {
                    if !term.evaluate(record, source)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Predicate::Or(terms) => {
                for term in terms {
                    if term.evaluate(record, source)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::All => write!(f, "TRUE"),
            Predicate::Equals { field, value } => write!(f, "{} = {:?}", field, value),
            Predicate::Compare { field, op, value } => {
                write!(f, "{} {} {:?}", field, op.symbol(), value)
            }
            Predicate::Contains { field, needle } => write!(f, "{} CONTAINS {:?}", field, needle),
            Predicate::In { field, values } => write!(f, "{} IN {:?}", field, values),
            Predicate::Related { relation, predicate } => write!(f, "{}.({})", relation, predicate),
            Predicate::AnyRelated { relation, predicate } => {
                write!(f, "ANY {}.({})", relation, predicate)
            }
            Predicate::And(terms) | Predicate::Or(terms) => {
                let joiner = if matches!(self, Predicate::And(_)) { " AND " } else { " OR " };
                write!(f, "(")?;
                for (i, term) in terms.iter().enumerate() {
                    if i > 0 {
                        write!(f, "{}", joiner)?;
                    }
                    write!(f, "{}", term)?;
                }
                write!(f, ")")
            }
        }
    }
}

fn field_def(schema: &RecordSchema, field: &str) -> Result<FieldType> {
    schema
        .field_def(field)
        .map(|def| def.field_type)
        .ok_or_else(|| {
            StorageError::InvalidPredicate(format!("unknown field '{}.{}'", schema.name, field))
        })
}

fn check_literal(schema: &RecordSchema, field: &str, value: &Value) -> Result<()> {
    let field_type = field_def(schema, field)?;
    let ok = match value {
        Value::Null => false,
        Value::Integer(_) | Value::Float(_) => {
            matches!(field_type, FieldType::Integer | FieldType::Float)
        }
        other => field_type.accepts(other),
    };
    if !ok {
        return Err(StorageError::InvalidPredicate(format!(
            "'{}.{}' is {:?}, cannot compare with {}",
            schema.name,
            field,
            field_type,
            value.kind_name()
        )));
    }
    Ok(())
}

fn relation_target(
    schema: &RecordSchema,
    relation: &str,
    kind: RelationKind,
    source: &dyn RecordSource,
) -> Result<std::sync::Arc<RecordSchema>> {
    let def = schema.relation_def(relation).ok_or_else(|| {
        StorageError::InvalidPredicate(format!("unknown relation '{}.{}'", schema.name, relation))
    })?;
    if def.kind != kind {
        return Err(StorageError::InvalidPredicate(format!(
            "relation '{}.{}' is {:?}",
            schema.name, relation, def.kind
        )));
    }
    source.schema(&def.target).ok_or_else(|| {
        StorageError::InvalidPredicate(format!("relation target type '{}' is not declared", def.target))
    })
}

fn target_type(record: &Record, relation: &str, source: &dyn RecordSource) -> Result<String> {
    source
        .schema(&record.type_name)
        .and_then(|s| s.relation_def(relation).map(|def| def.target.clone()))
        .ok_or_else(|| {
            StorageError::InvalidPredicate(format!(
                "unknown relation '{}.{}'",
                record.type_name, relation
            ))
        })
}

fn fetch_target(
    record: &Record,
    relation: &str,
    target_type: &str,
    id: u64,
    source: &dyn RecordSource,
) -> Result<std::sync::Arc<Record>> {
    source
        .fetch(target_type, id)
        .ok_or_else(|| StorageError::dangling(record, relation, target_type, id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{StoreVersion, Table};
    use std::sync::Arc;

    fn fixture() -> StoreVersion {
        let school = RecordSchema::new("School").field("name", FieldType::Text);
        let grade = RecordSchema::new("Grade")
            .field("subject", FieldType::Text)
            .field("grade", FieldType::Text);
        let student = RecordSchema::new("Student")
            .field("firstName", FieldType::Text)
            .field("age", FieldType::Integer)
            .to_one("school", "School")
            .to_many("grades", "Grade");

        let mut version = StoreVersion::default();
        let mut schools = Table::new(Arc::new(school));
        schools.put(Arc::new(Record::new("School").with_id(1).with("name", "Falconwood College")));
        let mut grades = Table::new(Arc::new(grade));
        grades.put(Arc::new(
            Record::new("Grade").with_id(1).with("subject", "physics").with("grade", "A*"),
        ));
        grades.put(Arc::new(
            Record::new("Grade").with_id(2).with("subject", "maths").with("grade", "B"),
        ));
        version.tables.insert("School".into(), Arc::new(schools));
        version.tables.insert("Grade".into(), Arc::new(grades));
        version.tables.insert("Student".into(), Arc::new(Table::new(Arc::new(student))));
        version
    }

    fn student() -> Record {
        Record::new("Student")
            .with_id(1)
            .with("firstName", "Ada")
            .with("age", 17)
            .with_one("school", Some(1))
            .with_many("grades", [1, 2])
    }

    #[test]
    fn test_field_terms() {
        let version = fixture();
        let s = student();
        let eval = |p: Predicate| p.evaluate(&s, &version).unwrap();

        assert!(eval(Predicate::eq("firstName", "Ada")));
        assert!(eval(Predicate::eq("age", 17.0)));
        assert!(eval(Predicate::cmp("age", CompareOp::Ge, 17)));
        assert!(!eval(Predicate::cmp("age", CompareOp::Lt, 17)));
        assert!(eval(Predicate::cmp("age", CompareOp::Ne, 18)));
        assert!(eval(Predicate::contains("firstName", "d")));
        assert!(eval(Predicate::one_of("firstName", ["Bob", "Ada"])));
        assert!(eval(Predicate::eq("firstName", "Bob").or(Predicate::All)));
        assert!(!eval(Predicate::eq("firstName", "Ada").and(Predicate::eq("age", 3))));
    }

    #[test]
    fn test_relationship_terms() {
        let version = fixture();
        let s = student();

        let physics_a_star = Predicate::any_related(
            "grades",
            Predicate::eq("subject", "physics").and(Predicate::eq("grade", "A*")),
        );
        assert!(physics_a_star.evaluate(&s, &version).unwrap());

        let maths_a_star = Predicate::any_related(
            "grades",
            Predicate::eq("subject", "maths").and(Predicate::eq("grade", "A*")),
        );
        assert!(!maths_a_star.evaluate(&s, &version).unwrap());

        let at_falconwood = Predicate::related("school", Predicate::eq("name", "Falconwood College"));
        assert!(at_falconwood.evaluate(&s, &version).unwrap());

        let homeless = s.clone().with_one("school", None);
        assert!(!at_falconwood.evaluate(&homeless, &version).unwrap());
    }

    #[test]
    fn test_missing_target_is_dangling() {
        let version = fixture();
        let s = student().with_many("grades", [1, 99]);
        let p = Predicate::any_related("grades", Predicate::eq("subject", "history"));
        let err = p.evaluate(&s, &version).unwrap_err();
        assert!(matches!(err, StorageError::DanglingReference { target_id: 99, .. }));
    }

    #[test]
    fn test_validate() {
        let version = fixture();
        let schema = version.schema("Student").unwrap();
        let ok = |p: Predicate| p.validate(&schema, &version).is_ok();

        assert!(ok(Predicate::eq("age", 3.5)));
        assert!(ok(Predicate::any_related("grades", Predicate::eq("subject", "maths"))));
        assert!(!ok(Predicate::eq("nope", 1)));
        assert!(!ok(Predicate::eq("age", "old")));
        assert!(!ok(Predicate::eq("age", Value::Null)));
        assert!(!ok(Predicate::contains("age", "1")));
        assert!(!ok(Predicate::related("grades", Predicate::All)));
        assert!(!ok(Predicate::any_related("school", Predicate::All)));
        assert!(!ok(Predicate::any_related("grades", Predicate::eq("name", "x"))));
    }

    #[test]
    fn test_and_flattens() {
        let p = Predicate::eq("a", 1).and(Predicate::eq("b", 2)).and(Predicate::eq("c", 3));
        assert!(matches!(&p, Predicate::And(terms) if terms.len() == 3));
        assert_eq!(Predicate::All.and(Predicate::eq("a", 1)), Predicate::eq("a", 1));
        assert_eq!(p.to_string(), "(a = Integer(1) AND b = Integer(2) AND c = Integer(3))");
    }
}
