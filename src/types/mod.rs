//! Record and value types
//!
//! A `Record` is a typed bag of named field values plus named links to other
//! records. Links hold identifiers only; resolving them goes through the
//! store (see `relation`).

mod schema;

pub use schema::{FieldDef, FieldType, RecordSchema, RelationDef, RelationKind};

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Record identifier (unique within its record type)
pub type RecordId = u64;

/// Reserved id meaning "let the store assign one"
pub const UNASSIGNED_ID: RecordId = 0;

/// Field value
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    /// Integer value
    Integer(i64),

    /// Floating point value
    Float(f64),

    /// Boolean value
    Bool(bool),

    /// Text string
    Text(String),

    /// Null value
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Name of the value kind, for error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "Integer",
            Value::Float(_) => "Float",
            Value::Bool(_) => "Bool",
            Value::Text(_) => "Text",
            Value::Null => "Null",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Serialized size in bytes (bincode encoding)
    pub fn encoded_size(&self) -> u64 {
        bincode::serialized_size(self).unwrap_or(0)
    }

    /// Equality as used by predicates and indexes: numeric kinds compare by
    /// value, Null never equals anything.
    pub fn matches(&self, other: &Value) -> bool {
        matches!(self.partial_cmp(other), Some(Ordering::Equal))
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a.partial_cmp(b),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.partial_cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.partial_cmp(b),
            (Value::Integer(a), Value::Float(b)) => cmp_int_float(*a, *b),
            (Value::Float(a), Value::Integer(b)) => cmp_int_float(*b, *a).map(Ordering::reverse),
            _ => None,
        }
    }
}

/// Exact `i` vs `f`, without rounding `i` through `f64`
fn cmp_int_float(i: i64, f: f64) -> Option<Ordering> {
    // 2^63: the first float above i64::MAX
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if f.is_nan() {
        return None;
    }
    if f >= LIMIT {
        return Some(Ordering::Less);
    }
    if f < -LIMIT {
        return Some(Ordering::Greater);
    }
    let whole = f.trunc();
    match i.cmp(&(whole as i64)) {
        Ordering::Equal => whole.partial_cmp(&f),
        ordering => Some(ordering),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Text(s) => write!(f, "{}", s),
            Value::Null => write!(f, "NULL"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Stored relationship: target ids only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Link {
    /// To-one reference (None = explicit null)
    ToOne(Option<RecordId>),
    /// To-many reference set
    ToMany(BTreeSet<RecordId>),
}

impl Link {
    pub fn kind(&self) -> RelationKind {
        match self {
            Link::ToOne(_) => RelationKind::ToOne,
            Link::ToMany(_) => RelationKind::ToMany,
        }
    }

    /// Target ids in ascending order
    pub fn targets(&self) -> Vec<RecordId> {
        match self {
            Link::ToOne(target) => target.iter().copied().collect(),
            Link::ToMany(targets) => targets.iter().copied().collect(),
        }
    }

    pub(crate) fn empty(kind: RelationKind) -> Self {
        match kind {
            RelationKind::ToOne => Link::ToOne(None),
            RelationKind::ToMany => Link::ToMany(BTreeSet::new()),
        }
    }
}

/// A typed record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Identifier, `UNASSIGNED_ID` until inserted
    pub id: RecordId,
    /// Record type name (must be declared in the catalog)
    pub type_name: String,
    /// Field values by name
    pub fields: BTreeMap<String, Value>,
    /// Links by relation name
    pub links: BTreeMap<String, Link>,
}

impl Record {
    /// Create an empty record of the given type
    ///
    /// # Example
    /// ```ignore
    /// let user = Record::new("User")
    ///     .with("firstName", "Jane")
    ///     .with("age", 42);
    /// ```
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            id: UNASSIGNED_ID,
            type_name: type_name.into(),
            fields: BTreeMap::new(),
            links: BTreeMap::new(),
        }
    }

    /// Use a caller-supplied id instead of an assigned one
    pub fn with_id(mut self, id: RecordId) -> Self {
        self.id = id;
        self
    }

    /// Set a field value (builder style)
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    /// Set a to-one link (builder style)
    pub fn with_one(mut self, relation: &str, target: Option<RecordId>) -> Self {
        self.links.insert(relation.to_string(), Link::ToOne(target));
        self
    }

    /// Set a to-many link (builder style)
    pub fn with_many(mut self, relation: &str, targets: impl IntoIterator<Item = RecordId>) -> Self {
        self.links
            .insert(relation.to_string(), Link::ToMany(targets.into_iter().collect()));
        self
    }

    /// Field value, `Null` when absent
    pub fn get(&self, field: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.fields.get(field).unwrap_or(&NULL)
    }

    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        self.fields.insert(field.to_string(), value.into());
    }

    pub fn link(&self, relation: &str) -> Option<&Link> {
        self.links.get(relation)
    }

    /// Estimated stored size: serialized field values plus 8 bytes per link id
    pub fn encoded_size(&self) -> u64 {
        let fields: u64 = self.fields.values().map(Value::encoded_size).sum();
        let links: u64 = self
            .links
            .values()
            .map(|link| match link {
                Link::ToOne(t) => t.map_or(0, |_| 8),
                Link::ToMany(ts) => 8 * ts.len() as u64,
            })
            .sum();
        fields + links
    }
}
