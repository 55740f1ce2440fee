/// Record type schemas: field and relation definitions
use super::{Link, Record, Value};
use serde::{Deserialize, Serialize};

/// Field data type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Integer,
    Float,
    Bool,
    Text,
}

impl FieldType {
    /// Whether a (non-null) value can be stored in a field of this type
    pub fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (FieldType::Integer, Value::Integer(_))
                | (FieldType::Float, Value::Float(_))
                | (FieldType::Float, Value::Integer(_)) // widened on store
                | (FieldType::Bool, Value::Bool(_))
                | (FieldType::Text, Value::Text(_))
        )
    }
}

/// Field definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
    pub nullable: bool,
}

/// Relation cardinality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationKind {
    ToOne,
    ToMany,
}

/// Relation definition (source type owns the link, target is by type name)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationDef {
    pub name: String,
    pub target: String,
    pub kind: RelationKind,
}

/// Record type schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordSchema {
    /// Record type name
    pub name: String,
    /// Field definitions (declaration order)
    pub fields: Vec<FieldDef>,
    /// Relation definitions
    pub relations: Vec<RelationDef>,
}

impl RecordSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Add a non-nullable field
    pub fn field(mut self, name: &str, field_type: FieldType) -> Self {
        self.fields.push(FieldDef {
            name: name.to_string(),
            field_type,
            nullable: false,
        });
        self
    }

    /// Add a nullable field
    pub fn optional_field(mut self, name: &str, field_type: FieldType) -> Self {
        self.fields.push(FieldDef {
            name: name.to_string(),
            field_type,
            nullable: true,
        });
        self
    }

    /// Add a to-one relation
    pub fn to_one(mut self, name: &str, target: &str) -> Self {
        self.relations.push(RelationDef {
            name: name.to_string(),
            target: target.to_string(),
            kind: RelationKind::ToOne,
        });
        self
    }

    /// Add a to-many relation
    pub fn to_many(mut self, name: &str, target: &str) -> Self {
        self.relations.push(RelationDef {
            name: name.to_string(),
            target: target.to_string(),
            kind: RelationKind::ToMany,
        });
        self
    }

    pub fn field_def(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn relation_def(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Check the schema itself: names must be unique across fields and relations
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("record type name must not be empty".into());
        }
        let mut seen = std::collections::HashSet::new();
        for name in self
            .fields
            .iter()
            .map(|f| &f.name)
            .chain(self.relations.iter().map(|r| &r.name))
        {
            if !seen.insert(name.as_str()) {
                return Err(format!("duplicate member '{}' in type '{}'", name, self.name));
            }
        }
        Ok(())
    }

    /// Validate a record and bring it to canonical form
    ///
    /// - unknown fields / relations are rejected
    /// - missing nullable fields become `Null`, missing non-nullable fields are rejected
    /// - integers stored into float fields are widened
    /// - missing relations become empty links
    pub fn normalize(&self, record: &mut Record) -> Result<(), String> {
        if record.type_name != self.name {
            return Err(format!(
                "record of type '{}' checked against schema '{}'",
                record.type_name, self.name
            ));
        }

        if let Some(unknown) = record.fields.keys().find(|k| self.field_def(k).is_none()) {
            return Err(format!("unknown field '{}' for type '{}'", unknown, self.name));
        }

        for def in &self.fields {
            let value = record
                .fields
                .entry(def.name.clone())
                .or_insert(Value::Null);

            if value.is_null() {
                if !def.nullable {
                    return Err(format!("field '{}' cannot be null", def.name));
                }
                continue;
            }

            if !def.field_type.accepts(value) {
                return Err(format!(
                    "type mismatch for field '{}': expected {:?}, got {}",
                    def.name,
                    def.field_type,
                    value.kind_name()
                ));
            }

            if def.field_type == FieldType::Float {
                if let Value::Integer(i) = *value {
                    *value = Value::Float(i as f64);
                }
            }
        }

        for (name, link) in &record.links {
            let def = self
                .relation_def(name)
                .ok_or_else(|| format!("unknown relation '{}' for type '{}'", name, self.name))?;
            if def.kind != link.kind() {
                return Err(format!(
                    "relation '{}' is {:?}, got {:?} link",
                    name,
                    def.kind,
                    link.kind()
                ));
            }
        }
        for def in &self.relations {
            record
                .links
                .entry(def.name.clone())
                .or_insert_with(|| Link::empty(def.kind));
        }

        Ok(())
    }
}
