use crate::storage::{RecordSource, StoreVersion, WriteSet};
use crate::types::{Link, Record, RecordId, RelationDef};
use crate::{Result, StorageError};
use std::sync::Arc;

/// Result of following one relationship
pub enum Resolved<S: RecordSource> {
    /// To-one: the target, or None when the link is empty
    One(Option<Arc<Record>>),
    /// To-many: targets in ascending id order
    Many(ResolveIter<S>),
}

impl<S: RecordSource> Resolved<S> {
    /// Collect every target, failing on the first dangling one
    pub fn into_records(self) -> Result<Vec<Arc<Record>>> {
        match self {
            Resolved::One(target) => Ok(target.into_iter().collect()),
            Resolved::Many(iter) => iter.collect(),
        }
    }
}

/// Lazily fetches to-many targets; yields `Err` for each missing one
pub struct ResolveIter<S: RecordSource> {
    source: S,
    from: Record,
    relation: String,
    target_type: String,
    ids: std::vec::IntoIter<RecordId>,
}

impl<S: RecordSource> ResolveIter<S> {
    /// Targets not yet yielded
    pub fn remaining(&self) -> usize {
        self.ids.len()
    }
}

impl<S: RecordSource> Iterator for ResolveIter<S> {
    type Item = Result<Arc<Record>>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.ids.next()?;
        Some(
            self.source
                .fetch(&self.target_type, id)
                .ok_or_else(|| StorageError::dangling(&self.from, &self.relation, &self.target_type, id)),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.ids.size_hint()
    }
}

/// Follow `relation` from `record`, reading targets through `source`
pub fn resolve<S: RecordSource>(source: S, record: &Record, relation: &str) -> Result<Resolved<S>> {
    let def = relation_def(&source, record, relation)?;
    match record.link(relation) {
        Some(Link::ToOne(None)) | None => Ok(Resolved::One(None)),
        Some(Link::ToOne(Some(id))) => source
            .fetch(&def.target, *id)
            .map(|target| Resolved::One(Some(target)))
            .ok_or_else(|| StorageError::dangling(record, relation, &def.target, *id)),
        Some(Link::ToMany(ids)) => Ok(Resolved::Many(ResolveIter {
            ids: ids.iter().copied().collect::<Vec<_>>().into_iter(),
            from: shallow(record),
            relation: relation.to_string(),
            target_type: def.target,
            source,
        })),
    }
}

/// Check that every link staged in `writes` points at a record that exists
/// once `writes` is applied on top of `latest`
pub fn validate_links(latest: &StoreVersion, writes: &WriteSet) -> Result<()> {
    for record in writes.puts() {
        let Some(table) = latest.table(&record.type_name) else {
            continue;
        };
        for (relation, link) in &record.links {
            let Some(def) = table.schema.relation_def(relation) else {
                continue;
            };
            for target_id in link.targets() {
                if writes.visible(latest, &def.target, target_id).is_none() {
                    return Err(StorageError::dangling(record, relation, &def.target, target_id));
                }
            }
        }
    }
    Ok(())
}

fn relation_def(source: &impl RecordSource, record: &Record, relation: &str) -> Result<RelationDef> {
    source
        .schema(&record.type_name)
        .and_then(|schema| schema.relation_def(relation).cloned())
        .ok_or_else(|| {
            StorageError::InvalidData(format!("unknown relation '{}.{}'", record.type_name, relation))
        })
}

/// Address of `record` without its payload (enough for error reports)
fn shallow(record: &Record) -> Record {
    Record::new(record.type_name.clone()).with_id(record.id)
}
