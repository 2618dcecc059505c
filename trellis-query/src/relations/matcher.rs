//! Attach fetched relation rows to their parents.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::spec::{RelationDescriptor, RelationKind};
use crate::filter::MatchKey;
use crate::record::{Collection, Record, Related};
use crate::row::RowExt;

/// The records fetched for one target model of a relation.
#[derive(Debug, Clone)]
pub struct FetchedGroup {
    /// Descriptor the fetch was constrained with.
    pub descriptor: Arc<RelationDescriptor>,
    /// Fetched records.
    pub records: Vec<Record>,
}

/// Everything fetched for one relation name of a level.
///
/// Only `morphTo` relations produce more than one group, one per resolved
/// target model.
#[derive(Debug, Clone)]
pub struct FetchedRelation {
    /// Relation name.
    pub name: String,
    /// Fetched groups.
    pub groups: Vec<FetchedGroup>,
}

impl FetchedRelation {
    /// Total number of fetched records.
    pub fn record_count(&self) -> usize {
        self.groups.iter().map(|g| g.records.len()).sum()
    }
}

/// Re-associates fetched rows with the parents they were fetched for.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseMatcher;

impl ResponseMatcher {
    /// Attach `fetched` to a single parent.
    pub fn attach_one(parent: &mut Record, fetched: &FetchedRelation) {
        Self::attach_many(std::slice::from_mut(parent), fetched);
    }

    /// Attach `fetched` to every member of `parents`.
    ///
    /// Every parent receives the relation slot: matching records, or an
    /// empty record or collection when nothing matched.
    pub fn attach_many(parents: &mut [Record], fetched: &FetchedRelation) {
        let indexes: Vec<HashMap<MatchKey, Vec<usize>>> =
            fetched.groups.iter().map(index_group).collect();

        for parent in parents.iter_mut() {
            let Some(position) = group_for(parent, &fetched.groups) else {
                continue;
            };
            let group = &fetched.groups[position];
            let descriptor = &group.descriptor;

            let matched: Vec<Record> = parent
                .attributes()
                .non_null(descriptor.parent_key())
                .and_then(|value| value.match_key())
                .and_then(|key| indexes[position].get(&key))
                .map(|hits| hits.iter().map(|&i| group.records[i].clone()).collect())
                .unwrap_or_default();

            let target = Arc::clone(&descriptor.target);
            let related = if descriptor.is_many() {
                Related::Many(Collection::from_records(target, matched))
            } else {
                Related::One(
                    matched
                        .into_iter()
                        .next()
                        .unwrap_or_else(|| Record::new(target)),
                )
            };
            parent.set_relation(fetched.name.as_str(), related);
        }

        debug!(
            relation = %fetched.name,
            parents = parents.len(),
            fetched = fetched.record_count(),
            "Matched relation rows"
        );
    }
}

/// Index a group's records by the column carrying the owner's value.
fn index_group(group: &FetchedGroup) -> HashMap<MatchKey, Vec<usize>> {
    let kind = &group.descriptor.kind;
    let column = kind.match_column();
    let morph = kind.morph_filter();

    let mut index: HashMap<MatchKey, Vec<usize>> = HashMap::new();
    for (i, record) in group.records.iter().enumerate() {
        let row = record.attributes();
        if let Some((morph_key, morph_value)) = morph {
            if row.value(morph_key).as_str() != Some(morph_value) {
                continue;
            }
        }
        if let Some(key) = row.non_null(&column).and_then(|v| v.match_key()) {
            index.entry(key).or_default().push(i);
        }
    }
    index
}

/// The group a parent's rows live in. `morphTo` picks by the parent's
/// discriminator; every other kind has a single group.
fn group_for(parent: &Record, groups: &[FetchedGroup]) -> Option<usize> {
    let first = groups.first()?;
    match &first.descriptor.kind {
        RelationKind::MorphTo { type_key, .. } => {
            let discriminator = parent.attributes().value(type_key).as_str()?;
            groups
                .iter()
                .position(|g| g.descriptor.target.table_name() == discriminator)
        }
        _ => Some(0),
    }
}
