//! Records, collections and relation slots.
//!
//! A [`Record`] is one row of a model plus the relations attached to it. A
//! [`Collection`] is an ordered set of records of one model. Both can act
//! as a relation placeholder: built empty by the relation builder, holding
//! the [`RelationDescriptor`] that produced it and a lazily created
//! [`SelectQuery`] the constraint builder narrows before the fetch.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::{QueryError, QueryResult};
use crate::filter::FilterValue;
use crate::model::ModelDef;
use crate::query::SelectQuery;
use crate::relations::{PivotColumn, RelationDescriptor};
use crate::row::{Row, RowExt};

/// A single model row with its attached relations.
#[derive(Debug, Clone)]
pub struct Record {
    model: Arc<ModelDef>,
    attributes: Row,
    relations: IndexMap<String, Related>,
    relation: Option<Arc<RelationDescriptor>>,
    query: Option<SelectQuery>,
}

impl Record {
    /// An empty record of `model`.
    pub fn new(model: Arc<ModelDef>) -> Self {
        Self::with_attributes(model, Row::new())
    }

    /// A record of `model` holding `attributes`.
    pub fn with_attributes(model: Arc<ModelDef>, attributes: Row) -> Self {
        Self {
            model,
            attributes,
            relations: IndexMap::new(),
            relation: None,
            query: None,
        }
    }

    pub(crate) fn placeholder(
        model: Arc<ModelDef>,
        attributes: Row,
        descriptor: Arc<RelationDescriptor>,
    ) -> Self {
        let mut record = Self::with_attributes(model, attributes);
        record.relation = Some(descriptor);
        record
    }

    /// The record's model.
    pub fn model(&self) -> &Arc<ModelDef> {
        &self.model
    }

    /// The model's table.
    pub fn table_name(&self) -> &str {
        self.model.table_name()
    }

    /// The identifier value, when present and not null.
    pub fn id(&self) -> Option<&FilterValue> {
        self.attributes.non_null(self.model.id_attribute())
    }

    /// An attribute value.
    pub fn get(&self, column: &str) -> Option<&FilterValue> {
        self.attributes.get(column)
    }

    /// Set an attribute.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<FilterValue>) -> &mut Self {
        self.attributes.insert(column.into(), value.into());
        self
    }

    /// All attributes, in column order.
    pub fn attributes(&self) -> &Row {
        &self.attributes
    }

    /// Whether the record holds no attributes.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub(crate) fn replace_attributes(&mut self, attributes: Row) {
        self.attributes = attributes;
    }

    /// Take over the attributes and loaded relations of a fetched copy.
    pub(crate) fn absorb(&mut self, fetched: Record) {
        self.attributes = fetched.attributes;
        self.relations.extend(fetched.relations);
    }

    /// Attached relations, in attachment order.
    pub fn relations(&self) -> &IndexMap<String, Related> {
        &self.relations
    }

    /// An attached relation.
    pub fn relation(&self, name: &str) -> Option<&Related> {
        self.relations.get(name)
    }

    /// Attach a relation result, replacing any earlier one under `name`.
    pub fn set_relation(&mut self, name: impl Into<String>, related: Related) {
        self.relations.insert(name.into(), related);
    }

    /// The descriptor of a relation placeholder.
    pub fn descriptor(&self) -> Option<&Arc<RelationDescriptor>> {
        self.relation.as_ref()
    }

    /// The record's query, created on first use.
    pub fn query_mut(&mut self) -> &mut SelectQuery {
        self.query
            .get_or_insert_with(|| SelectQuery::new(self.model.table_name()))
    }

    /// Take the built query, leaving a fresh one for the next use.
    pub fn take_query(&mut self) -> SelectQuery {
        self.query
            .take()
            .unwrap_or_else(|| SelectQuery::new(self.model.table_name()))
    }

    /// Render attributes plus attached relations as JSON.
    pub fn to_json(&self) -> Value {
        let mut object = serde_json::Map::new();
        for (column, value) in &self.attributes {
            object.insert(column.clone(), value.to_json());
        }
        for (name, related) in &self.relations {
            object.insert(name.clone(), related.to_json());
        }
        Value::Object(object)
    }
}

/// An ordered set of records of one model.
#[derive(Debug, Clone)]
pub struct Collection {
    model: Arc<ModelDef>,
    records: Vec<Record>,
    relation: Option<Arc<RelationDescriptor>>,
    query: Option<SelectQuery>,
}

impl Collection {
    /// An empty collection of `model`.
    pub fn new(model: Arc<ModelDef>) -> Self {
        Self::from_records(model, Vec::new())
    }

    /// A collection holding `records`.
    pub fn from_records(model: Arc<ModelDef>, records: Vec<Record>) -> Self {
        Self {
            model,
            records,
            relation: None,
            query: None,
        }
    }

    /// A collection built from raw rows.
    pub fn from_rows(model: Arc<ModelDef>, rows: Vec<Row>) -> Self {
        let records = rows
            .into_iter()
            .map(|row| Record::with_attributes(Arc::clone(&model), row))
            .collect();
        Self::from_records(model, records)
    }

    pub(crate) fn placeholder(model: Arc<ModelDef>, descriptor: Arc<RelationDescriptor>) -> Self {
        let mut collection = Self::new(model);
        collection.relation = Some(descriptor);
        collection
    }

    /// The member model.
    pub fn model(&self) -> &Arc<ModelDef> {
        &self.model
    }

    /// The members.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// The members, mutably.
    pub fn records_mut(&mut self) -> &mut [Record] {
        &mut self.records
    }

    /// Iterate over the members.
    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the collection has no members.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Member at `index`.
    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    /// Member whose identifier equals `id`.
    pub fn find(&self, id: impl Into<FilterValue>) -> Option<&Record> {
        let id = id.into();
        self.records
            .iter()
            .find(|r| r.id().is_some_and(|v| v.correlates_with(&id)))
    }

    /// Append a member.
    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    pub(crate) fn replace_records(&mut self, records: Vec<Record>) {
        self.records = records;
    }

    /// The descriptor of a relation placeholder.
    pub fn descriptor(&self) -> Option<&Arc<RelationDescriptor>> {
        self.relation.as_ref()
    }

    /// Select extra join-table columns on this many-to-many placeholder.
    ///
    /// ```rust
    /// # use std::sync::Arc;
    /// # use trellis_query::model::{ModelDef, Schema};
    /// # use trellis_query::record::Record;
    /// # use trellis_query::relations::{LoadMode, RelationBuilder, RelationDecl};
    /// # use trellis_query::row;
    /// let schema = Schema::new()
    ///     .register(ModelDef::new("Site", "sites")
    ///         .with_relation("admins", RelationDecl::belongs_to_many("Admin")))
    ///     .register(ModelDef::new("Admin", "admins"));
    /// let site = Record::with_attributes(schema.model("Site")?, row! { "id" => 1 });
    ///
    /// let admins = RelationBuilder::new(&schema, LoadMode::Instance)
    ///     .build(&site, "admins")?
    ///     .into_collection()
    ///     .unwrap()
    ///     .with_pivot(["item"])?;
    /// let kind = &admins.descriptor().unwrap().kind;
    /// assert_eq!(kind.pivot_columns()[0].alias, "pivot_item");
    /// # Ok::<(), trellis_query::QueryError>(())
    /// ```
    pub fn with_pivot<I, C>(mut self, columns: I) -> QueryResult<Self>
    where
        I: IntoIterator<Item = C>,
        C: Into<PivotColumn>,
    {
        let descriptor = self.relation.as_mut().ok_or_else(|| {
            QueryError::configuration("withPivot requires a belongsToMany relation placeholder")
        })?;
        Arc::make_mut(descriptor).with_pivot(columns)?;
        Ok(self)
    }

    /// The collection's query, created on first use.
    pub fn query_mut(&mut self) -> &mut SelectQuery {
        self.query
            .get_or_insert_with(|| SelectQuery::new(self.model.table_name()))
    }

    /// Take the built query, leaving a fresh one for the next use.
    pub fn take_query(&mut self) -> SelectQuery {
        self.query
            .take()
            .unwrap_or_else(|| SelectQuery::new(self.model.table_name()))
    }

    /// Render the members as a JSON array.
    pub fn to_json(&self) -> Value {
        Value::Array(self.records.iter().map(Record::to_json).collect())
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// A relation slot: one related record or a related collection.
#[derive(Debug, Clone)]
pub enum Related {
    /// Single-valued relation.
    One(Record),
    /// Multi-valued relation.
    Many(Collection),
}

impl Related {
    /// Whether this is a multi-valued slot.
    pub fn is_many(&self) -> bool {
        matches!(self, Self::Many(_))
    }

    /// The related record of a single-valued slot.
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::One(record) => Some(record),
            Self::Many(_) => None,
        }
    }

    /// The related collection of a multi-valued slot.
    pub fn as_collection(&self) -> Option<&Collection> {
        match self {
            Self::Many(collection) => Some(collection),
            Self::One(_) => None,
        }
    }

    /// Take the record of a single-valued slot.
    pub fn into_record(self) -> Option<Record> {
        match self {
            Self::One(record) => Some(record),
            Self::Many(_) => None,
        }
    }

    /// Take the collection of a multi-valued slot.
    pub fn into_collection(self) -> Option<Collection> {
        match self {
            Self::Many(collection) => Some(collection),
            Self::One(_) => None,
        }
    }

    /// Whether nothing is related: an empty record or an empty collection.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::One(record) => record.is_empty(),
            Self::Many(collection) => collection.is_empty(),
        }
    }

    /// Render the slot as JSON; an empty single-valued slot renders as `{}`.
    pub fn to_json(&self) -> Value {
        match self {
            Self::One(record) => record.to_json(),
            Self::Many(collection) => collection.to_json(),
        }
    }
}

/// Common surface of relation placeholders.
pub trait Relational {
    /// Target model of the placeholder.
    fn model(&self) -> &Arc<ModelDef>;

    /// The descriptor the placeholder carries.
    fn descriptor(&self) -> Option<&Arc<RelationDescriptor>>;

    /// The placeholder's query, created on first use.
    fn query_mut(&mut self) -> &mut SelectQuery;

    /// Take the built query.
    fn take_query(&mut self) -> SelectQuery;

    /// Whether the placeholder is a collection.
    fn is_collection(&self) -> bool;
}

impl Relational for Record {
    fn model(&self) -> &Arc<ModelDef> {
        Record::model(self)
    }

    fn descriptor(&self) -> Option<&Arc<RelationDescriptor>> {
        Record::descriptor(self)
    }

    fn query_mut(&mut self) -> &mut SelectQuery {
        Record::query_mut(self)
    }

    fn take_query(&mut self) -> SelectQuery {
        Record::take_query(self)
    }

    fn is_collection(&self) -> bool {
        false
    }
}

impl Relational for Collection {
    fn model(&self) -> &Arc<ModelDef> {
        Collection::model(self)
    }

    fn descriptor(&self) -> Option<&Arc<RelationDescriptor>> {
        Collection::descriptor(self)
    }

    fn query_mut(&mut self) -> &mut SelectQuery {
        Collection::query_mut(self)
    }

    fn take_query(&mut self) -> SelectQuery {
        Collection::take_query(self)
    }

    fn is_collection(&self) -> bool {
        true
    }
}

impl Relational for Related {
    fn model(&self) -> &Arc<ModelDef> {
        match self {
            Self::One(record) => record.model(),
            Self::Many(collection) => collection.model(),
        }
    }

    fn descriptor(&self) -> Option<&Arc<RelationDescriptor>> {
        match self {
            Self::One(record) => record.descriptor(),
            Self::Many(collection) => collection.descriptor(),
        }
    }

    fn query_mut(&mut self) -> &mut SelectQuery {
        match self {
            Self::One(record) => record.query_mut(),
            Self::Many(collection) => collection.query_mut(),
        }
    }

    fn take_query(&mut self) -> SelectQuery {
        match self {
            Self::One(record) => record.take_query(),
            Self::Many(collection) => collection.take_query(),
        }
    }

    fn is_collection(&self) -> bool {
        self.is_many()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row;
    use pretty_assertions::assert_eq;

    fn site_model() -> Arc<ModelDef> {
        Arc::new(ModelDef::new("Site", "sites"))
    }

    #[test]
    fn test_record_id_ignores_null() {
        let mut record = Record::with_attributes(site_model(), row! { "id" => None::<i64> });
        assert!(record.id().is_none());
        record.set("id", 3);
        assert_eq!(record.id(), Some(&FilterValue::Int(3)));
    }

    #[test]
    fn test_query_is_lazy_and_resettable() {
        let mut record = Record::new(site_model());
        record.query_mut().set_limit(1);
        let taken = record.take_query();
        assert_eq!(taken.table, "sites");
        assert_eq!(taken.limit, Some(1));
        assert_eq!(record.take_query().limit, None);
    }

    #[test]
    fn test_to_json_includes_relations() {
        let model = site_model();
        let mut site = Record::with_attributes(Arc::clone(&model), row! { "id" => 1, "name" => "knexjs.org" });
        site.set_relation("meta", Related::One(Record::new(Arc::clone(&model))));
        site.set_relation(
            "authors",
            Related::Many(Collection::from_rows(model, vec![row! { "id" => 2 }])),
        );

        assert_eq!(
            site.to_json(),
            serde_json::json!({
                "id": 1,
                "name": "knexjs.org",
                "meta": {},
                "authors": [{ "id": 2 }],
            })
        );
    }

    #[test]
    fn test_collection_find() {
        let collection = Collection::from_rows(
            site_model(),
            vec![row! { "id" => 1 }, row! { "id" => 2 }],
        );
        assert_eq!(collection.find(2).and_then(|r| r.get("id")), Some(&FilterValue::Int(2)));
        assert!(collection.find(5).is_none());
        assert_eq!(collection.iter().count(), 2);
    }

    #[test]
    fn test_with_pivot_requires_placeholder() {
        let err = Collection::new(site_model()).with_pivot(["item"]).unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_related_accessors() {
        let related = Related::Many(Collection::new(site_model()));
        assert!(related.is_many());
        assert!(related.is_empty());
        assert!(related.as_record().is_none());
        assert!(related.is_collection());
        assert_eq!(related.model().name(), "Site");
    }
}
