//! Relation declarations and the descriptors built from them.
//!
//! A [`RelationDecl`] is what a model declares: the kind of association,
//! the target model and any key overrides. Building a relation for a
//! concrete owner resolves the declaration into a [`RelationDescriptor`],
//! whose [`RelationKind`] carries exactly the keys that kind needs.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{QueryError, QueryResult};
use crate::filter::FilterValue;
use crate::model::ModelDef;

/// Type of relation between models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationType {
    /// The target holds a key pointing at the owner; one target.
    HasOne,
    /// The target holds a key pointing at the owner; many targets.
    HasMany,
    /// The owner holds a key pointing at the target.
    BelongsTo,
    /// Owner and target are linked through a join table.
    BelongsToMany,
    /// Polymorphic [`HasOne`](Self::HasOne).
    MorphOne,
    /// Polymorphic [`HasMany`](Self::HasMany).
    MorphMany,
    /// Inverse of a polymorphic relation; the target type is read from the owner.
    MorphTo,
}

impl RelationType {
    /// Check if this relation returns multiple records.
    pub fn is_many(&self) -> bool {
        matches!(self, Self::HasMany | Self::BelongsToMany | Self::MorphMany)
    }

    /// Check if this relation returns a single record.
    pub fn is_one(&self) -> bool {
        !self.is_many()
    }

    /// Check if this relation involves a type discriminator.
    pub fn is_polymorphic(&self) -> bool {
        matches!(self, Self::MorphOne | Self::MorphMany | Self::MorphTo)
    }

    /// Whether the owner, rather than the target, holds the correlating key.
    pub fn is_inverse(&self) -> bool {
        matches!(self, Self::BelongsTo | Self::MorphTo)
    }

    /// Name of the relation type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HasOne => "hasOne",
            Self::HasMany => "hasMany",
            Self::BelongsTo => "belongsTo",
            Self::BelongsToMany => "belongsToMany",
            Self::MorphOne => "morphOne",
            Self::MorphMany => "morphMany",
            Self::MorphTo => "morphTo",
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An extra join-table column selected alongside many-to-many targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotColumn {
    /// Column on the join table.
    pub column: String,
    /// Output name on the fetched rows.
    pub alias: String,
}

impl PivotColumn {
    /// Select `column` as `pivot_<column>`.
    pub fn new(column: impl Into<String>) -> Self {
        let column = column.into();
        let alias = format!("pivot_{}", column);
        Self { column, alias }
    }

    /// Select `column` under a caller-chosen alias.
    pub fn aliased(column: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            alias: alias.into(),
        }
    }

    /// The select expression for this column.
    pub fn to_select(&self, join_table: &str) -> String {
        format!("{}.{} AS {}", join_table, self.column, self.alias)
    }
}

impl From<&str> for PivotColumn {
    fn from(column: &str) -> Self {
        Self::new(column)
    }
}

impl From<String> for PivotColumn {
    fn from(column: String) -> Self {
        Self::new(column)
    }
}

impl From<(&str, &str)> for PivotColumn {
    fn from((column, alias): (&str, &str)) -> Self {
        Self::aliased(column, alias)
    }
}

/// A relation as declared on its owning model.
///
/// ```rust
/// use trellis_query::relations::{RelationDecl, RelationType};
///
/// let admins = RelationDecl::belongs_to_many("Admin").with_pivot(["item"]);
/// assert_eq!(admins.relation_type, RelationType::BelongsToMany);
/// assert_eq!(admins.pivot_columns[0].alias, "pivot_item");
///
/// let own_posts = RelationDecl::has_many("Post").foreign_key("owner_id");
/// assert_eq!(own_posts.foreign_key.as_deref(), Some("owner_id"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RelationDecl {
    /// Kind of association.
    pub relation_type: RelationType,
    /// Target model name; `None` for [`RelationType::MorphTo`].
    pub target: Option<String>,
    /// Override for the descriptor's foreign key.
    pub foreign_key: Option<String>,
    /// Override for the descriptor's other key.
    pub other_key: Option<String>,
    /// Override for the join table name.
    pub join_table: Option<String>,
    /// Polymorphic name, the prefix of the `_id` and `_type` columns.
    pub morph_name: Option<String>,
    /// Candidate target models of a [`RelationType::MorphTo`].
    pub candidates: Vec<String>,
    /// Extra join-table columns to select.
    pub pivot_columns: Vec<PivotColumn>,
}

impl RelationDecl {
    /// Declare a relation of any type against a target model.
    pub fn new(relation_type: RelationType, target: Option<String>) -> Self {
        Self {
            relation_type,
            target,
            foreign_key: None,
            other_key: None,
            join_table: None,
            morph_name: None,
            candidates: Vec::new(),
            pivot_columns: Vec::new(),
        }
    }

    /// `hasOne` relation to `target`.
    pub fn has_one(target: impl Into<String>) -> Self {
        Self::new(RelationType::HasOne, Some(target.into()))
    }

    /// `hasMany` relation to `target`.
    pub fn has_many(target: impl Into<String>) -> Self {
        Self::new(RelationType::HasMany, Some(target.into()))
    }

    /// `belongsTo` relation to `target`.
    pub fn belongs_to(target: impl Into<String>) -> Self {
        Self::new(RelationType::BelongsTo, Some(target.into()))
    }

    /// `belongsToMany` relation to `target`.
    pub fn belongs_to_many(target: impl Into<String>) -> Self {
        Self::new(RelationType::BelongsToMany, Some(target.into()))
    }

    /// `morphOne` relation to `target` under the polymorphic `name`.
    pub fn morph_one(target: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(RelationType::MorphOne, Some(target.into())).morph_name(name)
    }

    /// `morphMany` relation to `target` under the polymorphic `name`.
    pub fn morph_many(target: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(RelationType::MorphMany, Some(target.into())).morph_name(name)
    }

    /// `morphTo` relation under `name`, resolving to one of `candidates`.
    pub fn morph_to<I, S>(name: impl Into<String>, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut decl = Self::new(RelationType::MorphTo, None).morph_name(name);
        decl.candidates = candidates.into_iter().map(Into::into).collect();
        decl
    }

    /// Override the foreign key.
    pub fn foreign_key(mut self, key: impl Into<String>) -> Self {
        self.foreign_key = Some(key.into());
        self
    }

    /// Override the other key.
    pub fn other_key(mut self, key: impl Into<String>) -> Self {
        self.other_key = Some(key.into());
        self
    }

    /// Override the join table name.
    pub fn join_table(mut self, table: impl Into<String>) -> Self {
        self.join_table = Some(table.into());
        self
    }

    /// Set the polymorphic name.
    pub fn morph_name(mut self, name: impl Into<String>) -> Self {
        self.morph_name = Some(name.into());
        self
    }

    /// Select extra join-table columns on every fetch of this relation.
    pub fn with_pivot<I, C>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<PivotColumn>,
    {
        self.pivot_columns
            .extend(columns.into_iter().map(Into::into));
        self
    }
}

/// How a relation is being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadMode {
    /// For one already identified owner.
    #[default]
    Instance,
    /// For a batch of parent rows during eager loading.
    Eager,
}

/// Keys of a polymorphic `morphOne`/`morphMany` relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MorphKeys {
    /// `<name>_id` on the target.
    pub foreign_key: String,
    /// `<name>_type` on the target.
    pub morph_key: String,
    /// The owner's table name.
    pub morph_value: String,
}

/// Resolved relation kind with the keys it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationKind {
    /// Target's `foreign_key` references the owner's identifier.
    HasOne {
        /// Column on the target.
        foreign_key: String,
    },
    /// Target's `foreign_key` references the owner's identifier.
    HasMany {
        /// Column on the target.
        foreign_key: String,
    },
    /// Owner's `other_key` references the target's `foreign_key`.
    BelongsTo {
        /// Target's identifier column.
        foreign_key: String,
        /// Column on the owner.
        other_key: String,
    },
    /// Join table rows link `other_key` (owner) to `foreign_key` (target).
    BelongsToMany {
        /// Join table name.
        join_table: String,
        /// Join-table column referencing the target.
        foreign_key: String,
        /// Join-table column referencing the owner.
        other_key: String,
        /// Extra join-table columns to select.
        pivot_columns: Vec<PivotColumn>,
    },
    /// Polymorphic one-to-one.
    MorphOne(MorphKeys),
    /// Polymorphic one-to-many.
    MorphMany(MorphKeys),
    /// Owner's `other_key` references the resolved target's `foreign_key`.
    MorphTo {
        /// Target's identifier column.
        foreign_key: String,
        /// `<name>_id` on the owner.
        other_key: String,
        /// `<name>_type` on the owner.
        type_key: String,
        /// Candidate target models.
        candidates: Vec<String>,
    },
}

impl RelationKind {
    /// The relation type tag.
    pub fn relation_type(&self) -> RelationType {
        match self {
            Self::HasOne { .. } => RelationType::HasOne,
            Self::HasMany { .. } => RelationType::HasMany,
            Self::BelongsTo { .. } => RelationType::BelongsTo,
            Self::BelongsToMany { .. } => RelationType::BelongsToMany,
            Self::MorphOne(_) => RelationType::MorphOne,
            Self::MorphMany(_) => RelationType::MorphMany,
            Self::MorphTo { .. } => RelationType::MorphTo,
        }
    }

    /// The foreign key of this relation.
    pub fn foreign_key(&self) -> &str {
        match self {
            Self::HasOne { foreign_key }
            | Self::HasMany { foreign_key }
            | Self::BelongsTo { foreign_key, .. }
            | Self::BelongsToMany { foreign_key, .. }
            | Self::MorphTo { foreign_key, .. } => foreign_key,
            Self::MorphOne(keys) | Self::MorphMany(keys) => &keys.foreign_key,
        }
    }

    /// The other key, when the kind has one.
    pub fn other_key(&self) -> Option<&str> {
        match self {
            Self::BelongsTo { other_key, .. }
            | Self::BelongsToMany { other_key, .. }
            | Self::MorphTo { other_key, .. } => Some(other_key),
            _ => None,
        }
    }

    /// Join table of a many-to-many relation.
    pub fn join_table(&self) -> Option<&str> {
        match self {
            Self::BelongsToMany { join_table, .. } => Some(join_table),
            _ => None,
        }
    }

    /// Extra pivot columns of a many-to-many relation.
    pub fn pivot_columns(&self) -> &[PivotColumn] {
        match self {
            Self::BelongsToMany { pivot_columns, .. } => pivot_columns,
            _ => &[],
        }
    }

    /// The discriminator filter `(morph_key, morph_value)` of a
    /// `morphOne`/`morphMany` relation.
    pub fn morph_filter(&self) -> Option<(&str, &str)> {
        match self {
            Self::MorphOne(keys) | Self::MorphMany(keys) => {
                Some((keys.morph_key.as_str(), keys.morph_value.as_str()))
            }
            _ => None,
        }
    }

    /// Candidate target models of a `morphTo` relation.
    pub fn candidates(&self) -> &[String] {
        match self {
            Self::MorphTo { candidates, .. } => candidates,
            _ => &[],
        }
    }

    /// Column on fetched target rows that carries the owner's correlating value.
    pub fn match_column(&self) -> String {
        match self {
            Self::BelongsToMany { other_key, .. } => format!("_pivot_{}", other_key),
            _ => self.foreign_key().to_string(),
        }
    }
}

/// Where the owner-side correlating value comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum Correlation {
    /// Eager load: read `parent_id_attribute` from every parent row.
    Batch {
        /// Parent column holding the correlating value.
        parent_id_attribute: String,
    },
    /// A single owner whose value was resolved at build time.
    Instance {
        /// Owner column the value was read from.
        key: String,
        /// The value; `None` when the owner had no value for `key`.
        value: Option<FilterValue>,
    },
}

impl Correlation {
    /// The owner-side column used for correlation.
    pub fn key(&self) -> &str {
        match self {
            Self::Batch { parent_id_attribute } => parent_id_attribute,
            Self::Instance { key, .. } => key,
        }
    }

    /// The resolved owner value of an instance correlation.
    pub fn value(&self) -> Option<&FilterValue> {
        match self {
            Self::Instance { value, .. } => value.as_ref(),
            Self::Batch { .. } => None,
        }
    }

    /// Whether this is a batch correlation.
    pub fn is_batch(&self) -> bool {
        matches!(self, Self::Batch { .. })
    }
}

/// One resolved relation edge, carried by its placeholder.
#[derive(Debug, Clone)]
pub struct RelationDescriptor {
    /// Relation name on the owner.
    pub name: String,
    /// Kind and keys.
    pub kind: RelationKind,
    /// Target model.
    pub target: Arc<ModelDef>,
    /// How the owner's correlating value is obtained.
    pub correlation: Correlation,
}

impl RelationDescriptor {
    /// The relation type tag.
    pub fn relation_type(&self) -> RelationType {
        self.kind.relation_type()
    }

    /// Whether the relation yields a collection.
    pub fn is_many(&self) -> bool {
        self.relation_type().is_many()
    }

    /// Owner-side column used for correlation.
    pub fn parent_key(&self) -> &str {
        self.correlation.key()
    }

    /// The owner's resolved correlating value, for instance correlations.
    pub fn fk_value(&self) -> Option<&FilterValue> {
        self.correlation.value().filter(|v| !v.is_null())
    }

    /// Add pivot columns to a many-to-many descriptor.
    pub fn with_pivot<I, C>(&mut self, columns: I) -> QueryResult<()>
    where
        I: IntoIterator<Item = C>,
        C: Into<PivotColumn>,
    {
        match &mut self.kind {
            RelationKind::BelongsToMany { pivot_columns, .. } => {
                for column in columns {
                    let column = column.into();
                    if !pivot_columns.contains(&column) {
                        pivot_columns.push(column);
                    }
                }
                Ok(())
            }
            other => Err(QueryError::configuration(format!(
                "withPivot is only available on belongsToMany relations, `{}` is {}",
                self.name,
                other.relation_type()
            ))
            .with_relation(&self.name)),
        }
    }
}

/// Relations declared on a model, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct RelationRegistry {
    relations: IndexMap<String, RelationDecl>,
}

impl RelationRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a relation, replacing any earlier one with the same name.
    pub fn register(&mut self, name: impl Into<String>, decl: RelationDecl) {
        self.relations.insert(name.into(), decl);
    }

    /// Get a relation by name.
    pub fn get(&self, name: &str) -> Option<&RelationDecl> {
        self.relations.get(name)
    }

    /// Check whether a relation is declared.
    pub fn contains(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    /// All relations with their names.
    pub fn all(&self) -> impl Iterator<Item = (&str, &RelationDecl)> {
        self.relations.iter().map(|(name, decl)| (name.as_str(), decl))
    }

    /// Number of declared relations.
    pub fn len(&self) -> usize {
        self.relations.len()
    }

    /// Whether no relations are declared.
    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}
