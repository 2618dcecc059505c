//! Resolve declared relations into descriptors and placeholders.

use std::sync::Arc;

use inflector::Inflector;
use tracing::trace;

use super::spec::{
    Correlation, LoadMode, MorphKeys, RelationDecl, RelationDescriptor, RelationKind,
    RelationType,
};
use crate::error::{QueryError, QueryResult};
use crate::model::{ModelDef, Schema};
use crate::record::{Collection, Record, Related};
use crate::row::{Row, RowExt};

/// Builds relation placeholders for an owner.
///
/// In [`LoadMode::Instance`] the owner's correlating value is read at build
/// time and single-valued placeholders are seeded with the attributes that
/// identify the related row. In [`LoadMode::Eager`] the descriptor only
/// records which parent column to read, since the values come from the
/// parent batch when constraints are applied.
///
/// ```rust
/// use trellis_query::model::{ModelDef, Schema};
/// use trellis_query::record::Record;
/// use trellis_query::relations::{LoadMode, RelationBuilder, RelationDecl, RelationKind};
/// use trellis_query::row;
///
/// let schema = Schema::new()
///     .register(ModelDef::new("Blog", "blogs").with_relation("site", RelationDecl::belongs_to("Site")))
///     .register(ModelDef::new("Site", "sites"));
/// let blog = Record::with_attributes(schema.model("Blog")?, row! { "id" => 4, "site_id" => 2 });
///
/// let site = RelationBuilder::new(&schema, LoadMode::Instance).build(&blog, "site")?;
/// let record = site.as_record().unwrap();
/// assert_eq!(record.get("id"), Some(&2.into()));
///
/// let kind = &record.descriptor().unwrap().kind;
/// assert_eq!(kind.other_key(), Some("site_id"));
/// # Ok::<(), trellis_query::QueryError>(())
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RelationBuilder<'a> {
    schema: &'a Schema,
    mode: LoadMode,
}

impl<'a> RelationBuilder<'a> {
    /// Create a builder resolving target models through `schema`.
    pub fn new(schema: &'a Schema, mode: LoadMode) -> Self {
        Self { schema, mode }
    }

    /// The load mode descriptors are built for.
    pub fn mode(&self) -> LoadMode {
        self.mode
    }

    /// Build the placeholder of relation `name` declared on the owner's model.
    pub fn build(&self, owner: &Record, name: &str) -> QueryResult<Related> {
        let model = owner.model();
        let decl = model
            .relation(name)
            .ok_or_else(|| QueryError::unknown_relation(model.name(), name))?;
        self.build_decl(model, owner.attributes(), name, decl)
    }

    /// Build a placeholder from an explicit declaration.
    ///
    /// `owner` supplies the owner's attributes: the identifying values in
    /// instance mode, and the morph discriminator for `morphTo` in both modes.
    pub fn build_decl(
        &self,
        owner_model: &Arc<ModelDef>,
        owner: &Row,
        name: &str,
        decl: &RelationDecl,
    ) -> QueryResult<Related> {
        let descriptor = Arc::new(self.descriptor(owner_model, owner, name, decl)?);
        let target = Arc::clone(&descriptor.target);

        if descriptor.is_many() {
            return Ok(Related::Many(Collection::placeholder(target, descriptor)));
        }

        let seed = self.seed_attributes(&descriptor);
        Ok(Related::One(Record::placeholder(target, seed, descriptor)))
    }

    /// Resolve a declaration into a descriptor.
    pub fn descriptor(
        &self,
        owner_model: &Arc<ModelDef>,
        owner: &Row,
        name: &str,
        decl: &RelationDecl,
    ) -> QueryResult<RelationDescriptor> {
        let owner_table = owner_model.table_name();

        let (kind, target) = match decl.relation_type {
            RelationType::HasOne | RelationType::HasMany => {
                let target = self.target(name, decl)?;
                let foreign_key = decl
                    .foreign_key
                    .clone()
                    .unwrap_or_else(|| key_for(owner_table));
                let kind = if decl.relation_type == RelationType::HasOne {
                    RelationKind::HasOne { foreign_key }
                } else {
                    RelationKind::HasMany { foreign_key }
                };
                (kind, target)
            }
            RelationType::BelongsTo => {
                let target = self.target(name, decl)?;
                let kind = RelationKind::BelongsTo {
                    foreign_key: decl
                        .foreign_key
                        .clone()
                        .unwrap_or_else(|| target.id_attribute().to_string()),
                    other_key: decl
                        .other_key
                        .clone()
                        .unwrap_or_else(|| key_for(target.table_name())),
                };
                (kind, target)
            }
            RelationType::BelongsToMany => {
                let target = self.target(name, decl)?;
                let join_table = decl.join_table.clone().unwrap_or_else(|| {
                    let mut tables = [owner_table, target.table_name()];
                    tables.sort_unstable();
                    tables.join("_")
                });
                let kind = RelationKind::BelongsToMany {
                    join_table,
                    foreign_key: decl
                        .foreign_key
                        .clone()
                        .unwrap_or_else(|| key_for(target.table_name())),
                    other_key: decl
                        .other_key
                        .clone()
                        .unwrap_or_else(|| key_for(owner_table)),
                    pivot_columns: decl.pivot_columns.clone(),
                };
                (kind, target)
            }
            RelationType::MorphOne | RelationType::MorphMany => {
                let target = self.target(name, decl)?;
                let morph_name = morph_name(name, decl)?;
                let keys = MorphKeys {
                    foreign_key: format!("{}_id", morph_name),
                    morph_key: format!("{}_type", morph_name),
                    morph_value: owner_table.to_string(),
                };
                let kind = if decl.relation_type == RelationType::MorphOne {
                    RelationKind::MorphOne(keys)
                } else {
                    RelationKind::MorphMany(keys)
                };
                (kind, target)
            }
            RelationType::MorphTo => {
                let morph_name = morph_name(name, decl)?;
                if decl.candidates.is_empty() {
                    return Err(QueryError::configuration(format!(
                        "morphTo relation `{}` needs at least one candidate model",
                        name
                    ))
                    .with_relation(name));
                }
                let type_key = format!("{}_type", morph_name);
                let target = self.resolve_morph_target(name, decl, owner.value(&type_key).as_str())?;
                let kind = RelationKind::MorphTo {
                    foreign_key: target.id_attribute().to_string(),
                    other_key: decl
                        .other_key
                        .clone()
                        .unwrap_or_else(|| format!("{}_id", morph_name)),
                    type_key,
                    candidates: decl.candidates.clone(),
                };
                (kind, target)
            }
        };

        let parent_key = if decl.relation_type.is_inverse() {
            kind.other_key().unwrap_or_default().to_string()
        } else {
            owner_model.id_attribute().to_string()
        };

        let correlation = match self.mode {
            LoadMode::Eager => Correlation::Batch {
                parent_id_attribute: parent_key,
            },
            LoadMode::Instance => {
                let value = owner.non_null(&parent_key).cloned();
                Correlation::Instance {
                    key: parent_key,
                    value,
                }
            }
        };

        trace!(
            relation = name,
            kind = %kind.relation_type(),
            target = target.name(),
            mode = ?self.mode,
            "Built relation descriptor"
        );

        Ok(RelationDescriptor {
            name: name.to_string(),
            kind,
            target,
            correlation,
        })
    }

    fn target(&self, name: &str, decl: &RelationDecl) -> QueryResult<Arc<ModelDef>> {
        let target = decl.target.as_deref().ok_or_else(|| {
            QueryError::configuration(format!(
                "A valid target model must be defined for the {} relation `{}`",
                decl.relation_type, name
            ))
            .with_relation(name)
        })?;
        self.schema
            .model(target)
            .map_err(|err| err.with_relation(name))
    }

    fn resolve_morph_target(
        &self,
        name: &str,
        decl: &RelationDecl,
        discriminator: Option<&str>,
    ) -> QueryResult<Arc<ModelDef>> {
        for candidate in &decl.candidates {
            let model = self.schema.model(candidate).map_err(|err| err.with_relation(name))?;
            if discriminator == Some(model.table_name()) {
                return Ok(model);
            }
        }
        Err(
            QueryError::configuration("The target polymorphic model was not found")
                .with_relation(name)
                .with_help(format!(
                    "`{}` does not match the table of any of: {}",
                    discriminator.unwrap_or("null"),
                    decl.candidates.join(", ")
                )),
        )
    }

    fn seed_attributes(&self, descriptor: &RelationDescriptor) -> Row {
        let mut seed = Row::new();
        if let Some(value) = descriptor.fk_value() {
            seed.insert(descriptor.kind.foreign_key().to_string(), value.clone());
            if let Some((morph_key, morph_value)) = descriptor.kind.morph_filter() {
                seed.insert(morph_key.to_string(), morph_value.into());
            }
        }
        seed
    }
}

/// Default key column for a table: its singular name plus `_id`.
pub fn key_for(table: &str) -> String {
    format!("{}_id", table.to_singular())
}

fn morph_name<'d>(name: &str, decl: &'d RelationDecl) -> QueryResult<&'d str> {
    match decl.morph_name.as_deref() {
        Some(morph_name) if !morph_name.is_empty() => Ok(morph_name),
        _ => Err(QueryError::configuration("The polymorphic `name` is required.")
            .with_relation(name)),
    }
}
