//! Narrow a placeholder's query to the rows related to its owner(s).

use std::sync::Arc;

use tracing::trace;

use super::spec::RelationKind;
use crate::error::{QueryError, QueryResult};
use crate::filter::Filter;
use crate::query::Join;
use crate::record::Relational;
use crate::row::{Row, distinct_values};

/// Applies relation constraints to placeholder queries.
///
/// With a parent batch the correlating values are read from every parent row
/// and the query filters on `IN (...)`. Without a batch the value resolved at
/// build time is used. A placeholder with neither fails with a missing key
/// error instead of fetching an unconstrained table.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstraintBuilder;

impl ConstraintBuilder {
    /// Constrain `target`'s query for `parents`, or for its own owner when
    /// `parents` is `None`.
    pub fn apply<T>(target: &mut T, parents: Option<&[&Row]>) -> QueryResult<()>
    where
        T: Relational + ?Sized,
    {
        let descriptor = target.descriptor().map(Arc::clone).ok_or_else(|| {
            QueryError::internal("constraints can only be applied to relation placeholders")
        })?;

        let batch = parents.map(|rows| distinct_values(rows.iter().copied(), descriptor.parent_key()));
        let owner_value = descriptor.fk_value().cloned();
        if batch.is_none() && owner_value.is_none() {
            return Err(QueryError::missing_relation_key(
                descriptor.parent_key(),
                &descriptor.name,
            ));
        }

        let is_collection = target.is_collection();
        let query = target.query_mut();

        match &descriptor.kind {
            RelationKind::BelongsToMany {
                join_table,
                foreign_key,
                other_key,
                pivot_columns,
            } => {
                let target_table = descriptor.target.table_name();
                if !query.has_columns() {
                    query.push_column(format!("{}.*", target_table));
                }
                query
                    .push_column(format!("{}.{} AS _pivot_{}", join_table, other_key, other_key))
                    .push_column(format!(
                        "{}.{} AS _pivot_{}",
                        join_table, foreign_key, foreign_key
                    ));
                for pivot in pivot_columns {
                    query.push_column(pivot.to_select(join_table));
                }
                query.push_join(Join::inner(
                    join_table.as_str(),
                    format!("{}.{}", target_table, descriptor.target.id_attribute()),
                    format!("{}.{}", join_table, foreign_key),
                ));

                let column = format!("{}.{}", join_table, other_key);
                if let Some(values) = batch {
                    query.push_filter(Filter::in_list(column, values));
                } else if let Some(value) = owner_value {
                    query.push_filter(Filter::equals(column, value));
                }
            }
            kind => {
                let column = kind.foreign_key();
                match (batch, owner_value) {
                    (Some(values), _) => {
                        query.push_filter(Filter::in_list(column, values));
                    }
                    (None, Some(value)) if is_collection => {
                        query.push_filter(Filter::equals(column, value));
                    }
                    _ => {}
                }
                if let Some((morph_key, morph_value)) = kind.morph_filter() {
                    query.push_filter(Filter::equals(morph_key, morph_value));
                }
            }
        }

        trace!(
            relation = %descriptor.name,
            kind = %descriptor.relation_type(),
            batched = parents.is_some(),
            "Applied relation constraints"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterValue;
    use crate::model::{ModelDef, Schema};
    use crate::record::Record;
    use crate::relations::{LoadMode, RelationBuilder, RelationDecl};
    use crate::row;
    use pretty_assertions::assert_eq;

    fn schema() -> Schema {
        Schema::new()
            .register(
                ModelDef::new("Site", "sites")
                    .with_relation("blogs", RelationDecl::has_many("Blog"))
                    .with_relation("photos", RelationDecl::morph_many("Photo", "imageable"))
                    .with_relation("admins", RelationDecl::belongs_to_many("Admin").with_pivot(["item"])),
            )
            .register(ModelDef::new("Blog", "blogs").with_relation("site", RelationDecl::belongs_to("Site")))
            .register(ModelDef::new("Admin", "admins"))
            .register(ModelDef::new("Photo", "photos"))
    }

    fn build(schema: &Schema, model: &str, attributes: Row, name: &str, mode: LoadMode) -> crate::record::Related {
        let owner = Record::with_attributes(schema.model(model).unwrap(), attributes);
        RelationBuilder::new(schema, mode).build(&owner, name).unwrap()
    }

    #[test]
    fn test_instance_has_many() {
        let schema = schema();
        let mut blogs = build(&schema, "Site", row! { "id" => 1 }, "blogs", LoadMode::Instance);
        ConstraintBuilder::apply(&mut blogs, None).unwrap();
        let (sql, params) = blogs.take_query().to_sql();
        assert_eq!(sql, "SELECT * FROM blogs WHERE site_id = $1");
        assert_eq!(params, vec![FilterValue::Int(1)]);
    }

    #[test]
    fn test_batched_belongs_to_uses_other_key() {
        let schema = schema();
        let mut site = build(&schema, "Blog", row! {}, "site", LoadMode::Eager);
        let parents = [
            row! { "id" => 1, "site_id" => 1 },
            row! { "id" => 2, "site_id" => 1 },
            row! { "id" => 3, "site_id" => 2 },
        ];
        let refs: Vec<&Row> = parents.iter().collect();
        ConstraintBuilder::apply(&mut site, Some(refs.as_slice())).unwrap();

        let query = site.take_query();
        assert_eq!(
            query.filter,
            Filter::in_list("id", vec![FilterValue::Int(1), FilterValue::Int(2)])
        );
    }

    #[test]
    fn test_morph_many_adds_discriminator() {
        let schema = schema();
        let mut photos = build(&schema, "Site", row! { "id" => 1 }, "photos", LoadMode::Instance);
        ConstraintBuilder::apply(&mut photos, None).unwrap();
        let (sql, _) = photos.take_query().to_sql();
        assert_eq!(
            sql,
            "SELECT * FROM photos WHERE (imageable_id = $1 AND imageable_type = $2)"
        );
    }

    #[test]
    fn test_belongs_to_many_joins_pivot() {
        let schema = schema();
        let mut admins = build(&schema, "Site", row! { "id" => 1 }, "admins", LoadMode::Instance);
        ConstraintBuilder::apply(&mut admins, None).unwrap();
        let (sql, _) = admins.take_query().to_sql();
        assert_eq!(
            sql,
            "SELECT admins.*, admins_sites.site_id AS _pivot_site_id, \
             admins_sites.admin_id AS _pivot_admin_id, admins_sites.item AS pivot_item \
             FROM admins INNER JOIN admins_sites ON admins.id = admins_sites.admin_id \
             WHERE admins_sites.site_id = $1"
        );
    }

    #[test]
    fn test_missing_key_fails() {
        let schema = schema();
        let mut blogs = build(&schema, "Site", row! {}, "blogs", LoadMode::Instance);
        let err = ConstraintBuilder::apply(&mut blogs, None).unwrap_err();
        assert!(err.is_missing_relation_key());
        assert_eq!(err.message, "The id must be specified.");
        assert_eq!(err.relation(), Some("blogs"));
    }

    #[test]
    fn test_apply_twice_is_stable() {
        let schema = schema();
        let mut admins = build(&schema, "Site", row! { "id" => 1 }, "admins", LoadMode::Instance);
        ConstraintBuilder::apply(&mut admins, None).unwrap();
        let first = admins.query_mut().clone();
        ConstraintBuilder::apply(&mut admins, None).unwrap();
        assert_eq!(admins.take_query(), first);
    }
}
