//! Join-table management for many-to-many relations.

use tracing::debug;

use super::spec::{RelationDescriptor, RelationKind};
use crate::concurrent::ConcurrentExecutor;
use crate::error::{QueryError, QueryResult};
use crate::filter::{Filter, FilterValue};
use crate::record::{Record, Relational};
use crate::row::Row;
use crate::traits::QueryEngine;
use crate::transaction::TransactionContext;

/// One element passed to attach or detach.
#[derive(Debug, Clone, PartialEq)]
pub enum PivotItem {
    /// A target identifier.
    Id(FilterValue),
    /// A target record; contributes its identifier.
    Entity {
        /// Identifier column of the record's model.
        id_attribute: String,
        /// The identifier, if the record has one.
        id: Option<FilterValue>,
    },
    /// Join-table columns merged into the row as given.
    Attributes(Row),
}

impl From<FilterValue> for PivotItem {
    fn from(value: FilterValue) -> Self {
        Self::Id(value)
    }
}

impl From<i32> for PivotItem {
    fn from(value: i32) -> Self {
        Self::Id(value.into())
    }
}

impl From<i64> for PivotItem {
    fn from(value: i64) -> Self {
        Self::Id(value.into())
    }
}

impl From<&str> for PivotItem {
    fn from(value: &str) -> Self {
        Self::Id(value.into())
    }
}

impl From<String> for PivotItem {
    fn from(value: String) -> Self {
        Self::Id(value.into())
    }
}

impl From<&Record> for PivotItem {
    fn from(record: &Record) -> Self {
        Self::Entity {
            id_attribute: record.model().id_attribute().to_string(),
            id: record.id().cloned(),
        }
    }
}

impl From<Row> for PivotItem {
    fn from(row: Row) -> Self {
        Self::Attributes(row)
    }
}

/// Keys of the join table a pivot operation writes to.
struct PivotTarget<'d> {
    descriptor: &'d RelationDescriptor,
    join_table: &'d str,
    foreign_key: &'d str,
    other_key: &'d str,
    owner: FilterValue,
}

impl PivotTarget<'_> {
    /// The join-table row for one item.
    fn row_for(&self, item: PivotItem) -> QueryResult<Row> {
        let mut row = Row::new();
        row.insert(self.other_key.to_string(), self.owner.clone());
        match item {
            PivotItem::Id(id) => {
                row.insert(self.foreign_key.to_string(), id);
            }
            PivotItem::Entity { id: Some(id), .. } => {
                row.insert(self.foreign_key.to_string(), id);
            }
            PivotItem::Entity {
                id_attribute,
                id: None,
            } => {
                return Err(QueryError::missing_relation_key(
                    id_attribute,
                    &self.descriptor.name,
                ));
            }
            PivotItem::Attributes(attributes) => row.extend(attributes),
        }
        Ok(row)
    }
}

/// Attach and detach join-table rows of a `belongsToMany` placeholder.
///
/// Each call issues one write per item, all concurrently. The call succeeds
/// only if every write does; writes that already completed are not undone
/// unless the caller supplied a transaction.
pub struct PivotManager<'a, E: QueryEngine> {
    engine: &'a E,
    executor: &'a ConcurrentExecutor,
    transaction: Option<&'a TransactionContext>,
}

impl<'a, E: QueryEngine> PivotManager<'a, E> {
    /// Create a manager issuing writes through `engine`.
    pub fn new(
        engine: &'a E,
        executor: &'a ConcurrentExecutor,
        transaction: Option<&'a TransactionContext>,
    ) -> Self {
        Self {
            engine,
            executor,
            transaction,
        }
    }

    /// Insert one join-table row per item. Returns the number of rows inserted.
    pub async fn attach<R, I, T>(&self, relation: &R, items: I) -> QueryResult<usize>
    where
        R: Relational + ?Sized,
        I: IntoIterator<Item = T>,
        T: Into<PivotItem>,
    {
        let target = pivot_target(relation, "attach")?;
        let rows = items
            .into_iter()
            .map(|item| target.row_for(item.into()))
            .collect::<QueryResult<Vec<_>>>()?;
        if rows.is_empty() {
            return Ok(0);
        }

        let count = rows.len();
        let tasks = rows.into_iter().map(|row| {
            self.executor
                .limit(self.engine.insert(target.join_table, row, self.transaction))
        });
        self.executor
            .try_join_ordered(tasks)
            .await
            .map_err(|err| err.with_relation(&target.descriptor.name))?;

        debug!(
            relation = %target.descriptor.name,
            table = target.join_table,
            rows = count,
            "Attached pivot rows"
        );
        Ok(count)
    }

    /// Delete join-table rows.
    ///
    /// `None` deletes every row of the owner. Otherwise each item deletes the
    /// rows equal to its normalized row; an empty list deletes nothing.
    /// Returns the number of rows deleted.
    pub async fn detach<R>(&self, relation: &R, items: Option<Vec<PivotItem>>) -> QueryResult<u64>
    where
        R: Relational + ?Sized,
    {
        let target = pivot_target(relation, "detach")?;

        let filters = match items {
            None => vec![Filter::equals(target.other_key, target.owner.clone())],
            Some(items) => items
                .into_iter()
                .map(|item| {
                    let row = target.row_for(item)?;
                    Ok(Filter::and(
                        row.into_iter().map(|(column, value)| Filter::equals(column, value)),
                    ))
                })
                .collect::<QueryResult<Vec<_>>>()?,
        };
        if filters.is_empty() {
            return Ok(0);
        }

        let tasks = filters.iter().map(|filter| {
            self.executor
                .limit(self.engine.delete(target.join_table, filter, self.transaction))
        });
        let deleted: u64 = self
            .executor
            .try_join_ordered(tasks)
            .await
            .map_err(|err| err.with_relation(&target.descriptor.name))?
            .into_iter()
            .sum();

        debug!(
            relation = %target.descriptor.name,
            table = target.join_table,
            deleted,
            "Detached pivot rows"
        );
        Ok(deleted)
    }
}

fn pivot_target<'d, R>(relation: &'d R, operation: &str) -> QueryResult<PivotTarget<'d>>
where
    R: Relational + ?Sized,
{
    let descriptor = relation.descriptor().ok_or_else(|| {
        QueryError::configuration(format!("{} requires a relation placeholder", operation))
    })?;

    match &descriptor.kind {
        RelationKind::BelongsToMany {
            join_table,
            foreign_key,
            other_key,
            ..
        } => {
            let owner = descriptor.fk_value().cloned().ok_or_else(|| {
                QueryError::missing_relation_key(descriptor.parent_key(), &descriptor.name)
            })?;
            Ok(PivotTarget {
                descriptor,
                join_table,
                foreign_key,
                other_key,
                owner,
            })
        }
        other => Err(QueryError::configuration(format!(
            "{} is only available on belongsToMany relations, `{}` is {}",
            operation,
            descriptor.name,
            other.relation_type()
        ))
        .with_relation(&descriptor.name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelDef, Schema};
    use crate::query::SelectQuery;
    use crate::record::Related;
    use crate::relations::{LoadMode, RelationBuilder, RelationDecl};
    use crate::row;
    use crate::traits::BoxFuture;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct WriteLog {
        inserts: Mutex<Vec<(String, Row)>>,
        deletes: Mutex<Vec<(String, Filter)>>,
    }

    impl QueryEngine for WriteLog {
        fn select<'a>(
            &'a self,
            _query: &'a SelectQuery,
            _tx: Option<&'a TransactionContext>,
        ) -> BoxFuture<'a, QueryResult<Vec<Row>>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn insert<'a>(
            &'a self,
            table: &'a str,
            row: Row,
            _tx: Option<&'a TransactionContext>,
        ) -> BoxFuture<'a, QueryResult<Option<FilterValue>>> {
            Box::pin(async move {
                self.inserts.lock().push((table.to_string(), row));
                Ok(None)
            })
        }

        fn update<'a>(
            &'a self,
            _table: &'a str,
            _filter: &'a Filter,
            _row: Row,
            _tx: Option<&'a TransactionContext>,
        ) -> BoxFuture<'a, QueryResult<u64>> {
            Box::pin(async { Ok(0) })
        }

        fn delete<'a>(
            &'a self,
            table: &'a str,
            filter: &'a Filter,
            _tx: Option<&'a TransactionContext>,
        ) -> BoxFuture<'a, QueryResult<u64>> {
            Box::pin(async move {
                self.deletes.lock().push((table.to_string(), filter.clone()));
                Ok(1)
            })
        }
    }

    fn admins(owner: Row) -> Related {
        let schema = Schema::new()
            .register(
                ModelDef::new("Site", "sites")
                    .with_relation("admins", RelationDecl::belongs_to_many("Admin")),
            )
            .register(ModelDef::new("Admin", "admins"));
        let site = Record::with_attributes(schema.model("Site").unwrap(), owner);
        RelationBuilder::new(&schema, LoadMode::Instance)
            .build(&site, "admins")
            .unwrap()
    }

    #[tokio::test]
    async fn test_attach_normalizes_items() {
        let engine = WriteLog::default();
        let executor = ConcurrentExecutor::default();
        let pivots = PivotManager::new(&engine, &executor, None);
        let relation = admins(row! { "id" => 1 });

        let items: Vec<PivotItem> = vec![
            2.into(),
            row! { "admin_id" => 3, "item" => "test" }.into(),
        ];
        assert_eq!(pivots.attach(&relation, items).await.unwrap(), 2);

        let inserts = engine.inserts.lock().clone();
        assert_eq!(
            inserts,
            vec![
                ("admins_sites".to_string(), row! { "site_id" => 1, "admin_id" => 2 }),
                (
                    "admins_sites".to_string(),
                    row! { "site_id" => 1, "admin_id" => 3, "item" => "test" }
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_detach_all_and_none() {
        let engine = WriteLog::default();
        let executor = ConcurrentExecutor::default();
        let pivots = PivotManager::new(&engine, &executor, None);
        let relation = admins(row! { "id" => 1 });

        assert_eq!(pivots.detach(&relation, Some(Vec::new())).await.unwrap(), 0);
        assert!(engine.deletes.lock().is_empty());

        assert_eq!(pivots.detach(&relation, None).await.unwrap(), 1);
        assert_eq!(
            engine.deletes.lock().clone(),
            vec![("admins_sites".to_string(), Filter::equals("site_id", 1))]
        );
    }

    #[tokio::test]
    async fn test_attach_requires_owner_id() {
        let engine = WriteLog::default();
        let executor = ConcurrentExecutor::default();
        let pivots = PivotManager::new(&engine, &executor, None);
        let relation = admins(row! {});

        let err = pivots.attach(&relation, [1]).await.unwrap_err();
        assert!(err.is_missing_relation_key());
        assert!(engine.inserts.lock().is_empty());
    }

    #[tokio::test]
    async fn test_entity_without_id_fails() {
        let engine = WriteLog::default();
        let executor = ConcurrentExecutor::default();
        let pivots = PivotManager::new(&engine, &executor, None);
        let relation = admins(row! { "id" => 1 });
        let admin = Record::new(relation.model().clone());

        let err = pivots.attach(&relation, [&admin]).await.unwrap_err();
        assert!(err.is_missing_relation_key());
        assert_eq!(err.message, "The id must be specified.");
    }

    #[tokio::test]
    async fn test_attach_on_other_kind_is_configuration_error() {
        let engine = WriteLog::default();
        let executor = ConcurrentExecutor::default();
        let pivots = PivotManager::new(&engine, &executor, None);
        let schema = Schema::new()
            .register(ModelDef::new("Site", "sites").with_relation("blogs", RelationDecl::has_many("Blog")))
            .register(ModelDef::new("Blog", "blogs"));
        let site = Record::with_attributes(schema.model("Site").unwrap(), row! { "id" => 1 });
        let blogs = RelationBuilder::new(&schema, LoadMode::Instance).build(&site, "blogs").unwrap();

        let err = pivots.attach(&blogs, [1]).await.unwrap_err();
        assert!(err.is_configuration_error());
    }
}
