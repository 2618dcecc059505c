//! Fetching relations through a [`QueryEngine`].
//!
//! The loader ties the pieces together. It builds placeholders with the
//! [`RelationBuilder`], constrains them with the [`ConstraintBuilder`],
//! executes the queries and hands the results to the [`ResponseMatcher`].
//!
//! Eager loading walks an [`EagerPlan`] one level at a time:
//!
//! 1. every requested name is checked against the model before any query runs
//! 2. each node gets a placeholder built in eager mode and constrained with
//!    the whole parent batch, so one query serves every parent
//! 3. the level's queries run concurrently; a node with sub-paths recurses
//!    into its fetched rows as soon as its own query returns
//! 4. once every node of the level has finished, results are attached to the
//!    parents in request order
//!
//! The first failure anywhere in the tree fails the whole load and no parent
//! is modified.
//!
//! ```rust,ignore
//! let loader = RelationLoader::new(engine, schema);
//!
//! let mut sites = Collection::new(schema.model("Site")?);
//! loader
//!     .fetch_collection(&mut sites, &FetchOptions::new().with_related(["authors.ownPosts", "meta"]))
//!     .await?;
//! ```

use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::builder::RelationBuilder;
use super::constraint::ConstraintBuilder;
use super::matcher::{FetchedGroup, FetchedRelation, ResponseMatcher};
use super::pivot::{PivotItem, PivotManager};
use super::plan::{EagerPlan, LoadState, PlanNode};
use super::spec::{LoadMode, RelationDescriptor, RelationType};
use crate::concurrent::{ConcurrencyConfig, ConcurrentExecutor};
use crate::error::{QueryError, QueryResult};
use crate::filter::Filter;
use crate::model::{ModelDef, Schema};
use crate::query::SelectQuery;
use crate::record::{Collection, Record, Related, Relational};
use crate::row::{Row, RowExt};
use crate::traits::{BoxFuture, QueryEngine};
use crate::transaction::TransactionContext;

/// Options for a single fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Fail with an empty-response error when nothing is found.
    pub require: bool,
    /// Columns to select instead of `*`.
    pub columns: Vec<String>,
    /// Relation paths to eager load onto the fetched rows.
    pub with_related: Vec<String>,
}

impl FetchOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail when nothing is found.
    pub fn require(mut self) -> Self {
        self.require = true;
        self
    }

    /// Select only these columns.
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Eager load these relation paths.
    pub fn with_related<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_related.extend(paths.into_iter().map(Into::into));
        self
    }
}

/// A constrained query for one target model of a plan node.
struct PreparedGroup {
    descriptor: Arc<RelationDescriptor>,
    query: SelectQuery,
}

struct PreparedNode {
    node: PlanNode,
    groups: Vec<PreparedGroup>,
}

/// Loads relations through a query engine.
pub struct RelationLoader<E: QueryEngine> {
    engine: E,
    schema: Arc<Schema>,
    executor: ConcurrentExecutor,
    transaction: Option<TransactionContext>,
}

impl<E: QueryEngine> RelationLoader<E> {
    /// Create a loader. Concurrency is read from the environment.
    pub fn new(engine: E, schema: impl Into<Arc<Schema>>) -> Self {
        Self {
            engine,
            schema: schema.into(),
            executor: ConcurrentExecutor::new(ConcurrencyConfig::from_env()),
            transaction: None,
        }
    }

    /// Use an explicit concurrency configuration.
    pub fn with_concurrency(mut self, config: ConcurrencyConfig) -> Self {
        self.executor = ConcurrentExecutor::new(config);
        self
    }

    /// Run every query and write of this loader inside `transaction`.
    pub fn transacting(mut self, transaction: TransactionContext) -> Self {
        self.transaction = Some(transaction);
        self
    }

    /// The query engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// The schema relations resolve against.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The executor bounding concurrent engine calls.
    pub fn executor(&self) -> &ConcurrentExecutor {
        &self.executor
    }

    /// The transaction every call is bound to, if any.
    pub fn transaction(&self) -> Option<&TransactionContext> {
        self.transaction.as_ref()
    }

    /// Build the placeholder of relation `name` for one owner.
    pub fn related(&self, owner: &Record, name: &str) -> QueryResult<Related> {
        RelationBuilder::new(&self.schema, LoadMode::Instance).build(owner, name)
    }

    /// Pivot operations bound to this loader's engine and transaction.
    pub fn pivots(&self) -> PivotManager<'_, E> {
        PivotManager::new(&self.engine, &self.executor, self.transaction.as_ref())
    }

    /// Insert join-table rows for a many-to-many placeholder.
    pub async fn attach<R, I, T>(&self, relation: &R, items: I) -> QueryResult<usize>
    where
        R: Relational + ?Sized,
        I: IntoIterator<Item = T>,
        T: Into<PivotItem>,
    {
        self.pivots().attach(relation, items).await
    }

    /// Delete join-table rows for a many-to-many placeholder; `None` removes
    /// every row of the owner.
    pub async fn detach<R>(&self, relation: &R, items: Option<Vec<PivotItem>>) -> QueryResult<u64>
    where
        R: Relational + ?Sized,
    {
        self.pivots().detach(relation, items).await
    }

    /// Fetch the rows of a relation placeholder built by [`related`](Self::related).
    pub async fn fetch_related(&self, related: &mut Related, options: &FetchOptions) -> QueryResult<()> {
        let name = related
            .descriptor()
            .map(|d| d.name.clone())
            .ok_or_else(|| QueryError::internal("fetch_related needs a relation placeholder"))?;

        let result = async {
            // Caller columns go in first so a many-to-many projection does not add `target.*`.
            related.query_mut().push_columns(options.columns.iter().cloned());
            ConstraintBuilder::apply(related, None)?;
            let options = FetchOptions {
                columns: Vec::new(),
                ..options.clone()
            };
            match related {
                Related::Many(collection) => self.fetch_collection(collection, &options).await,
                Related::One(record) => self.fetch_record(record, &options).await,
            }
        }
        .await;
        result.map_err(|err| err.with_relation(name))
    }

    /// Fetch a single record matching its current non-null attributes.
    ///
    /// When nothing matches the record's attributes are cleared, or the
    /// fetch fails when `require` is set. When an eager relation fails the
    /// record is left as it was.
    pub async fn fetch_record(&self, record: &mut Record, options: &FetchOptions) -> QueryResult<()> {
        let plan = EagerPlan::parse(&options.with_related);
        self.validate_plan(record.model(), &plan)?;

        let mut query = record.query_mut().clone();
        query.push_columns(options.columns.iter().cloned());
        for (column, value) in record.attributes() {
            if !value.is_null() {
                query.push_filter(Filter::equals(column.as_str(), value.clone()));
            }
        }
        query.set_limit(1);

        let rows = self.select(&query).await?;
        let Some(row) = rows.into_iter().next() else {
            if options.require {
                return Err(QueryError::empty_response(record.model().name()));
            }
            record.take_query();
            record.replace_attributes(Row::new());
            return Ok(());
        };

        let model = Arc::clone(record.model());
        let mut fetched = Record::with_attributes(Arc::clone(&model), row);
        if !plan.is_empty() {
            self.fetch_level(model, std::slice::from_mut(&mut fetched), plan)
                .await?;
        }

        record.take_query();
        record.absorb(fetched);
        Ok(())
    }

    /// Fetch every row of a collection's query.
    ///
    /// Members are replaced only once every eager relation has loaded.
    pub async fn fetch_collection(
        &self,
        collection: &mut Collection,
        options: &FetchOptions,
    ) -> QueryResult<()> {
        let plan = EagerPlan::parse(&options.with_related);
        self.validate_plan(collection.model(), &plan)?;

        let mut query = collection.query_mut().clone();
        query.push_columns(options.columns.iter().cloned());

        let rows = self.select(&query).await?;
        if rows.is_empty() && options.require {
            return Err(QueryError::empty_response(collection.model().name()));
        }

        let model = Arc::clone(collection.model());
        let mut records: Vec<Record> = rows
            .into_iter()
            .map(|row| Record::with_attributes(Arc::clone(&model), row))
            .collect();

        if !plan.is_empty() {
            self.fetch_level(model, &mut records, plan).await?;
        }

        collection.take_query();
        collection.replace_records(records);
        Ok(())
    }

    /// Eager load `paths` onto an already fetched record.
    pub async fn load<I, S>(&self, record: &mut Record, paths: I) -> QueryResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let plan = EagerPlan::parse(paths);
        self.validate_plan(record.model(), &plan)?;
        let model = Arc::clone(record.model());
        self.fetch_level(model, std::slice::from_mut(record), plan).await
    }

    /// Eager load `paths` onto every member of an already fetched collection.
    pub async fn load_collection<I, S>(&self, collection: &mut Collection, paths: I) -> QueryResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let plan = EagerPlan::parse(paths);
        self.validate_plan(collection.model(), &plan)?;
        let model = Arc::clone(collection.model());
        self.fetch_level(model, collection.records_mut(), plan).await
    }

    async fn select(&self, query: &SelectQuery) -> QueryResult<Vec<Row>> {
        self.executor
            .limit(self.engine.select(query, self.transaction.as_ref()))
            .await
    }

    /// Check every path against the declared relations before anything is
    /// fetched. Paths beneath a `morphTo` depend on the resolved target and
    /// are checked when the level is prepared, before its queries run.
    fn validate_plan(&self, model: &ModelDef, plan: &EagerPlan) -> QueryResult<()> {
        for node in plan.iter() {
            let decl = model
                .relation(&node.name)
                .ok_or_else(|| QueryError::unknown_relation(model.name(), &node.name))?;
            if !node.has_sub_paths() {
                continue;
            }
            let target = decl.target.as_deref().and_then(|t| self.schema.get(t));
            if let Some(target) = target {
                self.validate_plan(target, &EagerPlan::parse(&node.sub_paths))?;
            }
        }
        Ok(())
    }

    fn fetch_level<'a>(
        &'a self,
        model: Arc<ModelDef>,
        parents: &'a mut [Record],
        plan: EagerPlan,
    ) -> BoxFuture<'a, QueryResult<()>> {
        Box::pin(async move {
            trace!(state = %LoadState::Init, model = model.name(), nodes = plan.len(), "Eager load level");
            for node in plan.iter() {
                if model.relation(&node.name).is_none() {
                    return Err(QueryError::unknown_relation(model.name(), &node.name));
                }
            }
            if plan.is_empty() || parents.is_empty() {
                return Ok(());
            }

            trace!(state = %LoadState::BuildingNodes, model = model.name());
            let prepared = {
                let rows: Vec<&Row> = parents.iter().map(Record::attributes).collect();
                plan.into_iter()
                    .map(|node| self.prepare_node(&model, &rows, node))
                    .collect::<QueryResult<Vec<_>>>()?
            };

            trace!(state = %LoadState::FetchingLevel, model = model.name(), nodes = prepared.len());
            let tasks: Vec<_> = prepared
                .into_iter()
                .map(|node| self.fetch_node(node))
                .collect();
            let fetched = match self.executor.try_join_ordered(tasks).await {
                Ok(fetched) => fetched,
                Err(err) => {
                    warn!(model = model.name(), error = %err, "Eager load failed, discarding level");
                    return Err(err);
                }
            };

            trace!(state = %LoadState::Matching, model = model.name());
            for relation in &fetched {
                ResponseMatcher::attach_many(parents, relation);
            }

            trace!(state = %LoadState::Done, model = model.name());
            Ok(())
        })
    }

    fn prepare_node(
        &self,
        model: &Arc<ModelDef>,
        rows: &[&Row],
        node: PlanNode,
    ) -> QueryResult<PreparedNode> {
        let name = node.name.clone();
        let prepare = || -> QueryResult<Vec<PreparedGroup>> {
            let decl = model
                .relation(&node.name)
                .ok_or_else(|| QueryError::unknown_relation(model.name(), &node.name))?;
            let builder = RelationBuilder::new(&self.schema, LoadMode::Eager);

            let batches = match (decl.relation_type, decl.morph_name.as_deref()) {
                (RelationType::MorphTo, Some(morph_name)) => {
                    group_by_discriminator(rows, &format!("{}_type", morph_name))
                }
                _ => vec![rows.to_vec()],
            };

            let mut groups = Vec::with_capacity(batches.len());
            for batch in batches {
                let Some(first) = batch.first() else {
                    continue;
                };
                let mut placeholder = builder.build_decl(model, first, &node.name, decl)?;
                ConstraintBuilder::apply(&mut placeholder, Some(batch.as_slice()))?;
                let descriptor = placeholder
                    .descriptor()
                    .map(Arc::clone)
                    .ok_or_else(|| QueryError::internal("placeholder lost its descriptor"))?;
                if node.has_sub_paths() {
                    self.validate_plan(&descriptor.target, &EagerPlan::parse(&node.sub_paths))?;
                }
                groups.push(PreparedGroup {
                    descriptor,
                    query: placeholder.take_query(),
                });
            }
            Ok(groups)
        };

        let groups = prepare().map_err(|err| err.with_relation(&name))?;
        Ok(PreparedNode { node, groups })
    }

    fn fetch_node(&self, prepared: PreparedNode) -> BoxFuture<'_, QueryResult<FetchedRelation>> {
        Box::pin(async move {
            let PreparedNode { node, groups } = prepared;
            let tasks: Vec<_> = groups
                .into_iter()
                .map(|group| self.fetch_group(group, &node.sub_paths))
                .collect();
            let groups = self
                .executor
                .try_join_ordered(tasks)
                .await
                .map_err(|err| err.with_relation(&node.name))?;
            Ok(FetchedRelation {
                name: node.name,
                groups,
            })
        })
    }

    fn fetch_group<'a>(
        &'a self,
        group: PreparedGroup,
        sub_paths: &'a [String],
    ) -> BoxFuture<'a, QueryResult<FetchedGroup>> {
        Box::pin(async move {
            let PreparedGroup { descriptor, query } = group;
            let rows = self.select(&query).await?;
            debug!(
                relation = %descriptor.name,
                kind = %descriptor.relation_type(),
                table = %query.table,
                rows = rows.len(),
                "Fetched relation"
            );

            let target = Arc::clone(&descriptor.target);
            let mut records: Vec<Record> = rows
                .into_iter()
                .map(|row| Record::with_attributes(Arc::clone(&target), row))
                .collect();

            if !sub_paths.is_empty() && !records.is_empty() {
                trace!(state = %LoadState::Recursing, relation = %descriptor.name, paths = ?sub_paths);
                self.fetch_level(target, &mut records, EagerPlan::parse(sub_paths))
                    .await?;
            }

            Ok(FetchedGroup {
                descriptor,
                records,
            })
        })
    }
}

/// Split parents by their morph discriminator, keeping first-seen order.
fn group_by_discriminator<'r>(rows: &[&'r Row], type_key: &str) -> Vec<Vec<&'r Row>> {
    let mut groups: indexmap::IndexMap<Option<&'r str>, Vec<&'r Row>> = indexmap::IndexMap::new();
    for &row in rows {
        groups.entry(row.value(type_key).as_str()).or_default().push(row);
    }
    groups.into_values().collect()
}

impl<E: QueryEngine> std::fmt::Debug for RelationLoader<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationLoader")
            .field("models", &self.schema.len())
            .field("executor", &self.executor)
            .field("transaction", &self.transaction)
            .finish()
    }
}
