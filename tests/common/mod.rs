//! Shared fixtures for the integration tests: an in-memory engine and a
//! small multi-site blogging schema with seed data.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use trellis_orm::query::{
    BoxFuture, Filter, FilterValue, ModelDef, QueryEngine, QueryError, QueryResult, RelationDecl,
    Row, RowExt, Schema, SelectQuery, TransactionContext, row,
};
use trellis_orm::query::query::column_alias;

/// One call received by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCall {
    pub kind: &'static str,
    pub table: String,
    pub sql: String,
    pub tx: Option<u64>,
}

/// Table storage evaluating [`SelectQuery`] values in memory.
#[derive(Default)]
pub struct MemoryEngine {
    tables: Mutex<HashMap<String, Vec<Row>>>,
    calls: Mutex<Vec<EngineCall>>,
    failing: Mutex<Option<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, table: &str, rows: Vec<Row>) -> Self {
        self.tables.lock().insert(table.to_string(), rows);
        self
    }

    /// Every call touching `table` fails from now on.
    pub fn fail_on(&self, table: &str) {
        *self.failing.lock() = Some(table.to_string());
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    pub fn selects(&self) -> Vec<EngineCall> {
        self.calls().into_iter().filter(|c| c.kind == "select").collect()
    }

    /// Number of selects issued against `table`.
    pub fn selects_on(&self, table: &str) -> usize {
        self.selects().iter().filter(|c| c.table == table).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables.lock().get(table).cloned().unwrap_or_default()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, kind: &'static str, table: &str, sql: String, tx: Option<&TransactionContext>) {
        self.calls.lock().push(EngineCall {
            kind,
            table: table.to_string(),
            sql,
            tx: tx.map(TransactionContext::id),
        });
    }

    fn check_failure(&self, table: &str) -> QueryResult<()> {
        match self.failing.lock().as_deref() {
            Some(failing) if failing == table => Err(QueryError::database(format!(
                "relation \"{}\" is unavailable",
                table
            ))),
            _ => Ok(()),
        }
    }

    /// Run `body` as one in-flight call, yielding once so concurrent calls
    /// overlap.
    async fn in_flight<T>(&self, body: impl FnOnce() -> QueryResult<T>) -> QueryResult<T> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        tokio::task::yield_now().await;
        let result = body();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn run_select(&self, query: &SelectQuery) -> Vec<Row> {
        let tables = self.tables.lock();
        let base_rows = tables.get(&query.table).cloned().unwrap_or_default();

        // Base columns are visible qualified and unqualified, joined columns
        // qualified only.
        let mut combined: Vec<(Row, Row)> = base_rows
            .into_iter()
            .map(|base| {
                let mut view = base.clone();
                view.extend(qualify(&query.table, &base));
                (base, view)
            })
            .collect();

        for join in &query.joins {
            let joined = tables.get(&join.table).cloned().unwrap_or_default();
            let mut next = Vec::new();
            for (base, view) in &combined {
                for other in &joined {
                    let mut merged = view.clone();
                    merged.extend(qualify(&join.table, other));
                    let left = merged.value(&join.left);
                    if !left.is_null() && left.correlates_with(merged.value(&join.right)) {
                        next.push((base.clone(), merged));
                    }
                }
            }
            combined = next;
        }

        let mut rows: Vec<Row> = combined
            .into_iter()
            .filter(|(_, view)| query.filter.matches(view))
            .map(|(base, view)| project(query, base, &view))
            .collect();

        if let Some(limit) = query.limit {
            rows.truncate(limit as usize);
        }
        rows
    }
}

fn qualify(table: &str, row: &Row) -> Row {
    row.iter()
        .map(|(column, value)| (format!("{}.{}", table, column), value.clone()))
        .collect()
}

fn project(query: &SelectQuery, base: Row, view: &Row) -> Row {
    if query.columns.is_empty() {
        return base;
    }
    let mut out = Row::new();
    for expr in &query.columns {
        let (source, alias) = column_alias(expr);
        if alias == "*" {
            if source == "*" || source == format!("{}.*", query.table) {
                out.extend(base.clone());
            }
            continue;
        }
        out.insert(alias.to_string(), view.value(source).clone());
    }
    out
}

impl QueryEngine for MemoryEngine {
    fn select<'a>(
        &'a self,
        query: &'a SelectQuery,
        tx: Option<&'a TransactionContext>,
    ) -> BoxFuture<'a, QueryResult<Vec<Row>>> {
        Box::pin(async move {
            self.record("select", &query.table, query.to_sql().0, tx);
            self.in_flight(|| {
                self.check_failure(&query.table)?;
                Ok(self.run_select(query))
            })
            .await
        })
    }

    fn insert<'a>(
        &'a self,
        table: &'a str,
        row: Row,
        tx: Option<&'a TransactionContext>,
    ) -> BoxFuture<'a, QueryResult<Option<FilterValue>>> {
        Box::pin(async move {
            let columns: Vec<_> = row.keys().cloned().collect();
            self.record(
                "insert",
                table,
                format!("INSERT INTO {} ({})", table, columns.join(", ")),
                tx,
            );
            self.in_flight(|| {
                self.check_failure(table)?;
                let id = row.get("id").cloned();
                self.tables
                    .lock()
                    .entry(table.to_string())
                    .or_default()
                    .push(row);
                Ok(id)
            })
            .await
        })
    }

    fn update<'a>(
        &'a self,
        table: &'a str,
        filter: &'a Filter,
        row: Row,
        tx: Option<&'a TransactionContext>,
    ) -> BoxFuture<'a, QueryResult<u64>> {
        Box::pin(async move {
            self.record("update", table, format!("UPDATE {} WHERE {}", table, filter.to_sql(0).0), tx);
            self.in_flight(|| {
                self.check_failure(table)?;
                let mut tables = self.tables.lock();
                let mut count = 0;
                for existing in tables.entry(table.to_string()).or_default().iter_mut() {
                    if filter.matches(existing) {
                        existing.extend(row.clone());
                        count += 1;
                    }
                }
                Ok(count)
            })
            .await
        })
    }

    fn delete<'a>(
        &'a self,
        table: &'a str,
        filter: &'a Filter,
        tx: Option<&'a TransactionContext>,
    ) -> BoxFuture<'a, QueryResult<u64>> {
        Box::pin(async move {
            self.record("delete", table, format!("DELETE FROM {} WHERE {}", table, filter.to_sql(0).0), tx);
            self.in_flight(|| {
                self.check_failure(table)?;
                let mut tables = self.tables.lock();
                let rows = tables.entry(table.to_string()).or_default();
                let before = rows.len();
                rows.retain(|existing| !filter.matches(existing));
                Ok((before - rows.len()) as u64)
            })
            .await
        })
    }
}

/// The blogging schema: sites with meta, admins, authors, blogs and photos;
/// posts with authors, tags and comments.
pub fn schema() -> Arc<Schema> {
    Arc::new(
        Schema::new()
            .register(
                ModelDef::new("SiteMeta", "sitesmeta")
                    .with_relation("site", RelationDecl::belongs_to("Site")),
            )
            .register(
                ModelDef::new("Site", "sites")
                    .with_relation("photos", RelationDecl::morph_many("Photo", "imageable"))
                    .with_relation("authors", RelationDecl::has_many("Author"))
                    .with_relation("blogs", RelationDecl::has_many("Blog"))
                    .with_relation("meta", RelationDecl::has_one("SiteMeta"))
                    .with_relation(
                        "admins",
                        RelationDecl::belongs_to_many("Admin").with_pivot(["item"]),
                    ),
            )
            .register(ModelDef::new("Admin", "admins"))
            .register(
                ModelDef::new("Author", "authors")
                    .with_relation("photo", RelationDecl::morph_one("Photo", "imageable"))
                    .with_relation("site", RelationDecl::belongs_to("Site"))
                    .with_relation("posts", RelationDecl::belongs_to_many("Post"))
                    .with_relation("ownPosts", RelationDecl::has_many("Post").foreign_key("owner_id")),
            )
            .register(
                ModelDef::new("Blog", "blogs")
                    .with_relation("site", RelationDecl::belongs_to("Site"))
                    .with_relation("posts", RelationDecl::has_many("Post")),
            )
            .register(
                ModelDef::new("Post", "posts")
                    .with_relation("blog", RelationDecl::belongs_to("Blog"))
                    .with_relation("authors", RelationDecl::belongs_to_many("Author"))
                    .with_relation("tags", RelationDecl::belongs_to_many("Tag"))
                    .with_relation("comments", RelationDecl::has_many("Comment")),
            )
            .register(
                ModelDef::new("Comment", "comments")
                    .with_relation("post", RelationDecl::belongs_to("Post")),
            )
            .register(
                ModelDef::new("Tag", "tags").with_relation("posts", RelationDecl::belongs_to_many("Post")),
            )
            .register(
                ModelDef::new("Photo", "photos")
                    .with_relation("imageable", RelationDecl::morph_to("imageable", ["Site", "Author"])),
            ),
    )
}

/// An engine seeded with the blogging data.
pub fn seeded_engine() -> MemoryEngine {
    MemoryEngine::new()
        .with_table(
            "sites",
            vec![
                row! { "id" => 1, "name" => "knexjs.org" },
                row! { "id" => 2, "name" => "bookshelfjs.org" },
                row! { "id" => 3, "name" => "backbonejs.org" },
            ],
        )
        .with_table(
            "sitesmeta",
            vec![
                row! { "id" => 1, "site_id" => 1, "description" => "This is a description for the Knexjs Site" },
                row! { "id" => 2, "site_id" => 2, "description" => "This is a description for the Bookshelfjs Site" },
            ],
        )
        .with_table(
            "admins",
            vec![
                row! { "id" => 1, "username" => "test" },
                row! { "id" => 2, "username" => "test2" },
            ],
        )
        .with_table(
            "admins_sites",
            vec![
                row! { "admin_id" => 1, "site_id" => 1, "item" => "test" },
                row! { "admin_id" => 2, "site_id" => 1, "item" => "test2" },
            ],
        )
        .with_table(
            "authors",
            vec![
                row! { "id" => 1, "site_id" => 1, "first_name" => "Tim", "last_name" => "Griesser" },
                row! { "id" => 2, "site_id" => 1, "first_name" => "Bazooka", "last_name" => "Joe" },
                row! { "id" => 3, "site_id" => 2, "first_name" => "Charlie", "last_name" => "Brown" },
                row! { "id" => 4, "site_id" => 2, "first_name" => "Ron", "last_name" => "Burgundy" },
            ],
        )
        .with_table(
            "blogs",
            vec![
                row! { "id" => 1, "site_id" => 1, "name" => "Main Site Blog" },
                row! { "id" => 2, "site_id" => 1, "name" => "Alternate Site Blog" },
                row! { "id" => 3, "site_id" => 2, "name" => "Main Site Blog" },
                row! { "id" => 4, "site_id" => 3, "name" => "Alternate Site Blog" },
            ],
        )
        .with_table(
            "posts",
            vec![
                row! { "id" => 1, "owner_id" => 1, "blog_id" => 1, "name" => "This is a new Title!" },
                row! { "id" => 2, "owner_id" => 2, "blog_id" => 2, "name" => "This is a new Title 2!" },
                row! { "id" => 3, "owner_id" => 2, "blog_id" => 1, "name" => "This is a new Title 3!" },
                row! { "id" => 4, "owner_id" => 3, "blog_id" => 3, "name" => "This is a new Title 4!" },
                row! { "id" => 5, "owner_id" => 1, "blog_id" => 1, "name" => "This is a new Title 5!" },
                row! { "id" => 6, "owner_id" => 1, "blog_id" => 2, "name" => "This is a new Title 6!" },
            ],
        )
        .with_table(
            "authors_posts",
            vec![
                row! { "author_id" => 1, "post_id" => 5 },
                row! { "author_id" => 1, "post_id" => 6 },
                row! { "author_id" => 2, "post_id" => 2 },
                row! { "author_id" => 2, "post_id" => 3 },
                row! { "author_id" => 3, "post_id" => 4 },
            ],
        )
        .with_table(
            "tags",
            vec![
                row! { "id" => 1, "name" => "cool" },
                row! { "id" => 2, "name" => "boring" },
                row! { "id" => 3, "name" => "exciting" },
            ],
        )
        .with_table(
            "posts_tags",
            vec![
                row! { "post_id" => 1, "tag_id" => 1 },
                row! { "post_id" => 1, "tag_id" => 2 },
                row! { "post_id" => 2, "tag_id" => 3 },
                row! { "post_id" => 5, "tag_id" => 1 },
            ],
        )
        .with_table(
            "comments",
            vec![
                row! { "id" => 1, "post_id" => 3, "email" => "test@example.com", "comment" => "this is neat." },
                row! { "id" => 2, "post_id" => 1, "email" => "test2@example.com", "comment" => "first!" },
            ],
        )
        .with_table(
            "photos",
            vec![
                row! { "id" => 1, "imageable_id" => 1, "imageable_type" => "sites", "url" => "https://example.com/1.jpg" },
                row! { "id" => 2, "imageable_id" => 1, "imageable_type" => "sites", "url" => "https://example.com/2.jpg" },
                row! { "id" => 3, "imageable_id" => 2, "imageable_type" => "sites", "url" => "https://example.com/3.jpg" },
                row! { "id" => 4, "imageable_id" => 1, "imageable_type" => "authors", "url" => "https://example.com/4.jpg" },
                row! { "id" => 5, "imageable_id" => 2, "imageable_type" => "authors", "url" => "https://example.com/5.jpg" },
            ],
        )
}
