//! The select a relation placeholder carries.
//!
//! Every record and collection owns a lazily created [`SelectQuery`]. The
//! relation builder and constraint builder mutate it in sequence and a
//! [`QueryEngine`](crate::traits::QueryEngine) executes it. Pushing a column,
//! join or filter that is already present is a no-op, so applying the same
//! constraint twice leaves the query unchanged.
//!
//! ```rust
//! use trellis_query::filter::Filter;
//! use trellis_query::query::{Join, SelectQuery};
//!
//! let mut query = SelectQuery::new("tags");
//! query.push_column("tags.*");
//! query.push_column("posts_tags.post_id AS _pivot_post_id");
//! query.push_join(Join::inner("posts_tags", "tags.id", "posts_tags.tag_id"));
//! query.push_filter(Filter::equals("posts_tags.post_id", 1));
//!
//! let (sql, params) = query.to_sql();
//! assert_eq!(
//!     sql,
//!     "SELECT tags.*, posts_tags.post_id AS _pivot_post_id FROM tags \
//!      INNER JOIN posts_tags ON tags.id = posts_tags.tag_id \
//!      WHERE posts_tags.post_id = $1"
//! );
//! assert_eq!(params.len(), 1);
//! ```

use crate::filter::{Filter, FilterValue};

/// An inner join: `INNER JOIN table ON left = right`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    /// Joined table.
    pub table: String,
    /// Left-hand column of the join condition.
    pub left: String,
    /// Right-hand column of the join condition.
    pub right: String,
}

impl Join {
    /// Create an inner join.
    pub fn inner(
        table: impl Into<String>,
        left: impl Into<String>,
        right: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            left: left.into(),
            right: right.into(),
        }
    }

    /// Generate the join clause.
    pub fn to_sql(&self) -> String {
        format!("INNER JOIN {} ON {} = {}", self.table, self.left, self.right)
    }
}

/// A single-table select with optional joins.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectQuery {
    /// Table rows are selected from.
    pub table: String,
    /// Projected column expressions; empty means `*`.
    pub columns: Vec<String>,
    /// Inner joins, in order.
    pub joins: Vec<Join>,
    /// WHERE clause.
    pub filter: Filter,
    /// Row limit.
    pub limit: Option<u64>,
}

impl SelectQuery {
    /// Create a query selecting every column of `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Add a column expression unless it is already projected.
    pub fn push_column(&mut self, column: impl Into<String>) -> &mut Self {
        let column = column.into();
        if !self.columns.contains(&column) {
            self.columns.push(column);
        }
        self
    }

    /// Add several column expressions.
    pub fn push_columns<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for column in columns {
            self.push_column(column);
        }
        self
    }

    /// Add a join unless an identical one exists.
    pub fn push_join(&mut self, join: Join) -> &mut Self {
        if !self.joins.contains(&join) {
            self.joins.push(join);
        }
        self
    }

    /// AND a filter onto the WHERE clause unless it is already there.
    pub fn push_filter(&mut self, filter: Filter) -> &mut Self {
        if !filter.is_none() && !self.filter.contains(&filter) {
            let current = std::mem::take(&mut self.filter);
            self.filter = current.and_then(filter);
        }
        self
    }

    /// Set the row limit.
    pub fn set_limit(&mut self, limit: u64) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    /// Whether any explicit columns are projected.
    pub fn has_columns(&self) -> bool {
        !self.columns.is_empty()
    }

    /// Generate SQL with `$n` placeholders.
    pub fn to_sql(&self) -> (String, Vec<FilterValue>) {
        let (where_sql, params) = self.filter.to_sql(0);

        let mut sql = String::from("SELECT ");
        if self.columns.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&self.columns.join(", "));
        }

        sql.push_str(" FROM ");
        sql.push_str(&self.table);

        for join in &self.joins {
            sql.push(' ');
            sql.push_str(&join.to_sql());
        }

        if !self.filter.is_none() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        (sql, params)
    }
}

/// Split a column expression into its source and output name.
///
/// `"posts_tags.tag_id AS _pivot_tag_id"` yields
/// `("posts_tags.tag_id", "_pivot_tag_id")`, `"tags.name"` yields
/// `("tags.name", "name")` and `"tags.*"` yields `("tags.*", "*")`.
pub fn column_alias(expr: &str) -> (&str, &str) {
    let trimmed = expr.trim();
    let lower = trimmed.to_ascii_lowercase();
    if let Some(pos) = lower.find(" as ") {
        let source = trimmed[..pos].trim();
        let alias = trimmed[pos + 4..].trim();
        return (source, alias);
    }
    let name = trimmed.rsplit('.').next().unwrap_or(trimmed);
    (trimmed, name)
}
