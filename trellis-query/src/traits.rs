//! The data-store seam.
//!
//! The relation engine never talks to a database directly. Everything it
//! needs goes through [`QueryEngine`]: a select built from a
//! [`SelectQuery`], plus the row writes pivot management issues.
//! Each call receives the active [`TransactionContext`], if any, so an
//! engine can route it to the right connection.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::QueryResult;
use crate::filter::{Filter, FilterValue};
use crate::query::SelectQuery;
use crate::row::Row;
use crate::transaction::TransactionContext;

/// A boxed future for async operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Executes queries on behalf of the relation engine.
pub trait QueryEngine: Send + Sync {
    /// Run a select and return the resulting rows.
    ///
    /// Rows must carry the projected column names, including any
    /// `<expr> AS <alias>` aliases on the query.
    fn select<'a>(
        &'a self,
        query: &'a SelectQuery,
        tx: Option<&'a TransactionContext>,
    ) -> BoxFuture<'a, QueryResult<Vec<Row>>>;

    /// Insert one row, returning the generated identifier when the store
    /// produces one.
    fn insert<'a>(
        &'a self,
        table: &'a str,
        row: Row,
        tx: Option<&'a TransactionContext>,
    ) -> BoxFuture<'a, QueryResult<Option<FilterValue>>>;

    /// Update the rows matching `filter` with the columns in `row`,
    /// returning how many were affected.
    fn update<'a>(
        &'a self,
        table: &'a str,
        filter: &'a Filter,
        row: Row,
        tx: Option<&'a TransactionContext>,
    ) -> BoxFuture<'a, QueryResult<u64>>;

    /// Delete the rows matching `filter`, returning how many were removed.
    fn delete<'a>(
        &'a self,
        table: &'a str,
        filter: &'a Filter,
        tx: Option<&'a TransactionContext>,
    ) -> BoxFuture<'a, QueryResult<u64>>;
}

impl<E: QueryEngine + ?Sized> QueryEngine for Arc<E> {
    fn select<'a>(
        &'a self,
        query: &'a SelectQuery,
        tx: Option<&'a TransactionContext>,
    ) -> BoxFuture<'a, QueryResult<Vec<Row>>> {
        (**self).select(query, tx)
    }

    fn insert<'a>(
        &'a self,
        table: &'a str,
        row: Row,
        tx: Option<&'a TransactionContext>,
    ) -> BoxFuture<'a, QueryResult<Option<FilterValue>>> {
        (**self).insert(table, row, tx)
    }

    fn update<'a>(
        &'a self,
        table: &'a str,
        filter: &'a Filter,
        row: Row,
        tx: Option<&'a TransactionContext>,
    ) -> BoxFuture<'a, QueryResult<u64>> {
        (**self).update(table, filter, row, tx)
    }

    fn delete<'a>(
        &'a self,
        table: &'a str,
        filter: &'a Filter,
        tx: Option<&'a TransactionContext>,
    ) -> BoxFuture<'a, QueryResult<u64>> {
        (**self).delete(table, filter, tx)
    }
}

impl<E: QueryEngine + ?Sized> QueryEngine for &E {
    fn select<'a>(
        &'a self,
        query: &'a SelectQuery,
        tx: Option<&'a TransactionContext>,
    ) -> BoxFuture<'a, QueryResult<Vec<Row>>> {
        (**self).select(query, tx)
    }

    fn insert<'a>(
        &'a self,
        table: &'a str,
        row: Row,
        tx: Option<&'a TransactionContext>,
    ) -> BoxFuture<'a, QueryResult<Option<FilterValue>>> {
        (**self).insert(table, row, tx)
    }

    fn update<'a>(
        &'a self,
        table: &'a str,
        filter: &'a Filter,
        row: Row,
        tx: Option<&'a TransactionContext>,
    ) -> BoxFuture<'a, QueryResult<u64>> {
        (**self).update(table, filter, row, tx)
    }

    fn delete<'a>(
        &'a self,
        table: &'a str,
        filter: &'a Filter,
        tx: Option<&'a TransactionContext>,
    ) -> BoxFuture<'a, QueryResult<u64>> {
        (**self).delete(table, filter, tx)
    }
}
