//! Concurrent fan-out with controlled parallelism.
//!
//! Eager loading issues one fetch per relation of a level, and pivot
//! management one write per row. Those calls run concurrently through a
//! [`ConcurrentExecutor`], which bounds how many engine calls are in flight
//! at once and joins results back in request order. The first failure
//! aborts the join and drops the remaining calls.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::env::{EnvSource, StdEnvSource};
use crate::error::{QueryError, QueryResult};

/// Environment variable overriding [`ConcurrencyConfig::max_concurrency`].
pub const MAX_CONCURRENCY_ENV: &str = "TRELLIS_MAX_CONCURRENCY";

/// Configuration for concurrent execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcurrencyConfig {
    /// Maximum number of engine calls in flight at once.
    pub max_concurrency: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_concurrency: num_cpus::get().max(4),
        }
    }
}

impl ConcurrencyConfig {
    /// Create a config with the default limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum concurrency.
    #[must_use]
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    /// Read the limit from `TRELLIS_MAX_CONCURRENCY`.
    pub fn from_env() -> Self {
        Self::from_env_source(&StdEnvSource)
    }

    /// Read the limit from an arbitrary environment source.
    ///
    /// Unparseable or zero values fall back to the default.
    pub fn from_env_source(env: &impl EnvSource) -> Self {
        let config = Self::default();
        match env.get(MAX_CONCURRENCY_ENV) {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(max) if max > 0 => config.with_max_concurrency(max),
                _ => {
                    warn!(value = %raw, "Ignoring invalid {}", MAX_CONCURRENCY_ENV);
                    config
                }
            },
            None => config,
        }
    }
}

/// Statistics from concurrent execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    /// Engine calls issued through the executor.
    pub total_calls: u64,
    /// Maximum concurrent calls observed.
    pub max_concurrent: usize,
}

/// Executor for running engine calls with controlled parallelism.
#[derive(Debug)]
pub struct ConcurrentExecutor {
    config: ConcurrencyConfig,
    semaphore: Arc<Semaphore>,
    active: AtomicUsize,
    max_seen: AtomicUsize,
    total: AtomicU64,
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConcurrentExecutor {
    /// Create a new concurrent executor.
    pub fn new(config: ConcurrencyConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrency));
        Self {
            config,
            semaphore,
            active: AtomicUsize::new(0),
            max_seen: AtomicUsize::new(0),
            total: AtomicU64::new(0),
        }
    }

    /// The executor's configuration.
    pub fn config(&self) -> &ConcurrencyConfig {
        &self.config
    }

    /// Run one engine call under the concurrency limit.
    ///
    /// Only the call itself holds a permit, so nested fan-outs never wait on
    /// permits held by their parents.
    pub async fn limit<T, F>(&self, call: F) -> QueryResult<T>
    where
        F: Future<Output = QueryResult<T>>,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| QueryError::internal("concurrency limiter closed"))?;

        let current = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = ActiveGuard(&self.active);
        self.max_seen.fetch_max(current, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::Relaxed);

        call.await
    }

    /// Drive every task concurrently and return their outputs in input order.
    ///
    /// Fails fast: the first error is returned and the tasks still pending
    /// are dropped.
    pub async fn try_join_ordered<T, Fut, I>(&self, tasks: I) -> QueryResult<Vec<T>>
    where
        I: IntoIterator<Item = Fut>,
        Fut: Future<Output = QueryResult<T>>,
    {
        let mut pending: FuturesUnordered<_> = tasks
            .into_iter()
            .enumerate()
            .map(|(task_id, task)| async move { (task_id, task.await) })
            .collect();

        let task_count = pending.len();
        let mut results = Vec::with_capacity(task_count);

        while let Some((task_id, result)) = pending.next().await {
            match result {
                Ok(value) => results.push((task_id, value)),
                Err(err) => {
                    debug!(task_id, task_count, error = %err, "Concurrent task failed, aborting join");
                    return Err(err);
                }
            }
        }

        results.sort_by_key(|(task_id, _)| *task_id);
        Ok(results.into_iter().map(|(_, value)| value).collect())
    }

    /// Snapshot of the execution statistics.
    pub fn stats(&self) -> ExecutionStats {
        ExecutionStats {
            total_calls: self.total.load(Ordering::Relaxed),
            max_concurrent: self.max_seen.load(Ordering::SeqCst),
        }
    }
}

impl Default for ConcurrentExecutor {
    fn default() -> Self {
        Self::new(ConcurrencyConfig::default())
    }
}
