//! Transaction context threaded through relation loading and pivot writes.
//!
//! The relation engine does not open or commit transactions itself. A caller
//! that already holds one wraps it in a [`TransactionContext`] and hands it
//! to the loader; every select, insert and delete issued for that top-level
//! operation, including recursive eager loads and individual pivot rows,
//! then receives the same context.
//!
//! ```rust
//! use trellis_query::TransactionContext;
//!
//! let tx = TransactionContext::new();
//! let same = tx.clone();
//! assert_eq!(tx.id(), same.id());
//! assert_ne!(tx.id(), TransactionContext::new().id());
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Handle for a caller-owned transaction.
///
/// Cloning keeps the identifier, so every clone refers to the same
/// underlying transaction. Engines map the identifier back to their own
/// connection or transaction handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionContext {
    id: u64,
}

impl TransactionContext {
    /// Create a context with a fresh identifier.
    pub fn new() -> Self {
        let id = NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed);
        debug!(tx_id = id, "Transaction context created");
        Self { id }
    }

    /// Process-unique identifier of this transaction.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Default for TransactionContext {
    fn default() -> Self {
        Self::new()
    }
}
