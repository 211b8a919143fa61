use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use kasir_core::{Money, ProductId, TransactionId};
use kasir_sales::{Product, SalesPeriod, SalesSummary, TransactionDetail};

/// Store operation error.
///
/// These are **infrastructure errors** (connectivity, locking, constraint
/// enforcement) as opposed to domain errors (validation). Callers must assume
/// that a unit of work that returned one of these had no durable effect.
///
/// ## Error Categories
///
/// - **Unavailable**: the store could not be reached or a unit of work could not be opened
/// - **LockTimeout**: a row hold was not granted within the configured lock timeout
/// - **Deadlock**: the store aborted this unit of work to break a lock cycle
/// - **ConstraintViolation**: a schema constraint (e.g. `stock >= 0`) rejected a write
/// - **Database**: any other query/write failure
/// - **Decode**: a row could not be decoded into a domain type
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("lock timeout: {0}")]
    LockTimeout(String),

    #[error("deadlock detected: {0}")]
    Deadlock(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("failed to decode row: {0}")]
    Decode(String),
}

/// Identifier and creation time assigned by the store to a new transaction row.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TransactionHeader {
    pub id: TransactionId,
    pub created_at: DateTime<Utc>,
}

/// Reads product rows and takes exclusive holds on them.
#[async_trait]
pub trait ProductLocker: Send {
    /// Lock and read every existing product in `ids`.
    ///
    /// Holds are acquired in ascending identifier order and kept until the
    /// enclosing unit of work commits or rolls back. Identifiers without a row
    /// are absent from the result.
    async fn lock_products(
        &mut self,
        ids: &BTreeSet<ProductId>,
    ) -> Result<HashMap<ProductId, Product>, StoreError>;
}

/// Applies stock decrements as one batched write.
#[async_trait]
pub trait StockMutator: Send {
    /// Subtract `quantities[id]` from the stock of each product.
    ///
    /// Every product must already be held by this unit of work.
    async fn decrement_stock(
        &mut self,
        quantities: &BTreeMap<ProductId, i64>,
    ) -> Result<(), StoreError>;
}

/// Writes the transaction header and its details.
#[async_trait]
pub trait TransactionWriter: Send {
    async fn insert_header(&mut self, total_amount: Money) -> Result<TransactionHeader, StoreError>;

    /// Persist all details of `transaction_id` in one batched write, keeping their order.
    async fn insert_details(
        &mut self,
        transaction_id: TransactionId,
        details: &[TransactionDetail],
    ) -> Result<(), StoreError>;
}

/// An open unit of work: either everything it wrote takes effect, or nothing.
///
/// Dropping a unit of work without calling [`UnitOfWork::commit`] discards it.
#[async_trait]
pub trait UnitOfWork: ProductLocker + StockMutator + TransactionWriter {
    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}

/// Handle to a transactional store.
///
/// Handles are cheap to clone and are injected into the services that need
/// them; the composition root owns their lifecycle.
#[async_trait]
pub trait Store: Send + Sync {
    type Unit: UnitOfWork;

    /// Open a new unit of work.
    async fn begin(&self) -> Result<Self::Unit, StoreError>;
}

/// Read-only aggregation over committed transactions.
#[async_trait]
pub trait SalesReportSource: Send + Sync {
    async fn sales_summary(&self, period: SalesPeriod) -> Result<SalesSummary, StoreError>;
}
