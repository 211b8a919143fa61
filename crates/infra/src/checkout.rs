//! Checkout execution pipeline (application-level orchestration).
//!
//! ## Checkout Execution Flow
//!
//! ```text
//! items
//!   ↓
//! 0. Shape check (empty / non-positive quantities), before any unit of work
//!   ↓
//! 1. Begin unit of work
//!   ↓
//! 2. Lock product rows, ascending id order            → ProductsLocked
//!   ↓
//! 3. Validate against the locked rows, price lines    → Validated
//!   ↓
//! 4. Decrement stock (one batched write)              → StockDecremented
//!   ↓
//! 5. Insert transaction header                        → HeaderInserted
//!   ↓
//! 6. Insert details (one batched write)               → DetailsInserted
//!   ↓
//! 7. Commit                                           → Committed
//! ```
//!
//! Any failure in steps 2–6 rolls the unit of work back before the error is
//! returned (`RolledBack`). A failed commit is reported as a store error and
//! the caller must assume nothing was persisted.
//!
//! Two checkouts sharing a product serialize on the row hold taken in step 2;
//! the second one validates against the stock the first one left behind.

use tracing::{Span, debug, info, instrument, warn};
use uuid::Uuid;

use kasir_core::ValidationError;
use kasir_sales::{CheckoutItem, CheckoutRequest, Transaction, validate};

use crate::store::{Store, StoreError, UnitOfWork};

/// Progress of a single checkout.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CheckoutStage {
    Started,
    ProductsLocked,
    Validated,
    StockDecremented,
    HeaderInserted,
    DetailsInserted,
    Committed,
    RolledBack,
}

/// Why a checkout did not commit.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CheckoutError {
    /// The checkout was rejected on business grounds; nothing was written.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The store failed; the unit of work was rolled back (or never committed).
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CheckoutError {
    /// Stable machine-readable code for the request layer.
    pub fn code(&self) -> &'static str {
        match self {
            CheckoutError::Validation(e) => e.code(),
            CheckoutError::Store(StoreError::LockTimeout(_)) => "lock_timeout",
            CheckoutError::Store(_) => "store_error",
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, CheckoutError::Validation(_))
    }
}

/// Executes checkouts against an injected store handle.
///
/// ## Generic Parameters
///
/// - `S`: store implementation (PostgreSQL in production, in-memory in tests)
#[derive(Debug, Clone)]
pub struct CheckoutService<S> {
    store: S,
}

impl<S> CheckoutService<S>
where
    S: Store,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Validate, reserve stock, and record a sale as one unit of work.
    #[instrument(
        skip(self, items),
        fields(
            checkout_id = %Uuid::now_v7(),
            item_count = items.len(),
            transaction_id = tracing::field::Empty
        ),
        err
    )]
    pub async fn create_transaction(
        &self,
        items: Vec<CheckoutItem>,
    ) -> Result<Transaction, CheckoutError> {
        let request = CheckoutRequest::new(items)?;

        let mut unit = self.store.begin().await?;
        let mut stage = CheckoutStage::Started;

        let transaction = match run_checkout(&mut unit, &request, &mut stage).await {
            Ok(transaction) => transaction,
            Err(err) => {
                if let Err(rollback_err) = unit.rollback().await {
                    warn!(error = %rollback_err, "rollback failed; dropping unit of work");
                }
                warn!(
                    reached = ?stage,
                    outcome = ?CheckoutStage::RolledBack,
                    code = err.code(),
                    error = %err,
                    "checkout rolled back"
                );
                return Err(err);
            }
        };

        unit.commit().await.map_err(|err| {
            warn!(reached = ?stage, error = %err, "commit failed");
            CheckoutError::Store(err)
        })?;

        Span::current().record("transaction_id", transaction.id.get());
        info!(
            outcome = ?CheckoutStage::Committed,
            total_amount = transaction.total_amount.amount(),
            "checkout committed"
        );
        Ok(transaction)
    }
}

/// Steps 2–6. `stage` is left at the last stage reached.
async fn run_checkout<U>(
    unit: &mut U,
    request: &CheckoutRequest,
    stage: &mut CheckoutStage,
) -> Result<Transaction, CheckoutError>
where
    U: UnitOfWork,
{
    let products = unit.lock_products(&request.product_ids()).await?;
    advance(stage, CheckoutStage::ProductsLocked);

    let checkout = validate(request, &products)?;
    advance(stage, CheckoutStage::Validated);

    unit.decrement_stock(&request.net_quantities()).await?;
    advance(stage, CheckoutStage::StockDecremented);

    let header = unit.insert_header(checkout.total_amount).await?;
    advance(stage, CheckoutStage::HeaderInserted);

    unit.insert_details(header.id, &checkout.details).await?;
    advance(stage, CheckoutStage::DetailsInserted);

    Ok(Transaction {
        id: header.id,
        total_amount: checkout.total_amount,
        created_at: header.created_at,
        details: checkout.details,
    })
}

fn advance(stage: &mut CheckoutStage, next: CheckoutStage) {
    debug!(from = ?*stage, to = ?next, "checkout stage");
    *stage = next;
}
