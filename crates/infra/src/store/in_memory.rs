use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::OwnedMutexGuard;

use kasir_core::{Money, ProductId, TransactionId, index_by_id};
use kasir_sales::{BestSeller, Product, SalesPeriod, SalesSummary, Transaction, TransactionDetail};

use super::r#trait::{
    ProductLocker, SalesReportSource, StockMutator, Store, StoreError, TransactionHeader,
    TransactionWriter, UnitOfWork,
};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

type RowLock = Arc<tokio::sync::Mutex<()>>;

#[derive(Debug, Default)]
struct Tables {
    products: BTreeMap<ProductId, Product>,
    transactions: Vec<Transaction>,
}

#[derive(Debug)]
struct Shared {
    tables: RwLock<Tables>,
    row_locks: Mutex<HashMap<ProductId, RowLock>>,
    next_transaction_id: AtomicI64,
    lock_timeout: Duration,
}

/// In-memory transactional store.
///
/// Intended for tests/dev. Mirrors the row-locking behaviour of the
/// PostgreSQL store: every product row has an exclusive hold that a unit of
/// work keeps until it commits, rolls back, or is dropped. Writes are staged
/// in the unit of work and applied under one table lock at commit.
///
/// The lock timeout bounds each row wait separately, so locking `n` contended
/// rows may take up to `n` timeouts in total.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    shared: Arc<Shared>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: RwLock::new(Tables::default()),
                row_locks: Mutex::new(HashMap::new()),
                next_transaction_id: AtomicI64::new(1),
                lock_timeout,
            }),
        }
    }

    /// Insert or replace a product row.
    pub fn insert_product(&self, product: Product) -> Result<(), StoreError> {
        let id = product.id;
        self.shared.write_tables()?.products.insert(id, product);
        self.shared
            .row_locks()?
            .entry(id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())));
        Ok(())
    }

    /// Committed state of a product row.
    pub fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.shared.read_tables()?.products.get(&id).cloned())
    }

    /// Committed transactions, in commit order.
    pub fn transactions(&self) -> Result<Vec<Transaction>, StoreError> {
        Ok(self.shared.read_tables()?.transactions.clone())
    }

    /// Record an already-committed transaction (e.g. imported history).
    pub fn record_transaction(&self, transaction: Transaction) -> Result<(), StoreError> {
        self.shared
            .next_transaction_id
            .fetch_max(transaction.id.get() + 1, Ordering::SeqCst);
        self.shared.write_tables()?.transactions.push(transaction);
        Ok(())
    }
}

impl Shared {
    fn read_tables(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    fn write_tables(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    fn row_locks(&self) -> Result<std::sync::MutexGuard<'_, HashMap<ProductId, RowLock>>, StoreError> {
        self.row_locks
            .lock()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    fn row_lock(&self, id: ProductId) -> Result<Option<RowLock>, StoreError> {
        Ok(self.row_locks()?.get(&id).cloned())
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Unit = InMemoryUnitOfWork;

    async fn begin(&self) -> Result<Self::Unit, StoreError> {
        Ok(InMemoryUnitOfWork {
            shared: self.shared.clone(),
            holds: BTreeMap::new(),
            stock_writes: BTreeMap::new(),
            header: None,
            details: Vec::new(),
        })
    }
}

/// Unit of work over an [`InMemoryStore`].
///
/// Row holds are released when the unit is committed, rolled back, or dropped.
#[derive(Debug)]
pub struct InMemoryUnitOfWork {
    shared: Arc<Shared>,
    holds: BTreeMap<ProductId, OwnedMutexGuard<()>>,
    stock_writes: BTreeMap<ProductId, i64>,
    header: Option<(TransactionHeader, Money)>,
    details: Vec<TransactionDetail>,
}

impl InMemoryUnitOfWork {
    /// Identifiers currently held by this unit, ascending.
    pub fn held_products(&self) -> Vec<ProductId> {
        self.holds.keys().copied().collect()
    }
}

#[async_trait]
impl ProductLocker for InMemoryUnitOfWork {
    async fn lock_products(
        &mut self,
        ids: &BTreeSet<ProductId>,
    ) -> Result<HashMap<ProductId, Product>, StoreError> {
        // BTreeSet iteration is ascending: holds are always taken in id order.
        for &id in ids {
            if self.holds.contains_key(&id) {
                continue;
            }
            let Some(lock) = self.shared.row_lock(id)? else {
                continue;
            };
            // Each wait is bounded on its own, like Postgres' lock_timeout.
            let guard = tokio::time::timeout(self.shared.lock_timeout, lock.lock_owned())
                .await
                .map_err(|_| {
                    StoreError::LockTimeout(format!(
                        "product {id} not granted within {:?}",
                        self.shared.lock_timeout
                    ))
                })?;
            self.holds.insert(id, guard);
        }

        let tables = self.shared.read_tables()?;
        let products = ids.iter().filter_map(|id| {
            let mut product = tables.products.get(id)?.clone();
            product.stock -= self.stock_writes.get(id).copied().unwrap_or(0);
            Some(product)
        });
        Ok(index_by_id(products))
    }
}

#[async_trait]
impl StockMutator for InMemoryUnitOfWork {
    async fn decrement_stock(
        &mut self,
        quantities: &BTreeMap<ProductId, i64>,
    ) -> Result<(), StoreError> {
        if let Some(id) = quantities.keys().find(|id| !self.holds.contains_key(id)) {
            return Err(StoreError::Database(format!(
                "stock write on product {id} without a row hold"
            )));
        }
        for (id, quantity) in quantities {
            *self.stock_writes.entry(*id).or_insert(0) += quantity;
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionWriter for InMemoryUnitOfWork {
    async fn insert_header(&mut self, total_amount: Money) -> Result<TransactionHeader, StoreError> {
        if self.header.is_some() {
            return Err(StoreError::Database(
                "transaction header already inserted in this unit of work".to_string(),
            ));
        }
        // Like a database sequence: ids consumed by rolled-back units leave gaps.
        let id = self.shared.next_transaction_id.fetch_add(1, Ordering::SeqCst);
        let header = TransactionHeader {
            id: TransactionId::new(id),
            created_at: Utc::now(),
        };
        self.header = Some((header, total_amount));
        Ok(header)
    }

    async fn insert_details(
        &mut self,
        transaction_id: TransactionId,
        details: &[TransactionDetail],
    ) -> Result<(), StoreError> {
        match &self.header {
            Some((header, _)) if header.id == transaction_id => {
                self.details.extend_from_slice(details);
                Ok(())
            }
            _ => Err(StoreError::ConstraintViolation(format!(
                "transaction {transaction_id} does not exist"
            ))),
        }
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn commit(self) -> Result<(), StoreError> {
        let mut tables = self.shared.write_tables()?;

        // Check every row first so a violation leaves the tables untouched.
        for (id, quantity) in &self.stock_writes {
            let product = tables
                .products
                .get(id)
                .ok_or_else(|| StoreError::Database(format!("product {id} vanished")))?;
            if product.stock - quantity < 0 {
                return Err(StoreError::ConstraintViolation(format!(
                    "stock of product {id} would become negative"
                )));
            }
        }
        for (id, quantity) in &self.stock_writes {
            if let Some(product) = tables.products.get_mut(id) {
                product.stock -= quantity;
            }
        }

        if let Some((header, total_amount)) = self.header {
            tables.transactions.push(Transaction {
                id: header.id,
                total_amount,
                created_at: header.created_at,
                details: self.details,
            });
        }

        // Holds are released only after the writes are visible.
        drop(tables);
        drop(self.holds);
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl SalesReportSource for InMemoryStore {
    async fn sales_summary(&self, period: SalesPeriod) -> Result<SalesSummary, StoreError> {
        let today = Utc::now().date_naive();
        let tables = self.shared.read_tables()?;

        let mut summary = SalesSummary::default();
        let mut sold: BTreeMap<String, i64> = BTreeMap::new();

        for tx in tables
            .transactions
            .iter()
            .filter(|tx| period.contains(tx.created_at.date_naive(), today))
        {
            summary.total_revenue = summary
                .total_revenue
                .checked_add(tx.total_amount)
                .ok_or_else(|| StoreError::Database("revenue overflow".to_string()))?;
            summary.total_transactions += 1;

            for detail in &tx.details {
                // Grouped by the product's current name, falling back to the snapshot.
                let name = tables
                    .products
                    .get(&detail.product_id)
                    .map_or_else(|| detail.product_name.clone(), |p| p.name.clone());
                *sold.entry(name).or_insert(0) += detail.quantity;
            }
        }

        summary.best_seller = BestSeller::pick(sold);
        Ok(summary)
    }
}
