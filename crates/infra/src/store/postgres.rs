//! Postgres-backed store implementation.
//!
//! Each unit of work is one database transaction. Row holds are
//! `SELECT … FOR UPDATE` locks; batched writes are single statements over
//! `UNNEST`ed arrays, so one checkout costs a fixed number of round trips no
//! matter how many lines it carries.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `StoreError` as follows:
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database | `55P03` | `LockTimeout` | A row hold exceeded `lock_timeout` |
//! | Database | `40P01` | `Deadlock` | The server aborted us to break a lock cycle |
//! | Database | `23xxx` | `ConstraintViolation` | e.g. `CHECK (stock >= 0)`, foreign keys |
//! | Database (other) | Any other | `Database` | Other database errors |
//! | PoolClosed / PoolTimedOut / Io / Tls | N/A | `Unavailable` | Connectivity |
//! | ColumnDecode / Decode / ColumnNotFound | N/A | `Decode` | Schema drift |
//! | Other | N/A | `Database` | Anything else |
//!
//! ## Thread Safety
//!
//! `PgStore` is `Send + Sync` and cheap to clone; the SQLx pool handles
//! connection management.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{Span, instrument};

use kasir_core::{Money, ProductId, TransactionId, index_by_id};
use kasir_sales::{BestSeller, Product, SalesPeriod, SalesSummary, TransactionDetail};

use super::r#trait::{
    ProductLocker, SalesReportSource, StockMutator, Store, StoreError, TransactionHeader,
    TransactionWriter, UnitOfWork,
};

/// Postgres store handle.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgStore {
    /// Wrap a pool owned by the caller.
    ///
    /// `lock_timeout` bounds every row-hold wait inside units of work opened
    /// from this handle.
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    type Unit = PgUnitOfWork;

    #[instrument(skip(self), err)]
    async fn begin(&self) -> Result<Self::Unit, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_begin_error(map_sqlx_error("begin_transaction", e)))?;

        // SET LOCAL cannot take bind parameters; set_config(.., true) is the same thing.
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_lock_timeout", e))?;

        Ok(PgUnitOfWork { tx })
    }
}

/// One Postgres transaction.
///
/// Dropping it without committing rolls the transaction back.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl ProductLocker for PgUnitOfWork {
    #[instrument(skip(self, ids), fields(product_count = ids.len(), locked = tracing::field::Empty), err)]
    async fn lock_products(
        &mut self,
        ids: &BTreeSet<ProductId>,
    ) -> Result<HashMap<ProductId, Product>, StoreError> {
        let ids: Vec<i64> = ids.iter().map(|id| id.get()).collect();

        // ORDER BY puts the sort below the row-locking step, so rows are
        // locked in id order whatever plan the server picks for the scan.
        let rows = sqlx::query(
            r#"
            SELECT id, name, price, stock
            FROM products
            WHERE id = ANY($1)
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_products", e))?;

        let products = rows
            .iter()
            .map(product_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Decode(format!("failed to decode product row: {e}")))?;
        let products = index_by_id(products);

        Span::current().record("locked", products.len());
        Ok(products)
    }
}

#[async_trait]
impl StockMutator for PgUnitOfWork {
    #[instrument(skip(self, quantities), fields(product_count = quantities.len()), err)]
    async fn decrement_stock(
        &mut self,
        quantities: &BTreeMap<ProductId, i64>,
    ) -> Result<(), StoreError> {
        if quantities.is_empty() {
            return Ok(());
        }

        let (ids, amounts): (Vec<i64>, Vec<i64>) =
            quantities.iter().map(|(id, qty)| (id.get(), *qty)).unzip();

        let result = sqlx::query(
            r#"
            UPDATE products AS p
            SET stock = p.stock - v.qty
            FROM UNNEST($1::bigint[], $2::bigint[]) AS v(id, qty)
            WHERE p.id = v.id
            "#,
        )
        .bind(&ids)
        .bind(&amounts)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("decrement_stock", e))?;

        if result.rows_affected() != ids.len() as u64 {
            return Err(StoreError::Database(format!(
                "stock update touched {} of {} products",
                result.rows_affected(),
                ids.len()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionWriter for PgUnitOfWork {
    #[instrument(skip(self, total_amount), fields(total_amount = total_amount.amount()), err)]
    async fn insert_header(&mut self, total_amount: Money) -> Result<TransactionHeader, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO transactions (total_amount)
            VALUES ($1)
            RETURNING id, created_at
            "#,
        )
        .bind(total_amount.amount())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_header", e))?;

        let id: i64 = row
            .try_get("id")
            .map_err(|e| StoreError::Decode(format!("failed to read transaction id: {e}")))?;
        let created_at: DateTime<Utc> = row
            .try_get("created_at")
            .map_err(|e| StoreError::Decode(format!("failed to read created_at: {e}")))?;

        Ok(TransactionHeader {
            id: TransactionId::new(id),
            created_at,
        })
    }

    #[instrument(skip(self, details), fields(detail_count = details.len()), err)]
    async fn insert_details(
        &mut self,
        transaction_id: TransactionId,
        details: &[TransactionDetail],
    ) -> Result<(), StoreError> {
        if details.is_empty() {
            return Ok(());
        }

        let mut product_ids = Vec::with_capacity(details.len());
        let mut quantities = Vec::with_capacity(details.len());
        let mut subtotals = Vec::with_capacity(details.len());
        for detail in details {
            product_ids.push(detail.product_id.get());
            quantities.push(detail.quantity);
            subtotals.push(detail.subtotal.amount());
        }

        sqlx::query(
            r#"
            INSERT INTO transaction_details (transaction_id, product_id, quantity, subtotal)
            SELECT $1, d.product_id, d.quantity, d.subtotal
            FROM UNNEST($2::bigint[], $3::bigint[], $4::bigint[])
                WITH ORDINALITY AS d(product_id, quantity, subtotal, line_no)
            ORDER BY d.line_no
            "#,
        )
        .bind(transaction_id.get())
        .bind(&product_ids)
        .bind(&quantities)
        .bind(&subtotals)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_details", e))?;

        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback_transaction", e))
    }
}

#[async_trait]
impl SalesReportSource for PgStore {
    #[instrument(skip(self), err)]
    async fn sales_summary(&self, period: SalesPeriod) -> Result<SalesSummary, StoreError> {
        // NULL bounds resolve to the server's CURRENT_DATE.
        let (start, end): (Option<NaiveDate>, Option<NaiveDate>) = match period {
            SalesPeriod::Today => (None, None),
            SalesPeriod::Between { start, end } => (Some(start), Some(end)),
        };

        let totals = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(total_amount), 0)::bigint AS total_revenue,
                COUNT(*) AS total_transactions
            FROM transactions
            WHERE created_at::date BETWEEN COALESCE($1::date, CURRENT_DATE)
                                       AND COALESCE($2::date, CURRENT_DATE)
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("sales_totals", e))?;

        let total_revenue: i64 = totals
            .try_get("total_revenue")
            .map_err(|e| StoreError::Decode(format!("failed to read total_revenue: {e}")))?;
        let total_transactions: i64 = totals
            .try_get("total_transactions")
            .map_err(|e| StoreError::Decode(format!("failed to read total_transactions: {e}")))?;

        let best = sqlx::query(
            r#"
            SELECT p.name, SUM(td.quantity)::bigint AS quantity_sold
            FROM transaction_details td
            JOIN transactions t ON t.id = td.transaction_id
            JOIN products p ON p.id = td.product_id
            WHERE t.created_at::date BETWEEN COALESCE($1::date, CURRENT_DATE)
                                         AND COALESCE($2::date, CURRENT_DATE)
            GROUP BY p.name
            ORDER BY quantity_sold DESC, p.name ASC
            LIMIT 1
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("best_seller", e))?;

        let best_seller = match best {
            Some(row) => {
                let name: String = row
                    .try_get("name")
                    .map_err(|e| StoreError::Decode(format!("failed to read name: {e}")))?;
                let quantity_sold: i64 = row
                    .try_get("quantity_sold")
                    .map_err(|e| StoreError::Decode(format!("failed to read quantity_sold: {e}")))?;
                BestSeller::pick([(name, quantity_sold)])
            }
            None => None,
        };

        Ok(SalesSummary {
            total_revenue: Money::new(total_revenue),
            total_transactions,
            best_seller,
        })
    }
}

fn product_from_row(row: &PgRow) -> Result<Product, sqlx::Error> {
    Ok(Product {
        id: ProductId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        price: Money::new(row.try_get("price")?),
        stock: row.try_get("stock")?,
    })
}

/// A unit of work that never opened is an availability problem, whatever the cause.
fn map_begin_error(err: StoreError) -> StoreError {
    match err {
        StoreError::Unavailable(_) => err,
        other => StoreError::Unavailable(other.to_string()),
    }
}

/// Map SQLx errors to StoreError.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("55P03") => StoreError::LockTimeout(msg),
                Some("40P01") => StoreError::Deadlock(msg),
                Some(code) if code.starts_with("23") => StoreError::ConstraintViolation(msg),
                _ => StoreError::Database(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("timed out acquiring a connection in {operation}"))
        }
        sqlx::Error::Io(e) => StoreError::Unavailable(format!("io error in {operation}: {e}")),
        sqlx::Error::Tls(e) => StoreError::Unavailable(format!("tls error in {operation}: {e}")),
        err @ (sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::ColumnNotFound(_)) => {
            StoreError::Decode(format!("{operation}: {err}"))
        }
        _ => StoreError::Database(format!("sqlx error in {operation}: {err}")),
    }
}
