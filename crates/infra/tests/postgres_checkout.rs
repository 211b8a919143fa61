//! Checkout against a live PostgreSQL.
//!
//! Run with `DATABASE_URL=postgres://... cargo test -p kasir-infra -- --ignored`.
//! Every test seeds its own products, so the suite can share one database.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use kasir_core::{Money, ProductId};
use kasir_infra::checkout::CheckoutService;
use kasir_infra::config::DatabaseConfig;
use kasir_infra::db;
use kasir_infra::report::ReportService;
use kasir_infra::store::{PgStore, ProductLocker, Store, StoreError, UnitOfWork};
use kasir_sales::CheckoutItem;

async fn pool() -> PgPool {
    kasir_observability::init();
    let config = DatabaseConfig::from_env().expect("DATABASE_URL must be set");
    let pool = db::connect(&config).await.expect("connect");
    db::apply_schema(&pool).await.expect("schema");
    pool
}

async fn seed(pool: &PgPool, name: &str, price: i64, stock: i64) -> ProductId {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO products (name, price, stock) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(name)
    .bind(price)
    .bind(stock)
    .fetch_one(pool)
    .await
    .expect("seed product");
    ProductId::new(id)
}

async fn stock(pool: &PgPool, id: ProductId) -> i64 {
    sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
        .bind(id.get())
        .fetch_one(pool)
        .await
        .expect("read stock")
}

async fn detail_count(pool: &PgPool, transaction_id: i64) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM transaction_details WHERE transaction_id = $1")
        .bind(transaction_id)
        .fetch_one(pool)
        .await
        .expect("count details")
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn checkout_persists_header_details_and_stock() {
    let pool = pool().await;
    let pen = seed(&pool, "Pen", 10, 5).await;
    let book = seed(&pool, "Book", 50, 2).await;
    let service = CheckoutService::new(PgStore::new(pool.clone(), Duration::from_secs(5)));

    let transaction = service
        .create_transaction(vec![CheckoutItem::new(book, 1), CheckoutItem::new(pen, 3)])
        .await
        .unwrap();

    assert_eq!(transaction.total_amount, Money::new(80));
    assert_eq!(transaction.details.len(), 2);
    assert_eq!(transaction.details[0].product_name, "Book");
    assert_eq!(transaction.details[1].subtotal, Money::new(30));
    assert_eq!(stock(&pool, pen).await, 2);
    assert_eq!(stock(&pool, book).await, 1);
    assert_eq!(detail_count(&pool, transaction.id.get()).await, 2);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn insufficient_stock_leaves_everything_untouched() {
    let pool = pool().await;
    let pen = seed(&pool, "Pen", 10, 5).await;
    let book = seed(&pool, "Book", 50, 2).await;
    let service = CheckoutService::new(PgStore::new(pool.clone(), Duration::from_secs(5)));

    let err = service
        .create_transaction(vec![CheckoutItem::new(pen, 1), CheckoutItem::new(book, 3)])
        .await
        .unwrap_err();

    assert_eq!(err.code(), "insufficient_stock");
    assert_eq!(stock(&pool, pen).await, 5);
    assert_eq!(stock(&pool, book).await, 2);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn unknown_product_is_rejected() {
    let pool = pool().await;
    let pen = seed(&pool, "Pen", 10, 5).await;
    let service = CheckoutService::new(PgStore::new(pool.clone(), Duration::from_secs(5)));

    let err = service
        .create_transaction(vec![
            CheckoutItem::new(pen, 1),
            CheckoutItem::new(ProductId::new(i64::MAX), 1),
        ])
        .await
        .unwrap_err();

    assert_eq!(err.code(), "product_not_found");
    assert_eq!(stock(&pool, pen).await, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires DATABASE_URL"]
async fn concurrent_checkouts_do_not_oversell() {
    let pool = pool().await;
    let pen = seed(&pool, "Pen", 10, 10).await;
    let service = Arc::new(CheckoutService::new(PgStore::new(
        pool.clone(),
        Duration::from_secs(5),
    )));

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .create_transaction(vec![CheckoutItem::new(pen, 1)])
                    .await
            })
        })
        .collect();

    let mut committed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => committed += 1,
            Err(err) => assert_eq!(err.code(), "insufficient_stock"),
        }
    }

    assert_eq!(committed, 10);
    assert_eq!(stock(&pool, pen).await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires DATABASE_URL"]
async fn opposite_request_orders_do_not_deadlock() {
    let pool = pool().await;
    let pen = seed(&pool, "Pen", 10, 1_000).await;
    let book = seed(&pool, "Book", 50, 1_000).await;
    let service = Arc::new(CheckoutService::new(PgStore::new(
        pool.clone(),
        Duration::from_secs(5),
    )));

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let service = service.clone();
            let items = if i % 2 == 0 {
                vec![CheckoutItem::new(pen, 1), CheckoutItem::new(book, 1)]
            } else {
                vec![CheckoutItem::new(book, 1), CheckoutItem::new(pen, 1)]
            };
            tokio::spawn(async move { service.create_transaction(items).await })
        })
        .collect();

    for handle in handles {
        let result = handle.await.unwrap();
        assert!(result.is_ok(), "checkout failed: {:?}", result.err());
    }

    assert_eq!(stock(&pool, pen).await, 980);
    assert_eq!(stock(&pool, book).await, 980);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn held_row_makes_second_checkout_time_out() {
    let pool = pool().await;
    let pen = seed(&pool, "Pen", 10, 5).await;
    let store = PgStore::new(pool.clone(), Duration::from_millis(200));

    let mut holder = store.begin().await.unwrap();
    let held = holder.lock_products(&[pen].into_iter().collect()).await.unwrap();
    assert!(held.contains_key(&pen));

    let service = CheckoutService::new(store.clone());
    let err = service
        .create_transaction(vec![CheckoutItem::new(pen, 1)])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        kasir_infra::CheckoutError::Store(StoreError::LockTimeout(_))
    ));
    assert_eq!(err.code(), "lock_timeout");

    holder.rollback().await.unwrap();
    assert_eq!(stock(&pool, pen).await, 5);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn todays_summary_counts_fresh_checkouts() {
    let pool = pool().await;
    let pen = seed(&pool, "Pen", 10, 50).await;
    let store = PgStore::new(pool.clone(), Duration::from_secs(5));
    let reports = ReportService::new(store.clone());

    let before = reports.sales_summary(None, None).await.unwrap();
    CheckoutService::new(store)
        .create_transaction(vec![CheckoutItem::new(pen, 4)])
        .await
        .unwrap();
    let after = reports.sales_summary(None, None).await.unwrap();

    assert!(after.total_transactions > before.total_transactions);
    assert!(after.total_revenue.amount() >= before.total_revenue.amount() + 40);
    assert!(after.best_seller.is_some());
}
