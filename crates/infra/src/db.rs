//! Connection pool and schema bootstrap for PostgreSQL.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, instrument};

use crate::config::DatabaseConfig;
use crate::store::StoreError;
use crate::store::postgres::map_sqlx_error;

/// DDL for products, transactions and transaction_details. Idempotent.
pub const SCHEMA: &str = include_str!("../schema.sql");

/// Open a pool sized per `config`.
#[instrument(skip(config), fields(url = %config.redacted_url()), err)]
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(&config.url)
        .await
        .map_err(|e| map_sqlx_error("connect", e))?;

    info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "database pool ready"
    );
    Ok(pool)
}

/// Create the tables if they do not exist yet.
pub async fn apply_schema(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("apply_schema", e))?;
    Ok(())
}
