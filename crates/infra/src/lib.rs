//! Infrastructure layer: stores, checkout orchestration, reports, config.

pub mod checkout;
pub mod config;
pub mod db;
pub mod report;
pub mod store;


pub use checkout::{CheckoutError, CheckoutService, CheckoutStage};
pub use config::{ConfigError, DatabaseConfig};
pub use report::{ReportError, ReportService};
pub use store::{InMemoryStore, PgStore, Store, StoreError};
