//! Transactional store boundary.
//!
//! The checkout core talks to storage only through the traits in this module.
//! Two implementations ship: PostgreSQL (production) and in-memory (tests/dev).

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::{InMemoryStore, InMemoryUnitOfWork};
pub use postgres::{PgStore, PgUnitOfWork};
pub use r#trait::{
    ProductLocker, SalesReportSource, StockMutator, Store, StoreError, TransactionHeader,
    TransactionWriter, UnitOfWork,
};
