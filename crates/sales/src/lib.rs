//! Point-of-sale domain module.
//!
//! This crate contains the business rules of a checkout and of the sales
//! summary, implemented purely as deterministic domain logic (no IO, no
//! storage, no clocks).

pub mod checkout;
pub mod model;
pub mod report;

pub use checkout::{CheckoutRequest, ValidatedCheckout, validate};
pub use model::{CheckoutItem, Product, Transaction, TransactionDetail};
pub use report::{BestSeller, SalesPeriod, SalesSummary};
