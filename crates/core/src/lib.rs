//! `kasir-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use entity::{Entity, index_by_id};
pub use error::{DomainResult, ValidationError};
pub use id::{InvalidId, ProductId, TransactionId};
pub use value_object::Money;
