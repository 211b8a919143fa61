//! Domain error model.

use chrono::NaiveDate;
use thiserror::Error;

use crate::id::ProductId;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, ValidationError>;

/// Domain-level validation failure.
///
/// Keep this focused on deterministic, business failures that are detected
/// before anything durable is written. Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The checkout carried no items.
    #[error("checkout has no items")]
    EmptyCheckout,

    /// A requested quantity was zero or negative.
    #[error("invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: ProductId, quantity: i64 },

    /// A requested product does not exist.
    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    /// A requested quantity exceeds the stock available to this checkout.
    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: i64,
        available: i64,
    },

    /// Subtotal or total arithmetic overflowed.
    #[error("amount overflow")]
    AmountOverflow,

    /// A report period whose start lies after its end.
    #[error("invalid date range: {start} is after {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
}

impl ValidationError {
    pub fn insufficient_stock(product_id: ProductId, requested: i64, available: i64) -> Self {
        Self::InsufficientStock {
            product_id,
            requested,
            available,
        }
    }

    /// Stable machine-readable code for the request layer.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyCheckout => "empty_checkout",
            Self::InvalidQuantity { .. } => "invalid_quantity",
            Self::ProductNotFound(_) => "product_not_found",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::AmountOverflow => "amount_overflow",
            Self::InvalidDateRange { .. } => "invalid_date_range",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failing_product() {
        let err = ValidationError::ProductNotFound(ProductId::new(7));
        assert_eq!(err.to_string(), "product 7 not found");

        let err = ValidationError::insufficient_stock(ProductId::new(2), 3, 2);
        assert_eq!(
            err.to_string(),
            "insufficient stock for product 2: requested 3, available 2"
        );
    }

    #[test]
    fn codes_distinguish_not_found_from_insufficient_stock() {
        assert_eq!(
            ValidationError::ProductNotFound(ProductId::new(1)).code(),
            "product_not_found"
        );
        assert_eq!(
            ValidationError::insufficient_stock(ProductId::new(1), 2, 1).code(),
            "insufficient_stock"
        );
        assert_eq!(ValidationError::EmptyCheckout.code(), "empty_checkout");
    }
}
