//! Strongly-typed identifiers used across the domain.
//!
//! Identifiers are assigned by the relational store (`BIGSERIAL` keys), so they
//! wrap `i64` rather than a generated UUID.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

/// Identifier of a product row.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(i64);

/// Identifier of a committed sales transaction.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(i64);

/// Error returned when an identifier cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid identifier: {0}")]
pub struct InvalidId(String);

macro_rules! impl_int_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<i64> for $t {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$t> for i64 {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = InvalidId;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let value = i64::from_str(s).map_err(|e| InvalidId(format!("{}: {}", $name, e)))?;
                Ok(Self(value))
            }
        }
    };
}

impl_int_newtype!(ProductId, "ProductId");
impl_int_newtype!(TransactionId, "TransactionId");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_ids_order_numerically() {
        let mut ids = vec![ProductId::new(10), ProductId::new(2), ProductId::new(7)];
        ids.sort();
        assert_eq!(ids, vec![ProductId::new(2), ProductId::new(7), ProductId::new(10)]);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!("42".parse::<ProductId>().unwrap(), ProductId::new(42));
        let err = "forty-two".parse::<TransactionId>().unwrap_err();
        assert!(err.to_string().starts_with("invalid identifier: TransactionId"));
    }

    #[test]
    fn serializes_as_bare_integer() {
        let json = serde_json::to_string(&TransactionId::new(9)).unwrap();
        assert_eq!(json, "9");
    }
}
