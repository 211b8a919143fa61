use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kasir_core::{Entity, Money, ProductId, TransactionId};

/// A sellable product as read from the store.
///
/// Stock is only ever decremented by a committed checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Unit price in the smallest currency unit.
    pub price: Money,
    pub stock: i64,
}

impl Product {
    pub fn new(id: ProductId, name: impl Into<String>, price: Money, stock: i64) -> Self {
        Self {
            id,
            name: name.into(),
            price,
            stock,
        }
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// One requested line of a checkout.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutItem {
    pub product_id: ProductId,
    pub quantity: i64,
}

impl CheckoutItem {
    pub fn new(product_id: ProductId, quantity: i64) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// Line of a committed transaction.
///
/// Name and subtotal are snapshots taken while the product row was locked;
/// later price or name changes do not touch them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDetail {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: i64,
    pub subtotal: Money,
}

/// A committed sale: header plus its details in checkout order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub total_amount: Money,
    pub created_at: DateTime<Utc>,
    pub details: Vec<TransactionDetail>,
}

impl Entity for Transaction {
    type Id = TransactionId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_serializes_with_flat_ids_and_amounts() {
        let tx = Transaction {
            id: TransactionId::new(1),
            total_amount: Money::new(30),
            created_at: DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
            details: vec![TransactionDetail {
                product_id: ProductId::new(1),
                product_name: "Pen".to_string(),
                quantity: 3,
                subtotal: Money::new(30),
            }],
        };

        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["id"], 1);
        assert_eq!(json["total_amount"], 30);
        assert_eq!(json["details"][0]["product_id"], 1);
        assert_eq!(json["details"][0]["product_name"], "Pen");
        assert_eq!(json["details"][0]["subtotal"], 30);
    }

    #[test]
    fn checkout_item_deserializes_from_request_shape() {
        let item: CheckoutItem =
            serde_json::from_str(r#"{"product_id": 2, "quantity": 3}"#).unwrap();
        assert_eq!(item, CheckoutItem::new(ProductId::new(2), 3));
    }
}
