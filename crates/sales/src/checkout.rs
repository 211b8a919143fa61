//! Checkout decision logic.
//!
//! A checkout is validated in two places:
//!
//! - [`CheckoutRequest::new`] rejects input that can never succeed (no items,
//!   non-positive quantities) before any unit of work is opened.
//! - [`validate`] checks the request against the product rows read under lock,
//!   and prices every line.
//!
//! Both are pure; nothing here touches storage.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use kasir_core::{DomainResult, Money, ProductId, ValidationError};

use crate::model::{CheckoutItem, Product, TransactionDetail};

/// A checkout whose shape has been validated.
///
/// Invariants: at least one item, every quantity strictly positive, and the
/// per-product quantity sums fit in an `i64`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    items: Vec<CheckoutItem>,
}

impl CheckoutRequest {
    pub fn new(items: Vec<CheckoutItem>) -> DomainResult<Self> {
        if items.is_empty() {
            return Err(ValidationError::EmptyCheckout);
        }
        for item in &items {
            if item.quantity <= 0 {
                return Err(ValidationError::InvalidQuantity {
                    product_id: item.product_id,
                    quantity: item.quantity,
                });
            }
        }

        let request = Self { items };
        request.try_net_quantities()?;
        Ok(request)
    }

    /// Items in caller order.
    pub fn items(&self) -> &[CheckoutItem] {
        &self.items
    }

    /// Distinct product identifiers, ascending.
    ///
    /// The ascending order is the lock acquisition order.
    pub fn product_ids(&self) -> BTreeSet<ProductId> {
        self.items.iter().map(|item| item.product_id).collect()
    }

    /// Total requested quantity per product, ascending by identifier.
    ///
    /// The same product may appear on several lines; the stock write needs a
    /// single decrement per row.
    pub fn net_quantities(&self) -> BTreeMap<ProductId, i64> {
        // Checked in `new`.
        self.try_net_quantities().unwrap_or_default()
    }

    fn try_net_quantities(&self) -> DomainResult<BTreeMap<ProductId, i64>> {
        let mut totals = BTreeMap::new();
        for item in &self.items {
            let total: &mut i64 = totals.entry(item.product_id).or_insert(0);
            *total = total
                .checked_add(item.quantity)
                .ok_or(ValidationError::AmountOverflow)?;
        }
        Ok(totals)
    }
}

/// Outcome of a successful validation: everything needed to write the sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCheckout {
    pub total_amount: Money,
    /// One detail per requested item, in request order.
    pub details: Vec<TransactionDetail>,
}

/// Validate a checkout against the locked product rows and price it.
///
/// Items are checked in request order; the first failing item decides the
/// error. Stock is checked against what is still available to this checkout,
/// so two lines for the same product cannot together exceed its stock.
pub fn validate(
    request: &CheckoutRequest,
    products: &HashMap<ProductId, Product>,
) -> DomainResult<ValidatedCheckout> {
    let mut total_amount = Money::ZERO;
    let mut claimed: HashMap<ProductId, i64> = HashMap::new();
    let mut details = Vec::with_capacity(request.items().len());

    for item in request.items() {
        let product = products
            .get(&item.product_id)
            .ok_or(ValidationError::ProductNotFound(item.product_id))?;

        let already_claimed = claimed.entry(item.product_id).or_insert(0);
        let available = product.stock - *already_claimed;
        if item.quantity > available {
            return Err(ValidationError::insufficient_stock(
                item.product_id,
                item.quantity,
                available,
            ));
        }
        *already_claimed += item.quantity;

        let subtotal = product
            .price
            .checked_times(item.quantity)
            .ok_or(ValidationError::AmountOverflow)?;
        total_amount = total_amount
            .checked_add(subtotal)
            .ok_or(ValidationError::AmountOverflow)?;

        details.push(TransactionDetail {
            product_id: item.product_id,
            product_name: product.name.clone(),
            quantity: item.quantity,
            subtotal,
        });
    }

    Ok(ValidatedCheckout {
        total_amount,
        details,
    })
}
