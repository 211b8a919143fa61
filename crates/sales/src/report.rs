//! Sales summary model.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use kasir_core::{DomainResult, Money, ValidationError};

/// Calendar period a sales summary covers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SalesPeriod {
    /// The store's current date.
    Today,
    /// Inclusive date range.
    Between { start: NaiveDate, end: NaiveDate },
}

impl SalesPeriod {
    /// Build a period from optional request bounds.
    ///
    /// A range is used only when both bounds are present; anything else falls
    /// back to [`SalesPeriod::Today`].
    pub fn from_bounds(start: Option<NaiveDate>, end: Option<NaiveDate>) -> DomainResult<Self> {
        match (start, end) {
            (Some(start), Some(end)) if start > end => {
                Err(ValidationError::InvalidDateRange { start, end })
            }
            (Some(start), Some(end)) => Ok(Self::Between { start, end }),
            _ => Ok(Self::Today),
        }
    }

    /// Inclusive `(start, end)` bounds, resolving `Today` against `today`.
    pub fn bounds(self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        match self {
            Self::Today => (today, today),
            Self::Between { start, end } => (start, end),
        }
    }

    pub fn contains(self, date: NaiveDate, today: NaiveDate) -> bool {
        let (start, end) = self.bounds(today);
        start <= date && date <= end
    }
}

/// Product sold in the largest quantity over a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestSeller {
    pub name: String,
    pub quantity_sold: i64,
}

/// Revenue and volume over a period.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesSummary {
    pub total_revenue: Money,
    pub total_transactions: i64,
    /// `None` when nothing was sold in the period.
    pub best_seller: Option<BestSeller>,
}

impl BestSeller {
    /// Pick the best seller from `(name, quantity)` totals.
    ///
    /// Highest quantity wins; ties go to the alphabetically first name so the
    /// answer does not depend on iteration order.
    pub fn pick<I>(totals: I) -> Option<BestSeller>
    where
        I: IntoIterator<Item = (String, i64)>,
    {
        totals
            .into_iter()
            .min_by(|(name_a, qty_a), (name_b, qty_b)| {
                qty_b.cmp(qty_a).then_with(|| name_a.cmp(name_b))
            })
            .map(|(name, quantity_sold)| BestSeller {
                name,
                quantity_sold,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn both_bounds_make_a_range() {
        let period = SalesPeriod::from_bounds(Some(date(2024, 1, 1)), Some(date(2024, 1, 31))).unwrap();
        assert_eq!(
            period,
            SalesPeriod::Between {
                start: date(2024, 1, 1),
                end: date(2024, 1, 31)
            }
        );
        assert!(period.contains(date(2024, 1, 31), date(2030, 1, 1)));
        assert!(!period.contains(date(2024, 2, 1), date(2030, 1, 1)));
    }

    #[test]
    fn missing_bound_falls_back_to_today() {
        assert_eq!(SalesPeriod::from_bounds(None, None).unwrap(), SalesPeriod::Today);
        assert_eq!(
            SalesPeriod::from_bounds(Some(date(2024, 1, 1)), None).unwrap(),
            SalesPeriod::Today
        );

        let today = date(2024, 5, 5);
        assert_eq!(SalesPeriod::Today.bounds(today), (today, today));
        assert!(!SalesPeriod::Today.contains(date(2024, 5, 4), today));
    }

    #[test]
    fn reversed_range_is_rejected() {
        let err = SalesPeriod::from_bounds(Some(date(2024, 2, 1)), Some(date(2024, 1, 1))).unwrap_err();
        assert_eq!(err.code(), "invalid_date_range");
    }

    #[test]
    fn best_seller_prefers_quantity_then_name() {
        let best = BestSeller::pick(vec![
            ("Pen".to_string(), 3),
            ("Book".to_string(), 5),
            ("Apple".to_string(), 5),
        ])
        .unwrap();
        assert_eq!(best.name, "Apple");
        assert_eq!(best.quantity_sold, 5);
    }

    #[test]
    fn no_sales_means_no_best_seller() {
        assert_eq!(BestSeller::pick(Vec::new()), None);
        assert_eq!(SalesSummary::default().best_seller, None);
    }
}
