//! Sales summary queries.
//!
//! Read-only: no unit of work, no row holds. A summary may race with
//! in-flight checkouts and simply reflects what had committed when it ran.

use chrono::NaiveDate;
use tracing::{info, instrument};

use kasir_core::ValidationError;
use kasir_sales::{SalesPeriod, SalesSummary};

use crate::store::{SalesReportSource, StoreError};

#[derive(Debug, Clone, thiserror::Error)]
pub enum ReportError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReportError {
    pub fn code(&self) -> &'static str {
        match self {
            ReportError::Validation(e) => e.code(),
            ReportError::Store(_) => "store_error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReportService<R> {
    source: R,
}

impl<R> ReportService<R>
where
    R: SalesReportSource,
{
    pub fn new(source: R) -> Self {
        Self { source }
    }

    /// Summary for `[start_date, end_date]`, or for today unless both bounds are given.
    #[instrument(skip(self), err)]
    pub async fn sales_summary(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<SalesSummary, ReportError> {
        let period = SalesPeriod::from_bounds(start_date, end_date)?;
        let summary = self.source.sales_summary(period).await?;
        info!(
            total_revenue = summary.total_revenue.amount(),
            total_transactions = summary.total_transactions,
            has_best_seller = summary.best_seller.is_some(),
            "sales summary computed"
        );
        Ok(summary)
    }
}
