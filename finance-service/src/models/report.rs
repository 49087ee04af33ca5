//! Read-side aggregates for dashboards.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use sqlx::FromRow;

use super::period::Period;

/// Inclusive date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, AppError> {
        if from > to {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Date range start {} is after its end {}",
                from,
                to
            )));
        }
        Ok(Self { from, to })
    }

    /// The whole calendar month of a billing period.
    pub fn for_period(period: Period) -> Self {
        Self {
            from: period.first_day(),
            to: period.last_day(),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}

/// Raw sums read from the ledger tables for one window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerTotals {
    pub revenue: Decimal,
    pub expenses: Decimal,
    pub donations: Decimal,
    pub pending_balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinanceSummary {
    pub revenue: Decimal,
    pub expenses: Decimal,
    pub donations: Decimal,
    /// revenue + donations - expenses
    pub net: Decimal,
    /// Outstanding PENDING invoices, never windowed.
    pub pending_balance: Decimal,
    pub range: Option<DateRange>,
}

impl FinanceSummary {
    pub fn from_totals(totals: LedgerTotals, range: Option<DateRange>) -> Self {
        Self {
            revenue: totals.revenue,
            expenses: totals.expenses,
            donations: totals.donations,
            net: totals.revenue + totals.donations - totals.expenses,
            pending_balance: totals.pending_balance,
            range,
        }
    }
}

/// Completed-payment revenue for one calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct RevenueBucket {
    pub period: String,
    pub revenue: Decimal,
    pub payments: i64,
}
