use chrono::NaiveDate;
use rust_decimal::Decimal;
use service_core::error::AppError;
use tracing::instrument;

use super::{ensure_non_negative, ensure_present, FinanceEngine};
use crate::auth::AuthContext;
use crate::models::{
    DateRange, Donation, Expense, FinanceSummary, NewDonation, NewExpense, Period, RevenueBucket,
};

/// Window applied to revenue, expenses and donations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportWindow {
    #[default]
    AllTime,
    Range(DateRange),
    Period(Period),
}

impl ReportWindow {
    pub fn range(&self) -> Option<DateRange> {
        match self {
            ReportWindow::AllTime => None,
            ReportWindow::Range(range) => Some(*range),
            ReportWindow::Period(period) => Some(DateRange::for_period(*period)),
        }
    }
}

impl FinanceEngine {
    /// Aggregates recomputed from the ledger tables on every call.
    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn get_finance_summary(
        &self,
        ctx: &AuthContext,
        window: ReportWindow,
    ) -> Result<FinanceSummary, AppError> {
        ctx.require_admin()?;
        let range = window.range();
        let totals = self.store.ledger_totals(range).await?;
        Ok(FinanceSummary::from_totals(totals, range))
    }

    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn get_revenue_trend(
        &self,
        ctx: &AuthContext,
        window: ReportWindow,
    ) -> Result<Vec<RevenueBucket>, AppError> {
        ctx.require_admin()?;
        self.store.revenue_by_month(window.range()).await
    }

    #[instrument(skip(self, ctx, description), fields(user_id = %ctx.user_id, category = %category))]
    pub async fn record_expense(
        &self,
        ctx: &AuthContext,
        category: String,
        description: Option<String>,
        amount: Decimal,
        expense_date: NaiveDate,
    ) -> Result<Expense, AppError> {
        ctx.require_admin()?;
        ensure_present("Expense category", &category)?;
        ensure_non_negative("Expense amount", amount)?;

        self.store
            .insert_expense(NewExpense {
                category,
                description,
                amount,
                expense_date,
                recorded_by: ctx.user_id.clone(),
            })
            .await
    }

    #[instrument(skip(self, ctx, note), fields(user_id = %ctx.user_id))]
    pub async fn record_donation(
        &self,
        ctx: &AuthContext,
        donor_name: String,
        amount: Decimal,
        donation_date: NaiveDate,
        note: Option<String>,
    ) -> Result<Donation, AppError> {
        ctx.require_admin()?;
        ensure_present("Donor name", &donor_name)?;
        ensure_non_negative("Donation amount", amount)?;

        self.store
            .insert_donation(NewDonation {
                donor_name,
                amount,
                donation_date,
                note,
                recorded_by: ctx.user_id.clone(),
            })
            .await
    }
}
