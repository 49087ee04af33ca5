use rust_decimal::Decimal;
use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{ensure_non_negative, ensure_present, FinanceEngine};
use crate::auth::AuthContext;
use crate::models::{
    ListPayrollFilter, NewPayroll, Notification, NotificationCategory, NotificationPriority,
    Payroll, Period,
};
use crate::services::metrics::record_payroll_operation;

#[derive(Debug, Clone)]
pub struct PayrollRequest {
    pub staff_id: String,
    pub amount: Decimal,
    pub period: Period,
    pub description: Option<String>,
}

impl FinanceEngine {
    /// One payroll row per staff member and period; a second is a conflict.
    #[instrument(skip(self, ctx, input), fields(user_id = %ctx.user_id, staff_id = %input.staff_id, period = %input.period))]
    pub async fn generate_payroll(
        &self,
        ctx: &AuthContext,
        input: PayrollRequest,
    ) -> Result<Payroll, AppError> {
        ctx.require_admin()?;
        ensure_present("Staff id", &input.staff_id)?;
        ensure_non_negative("Payroll amount", input.amount)?;

        let payroll = self
            .store
            .insert_payroll(NewPayroll {
                staff_id: input.staff_id.trim().to_string(),
                amount: input.amount,
                period: input.period,
                description: input.description,
            })
            .await?;

        record_payroll_operation("generate");
        Ok(payroll)
    }

    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id, payroll_id = %payroll_id))]
    pub async fn settle_payroll(&self, ctx: &AuthContext, payroll_id: Uuid) -> Result<Payroll, AppError> {
        ctx.require_super_admin()?;

        let payroll = self.store.settle_payroll(payroll_id).await?;
        record_payroll_operation("settle");
        info!(payroll_id = %payroll_id, staff_id = %payroll.staff_id, "Payroll paid out");

        self.notify(Notification::new(
            payroll.staff_id.clone(),
            "Salary paid",
            format!(
                "Your pay of {} for {} has been settled.",
                payroll.amount, payroll.period_label
            ),
            NotificationCategory::Payroll,
            NotificationPriority::Normal,
        ))
        .await;

        Ok(payroll)
    }

    pub async fn list_payroll(
        &self,
        ctx: &AuthContext,
        filter: ListPayrollFilter,
    ) -> Result<Vec<Payroll>, AppError> {
        ctx.require_admin()?;
        self.store.list_payroll(&filter).await
    }
}
