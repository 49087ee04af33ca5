use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{not_found, FinanceEngine};
use crate::auth::AuthContext;
use crate::config::BillingSettings;
use crate::models::{
    InvoiceSummary, Notification, NotificationCategory, NotificationPriority,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverdueNotifyReport {
    pub as_of: Option<NaiveDate>,
    pub overdue: u64,
    pub notified_count: u64,
    pub failed: u64,
}

/// HIGH while recently late, URGENT once the configured threshold passes.
fn overdue_priority(summary: &InvoiceSummary, as_of: NaiveDate, settings: BillingSettings) -> NotificationPriority {
    let days_late = (as_of - summary.due_date).num_days();
    if days_late >= settings.overdue_urgent_after_days {
        NotificationPriority::Urgent
    } else {
        NotificationPriority::High
    }
}

fn overdue_notice(summary: &InvoiceSummary, as_of: NaiveDate, settings: BillingSettings) -> Notification {
    Notification::new(
        summary.guardian_user_id.clone(),
        "Payment overdue",
        format!(
            "Your invoice for {} of {} was due on {} and is still outstanding.",
            summary.period_label, summary.amount, summary.due_date
        ),
        NotificationCategory::Payment,
        overdue_priority(summary, as_of, settings),
    )
}

impl FinanceEngine {
    /// PENDING invoices due before `as_of`. Read only.
    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id, as_of = %as_of))]
    pub async fn find_overdue_invoices(
        &self,
        ctx: &AuthContext,
        as_of: NaiveDate,
    ) -> Result<Vec<InvoiceSummary>, AppError> {
        ctx.require_admin()?;
        self.store.list_overdue_invoices(as_of).await
    }

    /// Send one overdue notice for a single invoice.
    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id, invoice_id = %invoice_id))]
    pub async fn notify_overdue(
        &self,
        ctx: &AuthContext,
        invoice_id: Uuid,
        as_of: NaiveDate,
    ) -> Result<Notification, AppError> {
        ctx.require_admin()?;

        let invoice = self
            .store
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| not_found("Invoice", invoice_id))?;
        if !invoice.is_overdue(as_of) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Invoice {} is not overdue as of {}",
                invoice_id,
                as_of
            )));
        }
        let guardian = self
            .store
            .get_guardian(invoice.guardian_id)
            .await?
            .ok_or_else(|| not_found("Guardian", invoice.guardian_id))?;
        let summary = InvoiceSummary::new(&invoice, &guardian);

        let notice = overdue_notice(&summary, as_of, self.settings);
        if !self.notify(notice.clone()).await {
            return Err(AppError::ServiceUnavailable);
        }
        Ok(notice)
    }

    /// One notice per overdue invoice. Emission failures are counted, not raised.
    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id, as_of = %as_of))]
    pub async fn notify_all_overdue(
        &self,
        ctx: &AuthContext,
        as_of: NaiveDate,
    ) -> Result<OverdueNotifyReport, AppError> {
        ctx.require_admin()?;

        let overdue = self.store.list_overdue_invoices(as_of).await?;
        let mut report = OverdueNotifyReport {
            as_of: Some(as_of),
            overdue: overdue.len() as u64,
            ..Default::default()
        };
        for summary in &overdue {
            if self.notify(overdue_notice(summary, as_of, self.settings)).await {
                report.notified_count += 1;
            } else {
                report.failed += 1;
            }
        }

        info!(
            overdue = report.overdue,
            notified = report.notified_count,
            failed = report.failed,
            "Overdue notices sent"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn summary(due: NaiveDate) -> InvoiceSummary {
        InvoiceSummary {
            invoice_id: Uuid::new_v4(),
            guardian_id: Uuid::new_v4(),
            guardian_user_id: "parent-1".to_string(),
            guardian_name: "Sam".to_string(),
            guardian_email: None,
            amount: Decimal::from(120),
            period_label: "2026-02".to_string(),
            due_date: due,
        }
    }

    #[test]
    fn priority_escalates_after_threshold() {
        let settings = BillingSettings::default();
        let due = NaiveDate::from_ymd_opt(2026, 2, 10).unwrap();
        let s = summary(due);
        assert_eq!(
            overdue_priority(&s, due + chrono::Duration::days(1), settings),
            NotificationPriority::High
        );
        assert_eq!(
            overdue_priority(&s, due + chrono::Duration::days(30), settings),
            NotificationPriority::Urgent
        );
    }

    #[test]
    fn notice_carries_amount_and_period() {
        let due = NaiveDate::from_ymd_opt(2026, 2, 28).unwrap();
        let notice = overdue_notice(&summary(due), due.succ_opt().unwrap(), BillingSettings::default());
        assert_eq!(notice.recipient_id, "parent-1");
        assert_eq!(notice.category, NotificationCategory::Payment);
        assert!(notice.message.contains("120"));
        assert!(notice.message.contains("2026-02"));
    }
}
