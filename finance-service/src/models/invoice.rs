//! Invoice model and its lifecycle.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use sqlx::FromRow;
use uuid::Uuid;

use super::Guardian;

/// Invoice status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Pending,
    Completed,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "PENDING",
            InvoiceStatus::Completed => "COMPLETED",
            InvoiceStatus::Cancelled => "CANCELLED",
        }
    }
}

/// Where an invoice came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceSource {
    Subscription,
    Manual,
}

impl InvoiceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceSource::Subscription => "SUBSCRIPTION",
            InvoiceSource::Manual => "MANUAL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub guardian_id: Uuid,
    pub student_id: Option<Uuid>,
    pub subscription_id: Option<Uuid>,
    /// Outstanding amount. Never negative.
    pub amount: Decimal,
    pub period_label: String,
    pub due_date: NaiveDate,
    pub status: InvoiceStatus,
    pub source: InvoiceSource,
    pub description: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Invoice {
    pub fn from_new(input: NewInvoice, now: DateTime<Utc>) -> Self {
        Self {
            invoice_id: Uuid::new_v4(),
            guardian_id: input.guardian_id,
            student_id: input.student_id,
            subscription_id: input.subscription_id,
            amount: input.amount,
            period_label: input.period_label,
            due_date: input.due_date,
            status: InvoiceStatus::Pending,
            source: input.source,
            description: input.description,
            created_utc: now,
            updated_utc: now,
        }
    }

    /// Reduce the outstanding amount, clamped at zero. Returns the amount before the discount.
    pub fn apply_discount(&mut self, discount: Decimal, now: DateTime<Utc>) -> Result<Decimal, AppError> {
        if discount < Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Discount must not be negative"
            )));
        }
        match self.status {
            InvoiceStatus::Pending | InvoiceStatus::Completed => {
                let before = self.amount;
                self.amount = (self.amount - discount).max(Decimal::ZERO);
                self.updated_utc = now;
                Ok(before)
            }
            InvoiceStatus::Cancelled => Err(AppError::Conflict(anyhow::anyhow!(
                "Invoice {} is cancelled",
                self.invoice_id
            ))),
        }
    }

    /// Mark the invoice settled by a payment.
    pub fn settle(&mut self, now: DateTime<Utc>) -> Result<(), AppError> {
        match self.status {
            InvoiceStatus::Pending => {
                self.status = InvoiceStatus::Completed;
                self.updated_utc = now;
                Ok(())
            }
            InvoiceStatus::Completed => Err(AppError::Conflict(anyhow::anyhow!(
                "Invoice {} is already settled",
                self.invoice_id
            ))),
            InvoiceStatus::Cancelled => Err(AppError::Conflict(anyhow::anyhow!(
                "Invoice {} is cancelled",
                self.invoice_id
            ))),
        }
    }

    /// Reopen the invoice for collection after its payment was refunded.
    pub fn reopen(&mut self, now: DateTime<Utc>) -> Result<(), AppError> {
        match self.status {
            InvoiceStatus::Completed | InvoiceStatus::Pending => {
                self.status = InvoiceStatus::Pending;
                self.updated_utc = now;
                Ok(())
            }
            InvoiceStatus::Cancelled => Err(AppError::Conflict(anyhow::anyhow!(
                "Invoice {} is cancelled and cannot be reopened",
                self.invoice_id
            ))),
        }
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), AppError> {
        match self.status {
            InvoiceStatus::Pending => {
                self.status = InvoiceStatus::Cancelled;
                self.updated_utc = now;
                Ok(())
            }
            InvoiceStatus::Completed => Err(AppError::Conflict(anyhow::anyhow!(
                "Invoice {} is settled; refund its payment before cancelling",
                self.invoice_id
            ))),
            InvoiceStatus::Cancelled => Err(AppError::Conflict(anyhow::anyhow!(
                "Invoice {} is already cancelled",
                self.invoice_id
            ))),
        }
    }

    pub fn is_overdue(&self, as_of: NaiveDate) -> bool {
        self.status == InvoiceStatus::Pending && self.due_date < as_of
    }
}

/// Input for creating an invoice.
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub guardian_id: Uuid,
    pub student_id: Option<Uuid>,
    pub subscription_id: Option<Uuid>,
    pub amount: Decimal,
    pub period_label: String,
    pub due_date: NaiveDate,
    pub source: InvoiceSource,
    pub description: Option<String>,
}

/// Audit row written with every discount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct InvoiceDiscount {
    pub discount_id: Uuid,
    pub invoice_id: Uuid,
    pub requested_amount: Decimal,
    pub amount_before: Decimal,
    pub amount_after: Decimal,
    pub reason: Option<String>,
    pub applied_by: String,
    pub applied_utc: DateTime<Utc>,
}

/// Overdue invoice joined with its guardian's contact identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct InvoiceSummary {
    pub invoice_id: Uuid,
    pub guardian_id: Uuid,
    pub guardian_user_id: String,
    pub guardian_name: String,
    pub guardian_email: Option<String>,
    pub amount: Decimal,
    pub period_label: String,
    pub due_date: NaiveDate,
}

impl InvoiceSummary {
    pub fn new(invoice: &Invoice, guardian: &Guardian) -> Self {
        Self {
            invoice_id: invoice.invoice_id,
            guardian_id: guardian.guardian_id,
            guardian_user_id: guardian.user_id.clone(),
            guardian_name: guardian.full_name.clone(),
            guardian_email: guardian.email.clone(),
            amount: invoice.amount,
            period_label: invoice.period_label.clone(),
            due_date: invoice.due_date,
        }
    }
}

/// Filter parameters for listing invoices.
#[derive(Debug, Clone, Default)]
pub struct ListInvoicesFilter {
    pub guardian_id: Option<Uuid>,
    pub status: Option<InvoiceStatus>,
    pub period_label: Option<String>,
}

impl ListInvoicesFilter {
    pub fn matches(&self, invoice: &Invoice) -> bool {
        self.guardian_id.map_or(true, |id| invoice.guardian_id == id)
            && self.status.map_or(true, |s| invoice.status == s)
            && self
                .period_label
                .as_deref()
                .map_or(true, |p| invoice.period_label == p)
    }
}

/// Outcome of a recurring invoice run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub period: String,
    pub created: u64,
    pub already_invoiced: u64,
    pub skipped_without_guardian: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(amount: i64) -> Invoice {
        Invoice::from_new(
            NewInvoice {
                guardian_id: Uuid::new_v4(),
                student_id: None,
                subscription_id: None,
                amount: Decimal::from(amount),
                period_label: "2026-02".to_string(),
                due_date: NaiveDate::from_ymd_opt(2026, 2, 28).unwrap(),
                source: InvoiceSource::Manual,
                description: None,
            },
            Utc::now(),
        )
    }

    #[test]
    fn discount_clamps_at_zero() {
        let mut invoice = pending(200);
        let before = invoice.apply_discount(Decimal::from(250), Utc::now()).unwrap();
        assert_eq!(before, Decimal::from(200));
        assert_eq!(invoice.amount, Decimal::ZERO);
        assert_eq!(invoice.status, InvoiceStatus::Pending);
    }

    #[test]
    fn discount_rejects_negative_and_cancelled() {
        let mut invoice = pending(100);
        assert!(matches!(
            invoice.apply_discount(Decimal::from(-1), Utc::now()),
            Err(AppError::BadRequest(_))
        ));
        invoice.cancel(Utc::now()).unwrap();
        assert!(matches!(
            invoice.apply_discount(Decimal::from(10), Utc::now()),
            Err(AppError::Conflict(_))
        ));
        assert_eq!(invoice.amount, Decimal::from(100));
    }

    #[test]
    fn settle_then_reopen() {
        let mut invoice = pending(150);
        invoice.settle(Utc::now()).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Completed);
        assert!(matches!(invoice.settle(Utc::now()), Err(AppError::Conflict(_))));
        invoice.reopen(Utc::now()).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Pending);
    }

    #[test]
    fn cancel_only_from_pending() {
        let mut settled = pending(10);
        settled.settle(Utc::now()).unwrap();
        assert!(matches!(settled.cancel(Utc::now()), Err(AppError::Conflict(_))));

        let mut open = pending(10);
        open.cancel(Utc::now()).unwrap();
        assert!(matches!(open.settle(Utc::now()), Err(AppError::Conflict(_))));
        assert!(matches!(open.reopen(Utc::now()), Err(AppError::Conflict(_))));
    }

    #[test]
    fn overdue_requires_pending_and_past_due() {
        let invoice = pending(10);
        let march_first = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        assert!(invoice.is_overdue(march_first));
        assert!(!invoice.is_overdue(invoice.due_date));

        let mut settled = pending(10);
        settled.settle(Utc::now()).unwrap();
        assert!(!settled.is_overdue(march_first));
    }

    #[test]
    fn filter_matches_all_given_fields() {
        let invoice = pending(10);
        let filter = ListInvoicesFilter {
            guardian_id: Some(invoice.guardian_id),
            status: Some(InvoiceStatus::Pending),
            period_label: Some("2026-02".to_string()),
        };
        assert!(filter.matches(&invoice));
        let other_period = ListInvoicesFilter {
            period_label: Some("2026-03".to_string()),
            ..Default::default()
        };
        assert!(!other_period.matches(&invoice));
    }
}
