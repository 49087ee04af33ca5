use chrono::NaiveDate;
use rust_decimal::Decimal;
use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{ensure_non_negative, not_found, FinanceEngine};
use crate::auth::AuthContext;
use crate::models::{
    GenerationReport, Invoice, InvoiceDiscount, InvoiceSource, ListInvoicesFilter, NewInvoice,
    Period,
};
use crate::services::metrics::record_invoices_created;
use crate::services::store::DiscountRequest;

/// Ad-hoc invoice raised by an operator.
#[derive(Debug, Clone)]
pub struct ManualInvoice {
    pub guardian_id: Uuid,
    pub student_id: Option<Uuid>,
    pub amount: Decimal,
    pub period: Period,
    pub due_date: NaiveDate,
    pub description: Option<String>,
}

impl FinanceEngine {
    /// Invoice every ACTIVE subscription whose student has a guardian.
    /// Re-running for a period only fills in what is missing.
    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id, period = %period))]
    pub async fn generate_recurring_invoices(
        &self,
        ctx: &AuthContext,
        period: Period,
    ) -> Result<GenerationReport, AppError> {
        ctx.require_admin()?;

        let due_date = period.day(self.settings.invoice_due_day);
        let subscriptions = self.store.list_billable_subscriptions().await?;

        let mut skipped_without_guardian = 0;
        let drafts: Vec<NewInvoice> = subscriptions
            .iter()
            .filter_map(|sub| {
                let draft = sub.draft_invoice(period, due_date);
                if draft.is_none() {
                    skipped_without_guardian += 1;
                }
                draft
            })
            .collect();

        let inserted = self.store.insert_recurring_invoices(period, drafts).await?;
        let created = inserted.created.len() as u64;
        record_invoices_created(InvoiceSource::Subscription.as_str(), created);

        info!(
            period = %period,
            created,
            already_invoiced = inserted.already_invoiced,
            skipped_without_guardian,
            "Recurring invoice run finished"
        );

        Ok(GenerationReport {
            period: period.label(),
            created,
            already_invoiced: inserted.already_invoiced,
            skipped_without_guardian,
        })
    }

    #[instrument(skip(self, ctx, input), fields(user_id = %ctx.user_id, guardian_id = %input.guardian_id))]
    pub async fn create_manual_invoice(
        &self,
        ctx: &AuthContext,
        input: ManualInvoice,
    ) -> Result<Invoice, AppError> {
        ctx.require_admin()?;
        ensure_non_negative("Invoice amount", input.amount)?;

        match self.store.get_guardian(input.guardian_id).await? {
            Some(guardian) if !guardian.is_removed() => {}
            _ => return Err(not_found("Guardian", input.guardian_id)),
        }

        let invoice = self
            .store
            .insert_invoice(NewInvoice {
                guardian_id: input.guardian_id,
                student_id: input.student_id,
                subscription_id: None,
                amount: input.amount,
                period_label: input.period.label(),
                due_date: input.due_date,
                source: InvoiceSource::Manual,
                description: input.description,
            })
            .await?;

        record_invoices_created(InvoiceSource::Manual.as_str(), 1);
        Ok(invoice)
    }

    pub async fn get_invoice(&self, ctx: &AuthContext, invoice_id: Uuid) -> Result<Invoice, AppError> {
        ctx.require_admin()?;
        self.store
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| not_found("Invoice", invoice_id))
    }

    pub async fn list_invoices(
        &self,
        ctx: &AuthContext,
        filter: ListInvoicesFilter,
    ) -> Result<Vec<Invoice>, AppError> {
        ctx.require_admin()?;
        self.store.list_invoices(&filter).await
    }

    /// Reduce an invoice's outstanding amount, never below zero. Every
    /// discount leaves an audit row.
    #[instrument(skip(self, ctx, reason), fields(user_id = %ctx.user_id, invoice_id = %invoice_id, discount = %discount))]
    pub async fn apply_discount(
        &self,
        ctx: &AuthContext,
        invoice_id: Uuid,
        discount: Decimal,
        reason: Option<String>,
    ) -> Result<(Invoice, InvoiceDiscount), AppError> {
        ctx.require_admin()?;
        ensure_non_negative("Discount", discount)?;

        self.store
            .apply_discount(
                invoice_id,
                DiscountRequest {
                    amount: discount,
                    reason,
                    applied_by: ctx.user_id.clone(),
                },
            )
            .await
    }

    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id, invoice_id = %invoice_id))]
    pub async fn cancel_invoice(&self, ctx: &AuthContext, invoice_id: Uuid) -> Result<Invoice, AppError> {
        ctx.require_admin()?;
        self.store.cancel_invoice(invoice_id).await
    }
}
