use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{ensure_non_negative, ensure_present, not_found, FinanceEngine};
use crate::auth::AuthContext;
use crate::models::{
    Admission, AdmissionNextStep, InvoicePayment, ListPaymentsFilter, NewPayment,
    NewSubscription, NotificationPriority, Payment, PaymentMethod,
};
use crate::services::metrics::{record_payment, record_refund};

#[derive(Debug, Clone)]
pub struct RecordPayment {
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AdmissionRequest {
    pub student_id: Uuid,
    pub plan_id: Uuid,
    pub method: PaymentMethod,
}

impl FinanceEngine {
    /// Record a payment and settle its invoice in one unit of work. Any
    /// non-negative amount settles the invoice in full.
    #[instrument(skip(self, ctx, input), fields(user_id = %ctx.user_id, invoice_id = %invoice_id, method = input.method.as_str()))]
    pub async fn record_manual_payment(
        &self,
        ctx: &AuthContext,
        invoice_id: Uuid,
        input: RecordPayment,
    ) -> Result<Payment, AppError> {
        ctx.require_admin()?;
        ensure_non_negative("Payment amount", input.amount)?;

        let (invoice, payment) = self
            .store
            .record_payment(
                invoice_id,
                InvoicePayment {
                    amount: input.amount,
                    method: input.method,
                    description: input.description,
                    recorded_by: ctx.user_id.clone(),
                },
            )
            .await?;

        record_payment(
            payment.method.as_str(),
            payment.status.as_str(),
            payment.amount.to_f64().unwrap_or_default(),
        );

        self.notify_guardian(
            invoice.guardian_id,
            "Payment received",
            format!(
                "We received your payment of {} for {}. Thank you.",
                payment.amount, invoice.period_label
            ),
            NotificationPriority::Normal,
        )
        .await;

        Ok(payment)
    }

    /// Open a PENDING subscription and its PENDING admission payment together.
    #[instrument(skip(self, ctx, input), fields(user_id = %ctx.user_id, student_id = %input.student_id, plan_id = %input.plan_id))]
    pub async fn create_admission_payment(
        &self,
        ctx: &AuthContext,
        input: AdmissionRequest,
    ) -> Result<Admission, AppError> {
        ctx.require_admin()?;

        let student = self
            .store
            .get_student(input.student_id)
            .await?
            .ok_or_else(|| not_found("Student", input.student_id))?;
        let guardian_id = student.guardian_id.ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!(
                "Student {} has no linked guardian to bill",
                student.student_id
            ))
        })?;
        let plan = self
            .store
            .get_plan(input.plan_id)
            .await?
            .ok_or_else(|| not_found("Plan", input.plan_id))?;

        let (subscription, payment) = self
            .store
            .create_admission(
                NewSubscription::from_plan(student.student_id, &plan),
                NewPayment {
                    guardian_id,
                    student_id: Some(student.student_id),
                    invoice_id: None,
                    subscription_id: None,
                    amount: plan.price,
                    method: input.method,
                    description: Some(format!("Admission: {}", plan.name)),
                    recorded_by: ctx.user_id.clone(),
                },
            )
            .await?;

        record_payment(payment.method.as_str(), payment.status.as_str(), 0.0);

        Ok(Admission {
            subscription,
            payment,
            next_step: AdmissionNextStep::for_method(input.method),
        })
    }

    /// Fully refund a COMPLETED payment and reopen its invoice.
    #[instrument(skip(self, ctx, reason), fields(user_id = %ctx.user_id, payment_id = %payment_id))]
    pub async fn process_refund(
        &self,
        ctx: &AuthContext,
        payment_id: Uuid,
        reason: &str,
    ) -> Result<Payment, AppError> {
        ctx.require_admin()?;
        ensure_present("Refund reason", reason)?;

        let (payment, invoice) = match self.store.refund_payment(payment_id, reason.trim()).await {
            Ok(done) => done,
            Err(e) => {
                record_refund("rejected");
                return Err(e);
            }
        };
        record_refund("ok");

        let period = invoice
            .as_ref()
            .map(|i| format!(" for {}", i.period_label))
            .unwrap_or_default();
        self.notify_guardian(
            payment.guardian_id,
            "Payment refunded",
            format!(
                "Your payment of {}{} was refunded. Reason: {}",
                payment.amount,
                period,
                reason.trim()
            ),
            NotificationPriority::High,
        )
        .await;

        Ok(payment)
    }

    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id, payment_id = %payment_id))]
    pub async fn delete_pending_payment(
        &self,
        ctx: &AuthContext,
        payment_id: Uuid,
    ) -> Result<Payment, AppError> {
        ctx.require_super_admin()?;
        let payment = self.store.delete_pending_payment(payment_id).await?;
        info!(payment_id = %payment_id, "Pending payment removed by operator");
        Ok(payment)
    }

    pub async fn get_payment(&self, ctx: &AuthContext, payment_id: Uuid) -> Result<Payment, AppError> {
        ctx.require_admin()?;
        self.store
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| not_found("Payment", payment_id))
    }

    pub async fn list_payments(
        &self,
        ctx: &AuthContext,
        filter: ListPaymentsFilter,
    ) -> Result<Vec<Payment>, AppError> {
        ctx.require_admin()?;
        self.store.list_payments(&filter).await
    }
}
