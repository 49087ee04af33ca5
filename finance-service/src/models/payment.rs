//! Payment model and refund transition.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use sqlx::FromRow;
use uuid::Uuid;

use super::invoice::Invoice;
use super::subscription::Subscription;

/// Payment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    Card,
    Cheque,
    Gateway,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "CASH",
            PaymentMethod::BankTransfer => "BANK_TRANSFER",
            PaymentMethod::Card => "CARD",
            PaymentMethod::Cheque => "CHEQUE",
            PaymentMethod::Gateway => "GATEWAY",
        }
    }

    pub fn origin(&self) -> PaymentOrigin {
        match self {
            PaymentMethod::Gateway => PaymentOrigin::Gateway,
            PaymentMethod::Cash
            | PaymentMethod::BankTransfer
            | PaymentMethod::Card
            | PaymentMethod::Cheque => PaymentOrigin::Manual,
        }
    }
}

/// Who initiated the payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentOrigin {
    Manual,
    Gateway,
}

impl PaymentOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentOrigin::Manual => "MANUAL",
            PaymentOrigin::Gateway => "GATEWAY",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub payment_id: Uuid,
    pub guardian_id: Uuid,
    pub student_id: Option<Uuid>,
    pub invoice_id: Option<Uuid>,
    pub subscription_id: Option<Uuid>,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub origin: PaymentOrigin,
    pub status: PaymentStatus,
    pub description: Option<String>,
    /// Set only once the payment completes.
    pub paid_utc: Option<DateTime<Utc>>,
    pub refund_reason: Option<String>,
    pub refunded_amount: Option<Decimal>,
    pub refunded_utc: Option<DateTime<Utc>>,
    pub recorded_by: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Payment {
    fn from_new(input: NewPayment, status: PaymentStatus, now: DateTime<Utc>) -> Self {
        Self {
            payment_id: Uuid::new_v4(),
            guardian_id: input.guardian_id,
            student_id: input.student_id,
            invoice_id: input.invoice_id,
            subscription_id: input.subscription_id,
            amount: input.amount,
            method: input.method,
            origin: input.method.origin(),
            status,
            description: input.description,
            paid_utc: (status == PaymentStatus::Completed).then_some(now),
            refund_reason: None,
            refunded_amount: None,
            refunded_utc: None,
            recorded_by: input.recorded_by,
            created_utc: now,
            updated_utc: now,
        }
    }

    /// A payment already collected, stamped paid at `now`.
    pub fn completed(input: NewPayment, now: DateTime<Utc>) -> Self {
        Self::from_new(input, PaymentStatus::Completed, now)
    }

    /// A payment awaiting external confirmation.
    pub fn pending(input: NewPayment, now: DateTime<Utc>) -> Self {
        Self::from_new(input, PaymentStatus::Pending, now)
    }

    /// Reverse the full amount of a completed payment.
    pub fn refund(&mut self, reason: &str, now: DateTime<Utc>) -> Result<(), AppError> {
        match self.status {
            PaymentStatus::Completed => {
                self.status = PaymentStatus::Refunded;
                self.refund_reason = Some(reason.to_string());
                self.refunded_amount = Some(self.amount);
                self.refunded_utc = Some(now);
                self.updated_utc = now;
                Ok(())
            }
            PaymentStatus::Pending => Err(AppError::Conflict(anyhow::anyhow!(
                "Payment {} is still pending and cannot be refunded",
                self.payment_id
            ))),
            PaymentStatus::Refunded => Err(AppError::Conflict(anyhow::anyhow!(
                "Payment {} is already refunded",
                self.payment_id
            ))),
        }
    }

    /// Only pending payments may be deleted.
    pub fn ensure_deletable(&self) -> Result<(), AppError> {
        match self.status {
            PaymentStatus::Pending => Ok(()),
            PaymentStatus::Completed | PaymentStatus::Refunded => {
                Err(AppError::Conflict(anyhow::anyhow!(
                    "Payment {} is {} and cannot be deleted",
                    self.payment_id,
                    self.status.as_str()
                )))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub guardian_id: Uuid,
    pub student_id: Option<Uuid>,
    pub invoice_id: Option<Uuid>,
    pub subscription_id: Option<Uuid>,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub description: Option<String>,
    pub recorded_by: String,
}

/// A manual payment recorded against an invoice.
#[derive(Debug, Clone)]
pub struct InvoicePayment {
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub description: Option<String>,
    pub recorded_by: String,
}

impl InvoicePayment {
    /// Bind the payment to the invoice's guardian and student.
    pub fn for_invoice(self, invoice: &Invoice) -> NewPayment {
        NewPayment {
            guardian_id: invoice.guardian_id,
            student_id: invoice.student_id,
            invoice_id: Some(invoice.invoice_id),
            subscription_id: invoice.subscription_id,
            amount: self.amount,
            method: self.method,
            description: self.description,
            recorded_by: self.recorded_by,
        }
    }
}

/// Where the caller sends the payer after an admission payment is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionNextStep {
    RedirectToGateway,
    ShowTransferInstructions,
}

impl AdmissionNextStep {
    pub fn for_method(method: PaymentMethod) -> Self {
        match method.origin() {
            PaymentOrigin::Gateway => AdmissionNextStep::RedirectToGateway,
            PaymentOrigin::Manual => AdmissionNextStep::ShowTransferInstructions,
        }
    }
}

/// Subscription and payment opened together at enrolment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Admission {
    pub subscription: Subscription,
    pub payment: Payment,
    pub next_step: AdmissionNextStep,
}

#[derive(Debug, Clone, Default)]
pub struct ListPaymentsFilter {
    pub guardian_id: Option<Uuid>,
    pub status: Option<PaymentStatus>,
}

impl ListPaymentsFilter {
    pub fn matches(&self, payment: &Payment) -> bool {
        self.guardian_id.map_or(true, |id| payment.guardian_id == id)
            && self.status.map_or(true, |s| payment.status == s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(method: PaymentMethod) -> NewPayment {
        NewPayment {
            guardian_id: Uuid::new_v4(),
            student_id: None,
            invoice_id: Some(Uuid::new_v4()),
            subscription_id: None,
            amount: Decimal::from(150),
            method,
            description: None,
            recorded_by: "admin-1".to_string(),
        }
    }

    #[test]
    fn completed_payment_is_stamped_paid() {
        let payment = Payment::completed(input(PaymentMethod::Cash), Utc::now());
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert!(payment.paid_utc.is_some());
        assert_eq!(payment.origin, PaymentOrigin::Manual);
    }

    #[test]
    fn pending_payment_has_no_paid_timestamp() {
        let payment = Payment::pending(input(PaymentMethod::Gateway), Utc::now());
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert!(payment.paid_utc.is_none());
        assert_eq!(payment.origin, PaymentOrigin::Gateway);
    }

    #[test]
    fn refund_is_full_and_only_once() {
        let mut payment = Payment::completed(input(PaymentMethod::Card), Utc::now());
        payment.refund("duplicate charge", Utc::now()).unwrap();
        assert_eq!(payment.status, PaymentStatus::Refunded);
        assert_eq!(payment.refunded_amount, Some(Decimal::from(150)));
        assert!(payment.refunded_utc.is_some());
        assert_eq!(payment.refund_reason.as_deref(), Some("duplicate charge"));

        let snapshot = payment.clone();
        assert!(matches!(
            payment.refund("again", Utc::now()),
            Err(AppError::Conflict(_))
        ));
        assert_eq!(payment, snapshot);
    }

    #[test]
    fn pending_cannot_be_refunded_but_can_be_deleted() {
        let mut payment = Payment::pending(input(PaymentMethod::BankTransfer), Utc::now());
        assert!(matches!(
            payment.refund("nope", Utc::now()),
            Err(AppError::Conflict(_))
        ));
        assert!(payment.ensure_deletable().is_ok());

        let completed = Payment::completed(input(PaymentMethod::Cash), Utc::now());
        assert!(matches!(
            completed.ensure_deletable(),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn next_step_follows_method() {
        assert_eq!(
            AdmissionNextStep::for_method(PaymentMethod::Gateway),
            AdmissionNextStep::RedirectToGateway
        );
        assert_eq!(
            AdmissionNextStep::for_method(PaymentMethod::BankTransfer),
            AdmissionNextStep::ShowTransferInstructions
        );
    }
}
