use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{ListPaymentsFilter, Payment, PaymentMethod, PaymentStatus};
use crate::services::finance::{AdmissionRequest, RecordPayment};
use crate::utils::validation::non_negative;

#[derive(Debug, Deserialize, Validate)]
pub struct RecordPaymentRequest {
    #[validate(custom(function = "non_negative"))]
    pub amount: Decimal,
    pub method: PaymentMethod,
    #[validate(length(max = 500, message = "Description is too long"))]
    pub description: Option<String>,
}

impl From<RecordPaymentRequest> for RecordPayment {
    fn from(req: RecordPaymentRequest) -> Self {
        RecordPayment {
            amount: req.amount,
            method: req.method,
            description: req.description,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecordPaymentResponse {
    pub payment_id: Uuid,
    pub payment: Payment,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAdmissionRequest {
    pub student_id: Uuid,
    pub plan_id: Uuid,
    pub method: PaymentMethod,
}

impl From<CreateAdmissionRequest> for AdmissionRequest {
    fn from(req: CreateAdmissionRequest) -> Self {
        AdmissionRequest {
            student_id: req.student_id,
            plan_id: req.plan_id,
            method: req.method,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefundRequest {
    #[validate(length(min = 1, max = 500, message = "Refund reason is required"))]
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct RefundResponse {
    pub ok: bool,
    pub payment: Payment,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ListPaymentsQuery {
    pub guardian_id: Option<Uuid>,
    pub status: Option<PaymentStatus>,
}

impl From<ListPaymentsQuery> for ListPaymentsFilter {
    fn from(query: ListPaymentsQuery) -> Self {
        ListPaymentsFilter {
            guardian_id: query.guardian_id,
            status: query.status,
        }
    }
}
