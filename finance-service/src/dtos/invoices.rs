use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{Invoice, InvoiceDiscount, InvoiceStatus, ListInvoicesFilter, Period};
use crate::services::finance::ManualInvoice;
use crate::utils::validation::non_negative;

#[derive(Debug, Deserialize, Validate)]
pub struct GenerateInvoicesRequest {
    pub period: Period,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInvoiceRequest {
    pub guardian_id: Uuid,
    pub student_id: Option<Uuid>,
    #[validate(custom(function = "non_negative"))]
    pub amount: Decimal,
    pub period: Period,
    pub due_date: NaiveDate,
    #[validate(length(max = 500, message = "Description is too long"))]
    pub description: Option<String>,
}

impl From<CreateInvoiceRequest> for ManualInvoice {
    fn from(req: CreateInvoiceRequest) -> Self {
        ManualInvoice {
            guardian_id: req.guardian_id,
            student_id: req.student_id,
            amount: req.amount,
            period: req.period,
            due_date: req.due_date,
            description: req.description,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateInvoiceResponse {
    pub invoice_id: Uuid,
    pub invoice: Invoice,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ApplyDiscountRequest {
    #[validate(custom(function = "non_negative"))]
    pub amount: Decimal,
    #[validate(length(max = 500, message = "Reason is too long"))]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApplyDiscountResponse {
    pub new_amount: Decimal,
    pub invoice: Invoice,
    pub discount: InvoiceDiscount,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ListInvoicesQuery {
    pub guardian_id: Option<Uuid>,
    pub status: Option<InvoiceStatus>,
    pub period: Option<Period>,
}

impl From<ListInvoicesQuery> for ListInvoicesFilter {
    fn from(query: ListInvoicesQuery) -> Self {
        ListInvoicesFilter {
            guardian_id: query.guardian_id,
            status: query.status,
            period_label: query.period.map(|p| p.label()),
        }
    }
}

/// Reference date for overdue checks. Defaults to today (UTC).
#[derive(Debug, Default, Deserialize, Validate)]
pub struct OverdueQuery {
    pub as_of: Option<NaiveDate>,
}

impl OverdueQuery {
    pub fn as_of(&self) -> NaiveDate {
        self.as_of
            .unwrap_or_else(|| chrono::Utc::now().date_naive())
    }
}
