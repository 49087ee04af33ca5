use rust_decimal::Decimal;
use serde::Deserialize;
use validator::Validate;

use crate::models::{ListPayrollFilter, Period};
use crate::services::finance::PayrollRequest;
use crate::utils::validation::non_negative;

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePayrollRequest {
    #[validate(length(min = 1, max = 100, message = "Staff id is required"))]
    pub staff_id: String,
    #[validate(custom(function = "non_negative"))]
    pub amount: Decimal,
    pub period: Period,
    #[validate(length(max = 500, message = "Description is too long"))]
    pub description: Option<String>,
}

impl From<CreatePayrollRequest> for PayrollRequest {
    fn from(req: CreatePayrollRequest) -> Self {
        PayrollRequest {
            staff_id: req.staff_id,
            amount: req.amount,
            period: req.period,
            description: req.description,
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ListPayrollQuery {
    pub staff_id: Option<String>,
    pub period: Option<Period>,
}

impl From<ListPayrollQuery> for ListPayrollFilter {
    fn from(query: ListPayrollQuery) -> Self {
        ListPayrollFilter {
            staff_id: query.staff_id,
            period_label: query.period.map(|p| p.label()),
        }
    }
}
