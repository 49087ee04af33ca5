//! Staff compensation records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use sqlx::FromRow;
use uuid::Uuid;

use super::period::Period;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayrollStatus {
    Pending,
    Completed,
}

impl PayrollStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayrollStatus::Pending => "PENDING",
            PayrollStatus::Completed => "COMPLETED",
        }
    }
}

/// One staff member's pay for one period. `(staff_id, period_label)` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Payroll {
    pub payroll_id: Uuid,
    pub staff_id: String,
    pub amount: Decimal,
    pub period_label: String,
    pub status: PayrollStatus,
    pub description: Option<String>,
    pub paid_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Payroll {
    pub fn from_new(input: NewPayroll, now: DateTime<Utc>) -> Self {
        Self {
            payroll_id: Uuid::new_v4(),
            staff_id: input.staff_id,
            amount: input.amount,
            period_label: input.period.label(),
            status: PayrollStatus::Pending,
            description: input.description,
            paid_utc: None,
            created_utc: now,
            updated_utc: now,
        }
    }

    pub fn settle(&mut self, now: DateTime<Utc>) -> Result<(), AppError> {
        match self.status {
            PayrollStatus::Pending => {
                self.status = PayrollStatus::Completed;
                self.paid_utc = Some(now);
                self.updated_utc = now;
                Ok(())
            }
            PayrollStatus::Completed => Err(AppError::Conflict(anyhow::anyhow!(
                "Payroll {} is already settled",
                self.payroll_id
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewPayroll {
    pub staff_id: String,
    pub amount: Decimal,
    pub period: Period,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ListPayrollFilter {
    pub staff_id: Option<String>,
    pub period_label: Option<String>,
}

impl ListPayrollFilter {
    pub fn matches(&self, payroll: &Payroll) -> bool {
        self.staff_id
            .as_deref()
            .map_or(true, |s| payroll.staff_id == s)
            && self
                .period_label
                .as_deref()
                .map_or(true, |p| payroll.period_label == p)
    }
}
