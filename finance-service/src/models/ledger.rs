//! Append-only expense and donation entries.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Expense {
    pub expense_id: Uuid,
    pub category: String,
    pub description: Option<String>,
    pub amount: Decimal,
    pub expense_date: NaiveDate,
    pub recorded_by: String,
    pub created_utc: DateTime<Utc>,
}

impl Expense {
    pub fn from_new(input: NewExpense, now: DateTime<Utc>) -> Self {
        Self {
            expense_id: Uuid::new_v4(),
            category: input.category,
            description: input.description,
            amount: input.amount,
            expense_date: input.expense_date,
            recorded_by: input.recorded_by,
            created_utc: now,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewExpense {
    pub category: String,
    pub description: Option<String>,
    pub amount: Decimal,
    pub expense_date: NaiveDate,
    pub recorded_by: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Donation {
    pub donation_id: Uuid,
    pub donor_name: String,
    pub amount: Decimal,
    pub donation_date: NaiveDate,
    pub note: Option<String>,
    pub recorded_by: String,
    pub created_utc: DateTime<Utc>,
}

impl Donation {
    pub fn from_new(input: NewDonation, now: DateTime<Utc>) -> Self {
        Self {
            donation_id: Uuid::new_v4(),
            donor_name: input.donor_name,
            amount: input.amount,
            donation_date: input.donation_date,
            note: input.note,
            recorded_by: input.recorded_by,
            created_utc: now,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewDonation {
    pub donor_name: String,
    pub amount: Decimal,
    pub donation_date: NaiveDate,
    pub note: Option<String>,
    pub recorded_by: String,
}
