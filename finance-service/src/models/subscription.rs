//! Billing plans and student subscriptions.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::invoice::{InvoiceSource, NewInvoice};
use super::period::Period;

/// Subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    Pending,
    Active,
    Cancelled,
    Completed,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "PENDING",
            SubscriptionStatus::Active => "ACTIVE",
            SubscriptionStatus::Cancelled => "CANCELLED",
            SubscriptionStatus::Completed => "COMPLETED",
        }
    }
}

/// Catalogue plan a student enrols into.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Plan {
    pub plan_id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub duration_months: i32,
    pub sessions_per_week: i32,
    pub days_per_week: i32,
    pub created_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub subscription_id: Uuid,
    pub student_id: Uuid,
    pub plan_id: Uuid,
    pub base_price: Decimal,
    /// Price actually billed; differs from `base_price` under custom terms.
    pub final_price: Decimal,
    pub sessions_per_week: i32,
    pub days_per_week: i32,
    pub status: SubscriptionStatus,
    pub start_date: Option<NaiveDate>,
    pub created_utc: DateTime<Utc>,
}

impl Subscription {
    /// Opened at admission; activation happens once the admission payment clears.
    pub fn from_new(input: NewSubscription, now: DateTime<Utc>) -> Self {
        Self {
            subscription_id: Uuid::new_v4(),
            student_id: input.student_id,
            plan_id: input.plan_id,
            base_price: input.base_price,
            final_price: input.final_price,
            sessions_per_week: input.sessions_per_week,
            days_per_week: input.days_per_week,
            status: SubscriptionStatus::Pending,
            start_date: None,
            created_utc: now,
        }
    }
}

/// An active subscription joined with the guardian who pays for it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BillableSubscription {
    pub subscription_id: Uuid,
    pub student_id: Uuid,
    pub guardian_id: Option<Uuid>,
    pub final_price: Decimal,
}

impl BillableSubscription {
    /// Draft this period's invoice, or `None` when nobody can be billed.
    pub fn draft_invoice(&self, period: Period, due_date: NaiveDate) -> Option<NewInvoice> {
        let guardian_id = self.guardian_id?;
        Some(NewInvoice {
            guardian_id,
            student_id: Some(self.student_id),
            subscription_id: Some(self.subscription_id),
            amount: self.final_price.max(Decimal::ZERO),
            period_label: period.label(),
            due_date,
            source: InvoiceSource::Subscription,
            description: None,
        })
    }
}

/// Input for creating a subscription at admission time.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub student_id: Uuid,
    pub plan_id: Uuid,
    pub base_price: Decimal,
    pub final_price: Decimal,
    pub sessions_per_week: i32,
    pub days_per_week: i32,
}

impl NewSubscription {
    pub fn from_plan(student_id: Uuid, plan: &Plan) -> Self {
        Self {
            student_id,
            plan_id: plan.plan_id,
            base_price: plan.price,
            final_price: plan.price,
            sessions_per_week: plan.sessions_per_week,
            days_per_week: plan.days_per_week,
        }
    }
}
