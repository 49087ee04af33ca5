//! Persistence seam for the ledger.
//!
//! Every mutating method is one unit of work: it either commits all of its
//! writes or none of them. Implementations lock the rows they read before
//! writing them back, and apply the state transitions defined on the models so
//! both backends enforce the same lifecycle rules.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{
    BillableSubscription, DateRange, Donation, Expense, Guardian, GuardianRemoval, Invoice,
    InvoiceDiscount, InvoicePayment, InvoiceSummary, LedgerTotals, ListInvoicesFilter,
    ListPaymentsFilter, ListPayrollFilter, NewDonation, NewExpense, NewInvoice, NewPayment,
    NewPayroll, NewSubscription, Payment, Payroll, Period, Plan, RevenueBucket, Student,
    Subscription,
};

/// Result of a batch insert of recurring invoices.
#[derive(Debug, Clone, Default)]
pub struct RecurringInsert {
    pub created: Vec<Invoice>,
    /// Drafts skipped because the subscription was already invoiced for the period.
    pub already_invoiced: u64,
}

/// Discount request carried into the store together with its audit fields.
#[derive(Debug, Clone)]
pub struct DiscountRequest {
    pub amount: Decimal,
    pub reason: Option<String>,
    pub applied_by: String,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn health_check(&self) -> Result<(), AppError>;

    // Reference data owned by enrolment.
    async fn get_guardian(&self, guardian_id: Uuid) -> Result<Option<Guardian>, AppError>;
    async fn get_student(&self, student_id: Uuid) -> Result<Option<Student>, AppError>;
    async fn get_plan(&self, plan_id: Uuid) -> Result<Option<Plan>, AppError>;
    /// ACTIVE subscriptions with the guardian of their student, if any.
    async fn list_billable_subscriptions(&self) -> Result<Vec<BillableSubscription>, AppError>;

    // Invoices.
    async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError>;
    async fn list_invoices(&self, filter: &ListInvoicesFilter) -> Result<Vec<Invoice>, AppError>;
    /// Insert a period's drafts, skipping subscriptions already invoiced for it.
    /// Concurrent runs for the same period are serialised.
    async fn insert_recurring_invoices(
        &self,
        period: Period,
        drafts: Vec<NewInvoice>,
    ) -> Result<RecurringInsert, AppError>;
    async fn insert_invoice(&self, input: NewInvoice) -> Result<Invoice, AppError>;
    async fn apply_discount(
        &self,
        invoice_id: Uuid,
        request: DiscountRequest,
    ) -> Result<(Invoice, InvoiceDiscount), AppError>;
    async fn cancel_invoice(&self, invoice_id: Uuid) -> Result<Invoice, AppError>;
    /// PENDING invoices due strictly before `as_of`, with guardian contact.
    async fn list_overdue_invoices(&self, as_of: NaiveDate)
        -> Result<Vec<InvoiceSummary>, AppError>;

    // Payments.
    async fn get_payment(&self, payment_id: Uuid) -> Result<Option<Payment>, AppError>;
    async fn list_payments(&self, filter: &ListPaymentsFilter) -> Result<Vec<Payment>, AppError>;
    /// Create a COMPLETED payment and settle its invoice together.
    async fn record_payment(
        &self,
        invoice_id: Uuid,
        payment: InvoicePayment,
    ) -> Result<(Invoice, Payment), AppError>;
    /// Create a PENDING subscription and a PENDING payment together.
    async fn create_admission(
        &self,
        subscription: NewSubscription,
        payment: NewPayment,
    ) -> Result<(Subscription, Payment), AppError>;
    /// Refund a COMPLETED payment and reopen its invoice together.
    async fn refund_payment(
        &self,
        payment_id: Uuid,
        reason: &str,
    ) -> Result<(Payment, Option<Invoice>), AppError>;
    async fn delete_pending_payment(&self, payment_id: Uuid) -> Result<Payment, AppError>;

    // Payroll.
    async fn get_payroll(&self, payroll_id: Uuid) -> Result<Option<Payroll>, AppError>;
    async fn list_payroll(&self, filter: &ListPayrollFilter) -> Result<Vec<Payroll>, AppError>;
    async fn insert_payroll(&self, input: NewPayroll) -> Result<Payroll, AppError>;
    async fn settle_payroll(&self, payroll_id: Uuid) -> Result<Payroll, AppError>;

    // Append-only entries and reporting.
    async fn insert_expense(&self, input: NewExpense) -> Result<Expense, AppError>;
    async fn insert_donation(&self, input: NewDonation) -> Result<Donation, AppError>;
    async fn ledger_totals(&self, range: Option<DateRange>) -> Result<LedgerTotals, AppError>;
    async fn revenue_by_month(&self, range: Option<DateRange>)
        -> Result<Vec<RevenueBucket>, AppError>;

    /// Delete pending payments, cancel pending invoices, unlink students and
    /// anonymise the guardian, in that order.
    async fn remove_guardian(&self, guardian_id: Uuid) -> Result<GuardianRemoval, AppError>;
}
