//! In-memory ledger store for tests and local development.
//!
//! Each unit of work runs against a copy of the state which replaces the
//! live state only when the whole closure succeeds, so a failure between two
//! writes leaves nothing behind. [`FaultPoint`]s inject such failures.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use super::store::{DiscountRequest, LedgerStore, RecurringInsert};
use crate::models::{
    BillableSubscription, DateRange, Donation, Expense, Guardian, GuardianRemoval, Invoice,
    InvoiceDiscount, InvoicePayment, InvoiceStatus, InvoiceSummary, LedgerTotals,
    ListInvoicesFilter, ListPaymentsFilter, ListPayrollFilter, NewDonation, NewExpense,
    NewInvoice, NewPayment, NewPayroll, NewSubscription, Payment, PaymentStatus, Payroll, Period,
    Plan, RevenueBucket, Student, Subscription, SubscriptionStatus,
};

/// Places inside a unit of work where a storage failure can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    /// `record_payment`: payment written, invoice not yet settled.
    AfterPaymentInsert,
    /// `refund_payment`: payment refunded, invoice not yet reopened.
    AfterRefundUpdate,
    /// `create_admission`: subscription written, payment not yet written.
    AfterSubscriptionInsert,
    /// `remove_guardian`: pending payments deleted, invoices not yet cancelled.
    AfterPendingPaymentsDeleted,
}

#[derive(Debug, Clone, Default)]
struct LedgerState {
    guardians: HashMap<Uuid, Guardian>,
    students: HashMap<Uuid, Student>,
    plans: HashMap<Uuid, Plan>,
    subscriptions: HashMap<Uuid, Subscription>,
    invoices: HashMap<Uuid, Invoice>,
    discounts: Vec<InvoiceDiscount>,
    payments: HashMap<Uuid, Payment>,
    payroll: HashMap<Uuid, Payroll>,
    expenses: Vec<Expense>,
    donations: Vec<Donation>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<LedgerState>,
    fault: Mutex<Option<FaultPoint>>,
}

fn not_found(kind: &str, id: Uuid) -> AppError {
    AppError::NotFound(anyhow::anyhow!("{} {} not found", kind, id))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next unit of work that reaches `point`.
    pub fn fail_at(&self, point: FaultPoint) {
        *self.fault.lock() = Some(point);
    }

    fn checkpoint(&self, point: FaultPoint) -> Result<(), AppError> {
        let mut fault = self.fault.lock();
        if *fault == Some(point) {
            *fault = None;
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "Injected storage failure at {:?}",
                point
            )));
        }
        Ok(())
    }

    /// Run `work` on a copy of the state and publish it only on success.
    fn unit_of_work<T>(
        &self,
        work: impl FnOnce(&mut LedgerState) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let mut live = self.state.lock();
        let mut draft = live.clone();
        let out = work(&mut draft)?;
        *live = draft;
        Ok(out)
    }

    fn read<T>(&self, view: impl FnOnce(&LedgerState) -> T) -> T {
        view(&self.state.lock())
    }

    // Seed helpers for reference data owned by enrolment.

    pub fn insert_guardian(&self, user_id: &str, full_name: &str, email: Option<&str>) -> Guardian {
        let guardian = Guardian {
            guardian_id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            full_name: full_name.to_string(),
            email: email.map(str::to_string),
            created_utc: Utc::now(),
            removed_utc: None,
        };
        self.state
            .lock()
            .guardians
            .insert(guardian.guardian_id, guardian.clone());
        guardian
    }

    pub fn insert_student(&self, guardian_id: Option<Uuid>, full_name: &str) -> Student {
        let student = Student {
            student_id: Uuid::new_v4(),
            guardian_id,
            full_name: full_name.to_string(),
            created_utc: Utc::now(),
        };
        self.state
            .lock()
            .students
            .insert(student.student_id, student.clone());
        student
    }

    pub fn insert_plan(&self, name: &str, price: Decimal) -> Plan {
        let plan = Plan {
            plan_id: Uuid::new_v4(),
            name: name.to_string(),
            price,
            duration_months: 1,
            sessions_per_week: 2,
            days_per_week: 2,
            created_utc: Utc::now(),
        };
        self.state.lock().plans.insert(plan.plan_id, plan.clone());
        plan
    }

    pub fn insert_subscription(
        &self,
        student_id: Uuid,
        plan: &Plan,
        final_price: Decimal,
        status: SubscriptionStatus,
    ) -> Subscription {
        let mut input = NewSubscription::from_plan(student_id, plan);
        input.final_price = final_price;
        let mut subscription = Subscription::from_new(input, Utc::now());
        subscription.status = status;
        self.state
            .lock()
            .subscriptions
            .insert(subscription.subscription_id, subscription.clone());
        subscription
    }

    pub fn subscription(&self, subscription_id: Uuid) -> Option<Subscription> {
        self.read(|s| s.subscriptions.get(&subscription_id).cloned())
    }

    pub fn discounts_for(&self, invoice_id: Uuid) -> Vec<InvoiceDiscount> {
        self.read(|s| {
            s.discounts
                .iter()
                .filter(|d| d.invoice_id == invoice_id)
                .cloned()
                .collect()
        })
    }

    pub fn payroll_count(&self, staff_id: &str, period_label: &str) -> usize {
        self.read(|s| {
            s.payroll
                .values()
                .filter(|p| p.staff_id == staff_id && p.period_label == period_label)
                .count()
        })
    }
}

fn completed_in(payment: &Payment, range: Option<DateRange>) -> Option<NaiveDate> {
    if payment.status != PaymentStatus::Completed {
        return None;
    }
    let paid = payment.paid_utc?.date_naive();
    range.map_or(true, |r| r.contains(paid)).then_some(paid)
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn get_guardian(&self, guardian_id: Uuid) -> Result<Option<Guardian>, AppError> {
        Ok(self.read(|s| s.guardians.get(&guardian_id).cloned()))
    }

    async fn get_student(&self, student_id: Uuid) -> Result<Option<Student>, AppError> {
        Ok(self.read(|s| s.students.get(&student_id).cloned()))
    }

    async fn get_plan(&self, plan_id: Uuid) -> Result<Option<Plan>, AppError> {
        Ok(self.read(|s| s.plans.get(&plan_id).cloned()))
    }

    async fn list_billable_subscriptions(&self) -> Result<Vec<BillableSubscription>, AppError> {
        Ok(self.read(|s| {
            let mut rows: Vec<_> = s
                .subscriptions
                .values()
                .filter(|sub| sub.status == SubscriptionStatus::Active)
                .map(|sub| BillableSubscription {
                    subscription_id: sub.subscription_id,
                    student_id: sub.student_id,
                    guardian_id: s.students.get(&sub.student_id).and_then(|st| st.guardian_id),
                    final_price: sub.final_price,
                })
                .collect();
            rows.sort_by_key(|r| r.subscription_id);
            rows
        }))
    }

    async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError> {
        Ok(self.read(|s| s.invoices.get(&invoice_id).cloned()))
    }

    async fn list_invoices(&self, filter: &ListInvoicesFilter) -> Result<Vec<Invoice>, AppError> {
        Ok(self.read(|s| {
            let mut rows: Vec<_> = s
                .invoices
                .values()
                .filter(|i| filter.matches(i))
                .cloned()
                .collect();
            rows.sort_by(|a, b| (a.created_utc, a.invoice_id).cmp(&(b.created_utc, b.invoice_id)));
            rows
        }))
    }

    async fn insert_recurring_invoices(
        &self,
        period: Period,
        drafts: Vec<NewInvoice>,
    ) -> Result<RecurringInsert, AppError> {
        let label = period.label();
        self.unit_of_work(|state| {
            let now = Utc::now();
            let mut outcome = RecurringInsert::default();
            for draft in drafts {
                let duplicate = state.invoices.values().any(|i| {
                    i.subscription_id.is_some()
                        && i.subscription_id == draft.subscription_id
                        && i.period_label == label
                });
                if duplicate {
                    outcome.already_invoiced += 1;
                    continue;
                }
                let invoice = Invoice::from_new(draft, now);
                state.invoices.insert(invoice.invoice_id, invoice.clone());
                outcome.created.push(invoice);
            }
            Ok(outcome)
        })
    }

    async fn insert_invoice(&self, input: NewInvoice) -> Result<Invoice, AppError> {
        self.unit_of_work(|state| {
            if !state.guardians.contains_key(&input.guardian_id) {
                return Err(not_found("Guardian", input.guardian_id));
            }
            let invoice = Invoice::from_new(input, Utc::now());
            state.invoices.insert(invoice.invoice_id, invoice.clone());
            Ok(invoice)
        })
    }

    async fn apply_discount(
        &self,
        invoice_id: Uuid,
        request: DiscountRequest,
    ) -> Result<(Invoice, InvoiceDiscount), AppError> {
        self.unit_of_work(|state| {
            let now = Utc::now();
            let invoice = state
                .invoices
                .get_mut(&invoice_id)
                .ok_or_else(|| not_found("Invoice", invoice_id))?;
            let before = invoice.apply_discount(request.amount, now)?;
            let audit = InvoiceDiscount {
                discount_id: Uuid::new_v4(),
                invoice_id,
                requested_amount: request.amount,
                amount_before: before,
                amount_after: invoice.amount,
                reason: request.reason,
                applied_by: request.applied_by,
                applied_utc: now,
            };
            let invoice = invoice.clone();
            state.discounts.push(audit.clone());
            Ok((invoice, audit))
        })
    }

    async fn cancel_invoice(&self, invoice_id: Uuid) -> Result<Invoice, AppError> {
        self.unit_of_work(|state| {
            let invoice = state
                .invoices
                .get_mut(&invoice_id)
                .ok_or_else(|| not_found("Invoice", invoice_id))?;
            invoice.cancel(Utc::now())?;
            Ok(invoice.clone())
        })
    }

    async fn list_overdue_invoices(
        &self,
        as_of: NaiveDate,
    ) -> Result<Vec<InvoiceSummary>, AppError> {
        Ok(self.read(|s| {
            let mut rows: Vec<_> = s
                .invoices
                .values()
                .filter(|i| i.is_overdue(as_of))
                .filter_map(|i| {
                    let guardian = s.guardians.get(&i.guardian_id)?;
                    Some(InvoiceSummary::new(i, guardian))
                })
                .collect();
            rows.sort_by_key(|r| (r.due_date, r.invoice_id));
            rows
        }))
    }

    async fn get_payment(&self, payment_id: Uuid) -> Result<Option<Payment>, AppError> {
        Ok(self.read(|s| s.payments.get(&payment_id).cloned()))
    }

    async fn list_payments(&self, filter: &ListPaymentsFilter) -> Result<Vec<Payment>, AppError> {
        Ok(self.read(|s| {
            let mut rows: Vec<_> = s
                .payments
                .values()
                .filter(|p| filter.matches(p))
                .cloned()
                .collect();
            rows.sort_by(|a, b| (a.created_utc, a.payment_id).cmp(&(b.created_utc, b.payment_id)));
            rows
        }))
    }

    async fn record_payment(
        &self,
        invoice_id: Uuid,
        payment: InvoicePayment,
    ) -> Result<(Invoice, Payment), AppError> {
        self.unit_of_work(|state| {
            let now = Utc::now();
            let mut invoice = state
                .invoices
                .get(&invoice_id)
                .cloned()
                .ok_or_else(|| not_found("Invoice", invoice_id))?;
            let payment = Payment::completed(payment.for_invoice(&invoice), now);
            state.payments.insert(payment.payment_id, payment.clone());

            self.checkpoint(FaultPoint::AfterPaymentInsert)?;

            invoice.settle(now)?;
            state.invoices.insert(invoice_id, invoice.clone());
            Ok((invoice, payment))
        })
    }

    async fn create_admission(
        &self,
        subscription: NewSubscription,
        payment: NewPayment,
    ) -> Result<(Subscription, Payment), AppError> {
        self.unit_of_work(|state| {
            let now = Utc::now();
            let subscription = Subscription::from_new(subscription, now);
            state
                .subscriptions
                .insert(subscription.subscription_id, subscription.clone());

            self.checkpoint(FaultPoint::AfterSubscriptionInsert)?;

            let payment = Payment::pending(
                NewPayment {
                    subscription_id: Some(subscription.subscription_id),
                    ..payment
                },
                now,
            );
            state.payments.insert(payment.payment_id, payment.clone());
            Ok((subscription, payment))
        })
    }

    async fn refund_payment(
        &self,
        payment_id: Uuid,
        reason: &str,
    ) -> Result<(Payment, Option<Invoice>), AppError> {
        self.unit_of_work(|state| {
            let now = Utc::now();
            let payment = state
                .payments
                .get_mut(&payment_id)
                .ok_or_else(|| not_found("Payment", payment_id))?;
            payment.refund(reason, now)?;
            let payment = payment.clone();

            self.checkpoint(FaultPoint::AfterRefundUpdate)?;

            let invoice = match payment.invoice_id {
                Some(invoice_id) => {
                    let invoice = state
                        .invoices
                        .get_mut(&invoice_id)
                        .ok_or_else(|| not_found("Invoice", invoice_id))?;
                    invoice.reopen(now)?;
                    Some(invoice.clone())
                }
                None => None,
            };
            Ok((payment, invoice))
        })
    }

    async fn delete_pending_payment(&self, payment_id: Uuid) -> Result<Payment, AppError> {
        self.unit_of_work(|state| {
            let payment = state
                .payments
                .get(&payment_id)
                .ok_or_else(|| not_found("Payment", payment_id))?;
            payment.ensure_deletable()?;
            state
                .payments
                .remove(&payment_id)
                .ok_or_else(|| not_found("Payment", payment_id))
        })
    }

    async fn get_payroll(&self, payroll_id: Uuid) -> Result<Option<Payroll>, AppError> {
        Ok(self.read(|s| s.payroll.get(&payroll_id).cloned()))
    }

    async fn list_payroll(&self, filter: &ListPayrollFilter) -> Result<Vec<Payroll>, AppError> {
        Ok(self.read(|s| {
            let mut rows: Vec<_> = s
                .payroll
                .values()
                .filter(|p| filter.matches(p))
                .cloned()
                .collect();
            rows.sort_by(|a, b| {
                (&a.period_label, &a.staff_id).cmp(&(&b.period_label, &b.staff_id))
            });
            rows
        }))
    }

    async fn insert_payroll(&self, input: NewPayroll) -> Result<Payroll, AppError> {
        self.unit_of_work(|state| {
            let label = input.period.label();
            let exists = state
                .payroll
                .values()
                .any(|p| p.staff_id == input.staff_id && p.period_label == label);
            if exists {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Payroll for staff {} and period {} already exists",
                    input.staff_id,
                    label
                )));
            }
            let payroll = Payroll::from_new(input, Utc::now());
            state.payroll.insert(payroll.payroll_id, payroll.clone());
            Ok(payroll)
        })
    }

    async fn settle_payroll(&self, payroll_id: Uuid) -> Result<Payroll, AppError> {
        self.unit_of_work(|state| {
            let payroll = state
                .payroll
                .get_mut(&payroll_id)
                .ok_or_else(|| not_found("Payroll", payroll_id))?;
            payroll.settle(Utc::now())?;
            Ok(payroll.clone())
        })
    }

    async fn insert_expense(&self, input: NewExpense) -> Result<Expense, AppError> {
        self.unit_of_work(|state| {
            let expense = Expense::from_new(input, Utc::now());
            state.expenses.push(expense.clone());
            Ok(expense)
        })
    }

    async fn insert_donation(&self, input: NewDonation) -> Result<Donation, AppError> {
        self.unit_of_work(|state| {
            let donation = Donation::from_new(input, Utc::now());
            state.donations.push(donation.clone());
            Ok(donation)
        })
    }

    async fn ledger_totals(&self, range: Option<DateRange>) -> Result<LedgerTotals, AppError> {
        Ok(self.read(|s| {
            let within = |date: NaiveDate| range.map_or(true, |r| r.contains(date));
            LedgerTotals {
                revenue: s
                    .payments
                    .values()
                    .filter(|p| completed_in(p, range).is_some())
                    .map(|p| p.amount)
                    .sum(),
                expenses: s
                    .expenses
                    .iter()
                    .filter(|e| within(e.expense_date))
                    .map(|e| e.amount)
                    .sum(),
                donations: s
                    .donations
                    .iter()
                    .filter(|d| within(d.donation_date))
                    .map(|d| d.amount)
                    .sum(),
                pending_balance: s
                    .invoices
                    .values()
                    .filter(|i| i.status == InvoiceStatus::Pending)
                    .map(|i| i.amount)
                    .sum(),
            }
        }))
    }

    async fn revenue_by_month(
        &self,
        range: Option<DateRange>,
    ) -> Result<Vec<RevenueBucket>, AppError> {
        Ok(self.read(|s| {
            let mut buckets: BTreeMap<Period, (Decimal, i64)> = BTreeMap::new();
            for payment in s.payments.values() {
                if let Some(paid) = completed_in(payment, range) {
                    let bucket = buckets.entry(Period::containing(paid)).or_default();
                    bucket.0 += payment.amount;
                    bucket.1 += 1;
                }
            }
            buckets
                .into_iter()
                .map(|(period, (revenue, payments))| RevenueBucket {
                    period: period.label(),
                    revenue,
                    payments,
                })
                .collect()
        }))
    }

    async fn remove_guardian(&self, guardian_id: Uuid) -> Result<GuardianRemoval, AppError> {
        self.unit_of_work(|state| {
            let now = Utc::now();
            match state.guardians.get(&guardian_id) {
                None => return Err(not_found("Guardian", guardian_id)),
                Some(g) if g.is_removed() => {
                    return Err(AppError::Conflict(anyhow::anyhow!(
                        "Guardian {} was already removed",
                        guardian_id
                    )))
                }
                Some(_) => {}
            }
            let mut removal = GuardianRemoval {
                guardian_id,
                ..Default::default()
            };

            let before = state.payments.len();
            state.payments.retain(|_, p| {
                !(p.guardian_id == guardian_id && p.status == PaymentStatus::Pending)
            });
            removal.pending_payments_deleted = (before - state.payments.len()) as u64;

            self.checkpoint(FaultPoint::AfterPendingPaymentsDeleted)?;

            for invoice in state.invoices.values_mut() {
                if invoice.guardian_id == guardian_id && invoice.status == InvoiceStatus::Pending {
                    invoice.cancel(now)?;
                    removal.pending_invoices_cancelled += 1;
                }
            }

            for student in state.students.values_mut() {
                if student.guardian_id == Some(guardian_id) {
                    student.guardian_id = None;
                    removal.students_unlinked += 1;
                }
            }

            if let Some(guardian) = state.guardians.get_mut(&guardian_id) {
                guardian.anonymize(now);
                removal.anonymized = true;
            }
            Ok(removal)
        })
    }
}
