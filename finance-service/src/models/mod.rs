//! Domain models for finance-service.

mod guardian;
mod invoice;
mod ledger;
mod notification;
mod payment;
mod payroll;
mod period;
mod report;
mod subscription;

pub use guardian::{Guardian, GuardianRemoval, Student};
pub use invoice::{
    GenerationReport, Invoice, InvoiceDiscount, InvoiceSource, InvoiceStatus, InvoiceSummary,
    ListInvoicesFilter, NewInvoice,
};
pub use ledger::{Donation, Expense, NewDonation, NewExpense};
pub use notification::{Notification, NotificationCategory, NotificationPriority};
pub use payment::{
    Admission, AdmissionNextStep, InvoicePayment, ListPaymentsFilter, NewPayment, Payment, PaymentMethod,
    PaymentOrigin, PaymentStatus,
};
pub use payroll::{ListPayrollFilter, NewPayroll, Payroll, PayrollStatus};
pub use period::{InvalidPeriod, Period};
pub use report::{DateRange, FinanceSummary, LedgerTotals, RevenueBucket};
pub use subscription::{
    BillableSubscription, NewSubscription, Plan, Subscription, SubscriptionStatus,
};
