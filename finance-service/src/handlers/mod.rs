//! HTTP handlers for finance-service.
//!
//! Handlers resolve the caller, translate DTOs and delegate to
//! [`FinanceEngine`](crate::services::FinanceEngine). No business rules live here.

pub mod guardians;
pub mod health;
pub mod invoices;
pub mod payments;
pub mod payroll;
pub mod reports;
