//! The finance engine: authorization, validation and orchestration on top of
//! a [`LedgerStore`]. Each concern lives in its own `impl FinanceEngine` block.

mod guardians;
mod invoices;
mod overdue;
mod payments;
mod payroll;
mod reporting;

pub use invoices::ManualInvoice;
pub use overdue::OverdueNotifyReport;
pub use payments::{AdmissionRequest, RecordPayment};
pub use payroll::PayrollRequest;
pub use reporting::ReportWindow;

use rust_decimal::Decimal;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::config::BillingSettings;
use crate::models::{Notification, NotificationCategory, NotificationPriority};
use crate::services::metrics::record_notification;
use crate::services::notifier::NotificationSink;
use crate::services::store::LedgerStore;

#[derive(Clone)]
pub struct FinanceEngine {
    store: Arc<dyn LedgerStore>,
    notifier: Arc<dyn NotificationSink>,
    settings: BillingSettings,
}

impl FinanceEngine {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        notifier: Arc<dyn NotificationSink>,
        settings: BillingSettings,
    ) -> Self {
        Self {
            store,
            notifier,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    pub fn settings(&self) -> BillingSettings {
        self.settings
    }

    /// Address a PAYMENT notification to a guardian. Lookup and emission
    /// failures are logged; the ledger operation has already committed.
    async fn notify_guardian(
        &self,
        guardian_id: Uuid,
        title: &str,
        message: String,
        priority: NotificationPriority,
    ) -> bool {
        match self.store.get_guardian(guardian_id).await {
            Ok(Some(guardian)) if !guardian.is_removed() => {
                self.notify(Notification::new(
                    guardian.user_id,
                    title,
                    message,
                    NotificationCategory::Payment,
                    priority,
                ))
                .await
            }
            Ok(_) => {
                warn!(guardian_id = %guardian_id, "No guardian to notify");
                false
            }
            Err(e) => {
                warn!(guardian_id = %guardian_id, error = %e, "Guardian lookup for notification failed");
                false
            }
        }
    }

    /// Hand a notification to the sink. Failures are logged, never returned.
    async fn notify(&self, notification: Notification) -> bool {
        let priority = notification.priority.as_str();
        let recipient = notification.recipient_id.clone();
        match self.notifier.emit(notification).await {
            Ok(()) => {
                record_notification(priority, "ok");
                true
            }
            Err(e) => {
                record_notification(priority, "error");
                warn!(recipient_id = %recipient, error = %e, "Failed to emit notification");
                false
            }
        }
    }
}

fn ensure_non_negative(field: &str, amount: Decimal) -> Result<(), AppError> {
    if amount < Decimal::ZERO {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "{} must not be negative",
            field
        )));
    }
    Ok(())
}

fn ensure_present(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!("{} is required", field)));
    }
    Ok(())
}

fn not_found(kind: &str, id: impl std::fmt::Display) -> AppError {
    AppError::NotFound(anyhow::anyhow!("{} {} not found", kind, id))
}
