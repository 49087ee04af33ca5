use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

use super::FinanceEngine;
use crate::auth::AuthContext;
use crate::models::GuardianRemoval;

impl FinanceEngine {
    /// Remove a guardian in explicit steps: pending payments are deleted,
    /// pending invoices cancelled, students unlinked, the guardian anonymised.
    /// Settled history stays for reporting.
    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id, guardian_id = %guardian_id))]
    pub async fn remove_guardian(
        &self,
        ctx: &AuthContext,
        guardian_id: Uuid,
    ) -> Result<GuardianRemoval, AppError> {
        ctx.require_super_admin()?;
        let removal = self.store.remove_guardian(guardian_id).await?;
        info!(
            guardian_id = %guardian_id,
            pending_payments_deleted = removal.pending_payments_deleted,
            pending_invoices_cancelled = removal.pending_invoices_cancelled,
            students_unlinked = removal.students_unlinked,
            "Guardian removed"
        );
        Ok(removal)
    }
}
