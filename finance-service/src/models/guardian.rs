//! Payer identities consumed by the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Paying party responsible for a student's charges.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Guardian {
    pub guardian_id: Uuid,
    /// Identity reference used to address notifications.
    pub user_id: String,
    pub full_name: String,
    pub email: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub removed_utc: Option<DateTime<Utc>>,
}

impl Guardian {
    pub fn is_removed(&self) -> bool {
        self.removed_utc.is_some()
    }

    /// Strip personal data while keeping the row for historical payments.
    pub fn anonymize(&mut self, now: DateTime<Utc>) {
        self.user_id = format!("removed:{}", self.guardian_id);
        self.full_name = "Removed guardian".to_string();
        self.email = None;
        self.removed_utc = Some(now);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Student {
    pub student_id: Uuid,
    pub guardian_id: Option<Uuid>,
    pub full_name: String,
    pub created_utc: DateTime<Utc>,
}

/// Counts of each step taken while removing a guardian.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardianRemoval {
    pub guardian_id: Uuid,
    pub pending_payments_deleted: u64,
    pub pending_invoices_cancelled: u64,
    pub students_unlinked: u64,
    pub anonymized: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymize_clears_contact_details() {
        let mut guardian = Guardian {
            guardian_id: Uuid::new_v4(),
            user_id: "parent-7".to_string(),
            full_name: "Dana Reyes".to_string(),
            email: Some("dana@example.com".to_string()),
            created_utc: Utc::now(),
            removed_utc: None,
        };
        guardian.anonymize(Utc::now());
        assert!(guardian.is_removed());
        assert!(guardian.email.is_none());
        assert!(!guardian.user_id.contains("parent-7"));
        assert!(!guardian.full_name.contains("Dana"));
    }
}
