//! Notification sinks.
//!
//! The ledger only creates notifications. They land in the
//! `notification_outbox` table, which the messaging collaborator drains.

use async_trait::async_trait;
use parking_lot::Mutex;
use service_core::error::AppError;
use sqlx::PgPool;
use tracing::{debug, instrument};

use crate::models::Notification;
use crate::services::metrics::DB_QUERY_DURATION;

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn emit(&self, notification: Notification) -> Result<(), AppError>;
}

/// Writes notifications to the Postgres outbox.
#[derive(Clone)]
pub struct OutboxNotifier {
    pool: PgPool,
}

impl OutboxNotifier {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationSink for OutboxNotifier {
    #[instrument(skip(self, notification), fields(recipient_id = %notification.recipient_id, priority = notification.priority.as_str()))]
    async fn emit(&self, notification: Notification) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["emit_notification"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO notification_outbox (notification_id, recipient_id, title, message, category, priority, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(notification.notification_id)
        .bind(&notification.recipient_id)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.category.as_str())
        .bind(notification.priority.as_str())
        .bind(notification.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to enqueue notification: {}", e))
        })?;

        timer.observe_duration();
        debug!(notification_id = %notification.notification_id, "Notification enqueued");
        Ok(())
    }
}

/// Keeps notifications in memory. Can be told to reject everything.
#[derive(Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<Notification>>,
    failing: Mutex<bool>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl NotificationSink for MemoryNotifier {
    async fn emit(&self, notification: Notification) -> Result<(), AppError> {
        if *self.failing.lock() {
            return Err(AppError::ServiceUnavailable);
        }
        self.sent.lock().push(notification);
        Ok(())
    }
}
