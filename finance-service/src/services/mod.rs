//! Services module for finance-service.

pub mod database;
pub mod finance;
pub mod memory;
pub mod metrics;
pub mod notifier;
pub mod store;

pub use database::Database;
pub use finance::FinanceEngine;
pub use memory::{FaultPoint, MemoryStore};
pub use metrics::{get_metrics, init_metrics};
pub use notifier::{MemoryNotifier, NotificationSink, OutboxNotifier};
pub use store::LedgerStore;
