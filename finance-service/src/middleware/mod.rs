//! HTTP middleware and extractors for finance-service.

pub mod auth_context;
pub mod metrics;

pub use auth_context::{require_admin, USER_ID_HEADER, USER_ROLES_HEADER};
pub use metrics::http_metrics_middleware;
