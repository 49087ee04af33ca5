//! Application startup and lifecycle management.

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::tracing::request_id_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::config::FinanceConfig;
use crate::handlers::{guardians, health, invoices, payments, payroll, reports};
use crate::middleware::{http_metrics_middleware, require_admin};
use crate::services::{init_metrics, Database, FinanceEngine, OutboxNotifier};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub engine: FinanceEngine,
}

impl AppState {
    pub fn new(engine: FinanceEngine) -> Self {
        Self { engine }
    }
}

/// Every route of the service. Probes are open; `/v1` requires an
/// administrative caller.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/v1/invoices", post(invoices::create_invoice).get(invoices::list_invoices))
        .route("/v1/invoices/generate", post(invoices::generate_invoices))
        .route("/v1/invoices/overdue", get(invoices::list_overdue))
        .route("/v1/invoices/overdue/notify", post(invoices::notify_all_overdue))
        .route("/v1/invoices/:id", get(invoices::get_invoice))
        .route("/v1/invoices/:id/discounts", post(invoices::apply_discount))
        .route("/v1/invoices/:id/cancel", post(invoices::cancel_invoice))
        .route("/v1/invoices/:id/payments", post(payments::record_payment))
        .route("/v1/invoices/:id/overdue-notice", post(invoices::notify_overdue))
        .route("/v1/admissions", post(payments::create_admission))
        .route("/v1/payments", get(payments::list_payments))
        .route(
            "/v1/payments/:id",
            get(payments::get_payment).delete(payments::delete_payment),
        )
        .route("/v1/payments/:id/refund", post(payments::refund_payment))
        .route("/v1/payroll", post(payroll::create_payroll).get(payroll::list_payroll))
        .route("/v1/payroll/:id/settle", post(payroll::settle_payroll))
        .route("/v1/expenses", post(reports::create_expense))
        .route("/v1/donations", post(reports::create_donation))
        .route("/v1/reports/summary", get(reports::finance_summary))
        .route("/v1/reports/revenue-trend", get(reports::revenue_trend))
        .route("/v1/guardians/:id", delete(guardians::remove_guardian))
        .route_layer(middleware::from_fn(require_admin));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics_handler))
        .merge(api)
        .layer(middleware::from_fn(http_metrics_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: FinanceConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build the application without running migrations.
    /// Use this in tests when migrations are already applied by the test harness.
    pub async fn build_without_migrations(config: FinanceConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(config: FinanceConfig, run_migrations: bool) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        if run_migrations {
            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        let notifier = Arc::new(OutboxNotifier::new(db.pool().clone()));
        let engine = FinanceEngine::new(Arc::new(db), notifier, config.billing);
        let state = AppState::new(engine);

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Finance service listener bound");

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serve HTTP until the listener fails or the future is dropped.
    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        let app = router(self.state);

        tracing::info!(
            service = "finance-service",
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );

        axum::serve(self.listener, app).await.map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}
