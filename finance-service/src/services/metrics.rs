//! Prometheus metrics for finance-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter_vec, CounterVec,
    HistogramVec, IntCounterVec, TextEncoder,
};

/// HTTP request counter by route and status.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "finance_http_requests_total",
        "Total number of HTTP requests",
        &["method", "route", "status"]
    )
    .expect("Failed to register http_requests_total")
});

/// HTTP request duration histogram by route.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "finance_http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "route"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("Failed to register http_request_duration")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "finance_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

pub static INVOICES_CREATED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "finance_invoices_created_total",
        "Total number of invoices created",
        &["source"]
    )
    .expect("Failed to register invoices_created")
});

pub static PAYMENTS_RECORDED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "finance_payments_recorded_total",
        "Total number of payments recorded",
        &["method", "status"]
    )
    .expect("Failed to register payments_recorded")
});

/// Collected amount; refunds are counted separately and not subtracted.
pub static PAYMENT_AMOUNT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "finance_payment_amount_total",
        "Sum of completed payment amounts",
        &["method"]
    )
    .expect("Failed to register payment_amount_total")
});

pub static REFUNDS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "finance_refunds_total",
        "Total number of refunds processed",
        &["status"]
    )
    .expect("Failed to register refunds_total")
});

pub static PAYROLL_OPERATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "finance_payroll_operations_total",
        "Total payroll operations by type",
        &["operation"]
    )
    .expect("Failed to register payroll_operations_total")
});

pub static NOTIFICATIONS_EMITTED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "finance_notifications_emitted_total",
        "Notifications handed to the outbox",
        &["priority", "status"]
    )
    .expect("Failed to register notifications_emitted")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "finance_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&HTTP_REQUESTS_TOTAL);
    Lazy::force(&HTTP_REQUEST_DURATION);
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&INVOICES_CREATED);
    Lazy::force(&PAYMENTS_RECORDED);
    Lazy::force(&PAYMENT_AMOUNT_TOTAL);
    Lazy::force(&REFUNDS_TOTAL);
    Lazy::force(&PAYROLL_OPERATIONS_TOTAL);
    Lazy::force(&NOTIFICATIONS_EMITTED);
    Lazy::force(&ERRORS_TOTAL);
}

pub fn record_http_request(method: &str, route: &str, status: u16, seconds: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, route, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION
        .with_label_values(&[method, route])
        .observe(seconds);
}

pub fn record_invoices_created(source: &str, count: u64) {
    INVOICES_CREATED.with_label_values(&[source]).inc_by(count);
}

pub fn record_payment(method: &str, status: &str, amount: f64) {
    PAYMENTS_RECORDED.with_label_values(&[method, status]).inc();
    if status == "COMPLETED" {
        PAYMENT_AMOUNT_TOTAL.with_label_values(&[method]).inc_by(amount);
    }
}

pub fn record_refund(status: &str) {
    REFUNDS_TOTAL.with_label_values(&[status]).inc();
}

pub fn record_payroll_operation(operation: &str) {
    PAYROLL_OPERATIONS_TOTAL.with_label_values(&[operation]).inc();
}

pub fn record_notification(priority: &str, status: &str) {
    NOTIFICATIONS_EMITTED
        .with_label_values(&[priority, status])
        .inc();
}

pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
