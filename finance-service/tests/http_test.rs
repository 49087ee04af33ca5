//! HTTP surface tests against the in-memory store.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{date, Harness};
use finance_service::startup::{router, AppState};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

fn app(h: &Harness) -> Router {
    router(AppState::new(h.engine.clone()))
}

fn request(method: &str, uri: &str, roles: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(roles) = roles {
        builder = builder
            .header("X-User-ID", "user-1")
            .header("X-User-Roles", roles);
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn health_check_works() {
    let h = Harness::new();
    let (status, body) = send(app(&h), request("GET", "/health", None, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "finance-service");
}

#[tokio::test]
async fn metrics_endpoint_works() {
    let h = Harness::new();
    let response = app(&h)
        .oneshot(request("GET", "/metrics", None, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get("content-type")
        .map(|v| v.to_str().unwrap_or("").contains("text/plain"))
        .unwrap_or(false));
}

#[tokio::test]
async fn missing_identity_is_unauthorized() {
    let h = Harness::new();
    let (status, body) = send(app(&h), request("GET", "/v1/invoices", None, None)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "authorization_error");
}

#[tokio::test]
async fn role_is_checked_before_body_validation() {
    let h = Harness::new();
    let invalid = json!({ "staff_id": "", "amount": "-5", "period": "not-a-period" });

    let (status, body) = send(
        app(&h),
        request("POST", "/v1/payroll", Some("TEACHER"), Some(invalid.clone())),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "authorization_error");

    let (status, body) = send(
        app(&h),
        request("POST", "/v1/payroll", Some("ADMIN"), Some(invalid)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");
}

#[tokio::test]
async fn negative_amount_is_a_validation_error() {
    let h = Harness::new();
    let (status, body) = send(
        app(&h),
        request(
            "POST",
            "/v1/payroll",
            Some("ADMIN"),
            Some(json!({ "staff_id": "T1", "amount": "-5", "period": "2026-01" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "validation_error");
}

#[tokio::test]
async fn invoice_lifecycle_over_http() {
    let h = Harness::new();
    let guardian = h.guardian("parent-1");

    let (status, created) = send(
        app(&h),
        request(
            "POST",
            "/v1/invoices",
            Some("ADMIN"),
            Some(json!({
                "guardian_id": guardian.guardian_id,
                "amount": "200",
                "period": "2026-02",
                "due_date": "2026-02-28"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let invoice_id = created["invoice_id"].as_str().unwrap().to_string();
    assert_eq!(created["invoice"]["status"], "PENDING");

    let (status, discounted) = send(
        app(&h),
        request(
            "POST",
            &format!("/v1/invoices/{}/discounts", invoice_id),
            Some("ADMIN"),
            Some(json!({ "amount": "250", "reason": "scholarship" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(discounted["new_amount"], "0");

    let (status, paid) = send(
        app(&h),
        request(
            "POST",
            &format!("/v1/invoices/{}/payments", invoice_id),
            Some("ADMIN"),
            Some(json!({ "amount": "0", "method": "CASH" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let payment_id = paid["payment_id"].as_str().unwrap().to_string();

    let (status, refunded) = send(
        app(&h),
        request(
            "POST",
            &format!("/v1/payments/{}/refund", payment_id),
            Some("ADMIN"),
            Some(json!({ "reason": "duplicate charge" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(refunded["ok"], true);
    assert_eq!(refunded["payment"]["status"], "REFUNDED");

    let (status, again) = send(
        app(&h),
        request(
            "POST",
            &format!("/v1/payments/{}/refund", payment_id),
            Some("ADMIN"),
            Some(json!({ "reason": "duplicate charge" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(again["code"], "conflict");

    let (status, listed) = send(
        app(&h),
        request("GET", "/v1/invoices?status=PENDING", Some("ADMIN"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["count"], 1);
}

#[tokio::test]
async fn overdue_route_is_not_shadowed_by_invoice_id() {
    let h = Harness::new();
    let guardian = h.guardian("parent-1");
    h.invoice(&guardian, 120, date(2026, 2, 28)).await;

    let (status, body) = send(
        app(&h),
        request("GET", "/v1/invoices/overdue?as_of=2026-03-01", Some("ADMIN"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["items"][0]["guardian_user_id"], "parent-1");
}

#[tokio::test]
async fn unknown_invoice_is_not_found() {
    let h = Harness::new();
    let (status, body) = send(
        app(&h),
        request(
            "GET",
            &format!("/v1/invoices/{}", uuid::Uuid::new_v4()),
            Some("ADMIN"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn report_window_must_be_complete() {
    let h = Harness::new();
    let (status, _) = send(
        app(&h),
        request("GET", "/v1/reports/summary?from=2026-01-01", Some("ADMIN"), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, summary) = send(
        app(&h),
        request("GET", "/v1/reports/summary?period=2026-01", Some("SUPER_ADMIN"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["net"], "0");
}

#[tokio::test]
async fn guardian_removal_requires_super_admin() {
    let h = Harness::new();
    let guardian = h.guardian("parent-1");
    let uri = format!("/v1/guardians/{}", guardian.guardian_id);

    let (status, _) = send(app(&h), request("DELETE", &uri, Some("ADMIN"), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(app(&h), request("DELETE", &uri, Some("SUPER_ADMIN"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["anonymized"], true);
}
