//! Payroll generation and settlement.

mod common;

use common::{admin, dec, period, super_admin, teacher, Harness};
use finance_service::models::{ListPayrollFilter, NotificationCategory, PayrollStatus};
use finance_service::services::finance::PayrollRequest;
use service_core::error::AppError;

fn t1_january() -> PayrollRequest {
    PayrollRequest {
        staff_id: "T1".to_string(),
        amount: dec(500),
        period: period("2026-01"),
        description: Some("January salary".to_string()),
    }
}

#[tokio::test]
async fn one_payroll_per_staff_and_period() {
    let h = Harness::new();

    let payroll = h.engine.generate_payroll(&admin(), t1_january()).await.unwrap();
    assert_eq!(payroll.status, PayrollStatus::Pending);
    assert_eq!(payroll.period_label, "2026-01");
    assert_eq!(payroll.amount, dec(500));
    assert!(payroll.paid_utc.is_none());

    let duplicate = h.engine.generate_payroll(&admin(), t1_january()).await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));
    assert_eq!(h.store.payroll_count("T1", "2026-01"), 1);

    // Other periods and staff are independent
    let mut february = t1_january();
    february.period = period("2026-02");
    h.engine.generate_payroll(&admin(), february).await.unwrap();
    let mut other = t1_january();
    other.staff_id = "T2".to_string();
    h.engine.generate_payroll(&admin(), other).await.unwrap();

    let listed = h
        .engine
        .list_payroll(
            &admin(),
            ListPayrollFilter {
                period_label: Some("2026-01".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);
}

#[tokio::test]
async fn negative_payroll_is_rejected() {
    let h = Harness::new();
    let mut request = t1_january();
    request.amount = dec(-1);

    let result = h.engine.generate_payroll(&admin(), request).await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));
    assert_eq!(h.store.payroll_count("T1", "2026-01"), 0);
}

#[tokio::test]
async fn settlement_requires_super_admin_and_happens_once() {
    let h = Harness::new();
    let payroll = h.engine.generate_payroll(&admin(), t1_january()).await.unwrap();

    let by_admin = h.engine.settle_payroll(&admin(), payroll.payroll_id).await;
    assert!(matches!(by_admin, Err(AppError::Forbidden(_))));

    let settled = h
        .engine
        .settle_payroll(&super_admin(), payroll.payroll_id)
        .await
        .unwrap();
    assert_eq!(settled.status, PayrollStatus::Completed);
    assert!(settled.paid_utc.is_some());

    let again = h.engine.settle_payroll(&super_admin(), payroll.payroll_id).await;
    assert!(matches!(again, Err(AppError::Conflict(_))));

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient_id, "T1");
    assert_eq!(sent[0].category, NotificationCategory::Payroll);
}

#[tokio::test]
async fn teachers_cannot_generate_payroll() {
    let h = Harness::new();
    let result = h.engine.generate_payroll(&teacher(), t1_january()).await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));
}
