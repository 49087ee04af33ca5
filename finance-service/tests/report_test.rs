//! Finance summary and revenue trend.

mod common;

use chrono::Utc;
use common::{admin, date, dec, teacher, Harness};
use finance_service::models::{DateRange, Period, PaymentMethod};
use finance_service::services::finance::{RecordPayment, ReportWindow};
use rust_decimal::Decimal;
use service_core::error::AppError;

async fn paid_invoice(h: &Harness, guardian: &finance_service::models::Guardian, amount: i64) -> uuid::Uuid {
    let invoice = h.invoice(guardian, amount, date(2026, 2, 10)).await;
    h.engine
        .record_manual_payment(
            &admin(),
            invoice.invoice_id,
            RecordPayment {
                amount: dec(amount),
                method: PaymentMethod::BankTransfer,
                description: None,
            },
        )
        .await
        .unwrap()
        .payment_id
}

#[tokio::test]
async fn summary_nets_revenue_donations_and_expenses() {
    let h = Harness::new();
    let guardian = h.guardian("parent-1");
    paid_invoice(&h, &guardian, 100).await;
    paid_invoice(&h, &guardian, 50).await;
    h.engine
        .record_expense(&admin(), "Supplies".to_string(), None, dec(30), date(2026, 2, 3))
        .await
        .unwrap();
    h.engine
        .record_donation(&admin(), "Alumni Fund".to_string(), dec(20), date(2026, 2, 4), None)
        .await
        .unwrap();

    let summary = h
        .engine
        .get_finance_summary(&admin(), ReportWindow::AllTime)
        .await
        .unwrap();

    assert_eq!(summary.revenue, dec(150));
    assert_eq!(summary.expenses, dec(30));
    assert_eq!(summary.donations, dec(20));
    assert_eq!(summary.net, dec(140));
    assert_eq!(summary.pending_balance, Decimal::ZERO);
    assert!(summary.range.is_none());
}

#[tokio::test]
async fn refunded_and_pending_payments_are_not_revenue() {
    let h = Harness::new();
    let guardian = h.guardian("parent-1");
    let kept = paid_invoice(&h, &guardian, 100).await;
    let refunded = paid_invoice(&h, &guardian, 40).await;
    h.engine
        .process_refund(&admin(), refunded, "cancelled enrolment")
        .await
        .unwrap();
    h.invoice(&guardian, 25, date(2026, 3, 10)).await;

    let summary = h
        .engine
        .get_finance_summary(&admin(), ReportWindow::AllTime)
        .await
        .unwrap();

    assert_eq!(summary.revenue, dec(100));
    // Reopened 40 plus the open 25
    assert_eq!(summary.pending_balance, dec(65));
    assert!(h.engine.get_payment(&admin(), kept).await.is_ok());
}

#[tokio::test]
async fn windows_filter_ledger_entries_by_date() {
    let h = Harness::new();
    h.engine
        .record_expense(&admin(), "Rent".to_string(), None, dec(400), date(2026, 1, 31))
        .await
        .unwrap();
    h.engine
        .record_expense(&admin(), "Rent".to_string(), None, dec(410), date(2026, 2, 1))
        .await
        .unwrap();
    h.engine
        .record_donation(&admin(), "Parent Council".to_string(), dec(75), date(2026, 2, 14), None)
        .await
        .unwrap();

    let february = h
        .engine
        .get_finance_summary(&admin(), ReportWindow::Period("2026-02".parse().unwrap()))
        .await
        .unwrap();
    assert_eq!(february.expenses, dec(410));
    assert_eq!(february.donations, dec(75));
    assert_eq!(february.net, dec(75) - dec(410));

    let range = DateRange::new(date(2026, 1, 1), date(2026, 1, 31)).unwrap();
    let january = h
        .engine
        .get_finance_summary(&admin(), ReportWindow::Range(range))
        .await
        .unwrap();
    assert_eq!(january.expenses, dec(400));
    assert_eq!(january.donations, Decimal::ZERO);
    assert_eq!(january.range, Some(range));
}

#[tokio::test]
async fn revenue_trend_buckets_by_payment_month() {
    let h = Harness::new();
    let guardian = h.guardian("parent-1");
    paid_invoice(&h, &guardian, 100).await;
    paid_invoice(&h, &guardian, 50).await;

    let trend = h
        .engine
        .get_revenue_trend(&admin(), ReportWindow::AllTime)
        .await
        .unwrap();

    let this_month = Period::containing(Utc::now().date_naive()).label();
    assert_eq!(trend.len(), 1);
    assert_eq!(trend[0].period, this_month);
    assert_eq!(trend[0].revenue, dec(150));
    assert_eq!(trend[0].payments, 2);
}

#[tokio::test]
async fn ledger_entries_validate_input() {
    let h = Harness::new();

    let negative = h
        .engine
        .record_expense(&admin(), "Supplies".to_string(), None, dec(-1), date(2026, 2, 3))
        .await;
    assert!(matches!(negative, Err(AppError::BadRequest(_))));

    let unnamed = h
        .engine
        .record_donation(&admin(), " ".to_string(), dec(10), date(2026, 2, 3), None)
        .await;
    assert!(matches!(unnamed, Err(AppError::BadRequest(_))));

    let forbidden = h
        .engine
        .get_finance_summary(&teacher(), ReportWindow::AllTime)
        .await;
    assert!(matches!(forbidden, Err(AppError::Forbidden(_))));
}
