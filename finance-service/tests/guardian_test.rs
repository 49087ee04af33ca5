//! Guardian removal cascade.

mod common;

use common::{admin, date, dec, super_admin, Harness};
use finance_service::models::{
    InvoiceStatus, ListInvoicesFilter, ListPaymentsFilter, PaymentMethod, PaymentStatus,
};
use finance_service::services::finance::{AdmissionRequest, RecordPayment};
use finance_service::services::FaultPoint;
use service_core::error::AppError;

/// Guardian with one settled invoice, one open invoice and one pending admission payment.
async fn guardian_with_history(h: &Harness) -> finance_service::models::Guardian {
    let guardian = h.guardian("parent-1");
    let student = h.student(&guardian);
    let plan = h.plan(300);

    let settled = h.invoice(&guardian, 100, date(2026, 1, 10)).await;
    h.engine
        .record_manual_payment(
            &admin(),
            settled.invoice_id,
            RecordPayment {
                amount: dec(100),
                method: PaymentMethod::Cash,
                description: None,
            },
        )
        .await
        .unwrap();
    h.invoice(&guardian, 120, date(2026, 2, 10)).await;
    h.engine
        .create_admission_payment(
            &admin(),
            AdmissionRequest {
                student_id: student.student_id,
                plan_id: plan.plan_id,
                method: PaymentMethod::BankTransfer,
            },
        )
        .await
        .unwrap();
    guardian
}

#[tokio::test]
async fn removal_runs_each_cleanup_step() {
    let h = Harness::new();
    let guardian = guardian_with_history(&h).await;

    let removal = h
        .engine
        .remove_guardian(&super_admin(), guardian.guardian_id)
        .await
        .unwrap();

    assert_eq!(removal.guardian_id, guardian.guardian_id);
    assert_eq!(removal.pending_payments_deleted, 1);
    assert_eq!(removal.pending_invoices_cancelled, 1);
    assert_eq!(removal.students_unlinked, 1);
    assert!(removal.anonymized);

    let payments = h
        .engine
        .list_payments(&admin(), ListPaymentsFilter::default())
        .await
        .unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentStatus::Completed);

    let invoices = h
        .engine
        .list_invoices(&admin(), ListInvoicesFilter::default())
        .await
        .unwrap();
    assert_eq!(invoices.len(), 2);
    assert!(invoices
        .iter()
        .all(|i| i.status != InvoiceStatus::Pending));

    let anonymized = h
        .engine
        .store()
        .get_guardian(guardian.guardian_id)
        .await
        .unwrap()
        .unwrap();
    assert!(anonymized.is_removed());
    assert!(anonymized.email.is_none());
}

#[tokio::test]
async fn removal_is_all_or_nothing() {
    let h = Harness::new();
    let guardian = guardian_with_history(&h).await;

    h.store.fail_at(FaultPoint::AfterPendingPaymentsDeleted);
    let result = h
        .engine
        .remove_guardian(&super_admin(), guardian.guardian_id)
        .await;
    assert!(matches!(result, Err(AppError::DatabaseError(_))));

    let pending = h
        .engine
        .list_payments(
            &admin(),
            ListPaymentsFilter {
                status: Some(PaymentStatus::Pending),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);

    let stored = h
        .engine
        .store()
        .get_guardian(guardian.guardian_id)
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.is_removed());
}

#[tokio::test]
async fn removal_needs_super_admin_and_happens_once() {
    let h = Harness::new();
    let guardian = h.guardian("parent-1");

    let by_admin = h.engine.remove_guardian(&admin(), guardian.guardian_id).await;
    assert!(matches!(by_admin, Err(AppError::Forbidden(_))));

    h.engine
        .remove_guardian(&super_admin(), guardian.guardian_id)
        .await
        .unwrap();
    let again = h
        .engine
        .remove_guardian(&super_admin(), guardian.guardian_id)
        .await;
    assert!(matches!(again, Err(AppError::Conflict(_))));

    let missing = h
        .engine
        .remove_guardian(&super_admin(), uuid::Uuid::new_v4())
        .await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn removed_guardian_cannot_be_invoiced() {
    let h = Harness::new();
    let guardian = h.guardian("parent-1");
    h.engine
        .remove_guardian(&super_admin(), guardian.guardian_id)
        .await
        .unwrap();

    let result = h
        .engine
        .create_manual_invoice(
            &admin(),
            finance_service::services::finance::ManualInvoice {
                guardian_id: guardian.guardian_id,
                student_id: None,
                amount: dec(10),
                period: "2026-02".parse().unwrap(),
                due_date: date(2026, 2, 10),
                description: None,
            },
        )
        .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}
