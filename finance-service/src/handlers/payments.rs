use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::dtos::payments::{
    CreateAdmissionRequest, ListPaymentsQuery, RecordPaymentRequest, RecordPaymentResponse,
    RefundRequest, RefundResponse,
};
use crate::dtos::{ListResponse, OkResponse};
use crate::models::{Admission, Payment};
use crate::startup::AppState;
use crate::utils::{ValidatedJson, ValidatedQuery};

#[tracing::instrument(skip(state, ctx, request), fields(user_id = %ctx.user_id))]
pub async fn record_payment(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(invoice_id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<RecordPaymentRequest>,
) -> Result<(StatusCode, Json<RecordPaymentResponse>), AppError> {
    let payment = state
        .engine
        .record_manual_payment(&ctx, invoice_id, request.into())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(RecordPaymentResponse {
            payment_id: payment.payment_id,
            payment,
        }),
    ))
}

#[tracing::instrument(skip(state, ctx, request), fields(user_id = %ctx.user_id))]
pub async fn create_admission(
    State(state): State<AppState>,
    ctx: AuthContext,
    ValidatedJson(request): ValidatedJson<CreateAdmissionRequest>,
) -> Result<(StatusCode, Json<Admission>), AppError> {
    let admission = state
        .engine
        .create_admission_payment(&ctx, request.into())
        .await?;
    Ok((StatusCode::CREATED, Json(admission)))
}

pub async fn list_payments(
    State(state): State<AppState>,
    ctx: AuthContext,
    ValidatedQuery(query): ValidatedQuery<ListPaymentsQuery>,
) -> Result<Json<ListResponse<Payment>>, AppError> {
    let payments = state.engine.list_payments(&ctx, query.into()).await?;
    Ok(Json(payments.into()))
}

pub async fn get_payment(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<Payment>, AppError> {
    Ok(Json(state.engine.get_payment(&ctx, payment_id).await?))
}

#[tracing::instrument(skip(state, ctx, request), fields(user_id = %ctx.user_id))]
pub async fn refund_payment(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(payment_id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<RefundRequest>,
) -> Result<Json<RefundResponse>, AppError> {
    let payment = state
        .engine
        .process_refund(&ctx, payment_id, &request.reason)
        .await?;
    Ok(Json(RefundResponse { ok: true, payment }))
}

#[tracing::instrument(skip(state, ctx), fields(user_id = %ctx.user_id))]
pub async fn delete_payment(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<OkResponse>, AppError> {
    state.engine.delete_pending_payment(&ctx, payment_id).await?;
    Ok(Json(OkResponse::ok()))
}
