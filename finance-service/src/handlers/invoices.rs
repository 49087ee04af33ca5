use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::dtos::invoices::{
    ApplyDiscountRequest, ApplyDiscountResponse, CreateInvoiceRequest, CreateInvoiceResponse,
    GenerateInvoicesRequest, ListInvoicesQuery, OverdueQuery,
};
use crate::dtos::ListResponse;
use crate::models::{GenerationReport, Invoice, InvoiceSummary, Notification};
use crate::services::finance::OverdueNotifyReport;
use crate::startup::AppState;
use crate::utils::{ValidatedJson, ValidatedQuery};

#[tracing::instrument(skip(state, ctx, request), fields(user_id = %ctx.user_id))]
pub async fn generate_invoices(
    State(state): State<AppState>,
    ctx: AuthContext,
    ValidatedJson(request): ValidatedJson<GenerateInvoicesRequest>,
) -> Result<Json<GenerationReport>, AppError> {
    let report = state
        .engine
        .generate_recurring_invoices(&ctx, request.period)
        .await?;
    Ok(Json(report))
}

#[tracing::instrument(skip(state, ctx, request), fields(user_id = %ctx.user_id))]
pub async fn create_invoice(
    State(state): State<AppState>,
    ctx: AuthContext,
    ValidatedJson(request): ValidatedJson<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<CreateInvoiceResponse>), AppError> {
    let invoice = state
        .engine
        .create_manual_invoice(&ctx, request.into())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateInvoiceResponse {
            invoice_id: invoice.invoice_id,
            invoice,
        }),
    ))
}

pub async fn list_invoices(
    State(state): State<AppState>,
    ctx: AuthContext,
    ValidatedQuery(query): ValidatedQuery<ListInvoicesQuery>,
) -> Result<Json<ListResponse<Invoice>>, AppError> {
    let invoices = state.engine.list_invoices(&ctx, query.into()).await?;
    Ok(Json(invoices.into()))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<Invoice>, AppError> {
    Ok(Json(state.engine.get_invoice(&ctx, invoice_id).await?))
}

#[tracing::instrument(skip(state, ctx, request), fields(user_id = %ctx.user_id))]
pub async fn apply_discount(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(invoice_id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<ApplyDiscountRequest>,
) -> Result<Json<ApplyDiscountResponse>, AppError> {
    let (invoice, discount) = state
        .engine
        .apply_discount(&ctx, invoice_id, request.amount, request.reason)
        .await?;
    Ok(Json(ApplyDiscountResponse {
        new_amount: invoice.amount,
        invoice,
        discount,
    }))
}

#[tracing::instrument(skip(state, ctx), fields(user_id = %ctx.user_id))]
pub async fn cancel_invoice(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<Invoice>, AppError> {
    Ok(Json(state.engine.cancel_invoice(&ctx, invoice_id).await?))
}

pub async fn list_overdue(
    State(state): State<AppState>,
    ctx: AuthContext,
    ValidatedQuery(query): ValidatedQuery<OverdueQuery>,
) -> Result<Json<ListResponse<InvoiceSummary>>, AppError> {
    let overdue = state
        .engine
        .find_overdue_invoices(&ctx, query.as_of())
        .await?;
    Ok(Json(overdue.into()))
}

#[tracing::instrument(skip(state, ctx), fields(user_id = %ctx.user_id))]
pub async fn notify_overdue(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(invoice_id): Path<Uuid>,
    ValidatedQuery(query): ValidatedQuery<OverdueQuery>,
) -> Result<Json<Notification>, AppError> {
    let notification = state
        .engine
        .notify_overdue(&ctx, invoice_id, query.as_of())
        .await?;
    Ok(Json(notification))
}

#[tracing::instrument(skip(state, ctx), fields(user_id = %ctx.user_id))]
pub async fn notify_all_overdue(
    State(state): State<AppState>,
    ctx: AuthContext,
    ValidatedQuery(query): ValidatedQuery<OverdueQuery>,
) -> Result<Json<OverdueNotifyReport>, AppError> {
    let report = state
        .engine
        .notify_all_overdue(&ctx, query.as_of())
        .await?;
    Ok(Json(report))
}
