use axum::{extract::State, http::StatusCode, Json};
use service_core::error::AppError;

use crate::auth::AuthContext;
use crate::dtos::reports::{CreateDonationRequest, CreateExpenseRequest, ReportQuery};
use crate::dtos::ListResponse;
use crate::models::{Donation, Expense, FinanceSummary, RevenueBucket};
use crate::startup::AppState;
use crate::utils::{ValidatedJson, ValidatedQuery};

pub async fn finance_summary(
    State(state): State<AppState>,
    ctx: AuthContext,
    ValidatedQuery(query): ValidatedQuery<ReportQuery>,
) -> Result<Json<FinanceSummary>, AppError> {
    let summary = state
        .engine
        .get_finance_summary(&ctx, query.window()?)
        .await?;
    Ok(Json(summary))
}

pub async fn revenue_trend(
    State(state): State<AppState>,
    ctx: AuthContext,
    ValidatedQuery(query): ValidatedQuery<ReportQuery>,
) -> Result<Json<ListResponse<RevenueBucket>>, AppError> {
    let buckets = state
        .engine
        .get_revenue_trend(&ctx, query.window()?)
        .await?;
    Ok(Json(buckets.into()))
}

#[tracing::instrument(skip(state, ctx, request), fields(user_id = %ctx.user_id))]
pub async fn create_expense(
    State(state): State<AppState>,
    ctx: AuthContext,
    ValidatedJson(request): ValidatedJson<CreateExpenseRequest>,
) -> Result<(StatusCode, Json<Expense>), AppError> {
    let expense = state
        .engine
        .record_expense(
            &ctx,
            request.category,
            request.description,
            request.amount,
            request.expense_date,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(expense)))
}

#[tracing::instrument(skip(state, ctx, request), fields(user_id = %ctx.user_id))]
pub async fn create_donation(
    State(state): State<AppState>,
    ctx: AuthContext,
    ValidatedJson(request): ValidatedJson<CreateDonationRequest>,
) -> Result<(StatusCode, Json<Donation>), AppError> {
    let donation = state
        .engine
        .record_donation(
            &ctx,
            request.donor_name,
            request.amount,
            request.donation_date,
            request.note,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(donation)))
}
