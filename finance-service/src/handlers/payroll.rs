use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::dtos::payroll::{CreatePayrollRequest, ListPayrollQuery};
use crate::dtos::ListResponse;
use crate::models::Payroll;
use crate::startup::AppState;
use crate::utils::{ValidatedJson, ValidatedQuery};

#[tracing::instrument(skip(state, ctx, request), fields(user_id = %ctx.user_id))]
pub async fn create_payroll(
    State(state): State<AppState>,
    ctx: AuthContext,
    ValidatedJson(request): ValidatedJson<CreatePayrollRequest>,
) -> Result<(StatusCode, Json<Payroll>), AppError> {
    let payroll = state.engine.generate_payroll(&ctx, request.into()).await?;
    Ok((StatusCode::CREATED, Json(payroll)))
}

pub async fn list_payroll(
    State(state): State<AppState>,
    ctx: AuthContext,
    ValidatedQuery(query): ValidatedQuery<ListPayrollQuery>,
) -> Result<Json<ListResponse<Payroll>>, AppError> {
    let payroll = state.engine.list_payroll(&ctx, query.into()).await?;
    Ok(Json(payroll.into()))
}

#[tracing::instrument(skip(state, ctx), fields(user_id = %ctx.user_id))]
pub async fn settle_payroll(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(payroll_id): Path<Uuid>,
) -> Result<Json<Payroll>, AppError> {
    Ok(Json(state.engine.settle_payroll(&ctx, payroll_id).await?))
}
