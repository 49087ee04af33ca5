use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::models::GuardianRemoval;
use crate::startup::AppState;

#[tracing::instrument(skip(state, ctx), fields(user_id = %ctx.user_id))]
pub async fn remove_guardian(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(guardian_id): Path<Uuid>,
) -> Result<Json<GuardianRemoval>, AppError> {
    Ok(Json(state.engine.remove_guardian(&ctx, guardian_id).await?))
}
