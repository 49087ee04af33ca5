use axum::async_trait;
use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use service_core::error::AppError;

use crate::auth::AuthContext;

pub const USER_ID_HEADER: &str = "X-User-ID";
pub const USER_ROLES_HEADER: &str = "X-User-Roles";

/// Resolves the caller from headers set by the trusted gateway.
///
/// A missing identity is rejected here. Finer role checks happen inside
/// each engine operation.
#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                AppError::Unauthorized(anyhow::anyhow!("Missing {} header", USER_ID_HEADER))
            })?;

        let roles = parts
            .headers
            .get(USER_ROLES_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(AuthContext::parse_roles)
            .unwrap_or_default();

        tracing::Span::current().record("user_id", user_id);

        Ok(AuthContext::new(user_id, roles))
    }
}

/// Rejects callers without an administrative role before the body is read,
/// so malformed input from an unauthorized caller is still a 403.
pub async fn require_admin(req: Request, next: Next) -> Response {
    let (mut parts, body) = req.into_parts();
    let ctx = match AuthContext::from_request_parts(&mut parts, &()).await {
        Ok(ctx) => ctx,
        Err(e) => return e.into_response(),
    };
    if let Err(e) = ctx.require_admin() {
        return e.into_response();
    }
    next.run(Request::from_parts(parts, body)).await
}
