//! Bearer-token authentication extractor for Axum handlers.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use meritum_core::types::UserId;

use crate::error::AppError;
use crate::state::AppState;

/// Authenticated user extracted from a Bearer token in the `Authorization` header.
///
/// ```ignore
/// async fn my_handler(user: AuthUser) -> AppResult<Json<()>> {
///     tracing::info!(user_id = %user.user_id, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// Subject of the verified token.
    pub user_id: UserId,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::unauthorized("Missing Authorization header"))?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::unauthorized("Invalid Authorization format. Expected: Bearer <token>")
        })?;

        let user_id = state.verifier.verify(token).await.map_err(|e| {
            tracing::debug!(error = %e, "Rejected bearer token");
            AppError::unauthorized("Invalid or expired token")
        })?;

        Ok(AuthUser { user_id })
    }
}
