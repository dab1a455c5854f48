use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::{error::AppError, state::AppState, user::services::authenticate};

/// Resolves the `Authorization: Token <key>` header to the caller's user id.
/// `Bearer <key>` is accepted as well; the scheme is case-insensitive.
pub struct AuthUser(pub Uuid);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(AppError::Unauthorized(
                "Authentication credentials were not provided.",
            ))?;

        let key = header
            .split_once(' ')
            .filter(|(scheme, _)| {
                scheme.eq_ignore_ascii_case("token") || scheme.eq_ignore_ascii_case("bearer")
            })
            .map(|(_, key)| key.trim())
            .filter(|k| !k.is_empty())
            .ok_or(AppError::Unauthorized("Invalid token header."))?;

        let user_id = authenticate(state.store.as_ref(), key).await?;
        Ok(AuthUser(user_id))
    }
}
