use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::warn;
use uuid::Uuid;

use super::{
    claims::{Claims, Role},
    jwt::JwtKeys,
};
use crate::{error::AppError, state::AppState};

/// Verified bearer token claims. Rejects with 401 when the header is missing,
/// malformed, or the token fails verification.
pub struct AuthUser(pub Claims);

impl AuthUser {
    pub fn id(&self) -> Uuid {
        self.0.sub
    }
}

/// Like [`AuthUser`] but additionally requires admin rights (403 otherwise).
pub struct AdminUser(pub Claims);

fn bearer_token(parts: &Parts) -> Option<&str> {
    let header = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() || token.contains(' ') {
        return None;
    }
    Some(token)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if !parts.headers.contains_key(AUTHORIZATION) {
            return Err(AppError::Unauthorized(
                "Missing Authorization header".to_string(),
            ));
        }
        let token = bearer_token(parts).ok_or_else(|| {
            AppError::Unauthorized("Invalid Authorization header".to_string())
        })?;

        let keys = JwtKeys::from_ref(state);
        match keys.verify(token) {
            Ok(claims) => Ok(AuthUser(claims)),
            Err(e) => {
                warn!(error = %e, "invalid or expired token");
                Err(AppError::Unauthorized(
                    "Invalid or expired token".to_string(),
                ))
            }
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(claims) = AuthUser::from_request_parts(parts, state).await?;

        let by_role = claims.role == Role::Admin;
        let by_email = state
            .config
            .admin_email
            .as_deref()
            .is_some_and(|admin| admin.eq_ignore_ascii_case(&claims.email));

        if !(by_role || by_email) {
            warn!(user_id = %claims.sub, "admin access denied");
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }
        Ok(AdminUser(claims))
    }
}
