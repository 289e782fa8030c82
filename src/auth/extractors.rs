use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::warn;
use uuid::Uuid;

use crate::{auth::jwt::TokenIssuer, error::AppError};

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

/// Caller identity taken from a verified access token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub username: String,
}

/// Cookie value with surrounding quotes removed.
pub(crate) fn cookie_value(jar: &CookieJar, name: &str) -> Option<String> {
    jar.get(name).map(|c| c.value_trimmed().to_string())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let auth = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    auth.strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    TokenIssuer: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let tokens = TokenIssuer::from_ref(state);
        let token = match bearer_token(&parts.headers) {
            Some(t) => t.to_string(),
            None => cookie_value(&CookieJar::from_headers(&parts.headers), ACCESS_COOKIE)
                .ok_or(AppError::InvalidToken)?,
        };

        let claims = tokens.verify_access(&token).map_err(|e| {
            warn!(error = %e, "rejected access token");
            e
        })?;

        Ok(AuthUser {
            id: claims.sub,
            email: claims.email,
            username: claims.username,
        })
    }
}
