use axum::http::{HeaderMap, header::AUTHORIZATION};
use axum_extra::extract::CookieJar;

use crate::{
    adapters::http::app_state::AppState,
    app_error::{AppError, AppResult},
    application::jwt::{self, Claims},
};

const ACCESS_COOKIE: &str = "access_token";

/// Session claims from the `access_token` cookie, or a bearer token when no
/// cookie is sent.
pub fn current_user(jar: &CookieJar, headers: &HeaderMap, app_state: &AppState) -> AppResult<Claims> {
    let token = match jar.get(ACCESS_COOKIE) {
        Some(cookie) => cookie.value().to_string(),
        None => headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_string)
            .ok_or(AppError::Unauthorized)?,
    };
    jwt::verify(&token, &app_state.config.jwt_secret)
}

/// Reject a body `userId` that names someone other than the session subject.
pub fn ensure_same_user(claims: &Claims, body_user_id: Option<&str>) -> AppResult<()> {
    match body_user_id {
        Some(id) if !id.is_empty() && id != claims.sub => {
            tracing::warn!(session_user = %claims.sub, body_user = %id, "User id mismatch");
            Err(AppError::Forbidden)
        }
        _ => Ok(()),
    }
}
