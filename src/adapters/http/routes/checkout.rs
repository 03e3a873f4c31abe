use axum::{
    Json, Router,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    routing::post,
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;

use crate::{
    adapters::http::{
        app_state::AppState,
        session::{current_user, ensure_same_user},
    },
    app_error::{AppError, AppResult},
    application::{jwt::Claims, use_cases::checkout::FinalizeInput},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/session", post(create_session))
        .route("/setup-intent", post(create_setup_intent))
        .route("/finalize", post(finalize))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutSessionPayload {
    price_id: String,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetupIntentPayload {
    price_id: String,
    #[serde(default)]
    promotion_code: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinalizePayload {
    #[serde(flatten)]
    input: FinalizeInput,
    #[serde(default)]
    user_id: Option<String>,
}

/// Email from the session claims. Request bodies never choose it.
fn session_email(claims: &Claims) -> AppResult<String> {
    claims
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::InvalidInput("Session has no email".into()))
}

/// POST /api/checkout/session
async fn create_session(
    State(app_state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    Json(payload): Json<CheckoutSessionPayload>,
) -> AppResult<impl IntoResponse> {
    let claims = current_user(&jar, &headers, &app_state)?;
    ensure_same_user(&claims, payload.user_id.as_deref())?;
    let checkout = app_state.checkout()?;
    let email = session_email(&claims)?;

    let session = checkout
        .create_checkout_session(&claims.sub, &email, &payload.price_id)
        .await?;

    Ok(Json(session))
}

/// POST /api/checkout/setup-intent
async fn create_setup_intent(
    State(app_state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    Json(payload): Json<SetupIntentPayload>,
) -> AppResult<impl IntoResponse> {
    let claims = current_user(&jar, &headers, &app_state)?;
    ensure_same_user(&claims, payload.user_id.as_deref())?;
    let checkout = app_state.checkout()?;
    let email = session_email(&claims)?;

    let quote = checkout
        .create_setup_intent(
            &claims.sub,
            &email,
            &payload.price_id,
            payload.promotion_code.as_deref(),
        )
        .await?;

    Ok(Json(quote))
}

/// POST /api/checkout/finalize
async fn finalize(
    State(app_state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    Json(payload): Json<FinalizePayload>,
) -> AppResult<impl IntoResponse> {
    let claims = current_user(&jar, &headers, &app_state)?;
    ensure_same_user(&claims, payload.user_id.as_deref())?;
    let checkout = app_state.checkout()?;

    let finalized = checkout
        .finalize_subscription(&claims.sub, payload.input)
        .await?;

    Ok(Json(finalized))
}
