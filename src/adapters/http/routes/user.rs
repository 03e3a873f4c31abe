use axum::{
    Json, Router,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, post},
};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};

use crate::{
    adapters::http::{app_state::AppState, session::current_user},
    app_error::AppResult,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/account", get(get_account))
        .route("/credits/consume", post(consume_credits))
}

async fn get_account(
    State(app_state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    let claims = current_user(&jar, &headers, &app_state)?;

    let overview = app_state.account_use_cases.overview(&claims.sub).await?;

    Ok(Json(overview))
}

#[derive(Deserialize)]
struct ConsumePayload {
    model: String,
}

#[derive(Serialize)]
struct ConsumeResponse {
    model: String,
    cost: i64,
    total: i64,
    used: i64,
    remaining: i64,
}

async fn consume_credits(
    State(app_state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    Json(payload): Json<ConsumePayload>,
) -> AppResult<impl IntoResponse> {
    let claims = current_user(&jar, &headers, &app_state)?;

    let charge = app_state
        .account_use_cases
        .charge_model(&claims.sub, &payload.model)
        .await?;

    Ok(Json(ConsumeResponse {
        model: charge.model,
        cost: charge.cost,
        total: charge.total,
        used: charge.used,
        remaining: charge.remaining,
    }))
}
