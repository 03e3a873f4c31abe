pub mod checkout;
pub mod user;
pub mod webhooks;

use axum::{Router, routing::get};

use crate::adapters::http::app_state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .nest("/webhooks", webhooks::router())
        .nest("/checkout", checkout::router())
        .nest("/user", user::router())
}
