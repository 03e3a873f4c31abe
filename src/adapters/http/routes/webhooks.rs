use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use chrono::Utc;
use secrecy::ExposeSecret;
use tracing::{error, info, warn};

use crate::{
    adapters::http::app_state::AppState,
    app_error::{AppError, AppResult},
    domain::entities::billing_event::BillingEvent,
    infra::stripe_client::StripeClient,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/stripe", post(handle_stripe_webhook))
}

/// Log a webhook error that Stripe should redeliver.
fn webhook_retryable_error(error: &AppError, event_type: &str, event_id: &str) -> StatusCode {
    error!(
        error = %error,
        event_type,
        event_id,
        retryable = true,
        "Webhook processing failed, returning 500 for Stripe retry"
    );
    StatusCode::INTERNAL_SERVER_ERROR
}

/// POST /api/webhooks/stripe
async fn handle_stripe_webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    let reconciler = app_state.reconciler()?;

    let webhook_secret = app_state
        .config
        .stripe_webhook_secret
        .as_ref()
        .ok_or_else(|| AppError::InvalidSignature("Webhook secret not configured".into()))?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::InvalidSignature("Missing Stripe signature".into()))?;

    StripeClient::verify_webhook_signature(
        &body,
        signature,
        webhook_secret.expose_secret(),
        app_state.config.webhook_tolerance_secs,
        Utc::now().timestamp(),
    )?;

    let event = BillingEvent::from_slice(&body)
        .map_err(|e| AppError::InvalidInput(format!("Invalid webhook payload: {}", e)))?;

    match reconciler.reconcile(&event).await {
        Ok(outcome) => {
            info!(event_id = %event.id, event_type = %event.event_type, ?outcome, "Webhook handled");
        }
        Err(e) if e.is_retryable() => {
            let status = webhook_retryable_error(&e, &event.event_type, &event.id);
            return Ok(status.into_response());
        }
        Err(e) => {
            // Acknowledge so Stripe stops retrying an event that can never succeed.
            warn!(
                error = %e,
                event_id = %event.id,
                event_type = %event.event_type,
                retryable = false,
                "Webhook processing failed, acknowledging"
            );
        }
    }

    Ok(Json(serde_json::json!({ "received": true })).into_response())
}
