use std::net::SocketAddr;

use axum::http::HeaderValue;
use env_helpers::{get_env, get_env_default};
use secrecy::SecretString;
use url::Url;

use crate::infra::error::InfraError;

pub struct AppConfig {
    pub jwt_secret: SecretString,
    pub app_origin: Url,
    pub cors_origin: HeaderValue,
    pub bind_addr: SocketAddr,
    pub redis_url: String,
    /// Stripe API key. Billing endpoints answer 500 while it is unset.
    pub stripe_secret_key: Option<SecretString>,
    /// Signing secret of the webhook endpoint. Webhooks answer 400 while it is unset.
    pub stripe_webhook_secret: Option<SecretString>,
    /// Maximum age of a webhook signature timestamp.
    pub webhook_tolerance_secs: i64,
    /// How long handled event ids are remembered for duplicate suppression.
    pub processed_event_ttl_secs: u64,
}

fn optional_secret(var: &str) -> Option<SecretString> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(|v| SecretString::new(v.into()))
}

impl AppConfig {
    pub fn from_env() -> Result<Self, InfraError> {
        let jwt_secret: SecretString = SecretString::new(get_env::<String>("JWT_SECRET").into());

        let app_origin: Url = get_env("APP_ORIGIN");
        let cors_origin: HeaderValue =
            get_env_default("CORS_ORIGIN", String::from("http://localhost:3000"))
                .parse()
                .map_err(|_| InfraError::ConfigInvalid { var: "CORS_ORIGIN" })?;

        let bind_addr: SocketAddr =
            get_env_default("BIND_ADDR", SocketAddr::from(([127, 0, 0, 1], 3001)));
        let redis_url: String = get_env_default("REDIS_URL", "redis://127.0.0.1:6379".to_string());

        let stripe_secret_key = optional_secret("STRIPE_SECRET_KEY");
        let stripe_webhook_secret = optional_secret("STRIPE_WEBHOOK_SECRET");
        if stripe_secret_key.is_none() {
            tracing::warn!("STRIPE_SECRET_KEY not set, billing endpoints are disabled");
        }

        let webhook_tolerance_secs: i64 = get_env_default("WEBHOOK_TOLERANCE_SECS", 300);
        // 72 hours
        let processed_event_ttl_secs: u64 = get_env_default("PROCESSED_EVENT_TTL_SECS", 259_200);

        Ok(Self {
            jwt_secret,
            app_origin,
            cors_origin,
            bind_addr,
            redis_url,
            stripe_secret_key,
            stripe_webhook_secret,
            webhook_tolerance_secs,
            processed_event_ttl_secs,
        })
    }
}
