pub mod app;
pub mod config;
pub mod error;
pub mod setup;
pub mod stripe_billing_adapter;
pub mod stripe_client;
