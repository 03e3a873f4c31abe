//! Test utilities.
//!
//! This module provides:
//! - An in-memory key-value store standing in for Redis
//! - A scripted billing provider standing in for Stripe
//! - Test data factories and webhook payload builders
//! - A builder for `AppState` used by route tests

mod app_state_builder;
mod billing_mocks;
mod factories;
mod store_mocks;

pub use app_state_builder::*;
pub use billing_mocks::*;
pub use factories::*;
pub use store_mocks::*;
