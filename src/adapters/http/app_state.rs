use std::sync::Arc;

use crate::{
    app_error::{AppError, AppResult},
    infra::config::AppConfig,
    use_cases::{
        account::AccountUseCases, checkout::CheckoutUseCases, event_reconciler::EventReconciler,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub account_use_cases: Arc<AccountUseCases>,
    /// `None` while no Stripe key is configured.
    pub checkout_use_cases: Option<Arc<CheckoutUseCases>>,
    /// `None` while no Stripe key is configured.
    pub event_reconciler: Option<Arc<EventReconciler>>,
}

impl AppState {
    pub fn checkout(&self) -> AppResult<&CheckoutUseCases> {
        self.checkout_use_cases
            .as_deref()
            .ok_or(AppError::ProviderNotConfigured)
    }

    pub fn reconciler(&self) -> AppResult<&EventReconciler> {
        self.event_reconciler
            .as_deref()
            .ok_or(AppError::ProviderNotConfigured)
    }
}
