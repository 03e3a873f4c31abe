use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Billing provider not configured")]
    ProviderNotConfigured,

    #[error("Not authenticated")]
    Unauthorized,

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Session does not match the requested user")]
    Forbidden,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found")]
    NotFound,

    #[error("Insufficient credits")]
    InsufficientCredits,

    #[error("Store error: {0}")]
    Store(String),

    #[error("Billing provider error: {0}")]
    Provider(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Clone, Copy, Debug)]
pub enum ErrorCode {
    ProviderNotConfigured,
    Unauthorized,
    InvalidSignature,
    Forbidden,
    InvalidInput,
    NotFound,
    InsufficientCredits,
    StoreError,
    ProviderError,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ProviderNotConfigured => "PROVIDER_NOT_CONFIGURED",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::InvalidSignature => "INVALID_SIGNATURE",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::InsufficientCredits => "INSUFFICIENT_CREDITS",
            ErrorCode::StoreError => "STORE_ERROR",
            ErrorCode::ProviderError => "PROVIDER_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl AppError {
    /// Whether a webhook that failed with this error should be redelivered.
    ///
    /// Transient failures (store, billing provider, unexpected) return `true`
    /// so the webhook responds 5xx and Stripe retries. Expected conditions
    /// such as a missing record or malformed input are acknowledged.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Store(_) | AppError::Provider(_) | AppError::Internal(_) => true,

            AppError::ProviderNotConfigured
            | AppError::Unauthorized
            | AppError::InvalidSignature(_)
            | AppError::Forbidden
            | AppError::InvalidInput(_)
            | AppError::NotFound
            | AppError::InsufficientCredits => false,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
