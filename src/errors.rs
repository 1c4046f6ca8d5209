use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Account not found")]
    AccountNotFound,

    #[error("Media not found")]
    MediaNotFound,

    #[error("Invalid size: {0} bytes")]
    InvalidSize(i64),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Commit failed: {0}")]
    CommitFailed(String),

    #[error("Reconcile failed for user {user_id}: {reason}")]
    ReconcileFailed { user_id: Uuid, reason: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Coarse classification handed to callers at the service boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The user is out of space. Actionable by the user.
    QuotaFull,
    NotFound,
    InvalidInput,
    /// Opaque failure; the caller may retry.
    Internal,
}

impl AppError {
    pub fn class(&self) -> ErrorClass {
        match self {
            AppError::QuotaExceeded(_) => ErrorClass::QuotaFull,
            AppError::AccountNotFound | AppError::MediaNotFound => ErrorClass::NotFound,
            AppError::InvalidSize(_) | AppError::Validation(_) => ErrorClass::InvalidInput,
            AppError::Database(_)
            | AppError::CommitFailed(_)
            | AppError::ReconcileFailed { .. }
            | AppError::Store(_)
            | AppError::Storage(_)
            | AppError::Config(_)
            | AppError::Internal(_) => ErrorClass::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Internal
    }

    /// Message safe to show an end user. Internal causes are not exposed.
    pub fn public_message(&self) -> String {
        match self.class() {
            ErrorClass::Internal => {
                tracing::error!("Internal error: {}", self);
                "Internal error, please try again".to_string()
            }
            _ => self.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
