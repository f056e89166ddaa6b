use axum::http::StatusCode;
use thiserror::Error;

/// Failures surfaced by the account workflow.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error("persistence error: {0:#}")]
    Persistence(#[source] anyhow::Error),
}

/// Failures surfaced by the direct object-storage endpoints.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("object storage unavailable: {0:#}")]
    Dependency(#[source] anyhow::Error),
}

impl AccountError {
    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AccountError::InvalidInput(_) => "invalid_input",
            AccountError::Conflict(_) => "conflict",
            AccountError::NotFound(_) => "not_found",
            AccountError::Persistence(_) => "persistence",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AccountError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AccountError::Conflict(_) => StatusCode::CONFLICT,
            AccountError::NotFound(_) => StatusCode::NOT_FOUND,
            AccountError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl StorageError {
    pub fn status(&self) -> StatusCode {
        match self {
            StorageError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            StorageError::Dependency(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<AccountError> for (StatusCode, String) {
    fn from(e: AccountError) -> Self {
        (e.status(), e.to_string())
    }
}

impl From<StorageError> for (StatusCode, String) {
    fn from(e: StorageError) -> Self {
        (e.status(), e.to_string())
    }
}
