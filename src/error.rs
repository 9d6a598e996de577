use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors surfaced by the curation store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or is not a usable curation database.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// An expected-absent lookup came back empty.
    #[error("not found: {0}")]
    NotFound(String),

    /// The store rejected a delete or update.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("query failed: {0}")]
    Query(rusqlite::Error),
}

impl StoreError {
    /// Whether the failed row needs a human to look at it rather than a retry.
    pub fn needs_manual_remediation(&self) -> bool {
        matches!(self, StoreError::ConstraintViolation(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match e.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => StoreError::ConstraintViolation(e.to_string()),
            Some(
                ErrorCode::CannotOpen | ErrorCode::NotADatabase | ErrorCode::PermissionDenied,
            ) => StoreError::Unavailable(e.to_string()),
            _ => StoreError::Query(e),
        }
    }
}
