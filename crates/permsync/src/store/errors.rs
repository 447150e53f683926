use sea_orm::DbErr;
use thiserror::Error;

/// Errors that can occur during permissions-store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from sea-orm.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    /// Row not found.
    #[error("Not found: {context}")]
    NotFound { context: String },

    /// A stored permission bitmap failed to deserialize.
    #[error("Corrupt permission bitmap: {context}")]
    CorruptBitmap { context: String },

    /// Invalid input data.
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },
}

impl StoreError {
    /// Create a NotFound error with context.
    pub fn not_found(context: impl Into<String>) -> Self {
        Self::NotFound {
            context: context.into(),
        }
    }

    /// Create a CorruptBitmap error with context.
    pub fn corrupt_bitmap(context: impl Into<String>) -> Self {
        Self::CorruptBitmap {
            context: context.into(),
        }
    }

    /// Create an InvalidInput error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

/// Check whether an error is worth retrying.
///
/// Covers lock contention (SQLite "database is locked") and transient
/// connection failures. Constraint violations and corrupt data are not
/// retryable.
pub fn is_retryable_error(err: &StoreError) -> bool {
    match err {
        StoreError::Database(db_err) => {
            let msg = db_err.to_string().to_ascii_lowercase();
            msg.contains("locked")
                || msg.contains("busy")
                || msg.contains("connection")
                || msg.contains("timed out")
        }
        _ => false,
    }
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_not_found() {
        let err = StoreError::not_found("user_id=42");
        let msg = err.to_string();
        assert!(msg.contains("Not found"));
        assert!(msg.contains("user_id=42"));
    }

    #[test]
    fn test_store_error_database_from_db_err() {
        let db_err = DbErr::RecordNotFound("test".to_string());
        let store_err: StoreError = db_err.into();
        assert!(store_err.to_string().contains("Database error"));
    }

    #[test]
    fn test_retryable_classification() {
        let locked: StoreError = DbErr::Exec(sea_orm::RuntimeErr::Internal(
            "database is locked".to_string(),
        ))
        .into();
        assert!(is_retryable_error(&locked));

        let corrupt = StoreError::corrupt_bitmap("user 1");
        assert!(!is_retryable_error(&corrupt));

        let invalid = StoreError::invalid_input("empty account list");
        assert!(!is_retryable_error(&invalid));
    }
}
