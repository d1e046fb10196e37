//! Error types for document store operations.
use thiserror::Error;

/// Postgres SQLSTATE codes that signal a retryable transaction conflict.
const TRANSIENT_SQLSTATES: [&str; 2] = ["40001", "40P01"];
const UNIQUE_VIOLATION: &str = "23505";

/// Represents errors that can occur within a document store.
///
/// `Transient` marks failures where retrying the whole transaction may
/// succeed (write conflicts, deadlocks, pool exhaustion). Every other
/// variant is permanent for the operation that raised it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Transient store error: {0}")]
    Transient(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Transaction aborted: {0}")]
    Aborted(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::Database(db) => match db.code().as_deref() {
                Some(code) if TRANSIENT_SQLSTATES.contains(&code) => {
                    StoreError::Transient(db.message().to_string())
                }
                Some(UNIQUE_VIOLATION) => StoreError::DuplicateKey(db.message().to_string()),
                _ => StoreError::Database(error),
            },
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
                StoreError::Transient(error.to_string())
            }
            _ => StoreError::Database(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_is_transient() {
        let error = StoreError::from(sqlx::Error::PoolTimedOut);
        assert!(error.is_transient());
    }

    #[test]
    fn test_row_not_found_is_permanent() {
        let error = StoreError::from(sqlx::Error::RowNotFound);
        assert!(!error.is_transient());
        assert!(matches!(error, StoreError::Database(_)));
    }
}
