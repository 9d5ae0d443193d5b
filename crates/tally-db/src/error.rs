//! # Store Errors
//!
//! ```text
//!  sqlx::Error / MigrateError / serde_json::Error
//!        │
//!        ▼
//!     DbError ──► SinkError ──► CoreError::Persistence   (register writes)
//!        └──────► TerminalError                          (start-up reads)
//! ```
//!
//! SQLite only reports constraint failures as message text, so the mapping
//! from `sqlx::Error::Database` goes by message prefix.

use tally_core::sink::SinkError;
use tally_core::ValidationError;
use thiserror::Error;

/// Result type for store operations.
pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    /// An update or delete matched no row: unknown product id, hold already
    /// released.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// `constraint` is SQLite's `table.column` list, e.g. `sales.receipt_number`.
    #[error("Duplicate value for {constraint}")]
    UniqueViolation { constraint: String },

    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// The file could not be opened or created (path, permissions, disk).
    #[error("Cannot open store: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Rejected before it reached SQLite.
    #[error("Invalid product: {0}")]
    Validation(#[from] ValidationError),

    /// A stored row no longer maps onto a domain value.
    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    #[error("Timed out waiting for a store connection")]
    PoolTimedOut,

    #[error("Store error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        DbError::InvalidData(message.into())
    }

    fn from_database_message(message: &str) -> Self {
        if let Some(constraint) = message.strip_prefix("UNIQUE constraint failed: ") {
            DbError::UniqueViolation {
                constraint: constraint.to_string(),
            }
        } else if message.starts_with("FOREIGN KEY constraint failed") {
            DbError::ForeignKeyViolation(message.to_string())
        } else {
            DbError::QueryFailed(message.to_string())
        }
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Row", "(query)"),
            sqlx::Error::Database(db_err) => DbError::from_database_message(db_err.message()),
            sqlx::Error::PoolTimedOut => DbError::PoolTimedOut,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("store is closed".to_string()),
            other => DbError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Hold snapshots and refund sources are stored as JSON.
impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::InvalidData(err.to_string())
    }
}

impl From<DbError> for SinkError {
    fn from(err: DbError) -> Self {
        SinkError::new(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_messages() {
        match DbError::from_database_message("UNIQUE constraint failed: sales.receipt_number") {
            DbError::UniqueViolation { constraint } => {
                assert_eq!(constraint, "sales.receipt_number")
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            DbError::from_database_message("FOREIGN KEY constraint failed"),
            DbError::ForeignKeyViolation(_)
        ));
        assert!(matches!(
            DbError::from_database_message("no such table: widgets"),
            DbError::QueryFailed(_)
        ));
    }

    #[test]
    fn test_sink_error_keeps_message() {
        let sink: SinkError = DbError::not_found("Hold", "H-0001").into();
        assert_eq!(sink.message(), "Hold not found: H-0001");
    }
}
