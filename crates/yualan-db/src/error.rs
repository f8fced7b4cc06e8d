//! # Database Error Types
//!
//! Error types for database operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  sqlx::Error ──► DbError ──► ReconcileError::Database ──► per-sale      │
//! │                     │                                     error count   │
//! │                     │                                                   │
//! │                     └── StatusGuard: a guarded UPDATE matched no row    │
//! │                         (sale moved on under us; reconcile treats it    │
//! │                          as an invariant violation)                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    ///
    /// ## When This Occurs
    /// - ID doesn't exist
    /// - Soft-deleted sale
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A status-guarded UPDATE affected no row.
    ///
    /// ## When This Occurs
    /// - Completing a sale that is no longer pending/failed
    /// - Attaching a transaction id to an attempt that already has one
    #[error("{entity} {id} is not in an updatable state ({expected})")]
    StatusGuard {
        entity: String,
        id: String,
        expected: String,
    },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Duplicate invoice number
    /// - Same gateway transaction id on two attempts
    /// - Second sale-driven decrement for one line item
    #[error("Duplicate value for {constraint}")]
    UniqueViolation { constraint: String },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a StatusGuard error.
    pub fn status_guard(
        entity: impl Into<String>,
        id: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        DbError::StatusGuard {
            entity: entity.into(),
            id: id.into(),
            expected: expected.into(),
        }
    }

    /// True for UNIQUE violations on the given `table.column` (or any, when
    /// `constraint` is empty).
    pub fn is_unique_violation_on(&self, constraint: &str) -> bool {
        match self {
            DbError::UniqueViolation { constraint: c } => constraint.is_empty() || c.contains(constraint),
            _ => false,
        }
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → UNIQUE / FOREIGN KEY / QueryFailed
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // SQLite: "UNIQUE constraint failed: payments.transaction_id"
                if let Some(constraint) = msg.strip_prefix("UNIQUE constraint failed: ") {
                    DbError::UniqueViolation {
                        constraint: constraint.to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_violation_matching() {
        let err = DbError::UniqueViolation {
            constraint: "payments.transaction_id".to_string(),
        };
        assert!(err.is_unique_violation_on("payments.transaction_id"));
        assert!(err.is_unique_violation_on(""));
        assert!(!err.is_unique_violation_on("sales.invoice_number"));
        assert!(!DbError::PoolExhausted.is_unique_violation_on(""));
    }

    #[test]
    fn test_status_guard_message() {
        let err = DbError::status_guard("Sale", "s-1", "pending or failed");
        assert_eq!(
            err.to_string(),
            "Sale s-1 is not in an updatable state (pending or failed)"
        );
    }
}
