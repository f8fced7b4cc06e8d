//! # Reconcile Error Types
//!
//! What the entry points classify. Nothing here reaches the scheduler or the
//! webhook handler as a failure: the engine folds errors into its summary and
//! the ingestor into its acknowledgement.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Reconcile Error Categories                        │
//! │                                                                         │
//! │  ┌─────────────────────┐  ┌─────────────────┐  ┌─────────────────────┐ │
//! │  │  Skippable          │  │  Per-sale error │  │  Configuration      │ │
//! │  │  (left unchanged)   │  │  (counted)      │  │                     │ │
//! │  │                     │  │                 │  │  Config             │ │
//! │  │  NotFound           │  │  GatewayUnavail.│  │                     │ │
//! │  │  AmbiguousCorrel.   │  │  Database       │  │                     │ │
//! │  │  CorrelationMism.   │  │                 │  │                     │ │
//! │  │  UnrecognizedStatus │  │  InvariantViol. │  │                     │ │
//! │  │                     │  │  InvalidTransit.│  │                     │ │
//! │  └─────────────────────┘  └─────────────────┘  └─────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use thiserror::Error;
use yualan_core::{CoreError, PaymentMethod};
use yualan_db::DbError;
use yualan_gateway::GatewayError;

/// Result type alias for reconcile operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Reconcile error type.
#[derive(Debug, Error)]
pub enum ReconcileError {
    // =========================================================================
    // Lookup Errors
    // =========================================================================
    /// Sale, tenant or payment attempt does not exist (or is soft-deleted).
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// No transaction id on the attempt and the history search came back
    /// empty.
    #[error("No {provider} transaction for sale {sale_id} (reference {reference_id}) within {pages} history pages")]
    AmbiguousCorrelation {
        provider: PaymentMethod,
        sale_id: String,
        reference_id: String,
        pages: u32,
    },

    /// A transaction id this sale never recorded, which the gateway files
    /// under a different merchant reference.
    #[error("{provider} transaction {transaction_id} belongs to reference {reported:?}, not sale {sale_id}")]
    CorrelationMismatch {
        provider: PaymentMethod,
        sale_id: String,
        transaction_id: String,
        reported: Option<String>,
    },

    // =========================================================================
    // Gateway Errors
    // =========================================================================
    /// Network failure, timeout, non-2xx or malformed answer.
    #[error("{provider} unavailable: {message}")]
    GatewayUnavailable {
        provider: PaymentMethod,
        message: String,
    },

    /// Status text outside the provider's known vocabulary.
    #[error("Unrecognized {provider} status '{status_text}'")]
    UnrecognizedStatus {
        provider: PaymentMethod,
        status_text: String,
    },

    // =========================================================================
    // State Errors
    // =========================================================================
    /// A write the idempotence checks should have prevented.
    ///
    /// ## When This Occurs
    /// - A guarded status UPDATE matched no row after the sale was locked
    /// - A second sale-driven decrement for the same line item
    /// - One gateway transaction id observed on two different sales
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// The requested operation is not allowed from the sale's status.
    #[error(transparent)]
    InvalidTransition(#[from] CoreError),

    // =========================================================================
    // Infrastructure Errors
    // =========================================================================
    /// Database failure.
    #[error("Database error: {0}")]
    Database(DbError),

    /// Invalid or unreadable configuration, or a gateway without credentials.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A background task's control channel is gone.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

impl ReconcileError {
    /// Creates a NotFound error.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        ReconcileError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// A gateway call that did not answer within `after`.
    pub fn timed_out(provider: PaymentMethod, operation: &str, after: Duration) -> Self {
        ReconcileError::GatewayUnavailable {
            provider,
            message: format!("{operation} timed out after {}s", after.as_secs()),
        }
    }

    /// Returns true for outcomes that leave the sale unchanged without
    /// counting as a processing failure.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            ReconcileError::NotFound { .. }
                | ReconcileError::AmbiguousCorrelation { .. }
                | ReconcileError::CorrelationMismatch { .. }
                | ReconcileError::UnrecognizedStatus { .. }
        )
    }

    /// Returns true when the provider could not be reached or understood.
    pub fn is_gateway_failure(&self) -> bool {
        matches!(self, ReconcileError::GatewayUnavailable { .. })
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

/// `StatusGuard` and UNIQUE violations only happen when a concurrent writer
/// got past the lock; both are reported as invariant violations.
impl From<DbError> for ReconcileError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ReconcileError::NotFound {
                entity: match entity.as_str() {
                    "Sale" => "Sale",
                    "Payment" => "Payment",
                    "Tenant" => "Tenant",
                    _ => "Record",
                },
                id,
            },
            DbError::StatusGuard { .. } | DbError::UniqueViolation { .. } => {
                ReconcileError::InvariantViolation(err.to_string())
            }
            other => ReconcileError::Database(other),
        }
    }
}

impl From<sqlx::Error> for ReconcileError {
    fn from(err: sqlx::Error) -> Self {
        DbError::from(err).into()
    }
}

impl From<GatewayError> for ReconcileError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotConfigured { .. } => ReconcileError::Config(err.to_string()),
            other => ReconcileError::GatewayUnavailable {
                provider: other.provider(),
                message: other.to_string(),
            },
        }
    }
}

impl From<std::io::Error> for ReconcileError {
    fn from(err: std::io::Error) -> Self {
        ReconcileError::Config(err.to_string())
    }
}

impl From<toml::de::Error> for ReconcileError {
    fn from(err: toml::de::Error) -> Self {
        ReconcileError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for ReconcileError {
    fn from(err: toml::ser::Error) -> Self {
        ReconcileError::Config(err.to_string())
    }
}

impl From<url::ParseError> for ReconcileError {
    fn from(err: url::ParseError) -> Self {
        ReconcileError::Config(format!("invalid URL: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(ReconcileError::not_found("Sale", "s1").is_skippable());
        assert!(ReconcileError::UnrecognizedStatus {
            provider: PaymentMethod::Ipaymu,
            status_text: "Expired".into(),
        }
        .is_skippable());

        let timeout = ReconcileError::timed_out(PaymentMethod::Ipaymu, "status query", Duration::from_secs(30));
        assert!(timeout.is_gateway_failure());
        assert!(!timeout.is_skippable());
        assert_eq!(timeout.to_string(), "ipaymu unavailable: status query timed out after 30s");
    }

    #[test]
    fn test_db_error_mapping() {
        let err: ReconcileError = DbError::status_guard("Sale", "s1", "pending").into();
        assert!(matches!(err, ReconcileError::InvariantViolation(_)));

        let err: ReconcileError = DbError::not_found("Sale", "s1").into();
        assert!(matches!(err, ReconcileError::NotFound { entity: "Sale", .. }));

        let err: ReconcileError = DbError::PoolExhausted.into();
        assert!(matches!(err, ReconcileError::Database(_)));
    }

    #[test]
    fn test_gateway_error_mapping() {
        let err: ReconcileError = GatewayError::call_failed(PaymentMethod::Midtrans, "HTTP 502").into();
        assert!(err.is_gateway_failure());

        let err: ReconcileError = GatewayError::not_configured(PaymentMethod::Ipaymu, "no VA").into();
        assert!(matches!(err, ReconcileError::Config(_)));
    }
}
