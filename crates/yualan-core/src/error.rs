//! # Error Types
//!
//! Domain-specific error types for yualan-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  yualan-core errors (this file)                                        │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Malformed input (payloads, totals)             │
//! │                                                                         │
//! │  yualan-db        DbError        - Database failures                   │
//! │  yualan-gateway   GatewayError   - Provider call failures              │
//! │  yualan-reconcile ReconcileError - What the entry points classify      │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → ReconcileError → summary / ack    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::types::SaleStatus;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Sale not found.
    #[error("Sale not found: {0}")]
    SaleNotFound(String),

    /// Sale is not in a state that allows the requested operation.
    ///
    /// ## When This Occurs
    /// - Re-initiating payment for a completed sale
    /// - Cancelling a sale that was already paid
    #[error("Sale {sale_id} is {current_status}, cannot {operation}")]
    InvalidSaleStatus {
        sale_id: String,
        current_status: SaleStatus,
        operation: &'static str,
    },

    /// Sale is not paid through a gateway.
    #[error("Sale {sale_id} uses {method}, which is not gateway-mediated")]
    NotGatewayPayment { sale_id: String, method: String },

    /// Payment amount is invalid.
    #[error("Invalid payment amount: {reason}")]
    InvalidPaymentAmount { reason: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates an InvalidSaleStatus error.
    pub fn invalid_status(
        sale_id: impl Into<String>,
        current_status: SaleStatus,
        operation: &'static str,
    ) -> Self {
        CoreError::InvalidSaleStatus {
            sale_id: sale_id.into(),
            current_status,
            operation,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    Negative { field: String },

    /// Invalid format.
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Stored amounts do not add up.
    #[error("total {total} != subtotal {subtotal} - discount {discount} + tax {tax}")]
    TotalMismatch {
        subtotal: i64,
        discount: i64,
        tax: i64,
        total: i64,
    },
}

impl ValidationError {
    /// Creates a Required error.
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::invalid_status("sale-1", SaleStatus::Completed, "re-initiate payment");
        assert_eq!(
            err.to_string(),
            "Sale sale-1 is completed, cannot re-initiate payment"
        );

        let err = ValidationError::required("reference_id");
        assert_eq!(err.to_string(), "reference_id is required");
    }

    #[test]
    fn test_validation_converts_into_core_error() {
        let err: CoreError = ValidationError::required("trx_id").into();
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
