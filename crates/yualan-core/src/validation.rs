//! # Validation Module
//!
//! Checks applied to data crossing a trust boundary: gateway notification
//! fields, gateway-returned identifiers, and stored sale totals.
//!
//! ## Usage
//! ```rust
//! use yualan_core::validation::{validate_reference_id, validate_transaction_id};
//!
//! assert!(validate_reference_id("0b6c1c4e-8d1f-4d57-9f8e-2b1f0f0f1a2b").is_ok());
//! assert!(validate_transaction_id("").is_err());
//! ```

use crate::error::ValidationError;
use crate::types::Sale;
use crate::{MAX_REFERENCE_ID_LEN, MAX_TRANSACTION_ID_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Identifier Validators
// =============================================================================

/// Validates a merchant reference id (the correlation id sent to gateways).
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most [`MAX_REFERENCE_ID_LEN`] characters
/// - Letters, digits, `-`, `_`, `.` and `/` only
///
/// ## Returns
/// The trimmed id.
pub fn validate_reference_id(reference_id: &str) -> ValidationResult<String> {
    validate_identifier("reference_id", reference_id, MAX_REFERENCE_ID_LEN)
}

/// Validates a gateway transaction id.
///
/// iPaymu ids are numeric, Midtrans ids are UUIDs; both fit the same rule set
/// as reference ids.
pub fn validate_transaction_id(transaction_id: &str) -> ValidationResult<String> {
    validate_identifier("transaction_id", transaction_id, MAX_TRANSACTION_ID_LEN)
}

fn validate_identifier(field: &str, value: &str, max: usize) -> ValidationResult<String> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::required(field));
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'))
    {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must contain only letters, numbers, '-', '_', '.' and '/'".to_string(),
        });
    }

    Ok(value.to_string())
}

// =============================================================================
// Amount Validators
// =============================================================================

/// Validates `total = subtotal - discount + tax` and that no amount is
/// negative.
pub fn validate_sale_totals(sale: &Sale) -> ValidationResult<()> {
    for (field, value) in [
        ("subtotal_cents", sale.subtotal_cents),
        ("discount_cents", sale.discount_cents),
        ("tax_cents", sale.tax_cents),
        ("total_cents", sale.total_cents),
    ] {
        if value < 0 {
            return Err(ValidationError::Negative {
                field: field.to_string(),
            });
        }
    }

    if sale.subtotal_cents - sale.discount_cents + sale.tax_cents != sale.total_cents {
        return Err(ValidationError::TotalMismatch {
            subtotal: sale.subtotal_cents,
            discount: sale.discount_cents,
            tax: sale.tax_cents,
            total: sale.total_cents,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PaymentMethod, SaleStatus};
    use chrono::Utc;

    fn sale(subtotal: i64, discount: i64, tax: i64, total: i64) -> Sale {
        let now = Utc::now();
        Sale {
            id: "sale-1".into(),
            tenant_id: "tenant-1".into(),
            invoice_number: "INV-1".into(),
            subtotal_cents: subtotal,
            discount_cents: discount,
            tax_cents: tax,
            total_cents: total,
            paid_cents: 0,
            change_cents: 0,
            payment_method: PaymentMethod::Ipaymu,
            status: SaleStatus::Pending,
            notes: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn test_reference_id() {
        assert_eq!(validate_reference_id("  O2 ").unwrap(), "O2");
        assert!(validate_reference_id("").is_err());
        assert!(validate_reference_id("   ").is_err());
        assert!(validate_reference_id("a b").is_err());
        assert!(validate_reference_id(&"x".repeat(MAX_REFERENCE_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_transaction_id() {
        assert_eq!(validate_transaction_id("1234567").unwrap(), "1234567");
        assert!(validate_transaction_id("9e1b7c1a-5d2f-4b7a-8c61-0f1e2d3c4b5a").is_ok());
        assert!(validate_transaction_id("<script>").is_err());
    }

    #[test]
    fn test_sale_totals() {
        assert!(validate_sale_totals(&sale(10_000, 0, 0, 10_000)).is_ok());
        assert!(validate_sale_totals(&sale(10_000, 1_000, 500, 9_500)).is_ok());
        assert!(matches!(
            validate_sale_totals(&sale(10_000, 1_000, 500, 10_000)),
            Err(ValidationError::TotalMismatch { .. })
        ));
        assert!(matches!(
            validate_sale_totals(&sale(10_000, -1, 0, 10_001)),
            Err(ValidationError::Negative { .. })
        ));
    }
}
