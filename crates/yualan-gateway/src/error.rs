//! # Gateway Error Types
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CallFailed       network, timeout, non-2xx, provider said "no"         │
//! │  InvalidResponse  2xx but the body is not what the contract promises    │
//! │  NotConfigured    tenant (and platform) lack credentials                │
//! │  Unsupported      the provider has no such operation                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Provider error codes are not interpreted; the message is carried as text.

use thiserror::Error;
use yualan_core::PaymentMethod;

/// Result type alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Gateway call failures.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The call did not produce a usable answer.
    #[error("{provider} call failed: {message}")]
    CallFailed {
        provider: PaymentMethod,
        message: String,
    },

    /// The provider answered, but not in the documented shape.
    #[error("{provider} returned an invalid response: {message}")]
    InvalidResponse {
        provider: PaymentMethod,
        message: String,
    },

    /// Credentials are missing or unusable.
    #[error("{provider} is not configured: {reason}")]
    NotConfigured {
        provider: PaymentMethod,
        reason: String,
    },

    /// The provider does not offer this operation.
    #[error("{provider} does not support {operation}")]
    Unsupported {
        provider: PaymentMethod,
        operation: &'static str,
    },
}

impl GatewayError {
    pub fn call_failed(provider: PaymentMethod, message: impl Into<String>) -> Self {
        GatewayError::CallFailed {
            provider,
            message: message.into(),
        }
    }

    pub fn invalid_response(provider: PaymentMethod, message: impl Into<String>) -> Self {
        GatewayError::InvalidResponse {
            provider,
            message: message.into(),
        }
    }

    pub fn not_configured(provider: PaymentMethod, reason: impl Into<String>) -> Self {
        GatewayError::NotConfigured {
            provider,
            reason: reason.into(),
        }
    }

    /// Provider the failing call was made to.
    pub fn provider(&self) -> PaymentMethod {
        match self {
            GatewayError::CallFailed { provider, .. }
            | GatewayError::InvalidResponse { provider, .. }
            | GatewayError::NotConfigured { provider, .. }
            | GatewayError::Unsupported { provider, .. } => *provider,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_provider() {
        let err = GatewayError::call_failed(PaymentMethod::Ipaymu, "HTTP 502");
        assert_eq!(err.to_string(), "ipaymu call failed: HTTP 502");
        assert_eq!(err.provider(), PaymentMethod::Ipaymu);

        let err = GatewayError::Unsupported {
            provider: PaymentMethod::Midtrans,
            operation: "history paging",
        };
        assert_eq!(err.to_string(), "midtrans does not support history paging");
    }
}
