//! # Notification Payloads
//!
//! Push notifications are triggers, not sources of truth: the status and
//! amount they carry are kept for logging, then re-verified with a status
//! query. Only the correlation ids drive processing.
//!
//! ```text
//! iPaymu   (form)  reference_id  trx_id          status              amount
//! Midtrans (JSON)  order_id      transaction_id  transaction_status  gross_amount
//!                     │               │
//!                     ▼               ▼
//!          NotificationPayload { reference_id, transaction_id, .. }
//! ```

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;
use yualan_core::validation::{validate_reference_id, validate_transaction_id};
use yualan_core::{Money, PaymentMethod};

/// A structurally valid push notification.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationPayload {
    pub provider: PaymentMethod,
    /// Our merchant reference (the sale id).
    pub reference_id: String,
    /// The gateway's transaction id, when the payload carries one.
    pub transaction_id: Option<String>,
    /// Status text as pushed. Never trusted.
    pub reported_status: Option<String>,
    /// Amount as pushed. Never trusted.
    pub reported_amount: Option<Money>,
    /// Every field received, for signature checks and logs.
    pub fields: BTreeMap<String, String>,
}

impl NotificationPayload {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Why a body could not be read as a notification.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("notification is missing {0}")]
    MissingField(&'static str),

    #[error("notification is malformed: {0}")]
    Malformed(String),
}

/// Parses an iPaymu form-encoded notification.
pub fn parse_ipaymu_form(
    fields: BTreeMap<String, String>,
) -> Result<NotificationPayload, NotificationError> {
    let reference_id = fields
        .get("reference_id")
        .filter(|v| !v.trim().is_empty())
        .ok_or(NotificationError::MissingField("reference_id"))?;
    let reference_id =
        validate_reference_id(reference_id).map_err(|e| NotificationError::Malformed(e.to_string()))?;

    let transaction_id = optional_transaction_id(fields.get("trx_id").map(String::as_str))?;

    Ok(NotificationPayload {
        provider: PaymentMethod::Ipaymu,
        reference_id,
        transaction_id,
        reported_status: fields.get("status").cloned(),
        reported_amount: fields.get("amount").and_then(|a| Money::parse_decimal(a)),
        fields,
    })
}

/// Parses a Midtrans JSON notification.
pub fn parse_midtrans_json(
    body: &serde_json::Value,
) -> Result<NotificationPayload, NotificationError> {
    let object = body
        .as_object()
        .ok_or_else(|| NotificationError::Malformed("body is not a JSON object".to_string()))?;

    // Flatten scalars so the signature check sees exactly what was sent
    let fields: BTreeMap<String, String> = object
        .iter()
        .filter_map(|(key, value)| {
            let text = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((key.clone(), text))
        })
        .collect();

    let reference_id = fields
        .get("order_id")
        .filter(|v| !v.trim().is_empty())
        .ok_or(NotificationError::MissingField("order_id"))?;
    let reference_id =
        validate_reference_id(reference_id).map_err(|e| NotificationError::Malformed(e.to_string()))?;

    let transaction_id = optional_transaction_id(fields.get("transaction_id").map(String::as_str))?;

    Ok(NotificationPayload {
        provider: PaymentMethod::Midtrans,
        reference_id,
        transaction_id,
        reported_status: fields.get("transaction_status").cloned(),
        reported_amount: object.get("gross_amount").and_then(Money::from_json),
        fields,
    })
}

fn optional_transaction_id(raw: Option<&str>) -> Result<Option<String>, NotificationError> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(id) => validate_transaction_id(id)
            .map(Some)
            .map_err(|e| NotificationError::Malformed(e.to_string())),
    }
}
