//! # Midtrans Adapter
//!
//! Core API status lookups and Snap initiation, authenticated with HTTP basic
//! auth (server key as user, empty password).
//!
//! Midtrans has no paged history; its status endpoint accepts our order id
//! directly, so [`GatewayClient::search_history`] is a single lookup here.
//! Notifications carry a SHA-512 `signature_key` that is checked before any
//! processing.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::debug;
use yualan_core::{GatewayStatus, Money, PaymentMethod};

use crate::client::{
    GatewayClient, HistoryEntry, HistoryPage, InitiateRequest, InitiateResponse, StatusReport,
};
use crate::error::{GatewayError, GatewayResult};
use crate::notification::NotificationPayload;
use crate::signature::{constant_time_eq, midtrans_signature};

const PROVIDER: PaymentMethod = PaymentMethod::Midtrans;

const API_PRODUCTION_URL: &str = "https://api.midtrans.com";
const API_SANDBOX_URL: &str = "https://api.sandbox.midtrans.com";
const SNAP_PRODUCTION_URL: &str = "https://app.midtrans.com";
const SNAP_SANDBOX_URL: &str = "https://app.sandbox.midtrans.com";

/// Credentials for one Midtrans merchant.
#[derive(Clone)]
pub struct MidtransCredentials {
    pub server_key: String,
    pub is_production: bool,
}

impl std::fmt::Debug for MidtransCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MidtransCredentials")
            .field("server_key", &"<redacted>")
            .field("is_production", &self.is_production)
            .finish()
    }
}

/// Midtrans API client.
#[derive(Debug, Clone)]
pub struct MidtransClient {
    http: reqwest::Client,
    credentials: MidtransCredentials,
}

impl MidtransClient {
    pub fn new(http: reqwest::Client, credentials: MidtransCredentials) -> Self {
        MidtransClient { http, credentials }
    }

    fn api_url(&self) -> &'static str {
        if self.credentials.is_production {
            API_PRODUCTION_URL
        } else {
            API_SANDBOX_URL
        }
    }

    fn snap_url(&self) -> &'static str {
        if self.credentials.is_production {
            SNAP_PRODUCTION_URL
        } else {
            SNAP_SANDBOX_URL
        }
    }

    /// `GET /v2/{id}/status`. `Ok(None)` when Midtrans does not know the id.
    async fn fetch_status(&self, id: &str) -> GatewayResult<Option<Value>> {
        let url = format!("{}/v2/{}/status", self.api_url(), id);
        debug!(id, "Midtrans status request");

        let response = self
            .http
            .get(&url)
            .basic_auth(&self.credentials.server_key, Some(""))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| GatewayError::call_failed(PROVIDER, e.to_string()))?;

        let http_status = response.status();
        if http_status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !http_status.is_success() {
            return Err(GatewayError::call_failed(
                PROVIDER,
                format!("status lookup: HTTP {}", http_status.as_u16()),
            ));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::invalid_response(PROVIDER, e.to_string()))?;

        // Midtrans reports unknown ids with HTTP 200 and status_code "404"
        match body.get("status_code").and_then(Value::as_str) {
            Some("404") => Ok(None),
            Some(code) if code.starts_with('2') || code == "407" => Ok(Some(body)),
            Some(code) => Err(GatewayError::call_failed(
                PROVIDER,
                format!(
                    "status lookup: status_code {code}: {}",
                    body.get("status_message").and_then(Value::as_str).unwrap_or("no message")
                ),
            )),
            None => Ok(Some(body)),
        }
    }
}

#[async_trait]
impl GatewayClient for MidtransClient {
    fn provider(&self) -> PaymentMethod {
        PROVIDER
    }

    async fn initiate(&self, request: &InitiateRequest) -> GatewayResult<InitiateResponse> {
        let url = format!("{}/snap/v1/transactions", self.snap_url());

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.credentials.server_key, Some(""))
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&snap_body(request))
            .send()
            .await
            .map_err(|e| GatewayError::call_failed(PROVIDER, e.to_string()))?;

        let http_status = response.status();
        if !http_status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GatewayError::call_failed(
                PROVIDER,
                format!("snap: HTTP {} {}", http_status.as_u16(), text),
            ));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::invalid_response(PROVIDER, e.to_string()))?;

        Ok(InitiateResponse {
            transaction_id: None,
            session_id: body.get("token").and_then(Value::as_str).map(str::to_string),
            redirect_url: body.get("redirect_url").and_then(Value::as_str).map(str::to_string),
            raw: body,
        })
    }

    async fn query_status(&self, transaction_id: &str) -> GatewayResult<StatusReport> {
        let body = self.fetch_status(transaction_id).await?.ok_or_else(|| {
            GatewayError::call_failed(PROVIDER, format!("transaction {transaction_id} not found"))
        })?;
        parse_status(transaction_id, body)
    }

    async fn history_page(&self, _page: u32) -> GatewayResult<HistoryPage> {
        Err(GatewayError::Unsupported {
            provider: PROVIDER,
            operation: "history paging",
        })
    }

    async fn search_history(
        &self,
        reference_id: &str,
        _max_pages: u32,
    ) -> GatewayResult<Option<HistoryEntry>> {
        let Some(body) = self.fetch_status(reference_id).await? else {
            return Ok(None);
        };

        Ok(body
            .get("transaction_id")
            .and_then(Value::as_str)
            .map(|transaction_id| HistoryEntry {
                transaction_id: transaction_id.to_string(),
                reference_id: body.get("order_id").and_then(Value::as_str).map(str::to_string),
                status_text: body
                    .get("transaction_status")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                amount: body.get("gross_amount").and_then(Money::from_json),
            }))
    }

    fn map_status(&self, status_text: &str) -> Option<GatewayStatus> {
        map_midtrans_status(status_text)
    }

    fn verify_notification(&self, payload: &NotificationPayload) -> bool {
        let (Some(status_code), Some(gross_amount), Some(given)) = (
            payload.field("status_code"),
            payload.field("gross_amount"),
            payload.field("signature_key"),
        ) else {
            return false;
        };

        let expected = midtrans_signature(
            &payload.reference_id,
            status_code,
            gross_amount,
            &self.credentials.server_key,
        );
        constant_time_eq(&expected, given)
    }
}

/// `capture`/`settlement` succeed; `deny`/`cancel`/`expire`/`failure` fail.
pub fn map_midtrans_status(status_text: &str) -> Option<GatewayStatus> {
    match status_text.trim().to_lowercase().as_str() {
        "capture" | "settlement" => Some(GatewayStatus::Success),
        "deny" | "cancel" | "expire" | "failure" => Some(GatewayStatus::Failed),
        "pending" => Some(GatewayStatus::Pending),
        _ => None,
    }
}

fn snap_body(request: &InitiateRequest) -> Value {
    let items: Vec<Value> = request
        .items
        .iter()
        .map(|item| {
            json!({
                "name": item.name,
                "price": item.unit_price.major(),
                "quantity": item.quantity,
            })
        })
        .collect();

    json!({
        "transaction_details": {
            "order_id": request.reference_id,
            "gross_amount": request.amount.major(),
        },
        "item_details": items,
        "customer_details": {
            "first_name": request.buyer.name,
            "email": request.buyer.email,
            "phone": request.buyer.phone,
        },
        "callbacks": {
            "finish": request.return_url,
        },
    })
}

fn parse_status(transaction_id: &str, body: Value) -> GatewayResult<StatusReport> {
    let status_text = body
        .get("transaction_status")
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::invalid_response(PROVIDER, "missing transaction_status"))?
        .to_string();

    Ok(StatusReport {
        transaction_id: body
            .get("transaction_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| transaction_id.to_string()),
        reference_id: body
            .get("order_id")
            .and_then(Value::as_str)
            .map(str::to_string),
        status_text,
        amount: body.get("gross_amount").and_then(Money::from_json),
        raw: body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::parse_midtrans_json;

    fn client(server_key: &str) -> MidtransClient {
        MidtransClient::new(
            reqwest::Client::new(),
            MidtransCredentials {
                server_key: server_key.to_string(),
                is_production: false,
            },
        )
    }

    #[test]
    fn test_status_vocabulary() {
        assert_eq!(map_midtrans_status("settlement"), Some(GatewayStatus::Success));
        assert_eq!(map_midtrans_status("Capture"), Some(GatewayStatus::Success));
        assert_eq!(map_midtrans_status("expire"), Some(GatewayStatus::Failed));
        assert_eq!(map_midtrans_status("pending"), Some(GatewayStatus::Pending));
        assert_eq!(map_midtrans_status("refund"), None);
    }

    #[test]
    fn test_verify_notification() {
        let signature = midtrans_signature("order-1", "200", "10000.00", "SB-Mid-server-KEY");
        let payload = parse_midtrans_json(&json!({
            "order_id": "order-1",
            "status_code": "200",
            "gross_amount": "10000.00",
            "transaction_status": "settlement",
            "signature_key": signature,
        }))
        .unwrap();

        assert!(client("SB-Mid-server-KEY").verify_notification(&payload));
        assert!(!client("other-key").verify_notification(&payload));
    }

    #[test]
    fn test_unsigned_notification_is_rejected() {
        let payload = parse_midtrans_json(&json!({"order_id": "order-1", "status_code": "200"})).unwrap();
        assert!(!client("SB-Mid-server-KEY").verify_notification(&payload));
    }

    #[test]
    fn test_parse_status() {
        let report = parse_status(
            "order-1",
            json!({"transaction_id": "abc", "order_id": "order-1", "transaction_status": "pending", "gross_amount": "10000.00"}),
        )
        .unwrap();
        assert_eq!(report.transaction_id, "abc");
        assert_eq!(report.reference_id.as_deref(), Some("order-1"));
        assert_eq!(report.amount, Some(Money::from_major(10_000)));

        assert!(parse_status("order-1", json!({"status_code": "200"})).is_err());
    }

    #[tokio::test]
    async fn test_history_paging_unsupported() {
        let err = client("k").history_page(1).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unsupported { .. }));
    }
}
