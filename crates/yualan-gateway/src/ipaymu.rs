//! # iPaymu Adapter
//!
//! iPaymu API v2 with the JSON request-signing scheme (see
//! [`crate::signature`]).
//!
//! ## Endpoints
//! ```text
//! ┌──────────────┬──────────────────────────────────┬─────────────────────────┐
//! │ Endpoint     │ Body                             │ Used for                │
//! ├──────────────┼──────────────────────────────────┼─────────────────────────┤
//! │ /payment     │ product[] qty[] price[] urls ... │ initiate                │
//! │ /transaction │ transactionId, account           │ query_status            │
//! │ /history     │ orderBy, order, limit, page      │ history_page            │
//! │ /refund      │ transactionId, amount            │ refund                  │
//! └──────────────┴──────────────────────────────────┴─────────────────────────┘
//! ```
//!
//! Every response is an envelope `{ Status, Success, Message, Data }`.
//! `TransactionId` and `Amount` arrive as numbers or strings depending on the
//! endpoint.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::{json, Value};
use tracing::{debug, warn};
use yualan_core::{GatewayStatus, Money, PaymentMethod};

use crate::client::{
    GatewayClient, HistoryEntry, HistoryPage, InitiateRequest, InitiateResponse, StatusReport,
};
use crate::error::{GatewayError, GatewayResult};
use crate::signature::ipaymu_signature;

/// Production API base URL.
pub const IPAYMU_PRODUCTION_URL: &str = "https://my.ipaymu.com/api/v2";

/// Sandbox API base URL.
pub const IPAYMU_SANDBOX_URL: &str = "https://sandbox.ipaymu.com/api/v2";

/// Rows per history page.
const HISTORY_PAGE_SIZE: u32 = 20;

const PROVIDER: PaymentMethod = PaymentMethod::Ipaymu;

/// Credentials for one iPaymu merchant account.
#[derive(Clone)]
pub struct IpaymuCredentials {
    /// Virtual account number; also the `account` of status queries.
    pub va: String,
    /// API key used as the HMAC secret.
    pub secret: String,
    pub base_url: String,
}

impl std::fmt::Debug for IpaymuCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpaymuCredentials")
            .field("va", &self.va)
            .field("secret", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// iPaymu API client.
#[derive(Debug, Clone)]
pub struct IpaymuClient {
    http: reqwest::Client,
    credentials: IpaymuCredentials,
}

impl IpaymuClient {
    pub fn new(http: reqwest::Client, credentials: IpaymuCredentials) -> Self {
        IpaymuClient { http, credentials }
    }

    /// Signs and POSTs `body`, returning the envelope's `Data`.
    async fn call(&self, endpoint: &str, body: &Value) -> GatewayResult<Value> {
        let url = format!("{}{}", self.credentials.base_url.trim_end_matches('/'), endpoint);
        let payload = serde_json::to_string(body)
            .map_err(|e| GatewayError::call_failed(PROVIDER, format!("encoding request: {e}")))?;

        let signature = ipaymu_signature("POST", &self.credentials.va, &payload, &self.credentials.secret)
            .ok_or_else(|| GatewayError::not_configured(PROVIDER, "unusable secret key"))?;
        let timestamp = Utc::now().format("%Y%m%d%H%M%S").to_string();

        debug!(endpoint, "iPaymu request");

        let response = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .header("signature", signature)
            .header("va", &self.credentials.va)
            .header("timestamp", timestamp)
            .body(payload)
            .send()
            .await
            .map_err(|e| GatewayError::call_failed(PROVIDER, e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::call_failed(PROVIDER, e.to_string()))?;

        if !status.is_success() {
            warn!(endpoint, http_status = status.as_u16(), "iPaymu returned an error status");
            return Err(GatewayError::call_failed(
                PROVIDER,
                format!("{endpoint}: HTTP {} {}", status.as_u16(), truncate(&text)),
            ));
        }

        let envelope: Value = serde_json::from_str(&text)
            .map_err(|e| GatewayError::invalid_response(PROVIDER, format!("{endpoint}: {e}")))?;
        unwrap_envelope(endpoint, envelope)
    }
}

#[async_trait]
impl GatewayClient for IpaymuClient {
    fn provider(&self) -> PaymentMethod {
        PROVIDER
    }

    async fn initiate(&self, request: &InitiateRequest) -> GatewayResult<InitiateResponse> {
        let data = self.call("/payment", &payment_body(request)).await?;

        Ok(InitiateResponse {
            transaction_id: data.get("TransactionId").and_then(id_text),
            session_id: data.get("SessionID").and_then(id_text),
            redirect_url: data.get("Url").and_then(Value::as_str).map(str::to_string),
            raw: data,
        })
    }

    async fn query_status(&self, transaction_id: &str) -> GatewayResult<StatusReport> {
        let body = json!({
            "transactionId": transaction_id,
            "account": self.credentials.va,
        });
        let data = self.call("/transaction", &body).await?;
        parse_status(transaction_id, data)
    }

    async fn history_page(&self, page: u32) -> GatewayResult<HistoryPage> {
        let body = json!({
            "orderBy": "id",
            "order": "DESC",
            "limit": HISTORY_PAGE_SIZE.to_string(),
            "page": page.to_string(),
        });
        let data = self.call("/history", &body).await?;
        Ok(parse_history(&data))
    }

    fn map_status(&self, status_text: &str) -> Option<GatewayStatus> {
        map_ipaymu_status(status_text)
    }

    async fn refund(&self, transaction_id: &str, amount: Money) -> GatewayResult<Value> {
        self.call("/refund", &refund_body(transaction_id, amount)).await
    }
}

// =============================================================================
// Wire Helpers
// =============================================================================

/// `Berhasil` / `Gagal` / `Pending`, compared trimmed and case-insensitively.
pub fn map_ipaymu_status(status_text: &str) -> Option<GatewayStatus> {
    match status_text.trim().to_lowercase().as_str() {
        "berhasil" => Some(GatewayStatus::Success),
        "gagal" => Some(GatewayStatus::Failed),
        "pending" => Some(GatewayStatus::Pending),
        _ => None,
    }
}

fn payment_body(request: &InitiateRequest) -> Value {
    let names: Vec<&str> = request.items.iter().map(|i| i.name.as_str()).collect();
    let quantities: Vec<i64> = request.items.iter().map(|i| i.quantity).collect();
    let prices: Vec<Value> = request.items.iter().map(|i| amount_json(i.unit_price)).collect();

    json!({
        "product": names,
        "qty": quantities,
        "price": prices,
        "returnUrl": request.return_url,
        "cancelUrl": request.cancel_url,
        "notifyUrl": request.notify_url,
        "referenceId": request.reference_id,
        "buyerName": request.buyer.name,
        "buyerEmail": request.buyer.email,
        "buyerPhone": request.buyer.phone,
        "comments": "Pembayaran pesanan POS",
    })
}

fn refund_body(transaction_id: &str, amount: Money) -> Value {
    json!({
        "transactionId": transaction_id,
        "amount": amount_json(amount),
    })
}

/// Whole amounts go out as integers, fractional ones as decimal strings.
fn amount_json(amount: Money) -> Value {
    if amount.minor_part() == 0 {
        Value::from(amount.major())
    } else {
        Value::from(amount.to_decimal_string())
    }
}

fn unwrap_envelope(endpoint: &str, envelope: Value) -> GatewayResult<Value> {
    let status = envelope.get("Status").and_then(Value::as_i64).unwrap_or(200);
    let success = envelope.get("Success").and_then(Value::as_bool).unwrap_or(true);

    if status != 200 || !success {
        let message = envelope
            .get("Message")
            .and_then(Value::as_str)
            .unwrap_or("no message");
        return Err(GatewayError::call_failed(
            PROVIDER,
            format!("{endpoint}: status {status}: {message}"),
        ));
    }

    match envelope.get("Data") {
        Some(data) if !data.is_null() => Ok(data.clone()),
        _ => Err(GatewayError::invalid_response(PROVIDER, format!("{endpoint}: missing Data"))),
    }
}

fn parse_status(transaction_id: &str, data: Value) -> GatewayResult<StatusReport> {
    let status_text = data
        .get("StatusDesc")
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::invalid_response(PROVIDER, "/transaction: missing StatusDesc"))?
        .to_string();

    Ok(StatusReport {
        transaction_id: data
            .get("TransactionId")
            .and_then(id_text)
            .unwrap_or_else(|| transaction_id.to_string()),
        reference_id: data.get("ReferenceId").and_then(id_text),
        status_text,
        amount: data.get("Amount").and_then(Money::from_json),
        raw: data,
    })
}

fn parse_history(data: &Value) -> HistoryPage {
    let entries = data
        .get("Transaction")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| {
                    Some(HistoryEntry {
                        transaction_id: row.get("TransactionId").and_then(id_text)?,
                        reference_id: row.get("ReferenceId").and_then(id_text),
                        status_text: row.get("StatusDesc").and_then(Value::as_str).map(str::to_string),
                        amount: row.get("Amount").and_then(Money::from_json),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let total_pages = data
        .get("Pagination")
        .and_then(|p| p.get("total_pages"))
        .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
        .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
        .unwrap_or(1);

    HistoryPage {
        entries,
        total_pages,
    }
}

/// Identifier that may be a JSON number or string.
fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn truncate(text: &str) -> &str {
    match text.char_indices().nth(200) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
