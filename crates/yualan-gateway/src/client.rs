//! # Gateway Client Contract
//!
//! One trait for every provider. The reconciliation engine and the webhook
//! path are written once against it.
//!
//! ## History Search
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  search_history("sale-1", max_pages = 5)                                │
//! │                                                                         │
//! │  page 1 ─► no match ─► page 2 ─► match "sale-1" ─► Some(entry)          │
//! │                                                                         │
//! │  Stops at: first match │ page >= total_pages │ empty page │ max_pages   │
//! │  A provider with a direct lookup overrides the walk (Midtrans).         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use yualan_core::{GatewayStatus, Money, PaymentMethod};

use crate::error::{GatewayError, GatewayResult};
use crate::notification::NotificationPayload;

// =============================================================================
// Request / Response Types
// =============================================================================

/// A line on the gateway's payment page.
#[derive(Debug, Clone, Serialize)]
pub struct ItemLine {
    pub name: String,
    pub quantity: i64,
    pub unit_price: Money,
}

/// Who pays.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Buyer {
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// Everything a provider needs to open a payment page.
#[derive(Debug, Clone, Serialize)]
pub struct InitiateRequest {
    pub items: Vec<ItemLine>,
    /// Merchant reference; the sale id.
    pub reference_id: String,
    pub amount: Money,
    pub buyer: Buyer,
    pub return_url: String,
    pub cancel_url: String,
    pub notify_url: String,
}

/// What a provider answered to an initiation.
#[derive(Debug, Clone)]
pub struct InitiateResponse {
    /// Present when the provider assigns a transaction id up front.
    pub transaction_id: Option<String>,
    pub session_id: Option<String>,
    pub redirect_url: Option<String>,
    pub raw: serde_json::Value,
}

/// Result of a status query.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub transaction_id: String,
    /// Merchant reference the gateway holds for this transaction.
    pub reference_id: Option<String>,
    /// Provider vocabulary, unmapped.
    pub status_text: String,
    pub amount: Option<Money>,
    pub raw: serde_json::Value,
}

/// One row of a provider's transaction history.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub transaction_id: String,
    pub reference_id: Option<String>,
    pub status_text: Option<String>,
    pub amount: Option<Money>,
}

/// One page of transaction history, newest first.
#[derive(Debug, Clone, Default)]
pub struct HistoryPage {
    pub entries: Vec<HistoryEntry>,
    pub total_pages: u32,
}

// =============================================================================
// Gateway Client Trait
// =============================================================================

/// A payment provider.
///
/// ## Errors
/// Network failures, timeouts and non-2xx answers surface as
/// [`GatewayError::CallFailed`]; provider error codes are not interpreted.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Which provider this client talks to.
    fn provider(&self) -> PaymentMethod;

    /// Opens a payment page.
    async fn initiate(&self, request: &InitiateRequest) -> GatewayResult<InitiateResponse>;

    /// Queries the status of a transaction by the provider's id.
    async fn query_status(&self, transaction_id: &str) -> GatewayResult<StatusReport>;

    /// Fetches one page (1-based) of transaction history.
    async fn history_page(&self, page: u32) -> GatewayResult<HistoryPage>;

    /// Finds the transaction whose merchant reference equals `reference_id`.
    ///
    /// Walks [`GatewayClient::history_page`] from page 1 and never requests
    /// more than `max_pages` pages.
    async fn search_history(
        &self,
        reference_id: &str,
        max_pages: u32,
    ) -> GatewayResult<Option<HistoryEntry>> {
        for page in 1..=max_pages {
            let history = self.history_page(page).await?;

            if let Some(entry) = history
                .entries
                .iter()
                .find(|e| e.reference_id.as_deref() == Some(reference_id))
            {
                debug!(
                    provider = %self.provider(),
                    reference_id,
                    transaction_id = %entry.transaction_id,
                    page,
                    "Transaction found in history"
                );
                return Ok(Some(entry.clone()));
            }

            if history.entries.is_empty() || page >= history.total_pages {
                break;
            }
        }

        debug!(provider = %self.provider(), reference_id, max_pages, "Transaction not found in history");
        Ok(None)
    }

    /// Maps the provider's status text onto the internal tri-state.
    ///
    /// `None` for anything outside the known vocabulary.
    fn map_status(&self, status_text: &str) -> Option<GatewayStatus>;

    /// Checks a push notification's signature, where the provider signs them.
    fn verify_notification(&self, _payload: &NotificationPayload) -> bool {
        true
    }

    /// Refunds a settled transaction. Operator passthrough.
    async fn refund(&self, _transaction_id: &str, _amount: Money) -> GatewayResult<serde_json::Value> {
        Err(GatewayError::Unsupported {
            provider: self.provider(),
            operation: "refund",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// History of `pages` pages; the reference sits on `match_page`, if any.
    struct PagedHistory {
        pages: u32,
        match_page: Option<u32>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl GatewayClient for PagedHistory {
        fn provider(&self) -> PaymentMethod {
            PaymentMethod::Ipaymu
        }

        async fn initiate(&self, _request: &InitiateRequest) -> GatewayResult<InitiateResponse> {
            unimplemented!()
        }

        async fn query_status(&self, _transaction_id: &str) -> GatewayResult<StatusReport> {
            unimplemented!()
        }

        async fn history_page(&self, page: u32) -> GatewayResult<HistoryPage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reference = if self.match_page == Some(page) { "wanted" } else { "other" };
            Ok(HistoryPage {
                entries: vec![HistoryEntry {
                    transaction_id: format!("T{page}"),
                    reference_id: Some(reference.to_string()),
                    status_text: None,
                    amount: None,
                }],
                total_pages: self.pages,
            })
        }

        fn map_status(&self, _status_text: &str) -> Option<GatewayStatus> {
            None
        }
    }

    fn history(pages: u32, match_page: Option<u32>) -> PagedHistory {
        PagedHistory {
            pages,
            match_page,
            calls: AtomicU32::new(0),
        }
    }

    #[tokio::test]
    async fn test_search_stops_at_first_match() {
        let client = history(10, Some(2));
        let found = client.search_history("wanted", 5).await.unwrap().unwrap();
        assert_eq!(found.transaction_id, "T2");
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_search_respects_page_cap() {
        let client = history(1_000, None);
        assert!(client.search_history("wanted", 5).await.unwrap().is_none());
        assert_eq!(client.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_search_stops_at_last_page() {
        let client = history(2, None);
        assert!(client.search_history("wanted", 5).await.unwrap().is_none());
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_refund_unsupported_by_default() {
        let err = history(1, None).refund("T1", Money::from_major(1)).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unsupported { operation: "refund", .. }));
    }
}
