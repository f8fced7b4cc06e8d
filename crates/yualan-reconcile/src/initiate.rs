//! # Payment Initiation
//!
//! Opens a gateway payment page for a sale and logs the attempt that the
//! reconcilers later settle. A failed or cancelled sale can be paid again:
//! initiation moves it back to `pending`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};
use yualan_core::validation::validate_sale_totals;
use yualan_core::{CoreError, OrderStateMachine, Payment, PaymentMethod, Sale};
use yualan_db::{Database, SaleRepository, TenantRepository};
use yualan_gateway::{Buyer, GatewayFactory, InitiateRequest, InitiateResponse, ItemLine};

use crate::config::ServerSettings;
use crate::error::{ReconcileError, ReconcileResult};
use crate::payments::{NewAttempt, PaymentRecordManager};

/// A payment page ready for the customer.
#[derive(Debug, Clone)]
pub struct InitiatedPayment {
    pub payment: Payment,
    pub redirect_url: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Clone)]
pub struct PaymentInitiator {
    db: Database,
    gateways: Arc<dyn GatewayFactory>,
    server: ServerSettings,
    currency: String,
    call_timeout: Duration,
}

impl PaymentInitiator {
    pub fn new(
        db: Database,
        gateways: Arc<dyn GatewayFactory>,
        server: ServerSettings,
        currency: impl Into<String>,
        call_timeout: Duration,
    ) -> Self {
        PaymentInitiator {
            db,
            gateways,
            server,
            currency: currency.into(),
            call_timeout,
        }
    }

    /// Opens a payment on the sale's gateway.
    ///
    /// The gateway call happens before any write. On success the sale is
    /// reopened as `pending` and a pending attempt is logged in one
    /// transaction.
    ///
    /// ## Errors
    /// - `NotFound` for a missing sale or tenant
    /// - `InvalidTransition` for a completed sale, a cash sale or bad totals
    /// - `GatewayUnavailable` when the gateway refuses or times out
    pub async fn initiate(&self, sale_id: &str, buyer: Buyer) -> ReconcileResult<InitiatedPayment> {
        let sale = SaleRepository::get_by_id(self.db.pool(), sale_id)
            .await?
            .ok_or_else(|| ReconcileError::not_found("Sale", sale_id))?;

        OrderStateMachine::ensure_can_reinitiate(&sale.id, sale.status)?;
        let method = sale.payment_method;
        if !method.is_gateway() {
            return Err(CoreError::NotGatewayPayment {
                sale_id: sale.id.clone(),
                method: method.to_string(),
            }
            .into());
        }
        validate_sale_totals(&sale).map_err(CoreError::from)?;

        let tenant = TenantRepository::get_by_id(self.db.pool(), &sale.tenant_id)
            .await?
            .ok_or_else(|| ReconcileError::not_found("Tenant", sale.tenant_id.clone()))?;
        let client = self.gateways.client_for(&tenant, method)?;

        let request = self.build_request(&sale, buyer).await?;
        let response = match tokio::time::timeout(self.call_timeout, client.initiate(&request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(sale_id = %sale.id, invoice = %sale.invoice_number, provider = %method, error = %e, "Payment initiation failed");
                return Err(e.into());
            }
            Err(_) => {
                warn!(sale_id = %sale.id, invoice = %sale.invoice_number, provider = %method, "Payment initiation timed out");
                return Err(ReconcileError::timed_out(method, "initiation", self.call_timeout));
            }
        };

        let payment = self.record(&sale, method, &response).await?;

        info!(
            sale_id = %sale.id,
            invoice = %sale.invoice_number,
            provider = %method,
            payment_id = %payment.id,
            transaction_id = ?payment.transaction_id,
            "Payment initiated"
        );

        Ok(InitiatedPayment {
            payment,
            redirect_url: response.redirect_url,
            session_id: response.session_id,
        })
    }

    async fn build_request(&self, sale: &Sale, buyer: Buyer) -> ReconcileResult<InitiateRequest> {
        let items = SaleRepository::get_items(self.db.pool(), &sale.id).await?;

        Ok(InitiateRequest {
            items: items
                .iter()
                .map(|item| ItemLine {
                    name: item.name_snapshot.clone(),
                    quantity: item.quantity,
                    unit_price: item.unit_price(),
                })
                .collect(),
            reference_id: sale.id.clone(),
            amount: sale.total(),
            buyer,
            return_url: self.server.return_url(&sale.id),
            cancel_url: self.server.cancel_url(&sale.id),
            notify_url: self.server.notify_url(sale.payment_method),
        })
    }

    async fn record(
        &self,
        sale: &Sale,
        method: PaymentMethod,
        response: &InitiateResponse,
    ) -> ReconcileResult<Payment> {
        let now = Utc::now();
        let raw = serde_json::to_string(&response.raw).ok();
        let mut tx = self.db.begin().await?;

        // The sale may have been paid while the gateway call was in flight.
        SaleRepository::lock_for_update(&mut *tx, &sale.id).await?;
        let current = SaleRepository::get_by_id(&mut *tx, &sale.id)
            .await?
            .ok_or_else(|| ReconcileError::not_found("Sale", sale.id.clone()))?;
        OrderStateMachine::ensure_can_reinitiate(&current.id, current.status)?;

        let note = format!("Waiting for payment via {}", method.display_name());
        SaleRepository::reopen_pending(&mut *tx, &sale.id, method, &note, now).await?;

        let payment = PaymentRecordManager::record_attempt(
            &mut *tx,
            &current,
            NewAttempt {
                method,
                amount: current.total(),
                currency: &self.currency,
                transaction_id: response.transaction_id.as_deref(),
                reference_id: &current.id,
                raw_response: raw.as_deref(),
                notes: "payment initiated",
            },
            now,
        )
        .await?;

        tx.commit().await?;
        Ok(payment)
    }
}
