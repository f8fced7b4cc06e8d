//! # Operator Refunds
//!
//! Passes a refund for a completed sale through to its gateway. The sale
//! and its attempts are not touched; the gateway's answer is returned as is.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use yualan_core::{AttemptStatus, CoreError, Money, SaleStatus};
use yualan_db::{Database, PaymentRepository, SaleRepository, TenantRepository};
use yualan_gateway::GatewayFactory;

use crate::error::{ReconcileError, ReconcileResult};

/// What was sent to the gateway and what it answered.
#[derive(Debug, Clone)]
pub struct RefundReceipt {
    pub sale_id: String,
    pub transaction_id: String,
    pub amount: Money,
    pub response: serde_json::Value,
}

#[derive(Clone)]
pub struct PaymentRefunder {
    db: Database,
    gateways: Arc<dyn GatewayFactory>,
    call_timeout: Duration,
}

impl PaymentRefunder {
    pub fn new(db: Database, gateways: Arc<dyn GatewayFactory>, call_timeout: Duration) -> Self {
        PaymentRefunder {
            db,
            gateways,
            call_timeout,
        }
    }

    /// Refunds `amount` (the settled attempt's amount when `None`) of a
    /// completed sale.
    ///
    /// ## Errors
    /// - `NotFound` for a missing sale, tenant or settled attempt
    /// - `InvalidTransition` when the sale is not completed or the amount is
    ///   not within the settled amount
    /// - `GatewayUnavailable` when the gateway refuses, times out or does not
    ///   offer refunds
    pub async fn refund(&self, sale_id: &str, amount: Option<Money>) -> ReconcileResult<RefundReceipt> {
        let sale = SaleRepository::get_by_id(self.db.pool(), sale_id)
            .await?
            .ok_or_else(|| ReconcileError::not_found("Sale", sale_id))?;

        if sale.status != SaleStatus::Completed {
            return Err(CoreError::InvalidSaleStatus {
                sale_id: sale.id.clone(),
                current_status: sale.status,
                operation: "refund",
            }
            .into());
        }

        let settled = PaymentRepository::list_for_sale(self.db.pool(), &sale.id)
            .await?
            .into_iter()
            .filter(|p| p.payment_method == sale.payment_method && p.status == AttemptStatus::Completed)
            .filter_map(|p| p.transaction_id.clone().map(|trx| (trx, p)))
            .last()
            .ok_or_else(|| ReconcileError::not_found("Payment", sale.id.clone()))?;
        let (transaction_id, attempt) = settled;

        let amount = amount.unwrap_or_else(|| attempt.amount());
        if !amount.is_positive() || amount > attempt.amount() {
            return Err(CoreError::InvalidPaymentAmount {
                reason: format!("refund {amount} outside settled {}", attempt.amount()),
            }
            .into());
        }

        let tenant = TenantRepository::get_by_id(self.db.pool(), &sale.tenant_id)
            .await?
            .ok_or_else(|| ReconcileError::not_found("Tenant", sale.tenant_id.clone()))?;
        let client = self.gateways.client_for(&tenant, sale.payment_method)?;

        let response = match tokio::time::timeout(self.call_timeout, client.refund(&transaction_id, amount)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(sale_id = %sale.id, transaction_id = %transaction_id, error = %e, "Refund refused");
                return Err(e.into());
            }
            Err(_) => {
                return Err(ReconcileError::timed_out(sale.payment_method, "refund", self.call_timeout));
            }
        };

        info!(
            sale_id = %sale.id,
            invoice = %sale.invoice_number,
            transaction_id = %transaction_id,
            amount = %amount,
            "Refund passed to gateway"
        );

        Ok(RefundReceipt {
            sale_id: sale.id,
            transaction_id,
            amount,
            response,
        })
    }
}
