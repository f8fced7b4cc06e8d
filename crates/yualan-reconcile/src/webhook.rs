//! # Webhook Ingestor
//!
//! Turns a gateway push notification into a status query and a
//! reconciliation. The notification only says *which* sale to look at; its
//! status and amount are logged and then ignored in favour of the gateway's
//! answer to a fresh query.
//!
//! ## Acknowledgement Policy
//! ```text
//! parseable payload ──▶ ingest() ──▶ WebhookAck (always HTTP 200)
//!                          │
//!                          ├─ sale missing ............ NotFound
//!                          ├─ wrong provider / bad sig  Rejected
//!                          ├─ foreign transaction id .. Rejected
//!                          ├─ sale completed/cancelled  Ignored (no gateway call)
//!                          ├─ gateway down, no trx id . Deferred (scheduler retries)
//!                          ├─ unknown status text ..... Unrecognized
//!                          └─ reconciled .............. Applied / Ignored
//! ```

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};
use ts_rs::TS;
use yualan_core::{CancelDecision, OrderStateMachine, SaleStatus, TriggerOrigin};
use yualan_db::{Database, SaleRepository};
use yualan_gateway::{GatewayFactory, NotificationPayload};

use crate::engine::{EngineSettings, ReconciliationEngine};
use crate::error::{ReconcileError, ReconcileResult};
use crate::reconciler::ReconcileOutcome;

const CANCELLED_NOTE: &str = "Payment cancelled by user";

/// What the ingestor did with a notification. Serialized as the webhook's
/// response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookAck {
    /// The sale's status or attempt changed.
    Applied { sale_id: String, status: SaleStatus },
    /// Nothing to do: the sale is terminal or the gateway still reports the
    /// state we already hold.
    Ignored { sale_id: String, status: SaleStatus },
    NotFound { reference_id: String },
    Rejected { reason: String },
    Unrecognized { status_text: String },
    /// Could not be processed now; the scheduled batches will pick it up.
    Deferred { reason: String },
}

/// Handles push notifications and cancel callbacks.
#[derive(Clone)]
pub struct WebhookIngestor {
    db: Database,
    gateways: Arc<dyn GatewayFactory>,
    settings: EngineSettings,
}

impl WebhookIngestor {
    pub fn new(db: Database, gateways: Arc<dyn GatewayFactory>, settings: EngineSettings) -> Self {
        WebhookIngestor {
            db,
            gateways,
            settings,
        }
    }

    /// Processes one notification. Never fails.
    pub async fn ingest(&self, payload: NotificationPayload) -> WebhookAck {
        let reference_id = payload.reference_id.clone();
        info!(
            provider = %payload.provider,
            reference_id = %reference_id,
            transaction_id = ?payload.transaction_id,
            reported_status = ?payload.reported_status,
            reported_amount = ?payload.reported_amount,
            "Payment notification received"
        );

        let sale = match SaleRepository::get_by_id(self.db.pool(), &reference_id).await {
            Ok(Some(sale)) => sale,
            Ok(None) => {
                warn!(reference_id = %reference_id, provider = %payload.provider, "Notification for unknown sale");
                return WebhookAck::NotFound { reference_id };
            }
            Err(e) => return self.deferred(&reference_id, e.into()),
        };

        if sale.payment_method != payload.provider {
            warn!(
                sale_id = %sale.id,
                invoice = %sale.invoice_number,
                expected = %sale.payment_method,
                provider = %payload.provider,
                "Notification from a provider the sale does not use"
            );
            return WebhookAck::Rejected {
                reason: format!("sale {} is not paid via {}", sale.id, payload.provider),
            };
        }

        if sale.status.is_terminal() {
            debug!(sale_id = %sale.id, status = %sale.status, "Notification for a settled sale");
            return WebhookAck::Ignored {
                sale_id: sale.id,
                status: sale.status,
            };
        }

        let engine = ReconciliationEngine::new(
            self.db.clone(),
            self.gateways.clone(),
            payload.provider,
            self.settings.clone(),
        )
        .with_origin(TriggerOrigin::Webhook);

        let client = match engine.client_for(&sale).await {
            Ok(client) => client,
            Err(e) => return self.deferred(&sale.id, e),
        };

        if !client.verify_notification(&payload) {
            warn!(sale_id = %sale.id, provider = %payload.provider, "Notification signature mismatch");
            return WebhookAck::Rejected {
                reason: "signature mismatch".to_string(),
            };
        }

        match engine.observe(client.as_ref(), &sale, payload.transaction_id).await {
            Ok(result) if result.outcome == ReconcileOutcome::Ignored => WebhookAck::Ignored {
                sale_id: sale.id,
                status: result.current,
            },
            Ok(result) => {
                info!(
                    sale_id = %sale.id,
                    invoice = %sale.invoice_number,
                    origin = %TriggerOrigin::Webhook,
                    outcome = ?result.outcome,
                    "Notification applied"
                );
                WebhookAck::Applied {
                    sale_id: sale.id,
                    status: result.current,
                }
            }
            Err(e @ ReconcileError::CorrelationMismatch { .. }) => WebhookAck::Rejected {
                reason: e.to_string(),
            },
            Err(ReconcileError::UnrecognizedStatus { status_text, .. }) => {
                WebhookAck::Unrecognized { status_text }
            }
            Err(ReconcileError::NotFound { entity: "Sale", .. }) => WebhookAck::NotFound { reference_id },
            Err(e) => self.deferred(&sale.id, e),
        }
    }

    /// Cancels an unpaid sale from the gateway's cancel callback.
    ///
    /// Completed sales are refused and cancelled ones left alone; neither is
    /// an error.
    pub async fn cancel(&self, sale_id: &str) -> ReconcileResult<CancelDecision> {
        let mut tx = self.db.begin().await?;

        SaleRepository::lock_for_update(&mut *tx, sale_id).await?;
        let sale = SaleRepository::get_by_id(&mut *tx, sale_id)
            .await?
            .ok_or_else(|| ReconcileError::not_found("Sale", sale_id))?;

        let decision = OrderStateMachine::on_cancel_request(sale.status);
        match decision {
            CancelDecision::Cancel => {
                SaleRepository::cancel(&mut *tx, sale_id, CANCELLED_NOTE, Utc::now()).await?;
                tx.commit().await?;
                info!(sale_id, invoice = %sale.invoice_number, previous = %sale.status, "Sale cancelled");
            }
            CancelDecision::AlreadyCancelled | CancelDecision::RefusedCompleted => {
                tx.rollback().await?;
                debug!(sale_id, status = %sale.status, decision = ?decision, "Cancel request ignored");
            }
        }

        Ok(decision)
    }

    fn deferred(&self, sale_id: &str, error: ReconcileError) -> WebhookAck {
        if error.is_skippable() {
            debug!(sale_id, reason = %error, "Notification deferred to the scheduler");
        } else {
            warn!(sale_id, error = %error, "Notification deferred to the scheduler");
        }
        WebhookAck::Deferred {
            reason: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        ipaymu_notification, seed_sale, setup_db, SaleFixture, StubFactory, StubGateway,
    };
    use std::time::Duration;
    use yualan_core::{AttemptStatus, Money, PaymentMethod};
    use yualan_db::{InventoryRepository, PaymentRepository};

    fn ingestor(db: &Database, stub: &Arc<StubGateway>) -> WebhookIngestor {
        WebhookIngestor::new(
            db.clone(),
            Arc::new(StubFactory::new(stub.clone())),
            EngineSettings {
                call_timeout: Duration::from_millis(200),
                history_max_pages: 5,
            },
        )
    }

    #[tokio::test]
    async fn test_requeries_instead_of_trusting_payload() {
        let db = setup_db().await;
        seed_sale(&db, SaleFixture::new("sale-1", SaleStatus::Pending).with_attempt(Some("T1"))).await;
        let stub = StubGateway::ipaymu();
        stub.script_status("T1", "Berhasil", Some(Money::from_major(10_000)));

        // The payload claims failure; the gateway says paid.
        let ack = ingestor(&db, &stub)
            .ingest(ipaymu_notification("sale-1", Some("T1"), "gagal"))
            .await;

        assert_eq!(
            ack,
            WebhookAck::Applied {
                sale_id: "sale-1".to_string(),
                status: SaleStatus::Completed
            }
        );
        assert_eq!(stub.status_calls(), 1);

        let sale = SaleRepository::get_by_id(db.pool(), "sale-1").await.unwrap().unwrap();
        assert_eq!(sale.paid_cents, 1_000_000);
        assert!(sale.notes.unwrap().contains("webhook"));
    }

    #[tokio::test]
    async fn test_duplicate_webhook_for_completed_sale() {
        let db = setup_db().await;
        seed_sale(&db, SaleFixture::new("sale-1", SaleStatus::Pending).with_attempt(Some("T1"))).await;
        let stub = StubGateway::ipaymu();
        stub.script_status("T1", "Berhasil", Some(Money::from_major(10_000)));
        let ingestor = ingestor(&db, &stub);

        let first = ingestor.ingest(ipaymu_notification("sale-1", Some("T1"), "berhasil")).await;
        assert!(matches!(first, WebhookAck::Applied { .. }));

        let attempt_before = PaymentRepository::latest_for_sale(db.pool(), "sale-1", PaymentMethod::Ipaymu)
            .await
            .unwrap()
            .unwrap();

        for _ in 0..2 {
            let ack = ingestor.ingest(ipaymu_notification("sale-1", Some("T1"), "berhasil")).await;
            assert_eq!(
                ack,
                WebhookAck::Ignored {
                    sale_id: "sale-1".to_string(),
                    status: SaleStatus::Completed
                }
            );
        }
        assert_eq!(stub.status_calls(), 1);

        let sale = SaleRepository::get_by_id(db.pool(), "sale-1").await.unwrap().unwrap();
        assert_eq!(sale.paid_cents, 1_000_000);
        assert_eq!(sale.change_cents, 0);

        let attempt_after = PaymentRepository::latest_for_sale(db.pool(), "sale-1", PaymentMethod::Ipaymu)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(attempt_after.amount_cents, attempt_before.amount_cents);
        assert_eq!(attempt_after.status, AttemptStatus::Completed);

        let movements = InventoryRepository::list_for_sale(db.pool(), "sale-1").await.unwrap();
        assert_eq!(movements.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_sale_is_acknowledged() {
        let db = setup_db().await;
        let stub = StubGateway::ipaymu();

        let ack = ingestor(&db, &stub)
            .ingest(ipaymu_notification("missing", Some("T1"), "berhasil"))
            .await;

        assert_eq!(
            ack,
            WebhookAck::NotFound {
                reference_id: "missing".to_string()
            }
        );
        assert_eq!(stub.status_calls(), 0);
    }

    #[tokio::test]
    async fn test_provider_mismatch_and_bad_signature() {
        let db = setup_db().await;
        seed_sale(
            &db,
            SaleFixture::new("sale-m", SaleStatus::Pending).method(PaymentMethod::Midtrans),
        )
        .await;
        seed_sale(&db, SaleFixture::new("sale-1", SaleStatus::Pending).with_attempt(Some("T1"))).await;
        let stub = StubGateway::ipaymu();
        let ingestor = ingestor(&db, &stub);

        let ack = ingestor.ingest(ipaymu_notification("sale-m", None, "berhasil")).await;
        assert!(matches!(ack, WebhookAck::Rejected { .. }));

        stub.reject_signatures();
        let ack = ingestor.ingest(ipaymu_notification("sale-1", Some("T1"), "berhasil")).await;
        assert_eq!(
            ack,
            WebhookAck::Rejected {
                reason: "signature mismatch".to_string()
            }
        );
        assert_eq!(stub.status_calls(), 0);
    }

    #[tokio::test]
    async fn test_falls_back_to_attempt_and_history() {
        let db = setup_db().await;
        seed_sale(&db, SaleFixture::new("sale-1", SaleStatus::Pending).with_attempt(Some("T1"))).await;
        seed_sale(&db, SaleFixture::new("sale-2", SaleStatus::Pending).with_attempt(None)).await;
        let stub = StubGateway::ipaymu();
        stub.script_status("T1", "Pending", None);
        stub.script_status("T9", "Gagal", None);
        stub.script_history(3, Some((2, "sale-2", "T9")));
        let ingestor = ingestor(&db, &stub);

        let ack = ingestor.ingest(ipaymu_notification("sale-1", None, "pending")).await;
        assert_eq!(
            ack,
            WebhookAck::Applied {
                sale_id: "sale-1".to_string(),
                status: SaleStatus::Pending
            }
        );

        let ack = ingestor.ingest(ipaymu_notification("sale-2", None, "gagal")).await;
        assert_eq!(
            ack,
            WebhookAck::Applied {
                sale_id: "sale-2".to_string(),
                status: SaleStatus::Failed
            }
        );
        assert_eq!(stub.history_calls(), 2);
    }

    #[tokio::test]
    async fn test_gateway_trouble_defers() {
        let db = setup_db().await;
        seed_sale(&db, SaleFixture::new("sale-1", SaleStatus::Pending).with_attempt(Some("T1"))).await;
        seed_sale(&db, SaleFixture::new("sale-2", SaleStatus::Pending).with_attempt(Some("T2"))).await;
        seed_sale(&db, SaleFixture::new("sale-3", SaleStatus::Pending).with_attempt(Some("T3"))).await;
        let stub = StubGateway::ipaymu();
        stub.fail_status("T1", "HTTP 502");
        stub.hang_status("T2");
        stub.script_status("T3", "Diproses Ulang", None);
        let ingestor = ingestor(&db, &stub);

        let ack = ingestor.ingest(ipaymu_notification("sale-1", Some("T1"), "berhasil")).await;
        assert!(matches!(ack, WebhookAck::Deferred { .. }));

        let ack = ingestor.ingest(ipaymu_notification("sale-2", Some("T2"), "berhasil")).await;
        match ack {
            WebhookAck::Deferred { reason } => assert!(reason.contains("timed out")),
            other => panic!("expected Deferred, got {other:?}"),
        }

        let ack = ingestor.ingest(ipaymu_notification("sale-3", Some("T3"), "berhasil")).await;
        assert_eq!(
            ack,
            WebhookAck::Unrecognized {
                status_text: "Diproses Ulang".to_string()
            }
        );

        for id in ["sale-1", "sale-2", "sale-3"] {
            let status = SaleRepository::status_of(db.pool(), id).await.unwrap();
            assert_eq!(status, Some(SaleStatus::Pending));
        }
    }

    #[tokio::test]
    async fn test_foreign_transaction_id_is_rejected() {
        let db = setup_db().await;
        seed_sale(&db, SaleFixture::new("sale-1", SaleStatus::Pending).with_attempt(Some("T1"))).await;
        let stub = StubGateway::ipaymu();
        stub.script_status("T1", "Pending", None);
        stub.script_status("FOREIGN", "Berhasil", Some(Money::from_major(1)));
        stub.script_reference("FOREIGN", "other-sale");
        stub.script_status("BARE", "Berhasil", Some(Money::from_major(10_000)));
        let ingestor = ingestor(&db, &stub);

        let ack = ingestor.ingest(ipaymu_notification("sale-1", Some("FOREIGN"), "berhasil")).await;
        assert!(matches!(ack, WebhookAck::Rejected { ref reason } if reason.contains("FOREIGN")));

        // No reference in the gateway's answer is no proof either.
        let ack = ingestor.ingest(ipaymu_notification("sale-1", Some("BARE"), "berhasil")).await;
        assert!(matches!(ack, WebhookAck::Rejected { .. }));

        let sale = SaleRepository::get_by_id(db.pool(), "sale-1").await.unwrap().unwrap();
        assert_eq!(sale.status, SaleStatus::Pending);
        assert_eq!(sale.paid_cents, 0);
        assert_eq!(sale.change_cents, 0);
        assert_eq!(PaymentRepository::list_for_sale(db.pool(), "sale-1").await.unwrap().len(), 1);
        assert!(PaymentRepository::find_by_transaction(db.pool(), "FOREIGN").await.unwrap().is_none());
        assert!(InventoryRepository::list_for_sale(db.pool(), "sale-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_new_transaction_id_accepted_under_sale_reference() {
        let db = setup_db().await;
        seed_sale(&db, SaleFixture::new("sale-1", SaleStatus::Pending).with_attempt(None)).await;
        let stub = StubGateway::ipaymu();
        stub.script_status("T7", "Berhasil", Some(Money::from_major(10_000)));
        stub.script_reference("T7", "sale-1");

        let ack = ingestor(&db, &stub)
            .ingest(ipaymu_notification("sale-1", Some("T7"), "berhasil"))
            .await;

        assert_eq!(
            ack,
            WebhookAck::Applied {
                sale_id: "sale-1".to_string(),
                status: SaleStatus::Completed
            }
        );
        assert_eq!(stub.history_calls(), 0);

        let attempt = PaymentRepository::latest_for_sale(db.pool(), "sale-1", PaymentMethod::Ipaymu)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(attempt.transaction_id.as_deref(), Some("T7"));
        assert_eq!(attempt.status, AttemptStatus::Completed);
    }

    #[tokio::test]
    async fn test_cancel_callback() {
        let db = setup_db().await;
        seed_sale(&db, SaleFixture::new("sale-1", SaleStatus::Pending)).await;
        seed_sale(&db, SaleFixture::new("sale-2", SaleStatus::Completed)).await;
        seed_sale(&db, SaleFixture::new("sale-3", SaleStatus::Failed)).await;
        let ingestor = ingestor(&db, &StubGateway::ipaymu());

        assert_eq!(ingestor.cancel("sale-1").await.unwrap(), CancelDecision::Cancel);
        assert_eq!(ingestor.cancel("sale-1").await.unwrap(), CancelDecision::AlreadyCancelled);
        assert_eq!(ingestor.cancel("sale-2").await.unwrap(), CancelDecision::RefusedCompleted);
        assert_eq!(ingestor.cancel("sale-3").await.unwrap(), CancelDecision::Cancel);

        let sale = SaleRepository::get_by_id(db.pool(), "sale-1").await.unwrap().unwrap();
        assert_eq!(sale.status, SaleStatus::Cancelled);
        assert_eq!(sale.notes.as_deref(), Some(CANCELLED_NOTE));
        assert_eq!(
            SaleRepository::status_of(db.pool(), "sale-2").await.unwrap(),
            Some(SaleStatus::Completed)
        );

        let err = ingestor.cancel("missing").await.unwrap_err();
        assert!(matches!(err, ReconcileError::NotFound { entity: "Sale", .. }));
    }
}
