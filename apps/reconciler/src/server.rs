//! HTTP endpoints the gateways call back on.
//!
//! Every structurally valid notification is answered `200` with the
//! ingestor's acknowledgement so the gateway stops retrying. Only bodies that
//! cannot be read as a notification get `400`.

use std::collections::BTreeMap;
use std::future::Future;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::{error, info, warn};
use yualan_db::Database;
use yualan_gateway::notification::{parse_ipaymu_form, parse_midtrans_json};
use yualan_gateway::{NotificationError, NotificationPayload};
use yualan_reconcile::{ReconcileError, WebhookIngestor};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub ingestor: WebhookIngestor,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhooks/ipaymu", post(ipaymu_webhook))
        .route("/webhooks/midtrans", post(midtrans_webhook))
        .route("/payments/{sale_id}/cancel", get(cancel_payment))
        .route("/health", get(health_check))
        .with_state(state)
}

/// Serves until `shutdown` resolves.
pub async fn serve(
    bind_addr: &str,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(addr = %bind_addr, "Webhook server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Webhook server stopped");
    Ok(())
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.db.health_check().await {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "database unavailable")
    }
}

async fn ipaymu_webhook(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let fields: BTreeMap<String, String> = url::form_urlencoded::parse(&body).into_owned().collect();
    acknowledge(&state, parse_ipaymu_form(fields)).await
}

async fn midtrans_webhook(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let parsed = serde_json::from_slice::<serde_json::Value>(&body)
        .map_err(|e| NotificationError::Malformed(e.to_string()))
        .and_then(|value| parse_midtrans_json(&value));
    acknowledge(&state, parsed).await
}

async fn acknowledge(
    state: &AppState,
    parsed: Result<NotificationPayload, NotificationError>,
) -> (StatusCode, Json<serde_json::Value>) {
    match parsed {
        Ok(payload) => {
            let ack = state.ingestor.ingest(payload).await;
            let body = serde_json::to_value(&ack).unwrap_or_else(|_| json!({ "outcome": "received" }));
            (StatusCode::OK, Json(body))
        }
        Err(e) => {
            warn!(error = %e, "Unreadable payment notification");
            (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() })))
        }
    }
}

async fn cancel_payment(
    State(state): State<AppState>,
    Path(sale_id): Path<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.ingestor.cancel(&sale_id).await {
        Ok(decision) => (
            StatusCode::OK,
            Json(json!({ "sale_id": sale_id, "decision": decision })),
        ),
        Err(ReconcileError::NotFound { .. }) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("sale {sale_id} not found") })),
        ),
        Err(e) => {
            error!(sale_id = %sale_id, error = %e, "Cancel callback failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "cancel failed" })),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::Duration;
    use yualan_core::{GatewayMode, PaymentMethod, Sale, SaleStatus, Tenant};
    use yualan_db::{DbConfig, SaleRepository, TenantRepository};
    use yualan_gateway::{PlatformIpaymu, TenantGatewayFactory};
    use yualan_reconcile::EngineSettings;

    async fn state() -> AppState {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let gateways = TenantGatewayFactory::new(Duration::from_secs(1), PlatformIpaymu::default()).unwrap();
        let ingestor = WebhookIngestor::new(db.clone(), Arc::new(gateways), EngineSettings::default());
        AppState { db, ingestor }
    }

    async fn seed_pending_sale(db: &Database, id: &str) {
        let now = Utc::now();
        TenantRepository::insert(
            db.pool(),
            &Tenant {
                id: "tenant-1".to_string(),
                name: "Toko Maju".to_string(),
                slug: "toko-maju".to_string(),
                ipaymu_va: None,
                ipaymu_secret_key: None,
                ipaymu_mode: GatewayMode::Sandbox,
                midtrans_server_key: None,
                midtrans_client_key: None,
                midtrans_merchant_id: None,
                midtrans_is_production: false,
                created_at: now,
                updated_at: now,
            },
        )
        .await
        .unwrap();

        SaleRepository::insert(
            db.pool(),
            &Sale {
                id: id.to_string(),
                tenant_id: "tenant-1".to_string(),
                invoice_number: format!("INV-{id}"),
                subtotal_cents: 1_000_000,
                discount_cents: 0,
                tax_cents: 0,
                total_cents: 1_000_000,
                paid_cents: 0,
                change_cents: 0,
                payment_method: PaymentMethod::Ipaymu,
                status: SaleStatus::Pending,
                notes: None,
                created_at: now,
                updated_at: now,
                deleted_at: None,
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = health_check(State(state().await)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unreadable_bodies_are_rejected() {
        let state = state().await;

        let (status, _) = acknowledge(
            &state,
            parse_ipaymu_form(BTreeMap::from([("status".to_string(), "berhasil".to_string())])),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let response = midtrans_webhook(State(state), Bytes::from("not json"))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_sale_is_acknowledged() {
        let state = state().await;

        let body = Bytes::from("reference_id=missing&trx_id=123&status=berhasil&amount=10000");
        let response = ipaymu_webhook(State(state.clone()), body).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let (status, Json(body)) = acknowledge(
            &state,
            parse_midtrans_json(&json!({ "order_id": "missing", "transaction_status": "settlement" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "not_found");
        assert_eq!(body["reference_id"], "missing");
    }

    #[tokio::test]
    async fn test_cancel_callback() {
        let state = state().await;
        seed_pending_sale(&state.db, "sale-1").await;

        let (status, Json(body)) = cancel_payment(State(state.clone()), Path("sale-1".to_string())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["decision"], "cancel");

        let (status, Json(body)) = cancel_payment(State(state.clone()), Path("sale-1".to_string())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["decision"], "already_cancelled");

        let (status, _) = cancel_payment(State(state), Path("missing".to_string())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
