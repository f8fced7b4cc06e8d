//! Fixtures and a scripted gateway shared by the service tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use yualan_core::{
    AttemptStatus, GatewayMode, GatewayStatus, Money, Payment, PaymentMethod, Product, Sale,
    SaleItem, SaleStatus, Tenant, TriggerOrigin,
};
use yualan_db::{Database, DbConfig, PaymentRepository, ProductRepository, SaleRepository, TenantRepository};
use yualan_gateway::ipaymu::map_ipaymu_status;
use yualan_gateway::midtrans::map_midtrans_status;
use yualan_gateway::notification::parse_ipaymu_form;
use yualan_gateway::{
    GatewayClient, GatewayError, GatewayFactory, GatewayResult, HistoryEntry, HistoryPage,
    InitiateRequest, InitiateResponse, NotificationPayload, StatusReport,
};

use crate::reconciler::Observation;

pub const TENANT_ID: &str = "tenant-1";
pub const PRODUCT_WITH_ITEM_COST: &str = "p-1";
pub const PRODUCT_WITHOUT_ITEM_COST: &str = "p-2";

// =============================================================================
// Database Fixtures
// =============================================================================

/// In-memory database with one tenant and two products.
pub async fn setup_db() -> Database {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let now = Utc::now();

    TenantRepository::insert(
        db.pool(),
        &Tenant {
            id: TENANT_ID.to_string(),
            name: "Toko Maju".to_string(),
            slug: "toko-maju".to_string(),
            ipaymu_va: Some("0000001234567890".to_string()),
            ipaymu_secret_key: Some("SANDBOX-SECRET".to_string()),
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

    for (id, cost) in [(PRODUCT_WITH_ITEM_COST, 200_000), (PRODUCT_WITHOUT_ITEM_COST, 250_000)] {
        ProductRepository::insert(
            db.pool(),
            &Product {
                id: id.to_string(),
                tenant_id: TENANT_ID.to_string(),
                sku: format!("SKU-{id}"),
                name: format!("Produk {id}"),
                price_cents: 300_000,
                cost_cents: Some(cost),
                is_active: true,
                created_at: now,
                updated_at: now,
            },
        )
        .await
        .unwrap();
    }

    db
}

/// A Rp10,000.00 sale: two of `p-1` at Rp3,000 and one `p-2` at Rp4,000.
pub struct SaleFixture {
    id: String,
    status: SaleStatus,
    method: PaymentMethod,
    attempt: Option<Option<String>>,
    age: Duration,
    items: bool,
}

impl SaleFixture {
    pub fn new(id: &str, status: SaleStatus) -> Self {
        SaleFixture {
            id: id.to_string(),
            status,
            method: PaymentMethod::Ipaymu,
            attempt: None,
            age: Duration::minutes(10),
            items: true,
        }
    }

    /// Adds a pending attempt with the given transaction id.
    pub fn with_attempt(mut self, transaction_id: Option<&str>) -> Self {
        self.attempt = Some(transaction_id.map(str::to_string));
        self
    }

    pub fn method(mut self, method: PaymentMethod) -> Self {
        self.method = method;
        self
    }

    pub fn created_ago(mut self, age: Duration) -> Self {
        self.age = age;
        self
    }

    pub fn without_items(mut self) -> Self {
        self.items = false;
        self
    }
}

pub async fn seed_sale(db: &Database, fixture: SaleFixture) -> Sale {
    let created_at = Utc::now() - fixture.age;
    let sale = Sale {
        id: fixture.id.clone(),
        tenant_id: TENANT_ID.to_string(),
        invoice_number: format!("INV-{}", fixture.id),
        subtotal_cents: 1_000_000,
        discount_cents: 0,
        tax_cents: 0,
        total_cents: 1_000_000,
        paid_cents: 0,
        change_cents: 0,
        payment_method: fixture.method,
        status: fixture.status,
        notes: None,
        created_at,
        updated_at: created_at,
        deleted_at: None,
    };
    SaleRepository::insert(db.pool(), &sale).await.unwrap();

    if fixture.items {
        let lines = [
            ("item-1", PRODUCT_WITH_ITEM_COST, 2, 300_000, Some(200_000)),
            ("item-2", PRODUCT_WITHOUT_ITEM_COST, 1, 400_000, None),
        ];
        for (suffix, product_id, quantity, unit_price_cents, unit_cost_cents) in lines {
            SaleRepository::insert_item(
                db.pool(),
                &SaleItem {
                    id: format!("{}-{}", fixture.id, suffix),
                    sale_id: fixture.id.clone(),
                    product_id: product_id.to_string(),
                    name_snapshot: format!("Produk {product_id}"),
                    quantity,
                    unit_price_cents,
                    unit_cost_cents,
                    created_at,
                },
            )
            .await
            .unwrap();
        }
    }

    if let Some(transaction_id) = fixture.attempt {
        PaymentRepository::insert(
            db.pool(),
            &Payment {
                id: format!("pay-{}", fixture.id),
                tenant_id: TENANT_ID.to_string(),
                sale_id: fixture.id.clone(),
                payment_method: fixture.method,
                amount_cents: sale.total_cents,
                currency: "IDR".to_string(),
                status: AttemptStatus::Pending,
                transaction_id,
                reference_id: Some(fixture.id.clone()),
                raw_response: None,
                notes: Some("payment initiated".to_string()),
                created_at,
                updated_at: created_at,
            },
        )
        .await
        .unwrap();
    }

    sale
}

/// A scheduler observation from iPaymu.
pub fn observation(transaction_id: &str, status: GatewayStatus, amount: Option<Money>) -> Observation {
    Observation {
        provider: PaymentMethod::Ipaymu,
        transaction_id: transaction_id.to_string(),
        status,
        amount,
        raw_response: None,
        origin: TriggerOrigin::Scheduler,
    }
}

/// An iPaymu notification as the webhook form would carry it.
pub fn ipaymu_notification(reference_id: &str, trx_id: Option<&str>, status: &str) -> NotificationPayload {
    let mut fields = BTreeMap::from([
        ("reference_id".to_string(), reference_id.to_string()),
        ("status".to_string(), status.to_string()),
        ("amount".to_string(), "10000".to_string()),
    ]);
    if let Some(trx_id) = trx_id {
        fields.insert("trx_id".to_string(), trx_id.to_string());
    }
    parse_ipaymu_form(fields).unwrap()
}

// =============================================================================
// Scripted Gateway
// =============================================================================

/// History of `total_pages` pages; `(page, reference, transaction id)` marks
/// the one matching entry.
type HistoryScript = (u32, Option<(u32, String, String)>);

/// A gateway that answers from scripts and counts its calls.
pub struct StubGateway {
    provider: PaymentMethod,
    statuses: Mutex<HashMap<String, (String, Option<Money>, Value)>>,
    references: Mutex<HashMap<String, String>>,
    failures: Mutex<HashMap<String, String>>,
    hanging: Mutex<HashSet<String>>,
    history: Mutex<Option<HistoryScript>>,
    initiate_transaction_id: Mutex<Option<String>>,
    initiate_fails: AtomicBool,
    rejects_signatures: AtomicBool,
    last_initiate: Mutex<Option<InitiateRequest>>,
    last_refund: Mutex<Option<(String, Money)>>,
    status_calls: AtomicU32,
    history_calls: AtomicU32,
    initiate_calls: AtomicU32,
}

impl StubGateway {
    pub fn new(provider: PaymentMethod) -> Arc<Self> {
        Arc::new(StubGateway {
            provider,
            statuses: Mutex::new(HashMap::new()),
            references: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            hanging: Mutex::new(HashSet::new()),
            history: Mutex::new(None),
            initiate_transaction_id: Mutex::new(None),
            initiate_fails: AtomicBool::new(false),
            rejects_signatures: AtomicBool::new(false),
            last_initiate: Mutex::new(None),
            last_refund: Mutex::new(None),
            status_calls: AtomicU32::new(0),
            history_calls: AtomicU32::new(0),
            initiate_calls: AtomicU32::new(0),
        })
    }

    pub fn ipaymu() -> Arc<Self> {
        Self::new(PaymentMethod::Ipaymu)
    }

    pub fn script_status(&self, transaction_id: &str, status_text: &str, amount: Option<Money>) {
        let raw = json!({"TransactionId": transaction_id, "StatusDesc": status_text});
        self.script_status_with(transaction_id, status_text, amount, raw);
    }

    pub fn script_status_raw(&self, transaction_id: &str, status_text: &str, raw: Value) {
        self.script_status_with(transaction_id, status_text, None, raw);
    }

    fn script_status_with(&self, transaction_id: &str, status_text: &str, amount: Option<Money>, raw: Value) {
        self.statuses
            .lock()
            .unwrap()
            .insert(transaction_id.to_string(), (status_text.to_string(), amount, raw));
    }

    /// The merchant reference the status query reports for this id.
    pub fn script_reference(&self, transaction_id: &str, reference_id: &str) {
        self.references
            .lock()
            .unwrap()
            .insert(transaction_id.to_string(), reference_id.to_string());
    }

    pub fn fail_status(&self, transaction_id: &str, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(transaction_id.to_string(), message.to_string());
    }

    /// The status query for this id never answers.
    pub fn hang_status(&self, transaction_id: &str) {
        self.hanging.lock().unwrap().insert(transaction_id.to_string());
    }

    pub fn script_history(&self, total_pages: u32, matching: Option<(u32, &str, &str)>) {
        *self.history.lock().unwrap() = Some((
            total_pages,
            matching.map(|(page, reference, trx)| (page, reference.to_string(), trx.to_string())),
        ));
    }

    pub fn script_initiate(&self, transaction_id: Option<&str>) {
        *self.initiate_transaction_id.lock().unwrap() = transaction_id.map(str::to_string);
    }

    pub fn fail_initiate(&self) {
        self.initiate_fails.store(true, Ordering::SeqCst);
    }

    pub fn reject_signatures(&self) {
        self.rejects_signatures.store(true, Ordering::SeqCst);
    }

    pub fn last_initiate(&self) -> Option<InitiateRequest> {
        self.last_initiate.lock().unwrap().clone()
    }

    pub fn last_refund(&self) -> Option<(String, Money)> {
        self.last_refund.lock().unwrap().clone()
    }

    pub fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn history_calls(&self) -> u32 {
        self.history_calls.load(Ordering::SeqCst)
    }

    pub fn initiate_calls(&self) -> u32 {
        self.initiate_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GatewayClient for StubGateway {
    fn provider(&self) -> PaymentMethod {
        self.provider
    }

    async fn initiate(&self, request: &InitiateRequest) -> GatewayResult<InitiateResponse> {
        self.initiate_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_initiate.lock().unwrap() = Some(request.clone());

        if self.initiate_fails.load(Ordering::SeqCst) {
            return Err(GatewayError::call_failed(self.provider, "HTTP 500"));
        }

        let transaction_id = self.initiate_transaction_id.lock().unwrap().clone();
        Ok(InitiateResponse {
            transaction_id: transaction_id.clone(),
            session_id: Some("SESSION-1".to_string()),
            redirect_url: Some("https://pay.example/SESSION-1".to_string()),
            raw: json!({"SessionID": "SESSION-1", "TransactionId": transaction_id}),
        })
    }

    async fn query_status(&self, transaction_id: &str) -> GatewayResult<StatusReport> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);

        if self.hanging.lock().unwrap().contains(transaction_id) {
            std::future::pending::<()>().await;
        }
        if let Some(message) = self.failures.lock().unwrap().get(transaction_id) {
            return Err(GatewayError::call_failed(self.provider, message.clone()));
        }

        let scripted = self.statuses.lock().unwrap().get(transaction_id).cloned();
        let reference_id = self.references.lock().unwrap().get(transaction_id).cloned();
        match scripted {
            Some((status_text, amount, raw)) => Ok(StatusReport {
                transaction_id: transaction_id.to_string(),
                reference_id,
                status_text,
                amount,
                raw,
            }),
            None => Err(GatewayError::call_failed(
                self.provider,
                format!("transaction {transaction_id} not found"),
            )),
        }
    }

    async fn history_page(&self, page: u32) -> GatewayResult<HistoryPage> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);

        let Some((total_pages, matching)) = self.history.lock().unwrap().clone() else {
            return Ok(HistoryPage::default());
        };

        let entry = match matching {
            Some((match_page, reference, trx)) if match_page == page => HistoryEntry {
                transaction_id: trx,
                reference_id: Some(reference),
                status_text: None,
                amount: None,
            },
            _ => HistoryEntry {
                transaction_id: format!("OTHER-{page}"),
                reference_id: Some(format!("other-sale-{page}")),
                status_text: None,
                amount: None,
            },
        };

        Ok(HistoryPage {
            entries: vec![entry],
            total_pages,
        })
    }

    fn map_status(&self, status_text: &str) -> Option<GatewayStatus> {
        match self.provider {
            PaymentMethod::Midtrans => map_midtrans_status(status_text),
            _ => map_ipaymu_status(status_text),
        }
    }

    fn verify_notification(&self, _payload: &NotificationPayload) -> bool {
        !self.rejects_signatures.load(Ordering::SeqCst)
    }

    async fn refund(&self, transaction_id: &str, amount: Money) -> GatewayResult<Value> {
        *self.last_refund.lock().unwrap() = Some((transaction_id.to_string(), amount));
        Ok(json!({"TransactionId": transaction_id, "Amount": amount.major()}))
    }
}

/// Hands out one stub for its provider and refuses the others.
pub struct StubFactory {
    stub: Arc<StubGateway>,
}

impl StubFactory {
    pub fn new(stub: Arc<StubGateway>) -> Self {
        StubFactory { stub }
    }
}

impl GatewayFactory for StubFactory {
    fn client_for(&self, _tenant: &Tenant, provider: PaymentMethod) -> GatewayResult<Arc<dyn GatewayClient>> {
        if provider == self.stub.provider {
            Ok(self.stub.clone())
        } else {
            Err(GatewayError::not_configured(provider, "no stub for this provider"))
        }
    }
}
