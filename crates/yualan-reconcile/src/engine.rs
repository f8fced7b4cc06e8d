//! # Reconciliation Engine
//!
//! Polls a gateway for sales that are still waiting on it.
//!
//! ## Batch Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  run_batch(max_count, max_age_hours)                                    │
//! │                                                                         │
//! │  select sales: method = provider, status ∈ {pending, failed},           │
//! │                created within max_age_hours, newest first, ≤ max_count  │
//! │                                                                         │
//! │  for each sale (errors stay with the sale):                             │
//! │    tenant ─► gateway client                                             │
//! │    latest attempt ─► transaction id                                     │
//! │        └─ none? search_history(reference, page cap) ─► attach           │
//! │                     └─ not found ─► unchanged (AmbiguousCorrelation)    │
//! │    query_status ─► map_status ─► reconcile                              │
//! │                                                                         │
//! │  → BatchSummary { completed, failed, unchanged, skipped, errors }       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every gateway call is wrapped in a timeout; a call that exceeds it is a
//! per-sale error like any other.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use ts_rs::TS;
use yualan_core::{Payment, PaymentMethod, Sale, TriggerOrigin};
use yualan_db::{Database, PaymentRepository, SaleRepository, TenantRepository};
use yualan_gateway::{GatewayClient, GatewayFactory, GatewayResult};

use crate::config::GatewaySettings;
use crate::error::{ReconcileError, ReconcileResult};
use crate::payments::PaymentRecordManager;
use crate::reconciler::{Observation, ReconcileOutcome, Reconciler, Reconciliation};

// =============================================================================
// Settings
// =============================================================================

/// Limits for one engine.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub call_timeout: Duration,
    pub history_max_pages: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            call_timeout: Duration::from_secs(30),
            history_max_pages: 5,
        }
    }
}

impl From<&GatewaySettings> for EngineSettings {
    fn from(settings: &GatewaySettings) -> Self {
        EngineSettings {
            call_timeout: settings.timeout(),
            history_max_pages: settings.history_max_pages,
        }
    }
}

// =============================================================================
// Batch Summary
// =============================================================================

/// Counts for one batch run. Every selected sale lands in exactly one of
/// `completed`, `failed`, `unchanged`, `skipped` or `errors`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct BatchSummary {
    pub provider: Option<PaymentMethod>,
    pub selected: u32,
    pub completed: u32,
    pub failed: u32,
    pub unchanged: u32,
    /// Sale, tenant or payment attempt missing.
    pub skipped: u32,
    pub errors: u32,
    pub elapsed_ms: u64,
    /// Set when the candidate query itself failed.
    pub selection_error: Option<String>,
}

impl BatchSummary {
    fn record(&mut self, result: &ReconcileResult<ReconcileOutcome>) {
        match result {
            Ok(ReconcileOutcome::Completed) => self.completed += 1,
            Ok(ReconcileOutcome::Failed) => self.failed += 1,
            Ok(_) => self.unchanged += 1,
            Err(ReconcileError::NotFound { .. }) => self.skipped += 1,
            Err(e) if e.is_skippable() => self.unchanged += 1,
            Err(_) => self.errors += 1,
        }
    }

    /// Adds another provider's counts to this one.
    pub fn merge(&mut self, other: &BatchSummary) {
        if self.provider != other.provider {
            self.provider = None;
        }
        self.selected += other.selected;
        self.completed += other.completed;
        self.failed += other.failed;
        self.unchanged += other.unchanged;
        self.skipped += other.skipped;
        self.errors += other.errors;
        self.elapsed_ms += other.elapsed_ms;
        if self.selection_error.is_none() {
            self.selection_error = other.selection_error.clone();
        }
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(provider) = self.provider {
            write!(f, "{}: ", provider.display_name())?;
        }
        write!(
            f,
            "{} checked, {} completed, {} failed, {} unchanged, {} skipped, {} errors in {}ms",
            self.selected,
            self.completed,
            self.failed,
            self.unchanged,
            self.skipped,
            self.errors,
            self.elapsed_ms
        )?;
        if let Some(err) = &self.selection_error {
            write!(f, " (selection failed: {err})")?;
        }
        Ok(())
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Reconciles one provider's outstanding sales against its gateway.
#[derive(Clone)]
pub struct ReconciliationEngine {
    db: Database,
    gateways: Arc<dyn GatewayFactory>,
    reconciler: Reconciler,
    provider: PaymentMethod,
    settings: EngineSettings,
    origin: TriggerOrigin,
}

impl ReconciliationEngine {
    pub fn new(
        db: Database,
        gateways: Arc<dyn GatewayFactory>,
        provider: PaymentMethod,
        settings: EngineSettings,
    ) -> Self {
        ReconciliationEngine {
            reconciler: Reconciler::new(db.clone()),
            db,
            gateways,
            provider,
            settings,
            origin: TriggerOrigin::Scheduler,
        }
    }

    /// Origin stamped on notes and movement reasons (default: scheduler).
    pub fn with_origin(mut self, origin: TriggerOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn provider(&self) -> PaymentMethod {
        self.provider
    }

    /// Checks up to `max_count` sales created in the last `max_age_hours`.
    ///
    /// Never fails: a broken selection query is reported in
    /// [`BatchSummary::selection_error`] and per-sale failures in the
    /// counters.
    pub async fn run_batch(&self, max_count: u32, max_age_hours: u32) -> BatchSummary {
        let started = Instant::now();
        let mut summary = BatchSummary {
            provider: Some(self.provider),
            ..BatchSummary::default()
        };

        let since = Utc::now() - chrono::Duration::hours(i64::from(max_age_hours));
        let sales = match SaleRepository::select_for_reconciliation(
            self.db.pool(),
            self.provider,
            since,
            max_count,
        )
        .await
        {
            Ok(sales) => sales,
            Err(e) => {
                error!(provider = %self.provider, error = %e, "Failed to select sales for reconciliation");
                summary.selection_error = Some(e.to_string());
                summary.elapsed_ms = started.elapsed().as_millis() as u64;
                return summary;
            }
        };

        summary.selected = sales.len() as u32;
        debug!(provider = %self.provider, count = sales.len(), max_age_hours, "Sales selected");

        for sale in &sales {
            let result = self.check_sale(sale).await;

            if let Err(e) = &result {
                if e.is_skippable() {
                    debug!(sale_id = %sale.id, invoice = %sale.invoice_number, reason = %e, "Sale left unchanged");
                } else {
                    error!(
                        sale_id = %sale.id,
                        invoice = %sale.invoice_number,
                        provider = %self.provider,
                        error = %e,
                        "Failed to reconcile sale"
                    );
                }
            }

            summary.record(&result);
        }

        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            provider = %self.provider,
            selected = summary.selected,
            completed = summary.completed,
            failed = summary.failed,
            unchanged = summary.unchanged,
            skipped = summary.skipped,
            errors = summary.errors,
            elapsed_ms = summary.elapsed_ms,
            "Reconciliation batch finished"
        );

        summary
    }

    /// Resolves, queries and reconciles one sale.
    async fn check_sale(&self, sale: &Sale) -> ReconcileResult<ReconcileOutcome> {
        let client = self.client_for(sale).await?;
        Ok(self.observe(client.as_ref(), sale, None).await?.outcome)
    }

    /// The sale's tenant-scoped client for this engine's provider.
    pub(crate) async fn client_for(&self, sale: &Sale) -> ReconcileResult<Arc<dyn GatewayClient>> {
        let tenant = TenantRepository::get_by_id(self.db.pool(), &sale.tenant_id)
            .await?
            .ok_or_else(|| ReconcileError::not_found("Tenant", sale.tenant_id.clone()))?;
        Ok(self.gateways.client_for(&tenant, self.provider)?)
    }

    /// Queries the gateway for `sale` and feeds the answer to the reconciler.
    ///
    /// The transaction id is `known_transaction_id` when given, else the
    /// latest attempt's id, else whatever the history search finds. A known
    /// id the sale has not recorded must come back from the gateway under the
    /// sale's reference, or nothing is written.
    pub(crate) async fn observe(
        &self,
        client: &dyn GatewayClient,
        sale: &Sale,
        known_transaction_id: Option<String>,
    ) -> ReconcileResult<Reconciliation> {
        let (transaction_id, recorded) = match known_transaction_id {
            Some(id) => {
                let recorded = PaymentRepository::find_by_sale_and_transaction(self.db.pool(), &sale.id, &id)
                    .await?
                    .is_some();
                (id, recorded)
            }
            None => {
                let attempt = PaymentRepository::latest_for_sale(self.db.pool(), &sale.id, self.provider)
                    .await?
                    .ok_or_else(|| ReconcileError::not_found("Payment", sale.id.clone()))?;
                let id = match attempt.transaction_id.clone() {
                    Some(id) => id,
                    None => self.discover_transaction_id(client, sale, &attempt).await?,
                };
                (id, true)
            }
        };

        let report = self
            .call("status query", client.query_status(&transaction_id))
            .await?;

        if !recorded {
            self.ensure_reference_matches(sale, &transaction_id, report.reference_id.as_deref())
                .await?;
        }

        let Some(status) = client.map_status(&report.status_text) else {
            warn!(
                sale_id = %sale.id,
                invoice = %sale.invoice_number,
                transaction_id = %transaction_id,
                status_text = %report.status_text,
                "Unrecognized gateway status"
            );
            return Err(ReconcileError::UnrecognizedStatus {
                provider: self.provider,
                status_text: report.status_text,
            });
        };

        let observation = Observation {
            provider: self.provider,
            transaction_id,
            status,
            amount: report.amount,
            raw_response: serde_json::to_string(&report.raw).ok(),
            origin: self.origin,
        };

        self.reconciler.reconcile(&sale.id, &observation).await
    }

    /// A transaction id the sale has not recorded is only trusted when the
    /// gateway files it under the sale's reference.
    async fn ensure_reference_matches(
        &self,
        sale: &Sale,
        transaction_id: &str,
        reported: Option<&str>,
    ) -> ReconcileResult<()> {
        let attempt_reference = PaymentRepository::latest_for_sale(self.db.pool(), &sale.id, self.provider)
            .await?
            .and_then(|attempt| attempt.reference_id);

        let matches = reported.is_some_and(|reference| {
            reference == sale.id || attempt_reference.as_deref() == Some(reference)
        });
        if matches {
            return Ok(());
        }

        warn!(
            sale_id = %sale.id,
            invoice = %sale.invoice_number,
            transaction_id,
            reported_reference = ?reported,
            provider = %self.provider,
            "Transaction id does not belong to this sale"
        );
        Err(ReconcileError::CorrelationMismatch {
            provider: self.provider,
            sale_id: sale.id.clone(),
            transaction_id: transaction_id.to_string(),
            reported: reported.map(str::to_string),
        })
    }

    /// Searches the gateway's history for the attempt's reference and stores
    /// the id it finds.
    async fn discover_transaction_id(
        &self,
        client: &dyn GatewayClient,
        sale: &Sale,
        attempt: &Payment,
    ) -> ReconcileResult<String> {
        let reference_id = attempt.reference_id.as_deref().unwrap_or(&sale.id);
        let pages = self.settings.history_max_pages;

        let Some(entry) = self
            .call("history search", client.search_history(reference_id, pages))
            .await?
        else {
            warn!(
                sale_id = %sale.id,
                invoice = %sale.invoice_number,
                payment_id = %attempt.id,
                age_hours = sale.age_hours(Utc::now()),
                reference_id,
                provider = %self.provider,
                "No gateway transaction found for sale"
            );
            return Err(ReconcileError::AmbiguousCorrelation {
                provider: self.provider,
                sale_id: sale.id.clone(),
                reference_id: reference_id.to_string(),
                pages,
            });
        };

        match PaymentRepository::find_by_transaction(self.db.pool(), &entry.transaction_id).await? {
            Some(existing) if existing.sale_id == sale.id => {
                debug!(
                    sale_id = %sale.id,
                    transaction_id = %entry.transaction_id,
                    payment_id = %existing.id,
                    "Transaction already recorded on another attempt"
                );
            }
            Some(existing) => {
                return Err(ReconcileError::InvariantViolation(format!(
                    "history entry {} for sale {} is recorded on sale {}",
                    entry.transaction_id, sale.id, existing.sale_id
                )));
            }
            None => {
                PaymentRecordManager::attach_transaction_id(
                    self.db.pool(),
                    attempt,
                    &entry.transaction_id,
                    Utc::now(),
                )
                .await?;
                info!(
                    sale_id = %sale.id,
                    payment_id = %attempt.id,
                    transaction_id = %entry.transaction_id,
                    "Transaction id discovered through history search"
                );
            }
        }

        Ok(entry.transaction_id)
    }

    async fn call<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = GatewayResult<T>>,
    ) -> ReconcileResult<T> {
        match tokio::time::timeout(self.settings.call_timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ReconcileError::timed_out(
                self.provider,
                operation,
                self.settings.call_timeout,
            )),
        }
    }
}
