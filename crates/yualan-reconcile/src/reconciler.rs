//! # Reconcile Choke Point
//!
//! Every gateway observation, whichever entry point produced it, is applied
//! here.
//!
//! ## One Transaction Per Sale
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │    lock_for_update(sale)        first statement: takes the write lock   │
//! │    read sale                    status as of the lock                   │
//! │    OrderStateMachine decides    Complete │ Fail │ Restamp │ Refresh │ … │
//! │    guarded sale UPDATE          WHERE status IN (...)                   │
//! │    PaymentRecordManager         upsert by (sale, transaction id)        │
//! │    InventoryEffectApplier       Complete only, exists-check first       │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  No gateway call ever happens between BEGIN and COMMIT.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use yualan_core::{
    AttemptStatus, GatewayStatus, Money, OrderStateMachine, PaymentMethod, Sale, SaleStatus,
    Transition, TriggerOrigin,
};
use yualan_db::{Database, SaleRepository};

use crate::error::{ReconcileError, ReconcileResult};
use crate::inventory::InventoryEffectApplier;
use crate::payments::{AttemptUpdate, PaymentRecordManager};

/// A gateway status observed for one transaction.
#[derive(Debug, Clone)]
pub struct Observation {
    pub provider: PaymentMethod,
    pub transaction_id: String,
    pub status: GatewayStatus,
    /// Amount the gateway reported, if it reported one.
    pub amount: Option<Money>,
    /// The gateway's answer as JSON text.
    pub raw_response: Option<String>,
    pub origin: TriggerOrigin,
}

/// What a reconcile did to the sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Completed,
    Failed,
    /// Still pending; attempt and notes rewritten.
    Restamped,
    /// Failed sale saw `pending`; only the attempt was written.
    AttemptRefreshed,
    /// Terminal or duplicate; nothing written.
    Ignored,
}

impl ReconcileOutcome {
    /// True when the sale's status changed.
    pub fn transitioned(&self) -> bool {
        matches!(self, ReconcileOutcome::Completed | ReconcileOutcome::Failed)
    }
}

/// Result of [`Reconciler::reconcile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    pub outcome: ReconcileOutcome,
    pub previous: SaleStatus,
    pub current: SaleStatus,
}

/// Applies observations to sales.
#[derive(Debug, Clone)]
pub struct Reconciler {
    db: Database,
}

impl Reconciler {
    pub fn new(db: Database) -> Self {
        Reconciler { db }
    }

    /// Applies `observation` to the sale in one transaction.
    ///
    /// ## Errors
    /// - `NotFound` when the sale does not exist or is soft-deleted
    /// - `InvariantViolation` when a guarded write matches nothing or the
    ///   transaction id belongs to another sale
    pub async fn reconcile(
        &self,
        sale_id: &str,
        observation: &Observation,
    ) -> ReconcileResult<Reconciliation> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        SaleRepository::lock_for_update(&mut *tx, sale_id).await?;
        let sale = SaleRepository::get_by_id(&mut *tx, sale_id)
            .await?
            .ok_or_else(|| ReconcileError::not_found("Sale", sale_id))?;

        let transition = OrderStateMachine::on_gateway_status(sale.status, observation.status);

        let outcome = match transition {
            Transition::Complete => {
                let paid = observation.amount.unwrap_or_else(|| sale.total());
                if paid < sale.total() {
                    warn!(
                        sale_id = %sale.id,
                        invoice = %sale.invoice_number,
                        transaction_id = %observation.transaction_id,
                        paid = %paid,
                        total = %sale.total(),
                        "Gateway reports success for less than the sale total"
                    );
                }
                let change = change_due(&sale, paid)?;
                let notes = sale_note("completed", observation);

                SaleRepository::complete(&mut *tx, &sale.id, paid, change, &notes, now).await?;
                Self::write_attempt(&mut tx, &sale, observation, AttemptStatus::Completed, paid, now).await?;
                InventoryEffectApplier::apply_if_absent(&mut tx, &sale, observation.origin, now).await?;

                ReconcileOutcome::Completed
            }
            Transition::Fail => {
                let paid = observation.amount.unwrap_or_else(Money::zero);
                let change = change_due(&sale, paid)?;
                let notes = sale_note("failed", observation);

                SaleRepository::fail(&mut *tx, &sale.id, paid, change, &notes, now).await?;
                Self::write_attempt(&mut tx, &sale, observation, AttemptStatus::Failed, paid, now).await?;

                ReconcileOutcome::Failed
            }
            Transition::Restamp => {
                let notes = sale_note("pending", observation);
                let amount = observation.amount.unwrap_or_else(|| sale.total());

                SaleRepository::restamp_pending(&mut *tx, &sale.id, &notes, now).await?;
                Self::write_attempt(&mut tx, &sale, observation, AttemptStatus::Pending, amount, now).await?;

                ReconcileOutcome::Restamped
            }
            Transition::RefreshAttempt => {
                let amount = observation.amount.unwrap_or_else(|| sale.total());
                Self::write_attempt(&mut tx, &sale, observation, AttemptStatus::Pending, amount, now).await?;

                ReconcileOutcome::AttemptRefreshed
            }
            Transition::Ignore(reason) => {
                debug!(
                    sale_id = %sale.id,
                    transaction_id = %observation.transaction_id,
                    observed = %observation.status,
                    ?reason,
                    "Observation ignored"
                );
                tx.rollback().await?;

                return Ok(Reconciliation {
                    outcome: ReconcileOutcome::Ignored,
                    previous: sale.status,
                    current: sale.status,
                });
            }
        };

        tx.commit().await?;

        let current = transition.target_status().unwrap_or(sale.status);
        info!(
            sale_id = %sale.id,
            invoice = %sale.invoice_number,
            transaction_id = %observation.transaction_id,
            provider = %observation.provider,
            origin = %observation.origin,
            outcome = ?outcome,
            from = %sale.status,
            to = %current,
            "Sale reconciled"
        );

        Ok(Reconciliation {
            outcome,
            previous: sale.status,
            current,
        })
    }

    async fn write_attempt(
        conn: &mut sqlx::SqliteConnection,
        sale: &Sale,
        observation: &Observation,
        status: AttemptStatus,
        amount: Money,
        now: DateTime<Utc>,
    ) -> ReconcileResult<()> {
        let notes = format!(
            "{} via {} at {}",
            status,
            observation.origin.label(),
            now.format("%Y-%m-%d %H:%M:%S")
        );

        PaymentRecordManager::update_attempt(
            conn,
            sale,
            AttemptUpdate {
                method: observation.provider,
                transaction_id: &observation.transaction_id,
                status,
                amount,
                raw_response: observation.raw_response.as_deref(),
                notes: &notes,
            },
            now,
        )
        .await?;

        Ok(())
    }
}

fn change_due(sale: &Sale, paid: Money) -> ReconcileResult<Money> {
    paid.checked_sub(sale.total()).ok_or_else(|| {
        ReconcileError::InvariantViolation(format!(
            "paid amount {} against total {} of sale {} is out of range",
            paid.cents(),
            sale.total().cents(),
            sale.id
        ))
    })
}

/// `Payment completed via iPaymu (scheduler check, TRX ID: 123)`
fn sale_note(verb: &str, observation: &Observation) -> String {
    format!(
        "Payment {} via {} ({}, TRX ID: {})",
        verb,
        observation.provider.display_name(),
        observation.origin.label(),
        observation.transaction_id
    )
}
