//! # Payment Record Manager
//!
//! Keeps the log of payment attempts per sale in step with what gateways
//! report.
//!
//! ## Upsert by Natural Key
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  update_attempt(sale, transaction_id, status, ...)                      │
//! │                                                                         │
//! │  1. (sale, transaction_id) exists?                                      │
//! │        completed and new status is not ─► Frozen (nothing written)      │
//! │        otherwise                        ─► Updated                      │
//! │  2. transaction_id owned by another sale ─► InvariantViolation          │
//! │  3. latest attempt for the method is pending without an id              │
//! │                                         ─► Adopted (id attached)        │
//! │  4. otherwise                           ─► Created                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Step 3 covers the common case of an iPaymu initiation that returned no
//! transaction id: the first observation of the id completes that attempt
//! instead of logging a second one next to it.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqliteExecutor};
use tracing::debug;
use uuid::Uuid;
use yualan_core::{AttemptStatus, Money, Payment, PaymentMethod, Sale, DEFAULT_CURRENCY};
use yualan_db::PaymentRepository;

use crate::error::{ReconcileError, ReconcileResult};

/// A payment being opened on a gateway.
#[derive(Debug, Clone)]
pub struct NewAttempt<'a> {
    pub method: PaymentMethod,
    pub amount: Money,
    pub currency: &'a str,
    pub transaction_id: Option<&'a str>,
    pub reference_id: &'a str,
    pub raw_response: Option<&'a str>,
    pub notes: &'a str,
}

/// What a gateway reported for one transaction.
#[derive(Debug, Clone)]
pub struct AttemptUpdate<'a> {
    pub method: PaymentMethod,
    pub transaction_id: &'a str,
    pub status: AttemptStatus,
    pub amount: Money,
    pub raw_response: Option<&'a str>,
    pub notes: &'a str,
}

/// How [`PaymentRecordManager::update_attempt`] resolved the natural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptWrite {
    Created,
    Updated,
    Adopted,
    /// A completed attempt refused a downgrade.
    Frozen,
}

#[derive(Debug, Clone)]
pub struct AttemptOutcome {
    pub payment: Payment,
    pub write: AttemptWrite,
}

/// Payment attempt bookkeeping. Stateless; callers own the transaction.
pub struct PaymentRecordManager;

impl PaymentRecordManager {
    /// Logs a new pending attempt. Called when a payment is initiated.
    pub async fn record_attempt<'e, E>(
        executor: E,
        sale: &Sale,
        attempt: NewAttempt<'_>,
        now: DateTime<Utc>,
    ) -> ReconcileResult<Payment>
    where
        E: SqliteExecutor<'e>,
    {
        let payment = Payment {
            id: Uuid::new_v4().to_string(),
            tenant_id: sale.tenant_id.clone(),
            sale_id: sale.id.clone(),
            payment_method: attempt.method,
            amount_cents: attempt.amount.cents(),
            currency: attempt.currency.to_string(),
            status: AttemptStatus::Pending,
            transaction_id: attempt.transaction_id.map(str::to_string),
            reference_id: Some(attempt.reference_id.to_string()),
            raw_response: attempt.raw_response.map(str::to_string),
            notes: Some(attempt.notes.to_string()),
            created_at: now,
            updated_at: now,
        };

        PaymentRepository::insert(executor, &payment).await?;

        debug!(
            sale_id = %sale.id,
            payment_id = %payment.id,
            provider = %attempt.method,
            "Payment attempt recorded"
        );

        Ok(payment)
    }

    /// Applies a gateway observation to the attempt identified by
    /// `(sale, transaction id)`, creating it when it does not exist.
    pub async fn update_attempt(
        conn: &mut SqliteConnection,
        sale: &Sale,
        update: AttemptUpdate<'_>,
        now: DateTime<Utc>,
    ) -> ReconcileResult<AttemptOutcome> {
        if let Some(existing) =
            PaymentRepository::find_by_sale_and_transaction(&mut *conn, &sale.id, update.transaction_id)
                .await?
        {
            if !existing.status.accepts(update.status) {
                debug!(
                    sale_id = %sale.id,
                    payment_id = %existing.id,
                    transaction_id = update.transaction_id,
                    current = %existing.status,
                    observed = %update.status,
                    "Completed attempt kept as is"
                );
                return Ok(AttemptOutcome {
                    payment: existing,
                    write: AttemptWrite::Frozen,
                });
            }

            let payment = Self::overwrite(conn, existing, &update, now).await?;
            return Ok(AttemptOutcome {
                payment,
                write: AttemptWrite::Updated,
            });
        }

        if let Some(other) = PaymentRepository::find_by_transaction(&mut *conn, update.transaction_id).await? {
            return Err(ReconcileError::InvariantViolation(format!(
                "transaction {} is recorded on sale {}, observed for sale {}",
                update.transaction_id, other.sale_id, sale.id
            )));
        }

        let latest = PaymentRepository::latest_for_sale(&mut *conn, &sale.id, update.method).await?;
        if let Some(mut orphan) =
            latest.filter(|p| p.transaction_id.is_none() && p.status == AttemptStatus::Pending)
        {
            PaymentRepository::attach_transaction_id(&mut *conn, &orphan.id, update.transaction_id, now)
                .await?;
            orphan.transaction_id = Some(update.transaction_id.to_string());

            let payment = Self::overwrite(conn, orphan, &update, now).await?;
            return Ok(AttemptOutcome {
                payment,
                write: AttemptWrite::Adopted,
            });
        }

        let payment = Payment {
            id: Uuid::new_v4().to_string(),
            tenant_id: sale.tenant_id.clone(),
            sale_id: sale.id.clone(),
            payment_method: update.method,
            amount_cents: update.amount.cents(),
            currency: DEFAULT_CURRENCY.to_string(),
            status: update.status,
            transaction_id: Some(update.transaction_id.to_string()),
            reference_id: Some(sale.id.clone()),
            raw_response: update.raw_response.map(str::to_string),
            notes: Some(update.notes.to_string()),
            created_at: now,
            updated_at: now,
        };
        PaymentRepository::insert(&mut *conn, &payment).await?;

        debug!(
            sale_id = %sale.id,
            payment_id = %payment.id,
            transaction_id = update.transaction_id,
            "Payment attempt created from observation"
        );

        Ok(AttemptOutcome {
            payment,
            write: AttemptWrite::Created,
        })
    }

    /// Stores a transaction id found through a history search.
    pub async fn attach_transaction_id<'e, E>(
        executor: E,
        payment: &Payment,
        transaction_id: &str,
        now: DateTime<Utc>,
    ) -> ReconcileResult<()>
    where
        E: SqliteExecutor<'e>,
    {
        PaymentRepository::attach_transaction_id(executor, &payment.id, transaction_id, now).await?;

        debug!(
            sale_id = %payment.sale_id,
            payment_id = %payment.id,
            transaction_id,
            "Transaction id attached"
        );

        Ok(())
    }

    async fn overwrite(
        conn: &mut SqliteConnection,
        mut payment: Payment,
        update: &AttemptUpdate<'_>,
        now: DateTime<Utc>,
    ) -> ReconcileResult<Payment> {
        PaymentRepository::update_outcome(
            &mut *conn,
            &payment.id,
            update.status,
            update.amount,
            update.raw_response,
            update.notes,
            now,
        )
        .await?;

        payment.status = update.status;
        payment.amount_cents = update.amount.cents();
        if let Some(raw) = update.raw_response {
            payment.raw_response = Some(raw.to_string());
        }
        payment.notes = Some(update.notes.to_string());
        payment.updated_at = now;

        Ok(payment)
    }
}
