//! # Payment Repository
//!
//! Payment attempts: one row per gateway initiation or first observation.
//! Rows are never deleted.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteExecutor;
use tracing::debug;

use crate::error::{DbError, DbResult};
use yualan_core::{AttemptStatus, Money, Payment, PaymentMethod};

const PAYMENT_COLUMNS: &str = "
    id, tenant_id, sale_id, payment_method, amount_cents, currency, status,
    transaction_id, reference_id, raw_response, notes, created_at, updated_at";

/// Repository for payment attempt operations.
pub struct PaymentRepository;

impl PaymentRepository {
    /// Inserts a new attempt.
    pub async fn insert<'e, E>(executor: E, payment: &Payment) -> DbResult<()>
    where
        E: SqliteExecutor<'e>,
    {
        debug!(
            id = %payment.id,
            sale_id = %payment.sale_id,
            transaction_id = ?payment.transaction_id,
            status = %payment.status,
            "Inserting payment attempt"
        );

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, tenant_id, sale_id, payment_method, amount_cents, currency, status,
                transaction_id, reference_id, raw_response, notes, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.tenant_id)
        .bind(&payment.sale_id)
        .bind(payment.payment_method)
        .bind(payment.amount_cents)
        .bind(&payment.currency)
        .bind(payment.status)
        .bind(&payment.transaction_id)
        .bind(&payment.reference_id)
        .bind(&payment.raw_response)
        .bind(&payment.notes)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Latest attempt of a sale for one payment method.
    pub async fn latest_for_sale<'e, E>(
        executor: E,
        sale_id: &str,
        method: PaymentMethod,
    ) -> DbResult<Option<Payment>>
    where
        E: SqliteExecutor<'e>,
    {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE sale_id = ?1 AND payment_method = ?2
            ORDER BY created_at DESC, rowid DESC
            LIMIT 1
            "#
        ))
        .bind(sale_id)
        .bind(method)
        .fetch_optional(executor)
        .await?;

        Ok(payment)
    }

    /// Finds an attempt by its natural key `(sale, transaction id)`.
    pub async fn find_by_sale_and_transaction<'e, E>(
        executor: E,
        sale_id: &str,
        transaction_id: &str,
    ) -> DbResult<Option<Payment>>
    where
        E: SqliteExecutor<'e>,
    {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE sale_id = ?1 AND transaction_id = ?2"
        ))
        .bind(sale_id)
        .bind(transaction_id)
        .fetch_optional(executor)
        .await?;

        Ok(payment)
    }

    /// Finds an attempt by gateway transaction id, whatever sale owns it.
    pub async fn find_by_transaction<'e, E>(
        executor: E,
        transaction_id: &str,
    ) -> DbResult<Option<Payment>>
    where
        E: SqliteExecutor<'e>,
    {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE transaction_id = ?1"
        ))
        .bind(transaction_id)
        .fetch_optional(executor)
        .await?;

        Ok(payment)
    }

    /// All attempts of a sale, oldest first.
    pub async fn list_for_sale<'e, E>(executor: E, sale_id: &str) -> DbResult<Vec<Payment>>
    where
        E: SqliteExecutor<'e>,
    {
        let payments = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE sale_id = ?1 ORDER BY created_at, rowid"
        ))
        .bind(sale_id)
        .fetch_all(executor)
        .await?;

        Ok(payments)
    }

    /// Overwrites the outcome fields of an attempt.
    pub async fn update_outcome<'e, E>(
        executor: E,
        id: &str,
        status: AttemptStatus,
        amount: Money,
        raw_response: Option<&str>,
        notes: &str,
        now: DateTime<Utc>,
    ) -> DbResult<()>
    where
        E: SqliteExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            UPDATE payments SET
                status = ?2,
                amount_cents = ?3,
                raw_response = COALESCE(?4, raw_response),
                notes = ?5,
                updated_at = ?6
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(amount.cents())
        .bind(raw_response)
        .bind(notes)
        .bind(now)
        .execute(executor)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Payment", id));
        }

        Ok(())
    }

    /// Stores a transaction id discovered after the fact (history search).
    ///
    /// Only fills an empty slot; an attempt's transaction id never changes
    /// once set.
    pub async fn attach_transaction_id<'e, E>(
        executor: E,
        id: &str,
        transaction_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<()>
    where
        E: SqliteExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            UPDATE payments SET transaction_id = ?2, updated_at = ?3
            WHERE id = ?1 AND transaction_id IS NULL
            "#,
        )
        .bind(id)
        .bind(transaction_id)
        .bind(now)
        .execute(executor)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::status_guard("Payment", id, "without transaction id"));
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::sale::SaleRepository;
    use crate::repository::test_rows::{payment_row, sale_row, seed_tenant};
    use crate::{Database, DbConfig};
    use chrono::Duration;
    use yualan_core::SaleStatus;

    async fn setup() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        seed_tenant(&db, "tenant-1").await;
        SaleRepository::insert(
            db.pool(),
            &sale_row("sale-1", "INV-1", PaymentMethod::Ipaymu, SaleStatus::Pending, Utc::now()),
        )
        .await
        .unwrap();
        db
    }

    #[tokio::test]
    async fn test_latest_for_sale_picks_newest() {
        let db = setup().await;
        let now = Utc::now();

        let mut older = payment_row("p-old", "sale-1", Some("T-OLD"));
        older.created_at = now - Duration::minutes(10);
        let newer = payment_row("p-new", "sale-1", None);

        PaymentRepository::insert(db.pool(), &older).await.unwrap();
        PaymentRepository::insert(db.pool(), &newer).await.unwrap();

        let latest = PaymentRepository::latest_for_sale(db.pool(), "sale-1", PaymentMethod::Ipaymu)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, "p-new");
        assert!(latest.transaction_id.is_none());

        let none = PaymentRepository::latest_for_sale(db.pool(), "sale-1", PaymentMethod::Midtrans)
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_transaction_id_is_unique() {
        let db = setup().await;
        PaymentRepository::insert(db.pool(), &payment_row("p1", "sale-1", Some("T1")))
            .await
            .unwrap();

        let err = PaymentRepository::insert(db.pool(), &payment_row("p2", "sale-1", Some("T1")))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation_on("payments.transaction_id"));

        // NULL transaction ids never collide
        PaymentRepository::insert(db.pool(), &payment_row("p3", "sale-1", None)).await.unwrap();
        PaymentRepository::insert(db.pool(), &payment_row("p4", "sale-1", None)).await.unwrap();
    }

    #[tokio::test]
    async fn test_attach_transaction_id_only_once() {
        let db = setup().await;
        let now = Utc::now();
        PaymentRepository::insert(db.pool(), &payment_row("p1", "sale-1", None)).await.unwrap();

        PaymentRepository::attach_transaction_id(db.pool(), "p1", "T9", now).await.unwrap();
        let err = PaymentRepository::attach_transaction_id(db.pool(), "p1", "T10", now)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::StatusGuard { .. }));

        let found = PaymentRepository::find_by_sale_and_transaction(db.pool(), "sale-1", "T9")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "p1");
    }

    #[tokio::test]
    async fn test_update_outcome_keeps_raw_response_when_absent() {
        let db = setup().await;
        let now = Utc::now();
        let mut row = payment_row("p1", "sale-1", Some("T1"));
        row.raw_response = Some(r#"{"Status":200}"#.to_string());
        PaymentRepository::insert(db.pool(), &row).await.unwrap();

        PaymentRepository::update_outcome(
            db.pool(),
            "p1",
            AttemptStatus::Failed,
            Money::zero(),
            None,
            "failed",
            now,
        )
        .await
        .unwrap();

        let loaded = PaymentRepository::find_by_transaction(db.pool(), "T1").await.unwrap().unwrap();
        assert_eq!(loaded.status, AttemptStatus::Failed);
        assert_eq!(loaded.raw_response.as_deref(), Some(r#"{"Status":200}"#));
        assert_eq!(loaded.notes.as_deref(), Some("failed"));
    }
}
