//! # Sale Repository
//!
//! Database operations for sales and their line items.
//!
//! ## Guarded Status Updates
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every status write names the states it may leave:                      │
//! │                                                                         │
//! │  complete()        WHERE status IN ('pending','failed')                 │
//! │  fail()            WHERE status = 'pending'                             │
//! │  restamp_pending() WHERE status = 'pending'                             │
//! │  cancel()          WHERE status IN ('pending','failed')                 │
//! │  reopen_pending()  WHERE status IN ('pending','failed','cancelled')     │
//! │                                                                         │
//! │  rows_affected == 0  ──►  DbError::StatusGuard                          │
//! │  A completed sale can therefore never be written back by SQL here.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteExecutor;
use tracing::debug;

use crate::error::{DbError, DbResult};
use yualan_core::{Money, PaymentMethod, Sale, SaleItem, SaleStatus};

const SALE_COLUMNS: &str = "
    id, tenant_id, invoice_number,
    subtotal_cents, discount_cents, tax_cents, total_cents,
    paid_cents, change_cents, payment_method, status, notes,
    created_at, updated_at, deleted_at";

/// Repository for sale database operations.
pub struct SaleRepository;

impl SaleRepository {
    /// Gets a live (not soft-deleted) sale by ID.
    pub async fn get_by_id<'e, E>(executor: E, id: &str) -> DbResult<Option<Sale>>
    where
        E: SqliteExecutor<'e>,
    {
        let sale = sqlx::query_as::<_, Sale>(&format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await?;

        Ok(sale)
    }

    /// Gets a live sale by invoice number.
    pub async fn get_by_invoice<'e, E>(executor: E, invoice_number: &str) -> DbResult<Option<Sale>>
    where
        E: SqliteExecutor<'e>,
    {
        let sale = sqlx::query_as::<_, Sale>(&format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE invoice_number = ?1 AND deleted_at IS NULL"
        ))
        .bind(invoice_number)
        .fetch_optional(executor)
        .await?;

        Ok(sale)
    }

    /// Inserts a sale. Order placement owns creation; this is used by tooling
    /// and tests.
    pub async fn insert<'e, E>(executor: E, sale: &Sale) -> DbResult<()>
    where
        E: SqliteExecutor<'e>,
    {
        debug!(id = %sale.id, invoice = %sale.invoice_number, "Inserting sale");

        sqlx::query(
            r#"
            INSERT INTO sales (
                id, tenant_id, invoice_number,
                subtotal_cents, discount_cents, tax_cents, total_cents,
                paid_cents, change_cents, payment_method, status, notes,
                created_at, updated_at, deleted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.tenant_id)
        .bind(&sale.invoice_number)
        .bind(sale.subtotal_cents)
        .bind(sale.discount_cents)
        .bind(sale.tax_cents)
        .bind(sale.total_cents)
        .bind(sale.paid_cents)
        .bind(sale.change_cents)
        .bind(sale.payment_method)
        .bind(sale.status)
        .bind(&sale.notes)
        .bind(sale.created_at)
        .bind(sale.updated_at)
        .bind(sale.deleted_at)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Adds a line item to a sale.
    pub async fn insert_item<'e, E>(executor: E, item: &SaleItem) -> DbResult<()>
    where
        E: SqliteExecutor<'e>,
    {
        debug!(sale_id = %item.sale_id, product_id = %item.product_id, "Adding sale item");

        sqlx::query(
            r#"
            INSERT INTO sale_items (
                id, sale_id, product_id, name_snapshot,
                quantity, unit_price_cents, unit_cost_cents, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&item.id)
        .bind(&item.sale_id)
        .bind(&item.product_id)
        .bind(&item.name_snapshot)
        .bind(item.quantity)
        .bind(item.unit_price_cents)
        .bind(item.unit_cost_cents)
        .bind(item.created_at)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Gets all items for a sale, in insertion order.
    pub async fn get_items<'e, E>(executor: E, sale_id: &str) -> DbResult<Vec<SaleItem>>
    where
        E: SqliteExecutor<'e>,
    {
        let items = sqlx::query_as::<_, SaleItem>(
            r#"
            SELECT id, sale_id, product_id, name_snapshot,
                   quantity, unit_price_cents, unit_cost_cents, created_at
            FROM sale_items
            WHERE sale_id = ?1
            ORDER BY created_at, rowid
            "#,
        )
        .bind(sale_id)
        .fetch_all(executor)
        .await?;

        Ok(items)
    }

    /// Selects sales that need a gateway status check.
    ///
    /// `payment_method = method`, `status IN (pending, failed)`,
    /// `created_at >= since`, not soft-deleted, newest first, at most `limit`.
    pub async fn select_for_reconciliation<'e, E>(
        executor: E,
        method: PaymentMethod,
        since: DateTime<Utc>,
        limit: u32,
    ) -> DbResult<Vec<Sale>>
    where
        E: SqliteExecutor<'e>,
    {
        let sales = sqlx::query_as::<_, Sale>(&format!(
            r#"
            SELECT {SALE_COLUMNS}
            FROM sales
            WHERE payment_method = ?1
              AND status IN ('pending', 'failed')
              AND created_at >= ?2
              AND deleted_at IS NULL
            ORDER BY created_at DESC
            LIMIT ?3
            "#
        ))
        .bind(method)
        .bind(since)
        .bind(i64::from(limit))
        .fetch_all(executor)
        .await?;

        Ok(sales)
    }

    /// Takes the write lock on the sale row at the start of a transaction.
    ///
    /// SQLite upgrades a deferred transaction to a writer on its first
    /// write. Issuing that write before reading the sale means two reconciles
    /// of the same sale serialize instead of both reading `pending`.
    pub async fn lock_for_update<'e, E>(executor: E, id: &str) -> DbResult<()>
    where
        E: SqliteExecutor<'e>,
    {
        let result = sqlx::query(
            "UPDATE sales SET updated_at = updated_at WHERE id = ?1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(executor)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Sale", id));
        }

        Ok(())
    }

    /// Marks a sale completed with its paid and change amounts.
    pub async fn complete<'e, E>(
        executor: E,
        id: &str,
        paid: Money,
        change: Money,
        notes: &str,
        now: DateTime<Utc>,
    ) -> DbResult<()>
    where
        E: SqliteExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            UPDATE sales SET
                status = 'completed',
                paid_cents = ?2,
                change_cents = ?3,
                notes = ?4,
                updated_at = ?5
            WHERE id = ?1 AND status IN ('pending', 'failed')
            "#,
        )
        .bind(id)
        .bind(paid.cents())
        .bind(change.cents())
        .bind(notes)
        .bind(now)
        .execute(executor)
        .await?;

        guard(result.rows_affected(), id, "pending or failed")
    }

    /// Marks a pending sale failed.
    pub async fn fail<'e, E>(
        executor: E,
        id: &str,
        paid: Money,
        change: Money,
        notes: &str,
        now: DateTime<Utc>,
    ) -> DbResult<()>
    where
        E: SqliteExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            UPDATE sales SET
                status = 'failed',
                paid_cents = ?2,
                change_cents = ?3,
                notes = ?4,
                updated_at = ?5
            WHERE id = ?1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(paid.cents())
        .bind(change.cents())
        .bind(notes)
        .bind(now)
        .execute(executor)
        .await?;

        guard(result.rows_affected(), id, "pending")
    }

    /// Rewrites the notes of a sale that stays pending.
    pub async fn restamp_pending<'e, E>(
        executor: E,
        id: &str,
        notes: &str,
        now: DateTime<Utc>,
    ) -> DbResult<()>
    where
        E: SqliteExecutor<'e>,
    {
        let result = sqlx::query(
            "UPDATE sales SET notes = ?2, updated_at = ?3 WHERE id = ?1 AND status = 'pending'",
        )
        .bind(id)
        .bind(notes)
        .bind(now)
        .execute(executor)
        .await?;

        guard(result.rows_affected(), id, "pending")
    }

    /// Cancels a sale that has not been paid.
    pub async fn cancel<'e, E>(executor: E, id: &str, notes: &str, now: DateTime<Utc>) -> DbResult<()>
    where
        E: SqliteExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            UPDATE sales SET status = 'cancelled', notes = ?2, updated_at = ?3
            WHERE id = ?1 AND status IN ('pending', 'failed')
            "#,
        )
        .bind(id)
        .bind(notes)
        .bind(now)
        .execute(executor)
        .await?;

        guard(result.rows_affected(), id, "pending or failed")
    }

    /// Moves a sale back to pending for a new payment attempt.
    pub async fn reopen_pending<'e, E>(
        executor: E,
        id: &str,
        method: PaymentMethod,
        notes: &str,
        now: DateTime<Utc>,
    ) -> DbResult<()>
    where
        E: SqliteExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            UPDATE sales SET
                status = 'pending',
                payment_method = ?2,
                paid_cents = 0,
                change_cents = 0,
                notes = ?3,
                updated_at = ?4
            WHERE id = ?1 AND status IN ('pending', 'failed', 'cancelled')
            "#,
        )
        .bind(id)
        .bind(method)
        .bind(notes)
        .bind(now)
        .execute(executor)
        .await?;

        guard(result.rows_affected(), id, "pending, failed or cancelled")
    }

    /// Soft-deletes a sale. Deleted sales are invisible to reconciliation.
    pub async fn soft_delete<'e, E>(executor: E, id: &str, now: DateTime<Utc>) -> DbResult<()>
    where
        E: SqliteExecutor<'e>,
    {
        let result = sqlx::query(
            "UPDATE sales SET deleted_at = ?2, updated_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(now)
        .execute(executor)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Sale", id));
        }

        Ok(())
    }

    /// Current status of a sale, including soft-deleted ones.
    pub async fn status_of<'e, E>(executor: E, id: &str) -> DbResult<Option<SaleStatus>>
    where
        E: SqliteExecutor<'e>,
    {
        let status = sqlx::query_scalar::<_, SaleStatus>("SELECT status FROM sales WHERE id = ?1")
            .bind(id)
            .fetch_optional(executor)
            .await?;

        Ok(status)
    }
}

fn guard(rows_affected: u64, id: &str, expected: &str) -> DbResult<()> {
    if rows_affected == 0 {
        return Err(DbError::status_guard("Sale", id, expected));
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
