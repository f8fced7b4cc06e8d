//! # Inventory Repository
//!
//! The append-only stock ledger. Stock level is the sum of deltas; there is
//! no mutable counter to drift.
//!
//! ## Source Columns
//! ```text
//! MovementSource::SaleItem("item-1")   ──►  source_kind = 'sale_item'
//!                                           source_id   = 'item-1'
//! ```
//! `idx_inventory_out_once` makes a second `out` row for the same source a
//! UNIQUE violation, so a bypassed existence check fails loudly.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{Sqlite, SqliteExecutor};
use sqlx::QueryBuilder;
use tracing::debug;

use crate::error::DbResult;
use yualan_core::{InventoryMovement, MovementSource, MovementType, SourceKind};

/// Row shape of `inventory_movements`; the source is split in two columns.
#[derive(Debug, sqlx::FromRow)]
struct MovementRow {
    id: String,
    tenant_id: String,
    product_id: String,
    quantity_change: i64,
    cost_per_unit_cents: Option<i64>,
    movement_type: MovementType,
    reason: String,
    source_kind: SourceKind,
    source_id: String,
    created_at: DateTime<Utc>,
}

impl From<MovementRow> for InventoryMovement {
    fn from(row: MovementRow) -> Self {
        InventoryMovement {
            id: row.id,
            tenant_id: row.tenant_id,
            product_id: row.product_id,
            quantity_change: row.quantity_change,
            cost_per_unit_cents: row.cost_per_unit_cents,
            movement_type: row.movement_type,
            reason: row.reason,
            source: MovementSource::from_parts(row.source_kind, row.source_id),
            created_at: row.created_at,
        }
    }
}

/// Repository for inventory ledger operations.
pub struct InventoryRepository;

impl InventoryRepository {
    /// Whether any movement references one of `source_ids` of the given kind.
    pub async fn exists_for_sources<'e, E>(
        executor: E,
        kind: SourceKind,
        source_ids: &[String],
    ) -> DbResult<bool>
    where
        E: SqliteExecutor<'e>,
    {
        if source_ids.is_empty() {
            return Ok(false);
        }

        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT EXISTS (SELECT 1 FROM inventory_movements WHERE source_kind = ",
        );
        query.push_bind(kind);
        query.push(" AND source_id IN (");
        let mut ids = query.separated(", ");
        for id in source_ids {
            ids.push_bind(id.as_str());
        }
        ids.push_unseparated("))");

        let exists: bool = query.build_query_scalar().fetch_one(executor).await?;
        Ok(exists)
    }

    /// Appends a movement.
    pub async fn insert<'e, E>(executor: E, movement: &InventoryMovement) -> DbResult<()>
    where
        E: SqliteExecutor<'e>,
    {
        debug!(
            product_id = %movement.product_id,
            quantity_change = movement.quantity_change,
            source_id = %movement.source.id(),
            "Inserting inventory movement"
        );

        sqlx::query(
            r#"
            INSERT INTO inventory_movements (
                id, tenant_id, product_id, quantity_change, cost_per_unit_cents,
                movement_type, reason, source_kind, source_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&movement.id)
        .bind(&movement.tenant_id)
        .bind(&movement.product_id)
        .bind(movement.quantity_change)
        .bind(movement.cost_per_unit_cents)
        .bind(movement.movement_type)
        .bind(&movement.reason)
        .bind(movement.source.kind())
        .bind(movement.source.id())
        .bind(movement.created_at)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Sale-driven movements of every line item of a sale.
    pub async fn list_for_sale<'e, E>(executor: E, sale_id: &str) -> DbResult<Vec<InventoryMovement>>
    where
        E: SqliteExecutor<'e>,
    {
        let rows = sqlx::query_as::<_, MovementRow>(
            r#"
            SELECT m.id, m.tenant_id, m.product_id, m.quantity_change, m.cost_per_unit_cents,
                   m.movement_type, m.reason, m.source_kind, m.source_id, m.created_at
            FROM inventory_movements m
            JOIN sale_items i ON m.source_kind = 'sale_item' AND m.source_id = i.id
            WHERE i.sale_id = ?1
            ORDER BY m.created_at, m.rowid
            "#,
        )
        .bind(sale_id)
        .fetch_all(executor)
        .await?;

        Ok(rows.into_iter().map(InventoryMovement::from).collect())
    }

    /// Stock on hand: the sum of every delta for the product.
    pub async fn stock_level<'e, E>(executor: E, product_id: &str) -> DbResult<i64>
    where
        E: SqliteExecutor<'e>,
    {
        let level: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity_change), 0) FROM inventory_movements WHERE product_id = ?1",
        )
        .bind(product_id)
        .fetch_one(executor)
        .await?;

        Ok(level)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
