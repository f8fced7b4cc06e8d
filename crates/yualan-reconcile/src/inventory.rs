//! # Inventory Effect Applier
//!
//! Writes the stock decrements of a completed sale exactly once.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::{debug, info};
use uuid::Uuid;
use yualan_core::{InventoryMovement, MovementSource, MovementType, Sale, SourceKind, TriggerOrigin};
use yualan_db::{InventoryRepository, ProductRepository, SaleRepository};

use crate::error::{ReconcileError, ReconcileResult};

/// Result of [`InventoryEffectApplier::apply_if_absent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventoryEffect {
    Applied { movements: usize },
    AlreadyApplied,
}

pub struct InventoryEffectApplier;

impl InventoryEffectApplier {
    /// Inserts one `out` movement per line item unless any line item of the
    /// sale already has one.
    ///
    /// Must run inside the transaction that completed the sale so that either
    /// every line item gets its movement or none does.
    pub async fn apply_if_absent(
        conn: &mut SqliteConnection,
        sale: &Sale,
        origin: TriggerOrigin,
        now: DateTime<Utc>,
    ) -> ReconcileResult<InventoryEffect> {
        let items = SaleRepository::get_items(&mut *conn, &sale.id).await?;
        let item_ids: Vec<String> = items.iter().map(|item| item.id.clone()).collect();

        if InventoryRepository::exists_for_sources(&mut *conn, SourceKind::SaleItem, &item_ids).await? {
            debug!(sale_id = %sale.id, invoice = %sale.invoice_number, "Inventory already applied");
            return Ok(InventoryEffect::AlreadyApplied);
        }

        let reason = format!(
            "Sale {} via {} ({})",
            sale.invoice_number,
            sale.payment_method.display_name(),
            origin.label()
        );

        for item in &items {
            let cost = match item.unit_cost_cents {
                Some(cost) => Some(cost),
                None => ProductRepository::current_cost(&mut *conn, &item.product_id).await?,
            };

            let movement = InventoryMovement {
                id: Uuid::new_v4().to_string(),
                tenant_id: sale.tenant_id.clone(),
                product_id: item.product_id.clone(),
                quantity_change: -item.quantity,
                cost_per_unit_cents: cost,
                movement_type: MovementType::Out,
                reason: reason.clone(),
                source: MovementSource::SaleItem(item.id.clone()),
                created_at: now,
            };

            InventoryRepository::insert(&mut *conn, &movement)
                .await
                .map_err(|e| {
                    ReconcileError::InvariantViolation(format!(
                        "second decrement for line item {} of sale {}: {e}",
                        item.id, sale.id
                    ))
                })?;
        }

        info!(
            sale_id = %sale.id,
            invoice = %sale.invoice_number,
            origin = %origin,
            items = items.len(),
            "Inventory movements recorded"
        );

        Ok(InventoryEffect::Applied {
            movements: items.len(),
        })
    }
}
