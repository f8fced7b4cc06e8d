//! # Domain Types
//!
//! Core domain types used by the reconciliation core.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │      Sale       │   │    Payment      │   │InventoryMovement│       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │1 *│  sale_id (FK)   │   │  product_id     │       │
//! │  │  invoice_number │──►│  transaction_id │   │  quantity_change│       │
//! │  │  status         │   │  status         │   │  source ────────┼──┐    │
//! │  │  total_cents    │   │  raw_response   │   └─────────────────┘  │    │
//! │  └────────┬────────┘   └─────────────────┘                        │    │
//! │           │ 1                                                     │    │
//! │           ▼ *                                                     │    │
//! │  ┌─────────────────┐                                              │    │
//! │  │    SaleItem     │◄──── MovementSource::SaleItem(id) ───────────┘    │
//! │  │  quantity       │                                                   │
//! │  │  unit_cost_cents│                                                   │
//! │  └─────────────────┘                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business ID: (invoice_number, transaction_id, sku) - what humans and
//!   gateways see

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Sale Status
// =============================================================================

/// Lifecycle status of a sale's payment.
///
/// Terminal states are `Completed` and `Cancelled`. Transitions are decided by
/// [`crate::state::OrderStateMachine`] only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Waiting for the gateway to confirm payment.
    Pending,
    /// Paid; line items and amounts are frozen.
    Completed,
    /// Gateway reported the payment failed. Can still complete later.
    Failed,
    /// Customer cancelled on the gateway page.
    Cancelled,
}

impl SaleStatus {
    /// Returns true for states no automatic transition may leave.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, SaleStatus::Completed | SaleStatus::Cancelled)
    }

    /// Database / wire representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Pending => "pending",
            SaleStatus::Completed => "completed",
            SaleStatus::Failed => "failed",
            SaleStatus::Cancelled => "cancelled",
        }
    }
}

impl Default for SaleStatus {
    fn default() -> Self {
        SaleStatus::Pending
    }
}

impl fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Payment Method
// =============================================================================

/// How a sale is paid. Every method except `Cash` is gateway-mediated.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash payment, completed at the counter.
    Cash,
    /// iPaymu redirect payment.
    Ipaymu,
    /// Midtrans Snap payment.
    Midtrans,
}

impl PaymentMethod {
    /// Returns true when the payment is confirmed asynchronously by a gateway.
    pub const fn is_gateway(&self) -> bool {
        !matches!(self, PaymentMethod::Cash)
    }

    /// Database / wire representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Ipaymu => "ipaymu",
            PaymentMethod::Midtrans => "midtrans",
        }
    }

    /// Human-readable provider name used in order notes.
    pub const fn display_name(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Ipaymu => "iPaymu",
            PaymentMethod::Midtrans => "Midtrans",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cash" => Ok(PaymentMethod::Cash),
            "ipaymu" => Ok(PaymentMethod::Ipaymu),
            "midtrans" => Ok(PaymentMethod::Midtrans),
            _ => Err(ValidationError::NotAllowed {
                field: "payment_method".to_string(),
                allowed: vec!["cash".into(), "ipaymu".into(), "midtrans".into()],
            }),
        }
    }
}

// =============================================================================
// Gateway Status
// =============================================================================

/// The internal tri-state every provider vocabulary is mapped onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum GatewayStatus {
    Success,
    Failed,
    Pending,
}

impl GatewayStatus {
    /// The payment attempt status this observation moves the attempt to.
    pub const fn attempt_status(&self) -> AttemptStatus {
        match self {
            GatewayStatus::Success => AttemptStatus::Completed,
            GatewayStatus::Failed => AttemptStatus::Failed,
            GatewayStatus::Pending => AttemptStatus::Pending,
        }
    }
}

impl fmt::Display for GatewayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayStatus::Success => f.write_str("success"),
            GatewayStatus::Failed => f.write_str("failed"),
            GatewayStatus::Pending => f.write_str("pending"),
        }
    }
}

// =============================================================================
// Attempt Status
// =============================================================================

/// Status of a single payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Pending,
    Completed,
    Failed,
}

impl AttemptStatus {
    /// Whether an attempt in this status may be overwritten with `next`.
    ///
    /// A completed attempt is frozen: a late `pending` or `failed`
    /// observation for the same transaction never downgrades it.
    pub const fn accepts(&self, next: AttemptStatus) -> bool {
        match self {
            AttemptStatus::Completed => matches!(next, AttemptStatus::Completed),
            AttemptStatus::Pending | AttemptStatus::Failed => true,
        }
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptStatus::Pending => f.write_str("pending"),
            AttemptStatus::Completed => f.write_str("completed"),
            AttemptStatus::Failed => f.write_str("failed"),
        }
    }
}

// =============================================================================
// Trigger Origin
// =============================================================================

/// Which entry point observed the gateway status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOrigin {
    /// Push notification from the gateway.
    Webhook,
    /// Periodic reconciliation batch.
    Scheduler,
    /// Operator-triggered run from the CLI.
    Manual,
}

impl TriggerOrigin {
    /// Label used in notes and inventory movement reasons.
    pub const fn label(&self) -> &'static str {
        match self {
            TriggerOrigin::Webhook => "webhook",
            TriggerOrigin::Scheduler => "scheduler check",
            TriggerOrigin::Manual => "manual check",
        }
    }
}

impl fmt::Display for TriggerOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Gateway Mode
// =============================================================================

/// Which gateway environment a tenant's credentials belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum GatewayMode {
    Sandbox,
    #[default]
    Production,
}

// =============================================================================
// Tenant
// =============================================================================

/// A merchant on the platform, with its own gateway credentials.
///
/// Secrets are never serialized out of the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub slug: String,
    /// iPaymu virtual account number (the `va` header).
    pub ipaymu_va: Option<String>,
    #[serde(skip_serializing)]
    pub ipaymu_secret_key: Option<String>,
    pub ipaymu_mode: GatewayMode,
    #[serde(skip_serializing)]
    pub midtrans_server_key: Option<String>,
    pub midtrans_client_key: Option<String>,
    pub midtrans_merchant_id: Option<String>,
    pub midtrans_is_production: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Product
// =============================================================================

/// A product a tenant sells. Only the fields inventory effects need.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub tenant_id: String,
    pub sku: String,
    pub name: String,
    pub price_cents: i64,
    /// Current cost; fallback when a line item did not capture its cost.
    pub cost_cents: Option<i64>,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Sale
// =============================================================================

/// An order. Invariant: `total = subtotal - discount + tax`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: String,
    pub tenant_id: String,
    pub invoice_number: String,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub paid_cents: i64,
    pub change_cents: i64,
    pub payment_method: PaymentMethod,
    pub status: SaleStatus,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker. Deleted sales are never reconciled.
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Sale {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn paid(&self) -> Money {
        Money::from_cents(self.paid_cents)
    }

    /// Hours elapsed since the sale was created.
    pub fn age_hours(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_hours()
    }
}

// =============================================================================
// Sale Item
// =============================================================================

/// A line item. Immutable after creation (snapshot pattern).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    pub product_id: String,
    /// Product name at time of sale (frozen).
    pub name_snapshot: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    /// Product cost at time of sale, when it was captured.
    pub unit_cost_cents: Option<i64>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl SaleItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }
}

// =============================================================================
// Payment
// =============================================================================

/// One payment attempt against a sale (initiated or first observed).
///
/// `transaction_id` is the gateway's id, unique when present.
/// `reference_id` is what we sent the gateway as the merchant reference.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Payment {
    pub id: String,
    pub tenant_id: String,
    pub sale_id: String,
    pub payment_method: PaymentMethod,
    pub amount_cents: i64,
    pub currency: String,
    pub status: AttemptStatus,
    pub transaction_id: Option<String>,
    pub reference_id: Option<String>,
    /// Raw gateway response (JSON text).
    pub raw_response: Option<String>,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Inventory Movement
// =============================================================================

/// Direction of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    In,
    Out,
    Adjustment,
}

/// Kind tag stored next to `source_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    SaleItem,
    StockAdjustment,
}

/// What caused an inventory movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum MovementSource {
    /// Sale-driven decrement, one per line item.
    SaleItem(String),
    /// Manual stock count correction.
    StockAdjustment(String),
}

impl MovementSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            MovementSource::SaleItem(_) => SourceKind::SaleItem,
            MovementSource::StockAdjustment(_) => SourceKind::StockAdjustment,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            MovementSource::SaleItem(id) | MovementSource::StockAdjustment(id) => id,
        }
    }

    /// Rebuilds the tagged source from its stored columns.
    pub fn from_parts(kind: SourceKind, id: String) -> Self {
        match kind {
            SourceKind::SaleItem => MovementSource::SaleItem(id),
            SourceKind::StockAdjustment => MovementSource::StockAdjustment(id),
        }
    }
}

/// An append-only stock ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InventoryMovement {
    pub id: String,
    pub tenant_id: String,
    pub product_id: String,
    /// Signed delta; sale decrements are negative.
    pub quantity_change: i64,
    pub cost_per_unit_cents: Option<i64>,
    pub movement_type: MovementType,
    pub reason: String,
    pub source: MovementSource,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(SaleStatus::Completed.is_terminal());
        assert!(SaleStatus::Cancelled.is_terminal());
        assert!(!SaleStatus::Pending.is_terminal());
        assert!(!SaleStatus::Failed.is_terminal());
    }

    #[test]
    fn test_payment_method_parsing() {
        assert_eq!("iPaymu".parse::<PaymentMethod>().unwrap(), PaymentMethod::Ipaymu);
        assert_eq!("midtrans".parse::<PaymentMethod>().unwrap(), PaymentMethod::Midtrans);
        assert!("paypal".parse::<PaymentMethod>().is_err());
        assert!(PaymentMethod::Ipaymu.is_gateway());
        assert!(!PaymentMethod::Cash.is_gateway());
    }

    #[test]
    fn test_completed_attempt_is_frozen() {
        assert!(!AttemptStatus::Completed.accepts(AttemptStatus::Pending));
        assert!(!AttemptStatus::Completed.accepts(AttemptStatus::Failed));
        assert!(AttemptStatus::Completed.accepts(AttemptStatus::Completed));
        assert!(AttemptStatus::Failed.accepts(AttemptStatus::Completed));
        assert!(AttemptStatus::Pending.accepts(AttemptStatus::Failed));
    }

    #[test]
    fn test_movement_source_round_trip() {
        let source = MovementSource::SaleItem("item-1".to_string());
        assert_eq!(source.kind(), SourceKind::SaleItem);
        assert_eq!(source.id(), "item-1");
        assert_eq!(
            MovementSource::from_parts(SourceKind::SaleItem, "item-1".to_string()),
            source
        );

        let json = serde_json::to_value(&source).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "sale_item", "id": "item-1"}));
    }

    #[test]
    fn test_sale_status_default() {
        assert_eq!(SaleStatus::default(), SaleStatus::Pending);
    }
}
