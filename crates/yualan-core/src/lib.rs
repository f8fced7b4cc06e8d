//! # yualan-core: Pure Domain Logic for Payment Reconciliation
//!
//! Types and rules shared by every layer of the reconciliation core. No I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   Yualan Reconciliation Architecture                    │
//! │                                                                         │
//! │   Gateway webhook ──┐                     ┌── Schedules (5 min / 1 h)   │
//! │                     ▼                     ▼                             │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │             yualan-reconcile (WebhookIngestor, Engine)          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ reconcile(sale, observation)           │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ yualan-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   state   │  │   money   │  │validation │  │   │
//! │  │   │   Sale    │  │ OrderState│  │   Money   │  │ ids,totals│  │   │
//! │  │   │  Payment  │  │  Machine  │  │ (minor u.)│  │           │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │          yualan-db (SQLite)  ◄─┴─►  yualan-gateway (iPaymu, Midtrans)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Sale, SaleItem, Payment, InventoryMovement, ...)
//! - [`state`] - The order payment state machine
//! - [`money`] - Money type with integer arithmetic
//! - [`error`] - Domain error types
//! - [`validation`] - Identifier and amount validation
//!
//! ## Example Usage
//!
//! ```rust
//! use yualan_core::state::{OrderStateMachine, Transition};
//! use yualan_core::{GatewayStatus, SaleStatus};
//!
//! let transition = OrderStateMachine::on_gateway_status(
//!     SaleStatus::Pending,
//!     GatewayStatus::Success,
//! );
//! assert_eq!(transition, Transition::Complete);
//!
//! // A paid sale never moves again, whatever the gateway says later.
//! let late = OrderStateMachine::on_gateway_status(
//!     SaleStatus::Completed,
//!     GatewayStatus::Failed,
//! );
//! assert!(matches!(late, Transition::Ignore(_)));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod state;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use state::{CancelDecision, IgnoreReason, OrderStateMachine, Transition};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Currency recorded on payment attempts.
pub const DEFAULT_CURRENCY: &str = "IDR";

/// Longest merchant reference id accepted from a notification.
pub const MAX_REFERENCE_ID_LEN: usize = 64;

/// Longest gateway transaction id accepted from a gateway.
pub const MAX_TRANSACTION_ID_LEN: usize = 64;
