//! # yualan-reconcile: Payment Reconciliation Services
//!
//! Keeps sales in step with what payment gateways report. Two triggers feed
//! one choke point:
//!
//! ```text
//!  schedules (scheduler.rs)          gateway push (webhook.rs)
//!        │                                   │
//!        ▼                                   ▼
//!  ReconciliationEngine::run_batch    WebhookIngestor::ingest
//!        │   resolve trx id, query status    │
//!        └───────────────┬───────────────────┘
//!                        ▼
//!             Reconciler::reconcile  (one transaction per sale)
//!               ├─ OrderStateMachine      (yualan-core)
//!               ├─ PaymentRecordManager   (payments.rs)
//!               └─ InventoryEffectApplier (inventory.rs)
//! ```
//!
//! Both triggers may touch the same sale at the same time. Correctness rests
//! on three properties rather than on in-process locking: completed and
//! cancelled sales are frozen, inventory is decremented only when no movement
//! exists for the sale's line items, and attempts are upserted by
//! `(sale, transaction id)`.
//!
//! ## Module Organization
//!
//! - [`config`] - TOML configuration with environment overrides
//! - [`error`] - [`ReconcileError`] and its classification
//! - [`reconciler`] - The single reconcile choke point
//! - [`payments`] - Payment attempt bookkeeping
//! - [`inventory`] - Stock decrements on completion
//! - [`engine`] - Batch reconciliation per provider
//! - [`webhook`] - Push notification and cancel callback handling
//! - [`initiate`] - Opening and re-opening gateway payments
//! - [`refund`] - Operator refunds passed through to the gateway
//! - [`scheduler`] - Periodic batch runs

pub mod config;
pub mod engine;
pub mod error;
pub mod initiate;
pub mod inventory;
pub mod payments;
pub mod reconciler;
pub mod refund;
pub mod scheduler;
pub mod webhook;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{ReconcilerConfig, ScheduleConfig, ServerSettings};
pub use engine::{BatchSummary, EngineSettings, ReconciliationEngine};
pub use error::{ReconcileError, ReconcileResult};
pub use initiate::{InitiatedPayment, PaymentInitiator};
pub use inventory::{InventoryEffect, InventoryEffectApplier};
pub use payments::{AttemptOutcome, AttemptUpdate, AttemptWrite, NewAttempt, PaymentRecordManager};
pub use reconciler::{Observation, ReconcileOutcome, Reconciler, Reconciliation};
pub use refund::{PaymentRefunder, RefundReceipt};
pub use scheduler::{ScheduleHandle, ScheduleRunner, Scheduler};
pub use webhook::{WebhookAck, WebhookIngestor};
