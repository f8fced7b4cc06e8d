//! # Order State Machine
//!
//! The authoritative transition rules for a sale's payment lifecycle.
//!
//! ## States
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │            success                                                      │
//! │   ┌─────────┐ ──────────────────────────────►┌───────────┐              │
//! │   │ pending │ ◄── pending (re-stamp)         │ completed │ (terminal)   │
//! │   └─┬───▲───┘                                └───────────┘              │
//! │     │   │ re-initiate                               ▲                   │
//! │     │   │ (explicit action only)                    │ success           │
//! │     │   │                                           │                   │
//! │     │ failed    ┌────────┐──────────────────────────┘                   │
//! │     ├──────────►│ failed │                                              │
//! │     │           └────────┘                                              │
//! │     │ cancel callback                                                   │
//! │     ▼                                                                   │
//! │   ┌───────────┐                                                         │
//! │   │ cancelled │ (terminal for automatic transitions)                    │
//! │   └───────────┘                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every decision here is pure. Persisting the decision (guarded UPDATEs,
//! payment record, inventory effects) happens in the reconcile crate inside a
//! single transaction.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::types::{GatewayStatus, SaleStatus};

// =============================================================================
// Transition
// =============================================================================

/// What applying a gateway observation to a sale must do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// `pending|failed → completed`: set paid/change, stamp notes, mark the
    /// attempt completed, apply inventory effects.
    Complete,
    /// `pending → failed`: mark the attempt failed. No inventory effect.
    Fail,
    /// `pending → pending`: refresh the attempt and rewrite the notes.
    Restamp,
    /// `failed` sale sees `pending`: refresh the attempt only.
    RefreshAttempt,
    /// Nothing may change.
    Ignore(IgnoreReason),
}

/// Why an observation was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The sale is in a terminal state.
    Terminal(SaleStatus),
    /// The observation repeats the current status.
    Duplicate(SaleStatus),
}

impl Transition {
    /// Status the sale ends up in, if the transition changes it.
    pub const fn target_status(&self) -> Option<SaleStatus> {
        match self {
            Transition::Complete => Some(SaleStatus::Completed),
            Transition::Fail => Some(SaleStatus::Failed),
            Transition::Restamp | Transition::RefreshAttempt | Transition::Ignore(_) => None,
        }
    }

    /// Whether the payment attempt is written at all.
    pub const fn touches_attempt(&self) -> bool {
        !matches!(self, Transition::Ignore(_))
    }
}

/// Outcome of a cancel request from the gateway's cancel callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CancelDecision {
    /// Move the sale to `cancelled`.
    Cancel,
    /// Already cancelled; nothing to do.
    AlreadyCancelled,
    /// Paid sales are never cancelled by the callback.
    RefusedCompleted,
}

// =============================================================================
// Order State Machine
// =============================================================================

/// The only component allowed to decide sale status transitions.
pub struct OrderStateMachine;

impl OrderStateMachine {
    /// Decides what a gateway observation does to a sale in `current` state.
    ///
    /// ## Rules
    /// ```text
    /// current \ observed │ success   failed        pending
    /// ───────────────────┼─────────────────────────────────────────
    /// pending            │ Complete  Fail          Restamp
    /// failed             │ Complete  Ignore(dup)   RefreshAttempt
    /// completed          │ Ignore    Ignore        Ignore     (frozen)
    /// cancelled          │ Ignore    Ignore        Ignore     (frozen)
    /// ```
    pub fn on_gateway_status(current: SaleStatus, observed: GatewayStatus) -> Transition {
        match (current, observed) {
            (SaleStatus::Completed, GatewayStatus::Success) => {
                Transition::Ignore(IgnoreReason::Duplicate(SaleStatus::Completed))
            }
            (SaleStatus::Completed, _) | (SaleStatus::Cancelled, _) => {
                Transition::Ignore(IgnoreReason::Terminal(current))
            }
            (SaleStatus::Pending, GatewayStatus::Success)
            | (SaleStatus::Failed, GatewayStatus::Success) => Transition::Complete,
            (SaleStatus::Pending, GatewayStatus::Failed) => Transition::Fail,
            (SaleStatus::Failed, GatewayStatus::Failed) => {
                Transition::Ignore(IgnoreReason::Duplicate(SaleStatus::Failed))
            }
            (SaleStatus::Pending, GatewayStatus::Pending) => Transition::Restamp,
            (SaleStatus::Failed, GatewayStatus::Pending) => Transition::RefreshAttempt,
        }
    }

    /// Decides what the gateway's cancel callback does.
    pub fn on_cancel_request(current: SaleStatus) -> CancelDecision {
        match current {
            SaleStatus::Completed => CancelDecision::RefusedCompleted,
            SaleStatus::Cancelled => CancelDecision::AlreadyCancelled,
            SaleStatus::Pending | SaleStatus::Failed => CancelDecision::Cancel,
        }
    }

    /// Checks that payment may be re-initiated (`pending|failed|cancelled →
    /// pending`). Only the explicit re-initiate action calls this.
    pub fn ensure_can_reinitiate(sale_id: &str, current: SaleStatus) -> CoreResult<()> {
        match current {
            SaleStatus::Pending | SaleStatus::Failed | SaleStatus::Cancelled => Ok(()),
            SaleStatus::Completed => Err(CoreError::invalid_status(
                sale_id,
                current,
                "re-initiate payment",
            )),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
