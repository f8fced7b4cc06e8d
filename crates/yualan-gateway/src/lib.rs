//! # yualan-gateway: Payment Gateway Adapters
//!
//! The provider side of reconciliation: initiating payments, querying
//! transaction status, searching history by merchant reference and reading
//! push notifications.
//!
//! ## Module Organization
//!
//! - [`client`] - The [`GatewayClient`] trait and its request/response types
//! - [`ipaymu`] - iPaymu v2 adapter (HMAC-SHA256 signed JSON)
//! - [`midtrans`] - Midtrans Core API / Snap adapter
//! - [`factory`] - Per-tenant client construction
//! - [`notification`] - Push notification parsing
//! - [`signature`] - Signing and verification helpers
//!
//! ## Usage
//!
//! ```rust,ignore
//! let factory = TenantGatewayFactory::new(Duration::from_secs(30), platform)?;
//! let client = factory.client_for(&tenant, PaymentMethod::Ipaymu)?;
//!
//! let report = client.query_status("123456").await?;
//! match client.map_status(&report.status_text) {
//!     Some(status) => { /* reconcile */ }
//!     None => { /* unrecognized: leave unchanged */ }
//! }
//! ```

pub mod client;
pub mod error;
pub mod factory;
pub mod ipaymu;
pub mod midtrans;
pub mod notification;
pub mod signature;

pub use client::{
    Buyer, GatewayClient, HistoryEntry, HistoryPage, InitiateRequest, InitiateResponse, ItemLine,
    StatusReport,
};
pub use error::{GatewayError, GatewayResult};
pub use factory::{GatewayFactory, PlatformIpaymu, TenantGatewayFactory};
pub use ipaymu::{IpaymuClient, IpaymuCredentials};
pub use midtrans::{MidtransClient, MidtransCredentials};
pub use notification::{NotificationError, NotificationPayload};
