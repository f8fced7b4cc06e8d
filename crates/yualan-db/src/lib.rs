//! # yualan-db: Database Layer for Payment Reconciliation
//!
//! SQLite access for sales, payment attempts and the inventory ledger,
//! through sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Reconciliation Data Flow                             │
//! │                                                                         │
//! │  webhook / scheduler / manual check                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  yualan-reconcile (decides the transition)                              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     yualan-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────────┐  ┌────────────┐  │   │
//! │  │   │   Database    │    │   Repositories     │  │ Migrations │  │   │
//! │  │   │   (pool.rs)   │    │                    │  │ (embedded) │  │   │
//! │  │   │               │    │ SaleRepository     │  │            │  │   │
//! │  │   │ SqlitePool    │◄───│ PaymentRepository  │  │ 001_...sql │  │   │
//! │  │   │ begin()       │    │ InventoryRepository│  │            │  │   │
//! │  │   └───────────────┘    └────────────────────┘  └────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database (WAL)                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use yualan_db::{Database, DbConfig, SaleRepository};
//!
//! let db = Database::new(DbConfig::new("reconciler.db")).await?;
//! let sale = SaleRepository::get_by_id(db.pool(), "sale-id").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::inventory::InventoryRepository;
pub use repository::payment::PaymentRepository;
pub use repository::product::ProductRepository;
pub use repository::sale::SaleRepository;
pub use repository::tenant::TenantRepository;
