//! # Repository Module
//!
//! Stateless repositories: every function takes an executor as its first
//! argument.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SaleRepository::get_by_id(db.pool(), id)       standalone read         │
//! │  SaleRepository::complete(&mut *tx, ...)        part of a transaction   │
//! │                                                                         │
//! │  The same function serves both; the caller decides the boundary.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`sale::SaleRepository`] - Sales, line items, guarded status writes
//! - [`payment::PaymentRepository`] - Payment attempts
//! - [`inventory::InventoryRepository`] - Stock ledger
//! - [`product::ProductRepository`] - Product cost lookups
//! - [`tenant::TenantRepository`] - Tenant gateway credentials

pub mod inventory;
pub mod payment;
pub mod product;
pub mod sale;
pub mod tenant;

/// Row builders shared by the repository tests.
#[cfg(test)]
pub(crate) mod test_rows {
    use chrono::{DateTime, Utc};
    use yualan_core::{
        AttemptStatus, GatewayMode, Payment, PaymentMethod, Product, Sale, SaleItem, SaleStatus,
        Tenant,
    };

    use super::tenant::TenantRepository;
    use crate::Database;

    pub fn tenant_row(id: &str) -> Tenant {
        let now = Utc::now();
        Tenant {
            id: id.to_string(),
            name: format!("Toko {id}"),
            slug: id.to_string(),
            ipaymu_va: None,
            ipaymu_secret_key: None,
            ipaymu_mode: GatewayMode::Production,
            midtrans_server_key: None,
            midtrans_client_key: None,
            midtrans_merchant_id: None,
            midtrans_is_production: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub async fn seed_tenant(db: &Database, id: &str) {
        TenantRepository::insert(db.pool(), &tenant_row(id)).await.unwrap();
    }

    /// A Rp10000.00 sale with no discount or tax for `tenant-1`.
    pub fn sale_row(
        id: &str,
        invoice: &str,
        method: PaymentMethod,
        status: SaleStatus,
        created_at: DateTime<Utc>,
    ) -> Sale {
        Sale {
            id: id.to_string(),
            tenant_id: "tenant-1".to_string(),
            invoice_number: invoice.to_string(),
            subtotal_cents: 1_000_000,
            discount_cents: 0,
            tax_cents: 0,
            total_cents: 1_000_000,
            paid_cents: 0,
            change_cents: 0,
            payment_method: method,
            status,
            notes: None,
            created_at,
            updated_at: created_at,
            deleted_at: None,
        }
    }

    pub fn payment_row(id: &str, sale_id: &str, transaction_id: Option<&str>) -> Payment {
        let now = Utc::now();
        Payment {
            id: id.to_string(),
            tenant_id: "tenant-1".to_string(),
            sale_id: sale_id.to_string(),
            payment_method: PaymentMethod::Ipaymu,
            amount_cents: 1_000_000,
            currency: "IDR".to_string(),
            status: AttemptStatus::Pending,
            transaction_id: transaction_id.map(str::to_string),
            reference_id: Some(sale_id.to_string()),
            raw_response: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn product_row(id: &str, cost_cents: Option<i64>) -> Product {
        let now = Utc::now();
        Product {
            id: id.to_string(),
            tenant_id: "tenant-1".to_string(),
            sku: format!("SKU-{id}"),
            name: format!("Product {id}"),
            price_cents: 500_000,
            cost_cents,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn item_row(
        id: &str,
        sale_id: &str,
        product_id: &str,
        quantity: i64,
        unit_cost_cents: Option<i64>,
    ) -> SaleItem {
        SaleItem {
            id: id.to_string(),
            sale_id: sale_id.to_string(),
            product_id: product_id.to_string(),
            name_snapshot: format!("Product {product_id}"),
            quantity,
            unit_price_cents: 500_000,
            unit_cost_cents,
            created_at: Utc::now(),
        }
    }
}
