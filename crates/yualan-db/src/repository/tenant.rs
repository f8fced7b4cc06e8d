//! # Tenant Repository
//!
//! Tenants carry their own gateway credentials; the gateway factory reads
//! them here on every batch.

use sqlx::sqlite::SqliteExecutor;
use tracing::debug;

use crate::error::DbResult;
use yualan_core::Tenant;

const TENANT_COLUMNS: &str = "
    id, name, slug, ipaymu_va, ipaymu_secret_key, ipaymu_mode,
    midtrans_server_key, midtrans_client_key, midtrans_merchant_id,
    midtrans_is_production, created_at, updated_at";

/// Repository for tenant lookups.
pub struct TenantRepository;

impl TenantRepository {
    /// Gets a tenant by ID.
    pub async fn get_by_id<'e, E>(executor: E, id: &str) -> DbResult<Option<Tenant>>
    where
        E: SqliteExecutor<'e>,
    {
        let tenant = sqlx::query_as::<_, Tenant>(&format!(
            "SELECT {TENANT_COLUMNS} FROM tenants WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await?;

        Ok(tenant)
    }

    /// Inserts a tenant.
    pub async fn insert<'e, E>(executor: E, tenant: &Tenant) -> DbResult<()>
    where
        E: SqliteExecutor<'e>,
    {
        debug!(id = %tenant.id, slug = %tenant.slug, "Inserting tenant");

        sqlx::query(
            r#"
            INSERT INTO tenants (
                id, name, slug, ipaymu_va, ipaymu_secret_key, ipaymu_mode,
                midtrans_server_key, midtrans_client_key, midtrans_merchant_id,
                midtrans_is_production, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&tenant.id)
        .bind(&tenant.name)
        .bind(&tenant.slug)
        .bind(&tenant.ipaymu_va)
        .bind(&tenant.ipaymu_secret_key)
        .bind(tenant.ipaymu_mode)
        .bind(&tenant.midtrans_server_key)
        .bind(&tenant.midtrans_client_key)
        .bind(&tenant.midtrans_merchant_id)
        .bind(tenant.midtrans_is_production)
        .bind(tenant.created_at)
        .bind(tenant.updated_at)
        .execute(executor)
        .await?;

        Ok(())
    }
}
