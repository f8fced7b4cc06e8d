//! # Product Repository
//!
//! The product lookups inventory effects need: the current cost of a product,
//! used when a line item did not capture its own.

use sqlx::sqlite::SqliteExecutor;
use tracing::debug;

use crate::error::DbResult;
use yualan_core::Product;

/// Repository for product database operations.
pub struct ProductRepository;

impl ProductRepository {
    /// Gets a product by ID.
    pub async fn get_by_id<'e, E>(executor: E, id: &str) -> DbResult<Option<Product>>
    where
        E: SqliteExecutor<'e>,
    {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, tenant_id, sku, name, price_cents, cost_cents,
                   is_active, created_at, updated_at
            FROM products
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await?;

        Ok(product)
    }

    /// Current unit cost of a product, `None` when unknown or missing.
    pub async fn current_cost<'e, E>(executor: E, id: &str) -> DbResult<Option<i64>>
    where
        E: SqliteExecutor<'e>,
    {
        let cost: Option<Option<i64>> =
            sqlx::query_scalar("SELECT cost_cents FROM products WHERE id = ?1")
                .bind(id)
                .fetch_optional(executor)
                .await?;

        Ok(cost.flatten())
    }

    /// Inserts a product.
    pub async fn insert<'e, E>(executor: E, product: &Product) -> DbResult<()>
    where
        E: SqliteExecutor<'e>,
    {
        debug!(id = %product.id, sku = %product.sku, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, tenant_id, sku, name, price_cents, cost_cents,
                is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&product.id)
        .bind(&product.tenant_id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.price_cents)
        .bind(product.cost_cents)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(executor)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_rows::{product_row, seed_tenant};
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_insert_and_cost_lookup() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        seed_tenant(&db, "tenant-1").await;

        ProductRepository::insert(db.pool(), &product_row("p-costed", Some(750)))
            .await
            .unwrap();
        ProductRepository::insert(db.pool(), &product_row("p-uncosted", None))
            .await
            .unwrap();

        let loaded = ProductRepository::get_by_id(db.pool(), "p-costed").await.unwrap().unwrap();
        assert_eq!(loaded.cost_cents, Some(750));
        assert!(loaded.is_active);

        assert_eq!(ProductRepository::current_cost(db.pool(), "p-costed").await.unwrap(), Some(750));
        assert_eq!(ProductRepository::current_cost(db.pool(), "p-uncosted").await.unwrap(), None);
        assert_eq!(ProductRepository::current_cost(db.pool(), "missing").await.unwrap(), None);
    }
}
