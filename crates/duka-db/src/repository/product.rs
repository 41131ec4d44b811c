//! # Product Repository
//!
//! Catalog reads and the two stock primitives the inventory ledger is built
//! on: `touch` (take the write lock) and `set_stock`.
//!
//! ## Stock Write Sequence (inside one transaction)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  touch(conn, id)        UPDATE products SET updated_at = ?             │
//! │       │                 ← first write: this tx now owns the lock       │
//! │       ▼                                                                 │
//! │  fetch(conn, id)        SELECT stock ...  ← nobody else can change it  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  plan_change(..)        duka-core rule check                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  set_stock(conn, ..)    UPDATE products SET stock = ?                  │
//! │                         CHECK (stock >= 0) is the last line            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use duka_core::Product;

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a product by its ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    /// Searches active products by name, brand or barcode.
    ///
    /// An empty query lists active products by name.
    pub async fn search(&self, query: &str, limit: u32) -> DbResult<Vec<Product>> {
        let query = query.trim();
        debug!(query = %query, limit = %limit, "Searching products");

        let pattern = format!("%{}%", query);
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT * FROM products
            WHERE is_active = 1
              AND (?1 = '' OR name LIKE ?2 OR brand LIKE ?2 OR barcode = ?1)
            ORDER BY name
            LIMIT ?3
            "#,
        )
        .bind(query)
        .bind(&pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        debug!(count = products.len(), "Search returned products");
        Ok(products)
    }

    /// Active products at or below their minimum stock level, emptiest first.
    pub async fn low_stock(&self, limit: u32) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT * FROM products
            WHERE is_active = 1 AND stock <= min_stock_level
            ORDER BY stock ASC, name
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Inserts a new product.
    pub async fn insert(&self, product: &Product) -> DbResult<()> {
        debug!(id = %product.id, name = %product.name, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, category, brand, size, barcode,
                price_cents, cost_cents, stock, min_stock_level, max_stock_level,
                is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.category)
        .bind(&product.brand)
        .bind(&product.size)
        .bind(&product.barcode)
        .bind(product.price_cents)
        .bind(product.cost_cents)
        .bind(product.stock)
        .bind(product.min_stock_level)
        .bind(product.max_stock_level)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Number of products, active or not.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Soft-deletes or restores a product.
    ///
    /// Products with sale history can't be hard-deleted (FK RESTRICT), so
    /// retiring a product means flipping `is_active`.
    pub async fn set_active(&self, id: &str, active: bool) -> DbResult<()> {
        let result = sqlx::query("UPDATE products SET is_active = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(active)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Hard-deletes a product.
    ///
    /// Fails with `ForeignKeyViolation` once the product has sale items or
    /// ledger entries.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Deleting product");

        let result = sqlx::query("DELETE FROM products WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }
}

// =============================================================================
// Transaction-Scoped Helpers
// =============================================================================

/// Reads a product on the caller's connection.
pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Product>> {
    let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(product)
}

/// Bumps `updated_at`, which makes the current transaction a writer.
///
/// Returns `false` when the product doesn't exist.
pub async fn touch(conn: &mut SqliteConnection, id: &str, at: DateTime<Utc>) -> DbResult<bool> {
    let result = sqlx::query("UPDATE products SET updated_at = ?2 WHERE id = ?1")
        .bind(id)
        .bind(at)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Writes a new stock level.
pub async fn set_stock(
    conn: &mut SqliteConnection,
    id: &str,
    new_stock: i64,
    at: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query("UPDATE products SET stock = ?2, updated_at = ?3 WHERE id = ?1")
        .bind(id)
        .bind(new_stock)
        .bind(at)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Product", id));
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures;

    #[tokio::test]
    async fn test_insert_and_get() {
        let db = fixtures::db().await;
        let product = fixtures::product("Johnnie Walker Black", 450_000, 12);
        db.products().insert(&product).await.unwrap();

        let found = db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(found.name, "Johnnie Walker Black");
        assert_eq!(found.stock, 12);
        assert!(found.is_active);

        assert!(db.products().get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_search_and_low_stock() {
        let db = fixtures::db().await;
        db.products().insert(&fixtures::product("Gilbeys Gin", 120_000, 40)).await.unwrap();
        db.products().insert(&fixtures::product("Gordons Gin", 250_000, 3)).await.unwrap();
        db.products().insert(&fixtures::product("Captain Morgan", 150_000, 0)).await.unwrap();

        let gins = db.products().search("gin", 10).await.unwrap();
        assert_eq!(gins.len(), 2);

        let all = db.products().search("  ", 10).await.unwrap();
        assert_eq!(all.len(), 3);

        let low = db.products().low_stock(10).await.unwrap();
        let names: Vec<_> = low.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Captain Morgan", "Gordons Gin"]);
    }

    #[tokio::test]
    async fn test_stock_check_constraint() {
        let db = fixtures::db().await;
        let product = fixtures::product("Kenya Cane", 80_000, 2);
        db.products().insert(&product).await.unwrap();

        let mut tx = db.begin().await.unwrap();
        assert!(touch(&mut tx, &product.id, Utc::now()).await.unwrap());
        let err = set_stock(&mut tx, &product.id, -1, Utc::now()).await.unwrap_err();
        assert!(matches!(err, DbError::CheckViolation { .. }));
    }

    #[tokio::test]
    async fn test_touch_missing_product() {
        let db = fixtures::db().await;
        let mut tx = db.begin().await.unwrap();
        assert!(!touch(&mut tx, "missing", Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_active() {
        let db = fixtures::db().await;
        let product = fixtures::product("Smirnoff Vodka", 110_000, 5);
        db.products().insert(&product).await.unwrap();

        db.products().set_active(&product.id, false).await.unwrap();
        assert!(db.products().search("smirnoff", 10).await.unwrap().is_empty());
        assert!(db.products().set_active("missing", false).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_rejected_once_ledger_references_product() {
        let db = fixtures::db().await;
        let unused = fixtures::product("Chrome Vodka", 60_000, 0);
        let stocked = fixtures::product("Viceroy Brandy", 130_000, 6);
        db.products().insert(&unused).await.unwrap();
        db.products().insert(&stocked).await.unwrap();

        let mut tx = db.begin().await.unwrap();
        crate::repository::inventory::insert_transaction(
            &mut tx,
            &duka_core::InventoryTransaction {
                id: uuid::Uuid::new_v4().to_string(),
                product_id: stocked.id.clone(),
                transaction_type: duka_core::TransactionType::Restock,
                quantity_change: 6,
                previous_stock: 0,
                new_stock: 6,
                reference_id: None,
                notes: None,
                created_by: None,
                created_at: Utc::now(),
            },
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        db.products().delete(&unused.id).await.unwrap();
        assert!(db.products().get_by_id(&unused.id).await.unwrap().is_none());

        let err = db.products().delete(&stocked.id).await.unwrap_err();
        assert!(matches!(err, DbError::ForeignKeyViolation { .. }));
        assert!(db.products().get_by_id(&stocked.id).await.unwrap().is_some());

        assert!(matches!(
            db.products().delete("missing").await.unwrap_err(),
            DbError::NotFound { .. }
        ));
    }
}
