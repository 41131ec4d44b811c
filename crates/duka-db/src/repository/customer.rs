//! # Customer Repository
//!
//! Customers and their running purchase totals. The totals only move inside
//! sale transactions, through [`add_purchase`] and [`reverse_purchase`].

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use duka_core::Customer;

/// Repository for customer database operations.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    /// Creates a new CustomerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    /// Gets a customer by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(customer)
    }

    /// Inserts a new customer.
    pub async fn insert(&self, customer: &Customer) -> DbResult<()> {
        debug!(id = %customer.id, name = %customer.name, "Inserting customer");

        sqlx::query(
            r#"
            INSERT INTO customers (
                id, name, email, phone, category, total_purchases_cents,
                last_purchase_date, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(&customer.phone)
        .bind(customer.category)
        .bind(customer.total_purchases_cents)
        .bind(customer.last_purchase_date)
        .bind(customer.is_active)
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Active customers whose name, phone or email matches, by name.
    pub async fn search(&self, query: &str, limit: u32) -> DbResult<Vec<Customer>> {
        let query = query.trim();
        let pattern = format!("%{}%", query);
        let customers = sqlx::query_as::<_, Customer>(
            r#"
            SELECT * FROM customers
            WHERE is_active = 1
              AND (?1 = '' OR name LIKE ?2 OR phone LIKE ?2 OR email LIKE ?2)
            ORDER BY name
            LIMIT ?3
            "#,
        )
        .bind(query)
        .bind(&pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(customers)
    }

    pub async fn set_active(&self, id: &str, active: bool) -> DbResult<()> {
        let result = sqlx::query("UPDATE customers SET is_active = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(active)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Customer", id));
        }

        Ok(())
    }

    /// Hard-deletes a customer. Rejected by FK RESTRICT once they have sales.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Deleting customer");

        let result = sqlx::query("DELETE FROM customers WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Customer", id));
        }

        Ok(())
    }
}

// =============================================================================
// Transaction-Scoped Helpers
// =============================================================================

/// True when the customer row exists.
pub async fn exists(conn: &mut SqliteConnection, id: &str) -> DbResult<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM customers WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(found.is_some())
}

/// Adds a finalized sale to the customer's running total.
pub async fn add_purchase(
    conn: &mut SqliteConnection,
    id: &str,
    amount_cents: i64,
    at: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE customers SET
            total_purchases_cents = total_purchases_cents + ?2,
            last_purchase_date = ?3,
            updated_at = ?3
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .bind(amount_cents)
    .bind(at)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Customer", id));
    }

    Ok(())
}

/// Takes a deleted sale back out of the running total, never below zero.
pub async fn reverse_purchase(
    conn: &mut SqliteConnection,
    id: &str,
    amount_cents: i64,
    at: DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query(
        r#"
        UPDATE customers SET
            total_purchases_cents = MAX(0, total_purchases_cents - ?2),
            updated_at = ?3
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .bind(amount_cents)
    .bind(at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures;

    #[tokio::test]
    async fn test_purchase_totals() {
        let db = fixtures::db().await;
        let customer = fixtures::customer("Wanjiku");
        db.customers().insert(&customer).await.unwrap();

        let mut tx = db.begin().await.unwrap();
        assert!(exists(&mut tx, &customer.id).await.unwrap());
        add_purchase(&mut tx, &customer.id, 150_000, Utc::now()).await.unwrap();
        reverse_purchase(&mut tx, &customer.id, 200_000, Utc::now()).await.unwrap();
        tx.commit().await.unwrap();

        let stored = db.customers().get_by_id(&customer.id).await.unwrap().unwrap();
        assert_eq!(stored.total_purchases_cents, 0);
        assert!(stored.last_purchase_date.is_some());
    }

    #[tokio::test]
    async fn test_add_purchase_unknown_customer() {
        let db = fixtures::db().await;
        let mut tx = db.begin().await.unwrap();
        assert!(!exists(&mut tx, "nobody").await.unwrap());
        let err = add_purchase(&mut tx, "nobody", 100, Utc::now()).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
