//! # Sale Repository
//!
//! Database operations for sales and sale items.
//!
//! ## Sale Status Transitions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   cash / card ─────────────────────────────────► finalized             │
//! │                                                      ▲                  │
//! │   mpesa ──► pending_payment ──claim_for_completion───┤                  │
//! │                  │     ▲                             │                  │
//! │        mark_failed│     │reopen_for_payment          │                  │
//! │                  ▼     │                             │                  │
//! │                 failed ─┴──claim_for_completion──────┘                  │
//! │                         (late success after expiry)                     │
//! │                                                                         │
//! │  Every transition is a guarded UPDATE … WHERE status IN (…); the       │
//! │  returned bool says whether this caller won the transition.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use duka_core::{Sale, SaleItem, SaleStatus};

/// Filter for [`SaleRepository::list`].
#[derive(Debug, Clone)]
pub struct SaleFilter {
    pub status: Option<SaleStatus>,
    pub employee_id: Option<String>,
    /// Inclusive lower bound on `sale_date`.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `sale_date`.
    pub to: Option<DateTime<Utc>>,
    pub limit: u32,
    pub offset: u32,
}

impl Default for SaleFilter {
    fn default() -> Self {
        SaleFilter {
            status: None,
            employee_id: None,
            from: None,
            to: None,
            limit: 50,
            offset: 0,
        }
    }
}

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Gets a sale by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>("SELECT * FROM sales WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(sale)
    }

    /// Gets a sale by receipt number.
    pub async fn get_by_receipt(&self, receipt_number: &str) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>("SELECT * FROM sales WHERE receipt_number = ?1")
            .bind(receipt_number)
            .fetch_optional(&self.pool)
            .await?;

        Ok(sale)
    }

    /// Gets all items for a sale.
    pub async fn get_items(&self, sale_id: &str) -> DbResult<Vec<SaleItem>> {
        let items = sqlx::query_as::<_, SaleItem>(
            "SELECT * FROM sale_items WHERE sale_id = ?1 ORDER BY created_at, rowid",
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Lists sales, newest first.
    pub async fn list(&self, filter: &SaleFilter) -> DbResult<Vec<Sale>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM sales WHERE 1 = 1");

        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status);
        }
        if let Some(employee_id) = &filter.employee_id {
            qb.push(" AND employee_id = ").push_bind(employee_id.clone());
        }
        if let Some(from) = filter.from {
            qb.push(" AND sale_date >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            qb.push(" AND sale_date < ").push_bind(to);
        }
        qb.push(" ORDER BY sale_date DESC, rowid DESC LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);

        let sales = qb.build_query_as::<Sale>().fetch_all(&self.pool).await?;
        Ok(sales)
    }

    /// Number of rows in `sales` (used by tests and the health endpoint).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Transaction-Scoped Helpers
// =============================================================================

/// Inserts a sale header.
///
/// A clash on `receipt_number` surfaces as `DbError::UniqueViolation` with a
/// field containing `receipt_number`; the caller decides whether to retry.
pub async fn insert_sale(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
    debug!(id = %sale.id, receipt_number = %sale.receipt_number, status = %sale.status, "Inserting sale");

    sqlx::query(
        r#"
        INSERT INTO sales (
            id, customer_id, employee_id, status, payment_method, payment_reference,
            total_cents, discount_cents, tax_cents, receipt_number, sale_date,
            notes, completed_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        "#,
    )
    .bind(&sale.id)
    .bind(&sale.customer_id)
    .bind(&sale.employee_id)
    .bind(sale.status)
    .bind(sale.payment_method)
    .bind(&sale.payment_reference)
    .bind(sale.total_cents)
    .bind(sale.discount_cents)
    .bind(sale.tax_cents)
    .bind(&sale.receipt_number)
    .bind(sale.sale_date)
    .bind(&sale.notes)
    .bind(sale.completed_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Inserts one sale item.
///
/// Product name and unit price are snapshots; later catalog edits don't
/// rewrite history.
pub async fn insert_item(conn: &mut SqliteConnection, item: &SaleItem) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO sale_items (
            id, sale_id, product_id, product_name, quantity,
            unit_price_cents, discount_cents, total_price_cents, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&item.id)
    .bind(&item.sale_id)
    .bind(&item.product_id)
    .bind(&item.product_name)
    .bind(item.quantity)
    .bind(item.unit_price_cents)
    .bind(item.discount_cents)
    .bind(item.total_price_cents)
    .bind(item.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Reads a sale on the caller's connection.
pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Sale>> {
    let sale = sqlx::query_as::<_, Sale>("SELECT * FROM sales WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(sale)
}

/// Reads a sale's items on the caller's connection.
pub async fn fetch_items(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Vec<SaleItem>> {
    let items = sqlx::query_as::<_, SaleItem>(
        "SELECT * FROM sale_items WHERE sale_id = ?1 ORDER BY created_at, rowid",
    )
    .bind(sale_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(items)
}

/// `pending_payment | failed → finalized`. Returns `true` if this call won.
pub async fn claim_for_completion(
    conn: &mut SqliteConnection,
    id: &str,
    payment_reference: Option<&str>,
    at: DateTime<Utc>,
) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE sales SET
            status = 'finalized',
            payment_reference = COALESCE(?2, payment_reference),
            completed_at = ?3
        WHERE id = ?1 AND status IN ('pending_payment', 'failed')
        "#,
    )
    .bind(id)
    .bind(payment_reference)
    .bind(at)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// `pending_payment → failed`. Returns `true` if the sale was pending.
pub async fn mark_failed(conn: &mut SqliteConnection, id: &str) -> DbResult<bool> {
    let result = sqlx::query(
        "UPDATE sales SET status = 'failed' WHERE id = ?1 AND status = 'pending_payment'",
    )
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// `failed → pending_payment`, for a payment retry.
pub async fn reopen_for_payment(conn: &mut SqliteConnection, id: &str) -> DbResult<bool> {
    let result = sqlx::query(
        "UPDATE sales SET status = 'pending_payment' WHERE id = ?1 AND status = 'failed'",
    )
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Deletes a sale; its items go with it (ON DELETE CASCADE).
pub async fn delete(conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
    let result = sqlx::query("DELETE FROM sales WHERE id = ?1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Sale", id));
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
    use duka_core::{PaymentMethod, UserRole};
    use uuid::Uuid;

    fn sale(employee_id: &str, receipt: &str, status: SaleStatus) -> Sale {
        Sale {
            id: Uuid::new_v4().to_string(),
            customer_id: None,
            employee_id: employee_id.to_string(),
            status,
            payment_method: PaymentMethod::Mpesa,
            payment_reference: None,
            total_cents: 90_000,
            discount_cents: 0,
            tax_cents: 0,
            receipt_number: receipt.to_string(),
            sale_date: Utc::now(),
            notes: None,
            completed_at: None,
        }
    }

    fn item(sale_id: &str, product_id: &str) -> SaleItem {
        SaleItem {
            id: Uuid::new_v4().to_string(),
            sale_id: sale_id.to_string(),
            product_id: product_id.to_string(),
            product_name: "Chrome Vodka 750ml".to_string(),
            quantity: 2,
            unit_price_cents: 45_000,
            discount_cents: 0,
            total_price_cents: 90_000,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let db = fixtures::db().await;
        let user = fixtures::user("cashier", UserRole::Employee);
        let product = fixtures::product("Chrome Vodka", 45_000, 10);
        db.users().insert(&user).await.unwrap();
        db.products().insert(&product).await.unwrap();

        let s = sale(&user.id, "RCP1", SaleStatus::PendingPayment);
        let mut tx = db.begin().await.unwrap();
        insert_sale(&mut tx, &s).await.unwrap();
        insert_item(&mut tx, &item(&s.id, &product.id)).await.unwrap();
        tx.commit().await.unwrap();

        let stored = db.sales().get_by_id(&s.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SaleStatus::PendingPayment);
        assert_eq!(stored.payment_method, PaymentMethod::Mpesa);
        assert_eq!(db.sales().get_items(&s.id).await.unwrap().len(), 1);
        assert_eq!(db.sales().get_by_receipt("RCP1").await.unwrap().unwrap().id, s.id);
    }

    #[tokio::test]
    async fn test_duplicate_receipt_is_unique_violation() {
        let db = fixtures::db().await;
        let user = fixtures::user("cashier", UserRole::Employee);
        db.users().insert(&user).await.unwrap();

        let mut tx = db.begin().await.unwrap();
        insert_sale(&mut tx, &sale(&user.id, "RCP1", SaleStatus::Finalized)).await.unwrap();
        let err = insert_sale(&mut tx, &sale(&user.id, "RCP1", SaleStatus::Finalized))
            .await
            .unwrap_err();
        assert!(err.is_unique_on("receipt_number"));
    }

    #[tokio::test]
    async fn test_guarded_transitions() {
        let db = fixtures::db().await;
        let user = fixtures::user("cashier", UserRole::Employee);
        db.users().insert(&user).await.unwrap();
        let s = sale(&user.id, "RCP2", SaleStatus::PendingPayment);

        let mut tx = db.begin().await.unwrap();
        insert_sale(&mut tx, &s).await.unwrap();

        assert!(mark_failed(&mut tx, &s.id).await.unwrap());
        assert!(!mark_failed(&mut tx, &s.id).await.unwrap());
        assert!(reopen_for_payment(&mut tx, &s.id).await.unwrap());

        assert!(claim_for_completion(&mut tx, &s.id, Some("QGH7XYZ"), Utc::now()).await.unwrap());
        assert!(!claim_for_completion(&mut tx, &s.id, Some("QGH7XYZ"), Utc::now()).await.unwrap());
        assert!(!mark_failed(&mut tx, &s.id).await.unwrap());

        let stored = fetch(&mut tx, &s.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SaleStatus::Finalized);
        assert_eq!(stored.payment_reference.as_deref(), Some("QGH7XYZ"));
        assert!(stored.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_delete_cascades_items() {
        let db = fixtures::db().await;
        let user = fixtures::user("cashier", UserRole::Employee);
        let product = fixtures::product("Chrome Vodka", 45_000, 10);
        db.users().insert(&user).await.unwrap();
        db.products().insert(&product).await.unwrap();
        let s = sale(&user.id, "RCP3", SaleStatus::Finalized);

        let mut tx = db.begin().await.unwrap();
        insert_sale(&mut tx, &s).await.unwrap();
        insert_item(&mut tx, &item(&s.id, &product.id)).await.unwrap();
        delete(&mut tx, &s.id).await.unwrap();
        assert!(fetch_items(&mut tx, &s.id).await.unwrap().is_empty());
        assert!(delete(&mut tx, &s.id).await.is_err());
    }

    #[tokio::test]
    async fn test_list_filters() {
        let db = fixtures::db().await;
        let user = fixtures::user("cashier", UserRole::Employee);
        db.users().insert(&user).await.unwrap();

        let mut tx = db.begin().await.unwrap();
        insert_sale(&mut tx, &sale(&user.id, "A", SaleStatus::Finalized)).await.unwrap();
        insert_sale(&mut tx, &sale(&user.id, "B", SaleStatus::PendingPayment)).await.unwrap();
        insert_sale(&mut tx, &sale(&user.id, "C", SaleStatus::Finalized)).await.unwrap();
        tx.commit().await.unwrap();

        let finalized = db
            .sales()
            .list(&SaleFilter {
                status: Some(SaleStatus::Finalized),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(finalized.len(), 2);

        let page = db
            .sales()
            .list(&SaleFilter {
                limit: 1,
                offset: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(db.sales().count().await.unwrap(), 3);
    }
}
