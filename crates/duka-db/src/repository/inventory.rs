//! # Inventory Ledger Repository
//!
//! Append-only rows in `inventory_transactions`. Each row records the stock
//! before and after, so the history can be replayed without trusting the
//! current `products.stock` value.
//!
//! Rows are only ever removed by retention cleanup ([`InventoryRepository::purge_older_than`]).

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::DbResult;
use duka_core::{InventoryTransaction, TransactionType};

/// Filter for [`InventoryRepository::history`].
#[derive(Debug, Clone)]
pub struct InventoryFilter {
    pub product_id: Option<String>,
    pub transaction_type: Option<TransactionType>,
    pub limit: u32,
    pub offset: u32,
}

impl Default for InventoryFilter {
    fn default() -> Self {
        InventoryFilter {
            product_id: None,
            transaction_type: None,
            limit: 100,
            offset: 0,
        }
    }
}

/// Repository for ledger reads and retention.
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    /// Creates a new InventoryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    /// Ledger rows, newest first.
    pub async fn history(&self, filter: &InventoryFilter) -> DbResult<Vec<InventoryTransaction>> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM inventory_transactions WHERE 1 = 1");

        if let Some(product_id) = &filter.product_id {
            qb.push(" AND product_id = ").push_bind(product_id.clone());
        }
        if let Some(kind) = filter.transaction_type {
            qb.push(" AND transaction_type = ").push_bind(kind);
        }
        qb.push(" ORDER BY created_at DESC, rowid DESC LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);

        let rows = qb
            .build_query_as::<InventoryTransaction>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// All rows that reference a given sale, oldest first.
    pub async fn for_reference(&self, reference_id: &str) -> DbResult<Vec<InventoryTransaction>> {
        let rows = sqlx::query_as::<_, InventoryTransaction>(
            "SELECT * FROM inventory_transactions WHERE reference_id = ?1 ORDER BY created_at, rowid",
        )
        .bind(reference_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Deletes rows created before `cutoff`. Returns how many went.
    pub async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM inventory_transactions WHERE created_at < ?1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        info!(cutoff = %cutoff, deleted = result.rows_affected(), "Purged old inventory transactions");
        Ok(result.rows_affected())
    }
}

// =============================================================================
// Transaction-Scoped Helpers
// =============================================================================

/// Appends a ledger row.
pub async fn insert_transaction(
    conn: &mut SqliteConnection,
    entry: &InventoryTransaction,
) -> DbResult<()> {
    debug!(
        product_id = %entry.product_id,
        kind = %entry.transaction_type,
        change = entry.quantity_change,
        new_stock = entry.new_stock,
        "Recording inventory transaction"
    );

    sqlx::query(
        r#"
        INSERT INTO inventory_transactions (
            id, product_id, transaction_type, quantity_change, previous_stock,
            new_stock, reference_id, notes, created_by, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.product_id)
    .bind(entry.transaction_type)
    .bind(entry.quantity_change)
    .bind(entry.previous_stock)
    .bind(entry.new_stock)
    .bind(&entry.reference_id)
    .bind(&entry.notes)
    .bind(&entry.created_by)
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// True when any row of `kind` references `reference_id`.
pub async fn has_entries(
    conn: &mut SqliteConnection,
    reference_id: &str,
    kind: TransactionType,
) -> DbResult<bool> {
    let found: Option<i64> = sqlx::query_scalar(
        "SELECT 1 FROM inventory_transactions WHERE reference_id = ?1 AND transaction_type = ?2 LIMIT 1",
    )
    .bind(reference_id)
    .bind(kind)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(found.is_some())
}

/// Units moved by rows of `kind` for one product under one reference.
///
/// Sums absolute values, so it reads the same for sales (negative) and
/// returns (positive).
pub async fn units_for_reference(
    conn: &mut SqliteConnection,
    reference_id: &str,
    product_id: &str,
    kind: TransactionType,
) -> DbResult<i64> {
    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(ABS(quantity_change)), 0)
        FROM inventory_transactions
        WHERE reference_id = ?1 AND product_id = ?2 AND transaction_type = ?3
        "#,
    )
    .bind(reference_id)
    .bind(product_id)
    .bind(kind)
    .fetch_one(&mut *conn)
    .await?;

    Ok(total)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures;
    use chrono::Duration;
    use uuid::Uuid;

    fn entry(
        product_id: &str,
        kind: TransactionType,
        previous: i64,
        change: i64,
        reference: Option<&str>,
        at: DateTime<Utc>,
    ) -> InventoryTransaction {
        InventoryTransaction {
            id: Uuid::new_v4().to_string(),
            product_id: product_id.to_string(),
            transaction_type: kind,
            quantity_change: change,
            previous_stock: previous,
            new_stock: previous + change,
            reference_id: reference.map(str::to_string),
            notes: None,
            created_by: None,
            created_at: at,
        }
    }

    #[tokio::test]
    async fn test_reference_queries() {
        let db = fixtures::db().await;
        let product = fixtures::product("Jameson", 280_000, 10);
        db.products().insert(&product).await.unwrap();
        let now = Utc::now();

        let mut tx = db.begin().await.unwrap();
        insert_transaction(&mut tx, &entry(&product.id, TransactionType::Sale, 10, -3, Some("s1"), now))
            .await
            .unwrap();
        insert_transaction(&mut tx, &entry(&product.id, TransactionType::Return, 7, 1, Some("s1"), now))
            .await
            .unwrap();

        assert!(has_entries(&mut tx, "s1", TransactionType::Sale).await.unwrap());
        assert!(!has_entries(&mut tx, "s2", TransactionType::Sale).await.unwrap());
        assert_eq!(
            units_for_reference(&mut tx, "s1", &product.id, TransactionType::Sale).await.unwrap(),
            3
        );
        assert_eq!(
            units_for_reference(&mut tx, "s1", &product.id, TransactionType::Return).await.unwrap(),
            1
        );
        tx.commit().await.unwrap();

        assert_eq!(db.inventory().for_reference("s1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_ledger_row_must_add_up() {
        let db = fixtures::db().await;
        let product = fixtures::product("Jameson", 280_000, 10);
        db.products().insert(&product).await.unwrap();

        let mut bad = entry(&product.id, TransactionType::Restock, 10, 5, None, Utc::now());
        bad.new_stock = 99;
        let mut tx = db.begin().await.unwrap();
        assert!(insert_transaction(&mut tx, &bad).await.is_err());
    }

    #[tokio::test]
    async fn test_history_and_purge() {
        let db = fixtures::db().await;
        let product = fixtures::product("Jameson", 280_000, 10);
        db.products().insert(&product).await.unwrap();
        let old = Utc::now() - Duration::days(120);
        let recent = Utc::now();

        let mut tx = db.begin().await.unwrap();
        insert_transaction(&mut tx, &entry(&product.id, TransactionType::Restock, 0, 10, None, old))
            .await
            .unwrap();
        insert_transaction(&mut tx, &entry(&product.id, TransactionType::Sale, 10, -2, Some("s"), recent))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let sales_only = db
            .inventory()
            .history(&InventoryFilter {
                transaction_type: Some(TransactionType::Sale),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(sales_only.len(), 1);

        let purged = db
            .inventory()
            .purge_older_than(Utc::now() - Duration::days(90))
            .await
            .unwrap();
        assert_eq!(purged, 1);

        let rest = db
            .inventory()
            .history(&InventoryFilter {
                product_id: Some(product.id.clone()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].transaction_type, TransactionType::Sale);
    }
}
