//! # Inventory Ledger
//!
//! Every stock change in the system, whether a sale, a restock, an
//! adjustment or a return, goes through [`apply`]. It is the only code that
//! writes `products.stock`, and it always writes the matching
//! `inventory_transactions` row in the same transaction.
//!
//! ## Choke Point
//! ```text
//! apply(conn, movement)
//!   1. lock     UPDATE products SET updated_at  (makes the txn a writer)
//!   2. read     SELECT * FROM products
//!   3. plan     duka_core::inventory::plan_change   (sign, floor, reference)
//!   4. cap      returns ≤ sold − already returned
//!   5. write    UPDATE products SET stock
//!   6. record   INSERT INTO inventory_transactions
//! ```
//!
//! `InventoryLedger` wraps the choke point in its own transaction for the
//! manual operations (restock, adjust, return). `SaleEngine` calls
//! [`apply`] directly inside the sale transaction.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use duka_core::inventory::{plan_adjustment, plan_change, stock_alert, StockAlert, StockChange};
use duka_core::{InventoryTransaction, Product, SaleStatus, TransactionType, ValidationError};
use duka_db::repository::{inventory, product, sale};
use duka_db::{Database, InventoryFilter, SqliteConnection};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::events::{Event, EventSink};
use crate::users::{require_privileged, UserDirectory};

// =============================================================================
// Connection-Level Choke Point
// =============================================================================

/// One requested stock change.
#[derive(Debug, Clone)]
pub(crate) struct Movement<'a> {
    pub product_id: &'a str,
    pub kind: TransactionType,
    pub quantity_change: i64,
    pub actor_id: Option<&'a str>,
    pub reference_id: Option<&'a str>,
    pub notes: Option<String>,
}

/// What [`apply`] wrote.
#[derive(Debug, Clone)]
pub(crate) struct Applied {
    pub entry: InventoryTransaction,
    pub product_name: String,
    pub min_stock_level: i64,
    pub alert: Option<StockAlert>,
}

impl Applied {
    /// Low/out-of-stock event, if this change crossed a threshold.
    pub fn alert_event(&self) -> Option<Event> {
        match self.alert? {
            StockAlert::LowStock => Some(Event::LowStock {
                product_id: self.entry.product_id.clone(),
                product_name: self.product_name.clone(),
                stock: self.entry.new_stock,
                min_stock_level: self.min_stock_level,
            }),
            StockAlert::OutOfStock => Some(Event::OutOfStock {
                product_id: self.entry.product_id.clone(),
                product_name: self.product_name.clone(),
            }),
        }
    }
}

/// Takes the write lock on a product and reads it.
pub(crate) async fn lock_product(
    conn: &mut SqliteConnection,
    product_id: &str,
    at: DateTime<Utc>,
) -> EngineResult<Product> {
    if !product::touch(conn, product_id, at).await? {
        return Err(EngineError::invalid_reference("Product", product_id));
    }
    product::fetch(conn, product_id)
        .await?
        .ok_or_else(|| EngineError::invalid_reference("Product", product_id))
}

/// Plans and writes one movement.
pub(crate) async fn apply(
    conn: &mut SqliteConnection,
    movement: Movement<'_>,
    at: DateTime<Utc>,
) -> EngineResult<Applied> {
    let current = lock_product(conn, movement.product_id, at).await?;
    let change = plan_change(
        &current.name,
        movement.kind,
        current.stock,
        movement.quantity_change,
        movement.reference_id.is_some(),
    )?;
    write_planned(conn, &current, movement, change, at).await
}

/// Writes a change that has already been planned against `current`.
pub(crate) async fn write_planned(
    conn: &mut SqliteConnection,
    current: &Product,
    movement: Movement<'_>,
    change: StockChange,
    at: DateTime<Utc>,
) -> EngineResult<Applied> {
    if movement.kind == TransactionType::Return {
        if let Some(reference_id) = movement.reference_id {
            let returnable = returnable_units(conn, reference_id, &current.id).await?;
            if change.quantity_change > returnable {
                return Err(ValidationError::OutOfRange {
                    field: "quantity".to_string(),
                    min: 1,
                    max: returnable,
                }
                .into());
            }
        }
    }

    product::set_stock(conn, &current.id, change.new_stock, at).await?;

    let entry = InventoryTransaction {
        id: Uuid::new_v4().to_string(),
        product_id: current.id.clone(),
        transaction_type: movement.kind,
        quantity_change: change.quantity_change,
        previous_stock: change.previous_stock,
        new_stock: change.new_stock,
        reference_id: movement.reference_id.map(str::to_string),
        notes: movement.notes,
        created_by: movement.actor_id.map(str::to_string),
        created_at: at,
    };
    inventory::insert_transaction(conn, &entry).await?;

    Ok(Applied {
        entry,
        product_name: current.name.clone(),
        min_stock_level: current.min_stock_level,
        alert: stock_alert(&change, current.min_stock_level),
    })
}

/// Units of `product_id` sold under `sale_id` and not yet returned.
pub(crate) async fn returnable_units(
    conn: &mut SqliteConnection,
    sale_id: &str,
    product_id: &str,
) -> EngineResult<i64> {
    let sold = inventory::units_for_reference(conn, sale_id, product_id, TransactionType::Sale).await?;
    let returned =
        inventory::units_for_reference(conn, sale_id, product_id, TransactionType::Return).await?;
    Ok((sold - returned).max(0))
}

// =============================================================================
// Inventory Ledger Service
// =============================================================================

/// Manual stock operations: restock, adjust, return, history, cleanup.
#[derive(Clone)]
pub struct InventoryLedger {
    db: Database,
    users: Arc<dyn UserDirectory>,
    events: Arc<dyn EventSink>,
}

impl InventoryLedger {
    pub fn new(db: Database, users: Arc<dyn UserDirectory>, events: Arc<dyn EventSink>) -> Self {
        InventoryLedger { db, users, events }
    }

    /// Records an arbitrary movement (admin/manager only).
    pub async fn record_transaction(
        &self,
        product_id: &str,
        kind: TransactionType,
        quantity_change: i64,
        actor_id: &str,
        reference_id: Option<&str>,
        notes: Option<String>,
    ) -> EngineResult<InventoryTransaction> {
        require_privileged(self.users.as_ref(), actor_id, "record inventory transactions").await?;

        let now = Utc::now();
        let mut tx = self.db.begin().await?;
        let applied = apply(
            &mut tx,
            Movement {
                product_id,
                kind,
                quantity_change,
                actor_id: Some(actor_id),
                reference_id,
                notes,
            },
            now,
        )
        .await?;
        tx.commit().await.map_err(duka_db::DbError::from)?;

        self.after_commit(&applied, actor_id).await;
        Ok(applied.entry)
    }

    /// Adds `quantity` units from a delivery.
    pub async fn restock(
        &self,
        product_id: &str,
        quantity: i64,
        actor_id: &str,
        notes: Option<String>,
    ) -> EngineResult<InventoryTransaction> {
        if quantity <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "quantity".to_string(),
            }
            .into());
        }
        let notes = notes
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("Restocked {} units", quantity));

        self.record_transaction(product_id, TransactionType::Restock, quantity, actor_id, None, Some(notes))
            .await
    }

    /// Sets stock to a counted value.
    pub async fn adjust(
        &self,
        product_id: &str,
        new_absolute_stock: i64,
        actor_id: &str,
        reason: &str,
    ) -> EngineResult<InventoryTransaction> {
        require_privileged(self.users.as_ref(), actor_id, "adjust stock").await?;
        if reason.trim().is_empty() {
            return Err(ValidationError::required("reason").into());
        }

        let now = Utc::now();
        let mut tx = self.db.begin().await?;
        let current = lock_product(&mut tx, product_id, now).await?;
        let change = plan_adjustment(&current.name, current.stock, new_absolute_stock)?;
        let applied = write_planned(
            &mut tx,
            &current,
            Movement {
                product_id,
                kind: TransactionType::Adjustment,
                quantity_change: change.quantity_change,
                actor_id: Some(actor_id),
                reference_id: None,
                notes: Some(format!("Inventory adjustment: {}", reason.trim())),
            },
            change,
            now,
        )
        .await?;
        tx.commit().await.map_err(duka_db::DbError::from)?;

        info!(
            product_id = %product_id,
            previous = applied.entry.previous_stock,
            new = applied.entry.new_stock,
            "Stock adjusted"
        );

        self.after_commit(&applied, actor_id).await;
        Ok(applied.entry)
    }

    /// Puts returned units from a finalized sale back on the shelf.
    pub async fn return_items(
        &self,
        sale_id: &str,
        product_id: &str,
        quantity: i64,
        actor_id: &str,
        notes: Option<String>,
    ) -> EngineResult<InventoryTransaction> {
        require_privileged(self.users.as_ref(), actor_id, "record returns").await?;
        if quantity <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "quantity".to_string(),
            }
            .into());
        }

        let now = Utc::now();
        let mut tx = self.db.begin().await?;
        let current = lock_product(&mut tx, product_id, now).await?;

        let original = sale::fetch(&mut tx, sale_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Sale", sale_id))?;
        if original.status != SaleStatus::Finalized {
            return Err(EngineError::InvalidState(format!(
                "sale {} is {}, only finalized sales accept returns",
                original.receipt_number, original.status
            )));
        }

        let change = plan_change(&current.name, TransactionType::Return, current.stock, quantity, true)?;
        let notes = notes
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("Return from sale {}", original.receipt_number));
        let applied = write_planned(
            &mut tx,
            &current,
            Movement {
                product_id,
                kind: TransactionType::Return,
                quantity_change: quantity,
                actor_id: Some(actor_id),
                reference_id: Some(sale_id),
                notes: Some(notes),
            },
            change,
            now,
        )
        .await?;
        tx.commit().await.map_err(duka_db::DbError::from)?;

        self.after_commit(&applied, actor_id).await;
        Ok(applied.entry)
    }

    /// Ledger rows, newest first.
    pub async fn history(&self, filter: &InventoryFilter) -> EngineResult<Vec<InventoryTransaction>> {
        Ok(self.db.inventory().history(filter).await?)
    }

    /// Deletes ledger rows older than `days` days. Returns how many went.
    pub async fn purge_older_than(&self, days: u32, actor_id: &str) -> EngineResult<u64> {
        require_privileged(self.users.as_ref(), actor_id, "clean up inventory history").await?;
        if days == 0 {
            return Err(ValidationError::MustBePositive {
                field: "days".to_string(),
            }
            .into());
        }

        let cutoff = Utc::now() - Duration::days(i64::from(days));
        let deleted = self.db.inventory().purge_older_than(cutoff).await?;
        info!(deleted, days, "Purged old inventory transactions");

        self.events
            .emit(Event::CleanupCompleted {
                deleted,
                older_than_days: days,
                actor_id: actor_id.to_string(),
            })
            .await;
        Ok(deleted)
    }

    /// Active products at or below their minimum level.
    pub async fn low_stock_products(&self, limit: u32) -> EngineResult<Vec<Product>> {
        Ok(self.db.products().low_stock(limit).await?)
    }

    async fn after_commit(&self, applied: &Applied, actor_id: &str) {
        debug!(
            product_id = %applied.entry.product_id,
            kind = %applied.entry.transaction_type,
            change = applied.entry.quantity_change,
            "Inventory transaction committed"
        );

        self.events
            .emit(Event::StockAdjusted {
                product_id: applied.entry.product_id.clone(),
                product_name: applied.product_name.clone(),
                kind: applied.entry.transaction_type,
                previous_stock: applied.entry.previous_stock,
                new_stock: applied.entry.new_stock,
                actor_id: actor_id.to_string(),
                notes: applied.entry.notes.clone(),
            })
            .await;

        if let Some(event) = applied.alert_event() {
            self.events.emit(event).await;
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{self, RecordingSink};
    use duka_core::UserRole;

    struct Setup {
        db: Database,
        ledger: InventoryLedger,
        sink: Arc<RecordingSink>,
        admin: String,
        cashier: String,
    }

    async fn setup() -> Setup {
        let db = testkit::db().await;
        let admin = testkit::user(&db, "admin", UserRole::Admin).await;
        let cashier = testkit::user(&db, "cashier", UserRole::Employee).await;
        let sink = Arc::new(RecordingSink::default());
        let ledger = InventoryLedger::new(db.clone(), Arc::new(db.users()), sink.clone());
        Setup {
            db,
            ledger,
            sink,
            admin,
            cashier,
        }
    }

    async fn stock_of(db: &Database, id: &str) -> i64 {
        db.products().get_by_id(id).await.unwrap().unwrap().stock
    }

    #[tokio::test]
    async fn test_restock_writes_entry_and_stock() {
        let s = setup().await;
        let product = testkit::product(&s.db, "Jameson 750ml", 320_000, 4).await;

        let entry = s.ledger.restock(&product, 20, &s.admin, None).await.unwrap();
        assert_eq!(entry.previous_stock, 4);
        assert_eq!(entry.new_stock, 24);
        assert_eq!(entry.notes.as_deref(), Some("Restocked 20 units"));
        assert_eq!(stock_of(&s.db, &product).await, 24);
        assert!(s.sink.names().contains(&"stock_adjusted"));
    }

    #[tokio::test]
    async fn test_restock_requires_privileged_actor() {
        let s = setup().await;
        let product = testkit::product(&s.db, "Jameson 750ml", 320_000, 4).await;

        let err = s.ledger.restock(&product, 5, &s.cashier, None).await.unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));
        assert_eq!(stock_of(&s.db, &product).await, 4);
    }

    #[tokio::test]
    async fn test_adjust() {
        let s = setup().await;
        let product = testkit::product(&s.db, "Smirnoff Vodka 750ml", 150_000, 20).await;

        let entry = s.ledger.adjust(&product, 3, &s.admin, "stock count").await.unwrap();
        assert_eq!(entry.quantity_change, -17);
        assert_eq!(entry.notes.as_deref(), Some("Inventory adjustment: stock count"));
        assert_eq!(stock_of(&s.db, &product).await, 3);
        // min level is 5 in the fixture
        assert!(s.sink.names().contains(&"low_stock"));

        let err = s.ledger.adjust(&product, -1, &s.admin, "typo").await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let err = s.ledger.adjust(&product, 3, &s.admin, "recount").await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(stock_of(&s.db, &product).await, 3);
    }

    #[tokio::test]
    async fn test_negative_stock_rejected_and_nothing_written() {
        let s = setup().await;
        let product = testkit::product(&s.db, "Tusker Lager 500ml", 25_000, 2).await;

        let err = s
            .ledger
            .record_transaction(&product, TransactionType::Adjustment, -3, &s.admin, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NegativeStockRejected { .. }));
        assert_eq!(stock_of(&s.db, &product).await, 2);

        let history = s
            .ledger
            .history(&InventoryFilter {
                product_id: Some(product.clone()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_return_is_capped_by_quantity_sold() {
        let s = setup().await;
        let product = testkit::product(&s.db, "Amarula 750ml", 220_000, 10).await;
        let sale_id = testkit::finalized_sale(&s.db, &s.cashier, &product, 3).await;
        assert_eq!(stock_of(&s.db, &product).await, 7);

        s.ledger.return_items(&sale_id, &product, 2, &s.admin, None).await.unwrap();
        assert_eq!(stock_of(&s.db, &product).await, 9);

        let err = s.ledger.return_items(&sale_id, &product, 2, &s.admin, None).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        s.ledger.return_items(&sale_id, &product, 1, &s.admin, None).await.unwrap();
        assert_eq!(stock_of(&s.db, &product).await, 10);
    }

    #[tokio::test]
    async fn test_return_without_sale_reference_rejected() {
        let s = setup().await;
        let product = testkit::product(&s.db, "Amarula 750ml", 220_000, 10).await;

        let err = s
            .ledger
            .record_transaction(&product, TransactionType::Return, 1, &s.admin, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unknown_product_is_invalid_reference() {
        let s = setup().await;
        let err = s.ledger.restock("nope", 1, &s.admin, None).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidReference { .. }));
    }

    #[tokio::test]
    async fn test_purge_emits_cleanup_event() {
        let s = setup().await;
        let product = testkit::product(&s.db, "Chrome Vodka 250ml", 35_000, 10).await;
        s.ledger.restock(&product, 5, &s.admin, None).await.unwrap();

        // Fresh rows survive a 30-day cutoff
        let deleted = s.ledger.purge_older_than(30, &s.admin).await.unwrap();
        assert_eq!(deleted, 0);
        assert!(s.sink.names().contains(&"cleanup_completed"));

        assert!(s.ledger.purge_older_than(0, &s.admin).await.is_err());
        assert!(matches!(
            s.ledger.purge_older_than(30, &s.cashier).await,
            Err(EngineError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_low_stock_products() {
        let s = setup().await;
        let low = testkit::product(&s.db, "Kenya Cane 750ml", 90_000, 2).await;
        testkit::product(&s.db, "Captain Morgan 750ml", 180_000, 50).await;

        let products = s.ledger.low_stock_products(10).await.unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].id, low);
    }
}
