//! # Catalog Management
//!
//! Products and customers: create, look up, retire, delete.
//!
//! Retiring is `is_active = false`; the row stays, its sale history stays,
//! and new sales can no longer reference it. Hard deletes only succeed for
//! rows nothing points at yet. The FK RESTRICT constraints decide, and a
//! refusal comes back as [`EngineError::Conflict`].
//!
//! Opening stock for a new product is booked through the inventory ledger
//! as a restock, so `products.stock` still only moves through
//! `ledger::apply`.

use std::sync::Arc;

use chrono::Utc;
use duka_core::validation::{sanitize_phone_number, validate_non_negative};
use duka_core::{Customer, CustomerCategory, Money, Product, ValidationError};
use duka_db::{Database, DbError};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::ledger::InventoryLedger;
use crate::users::{require_privileged, UserDirectory};

/// A product as entered by a manager.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub size: Option<String>,
    pub barcode: Option<String>,
    pub price: Money,
    pub cost: Money,
    pub opening_stock: i64,
    pub min_stock_level: i64,
    pub max_stock_level: i64,
}

#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub category: CustomerCategory,
}

#[derive(Clone)]
pub struct Catalog {
    db: Database,
    users: Arc<dyn UserDirectory>,
    ledger: InventoryLedger,
}

impl Catalog {
    pub fn new(db: Database, users: Arc<dyn UserDirectory>, ledger: InventoryLedger) -> Self {
        Catalog { db, users, ledger }
    }

    // =========================================================================
    // Products
    // =========================================================================

    pub async fn create_product(&self, new: NewProduct, actor_id: &str) -> EngineResult<Product> {
        require_privileged(self.users.as_ref(), actor_id, "create products").await?;

        let name = new.name.trim();
        if name.is_empty() {
            return Err(ValidationError::required("name").into());
        }
        validate_non_negative("price", new.price)?;
        validate_non_negative("cost", new.cost)?;
        if new.opening_stock < 0 || new.min_stock_level < 0 {
            return Err(ValidationError::invalid_format("stock", "must not be negative").into());
        }
        if new.max_stock_level < new.min_stock_level {
            return Err(ValidationError::invalid_format(
                "max_stock_level",
                "must not be below min_stock_level",
            )
            .into());
        }

        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            category: non_blank(new.category),
            brand: non_blank(new.brand),
            size: non_blank(new.size),
            barcode: non_blank(new.barcode),
            price_cents: new.price.cents(),
            cost_cents: new.cost.cents(),
            stock: 0,
            min_stock_level: new.min_stock_level,
            max_stock_level: new.max_stock_level,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        self.db.products().insert(&product).await.map_err(|e| match e {
            DbError::UniqueViolation { .. } => ValidationError::invalid_format(
                "barcode",
                "already assigned to another product",
            )
            .into(),
            other => EngineError::from(other),
        })?;
        info!(product_id = %product.id, name = %product.name, actor = %actor_id, "Product created");

        if new.opening_stock > 0 {
            self.ledger
                .restock(
                    &product.id,
                    new.opening_stock,
                    actor_id,
                    Some("Opening stock".to_string()),
                )
                .await?;
        }

        self.get_product(&product.id).await
    }

    pub async fn get_product(&self, id: &str) -> EngineResult<Product> {
        self.db
            .products()
            .get_by_id(id)
            .await?
            .ok_or_else(|| EngineError::not_found("Product", id))
    }

    pub async fn search_products(&self, query: &str, limit: u32) -> EngineResult<Vec<Product>> {
        Ok(self.db.products().search(query, limit).await?)
    }

    /// Retires (or restores) a product. Works whatever its history.
    pub async fn set_product_active(&self, id: &str, active: bool, actor_id: &str) -> EngineResult<Product> {
        require_privileged(self.users.as_ref(), actor_id, "change products").await?;
        self.db.products().set_active(id, active).await?;
        info!(product_id = %id, active, actor = %actor_id, "Product availability changed");
        self.get_product(id).await
    }

    pub async fn delete_product(&self, id: &str, actor_id: &str) -> EngineResult<()> {
        require_privileged(self.users.as_ref(), actor_id, "delete products").await?;
        self.db
            .products()
            .delete(id)
            .await
            .map_err(|e| referenced_or(e, "Product", id))?;
        info!(product_id = %id, actor = %actor_id, "Product deleted");
        Ok(())
    }

    // =========================================================================
    // Customers
    // =========================================================================

    /// Any active user may register a customer at the till.
    pub async fn create_customer(&self, new: NewCustomer, actor_id: &str) -> EngineResult<Customer> {
        if !self.users.user_exists(actor_id).await? {
            return Err(EngineError::invalid_reference("User", actor_id));
        }
        let name = new.name.trim();
        if name.is_empty() {
            return Err(ValidationError::required("name").into());
        }
        let phone = match non_blank(new.phone) {
            Some(raw) => Some(sanitize_phone_number(&raw)?),
            None => None,
        };

        let now = Utc::now();
        let customer = Customer {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            email: non_blank(new.email),
            phone,
            category: new.category,
            total_purchases_cents: 0,
            last_purchase_date: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.db.customers().insert(&customer).await?;
        info!(customer_id = %customer.id, actor = %actor_id, "Customer created");
        Ok(customer)
    }

    pub async fn get_customer(&self, id: &str) -> EngineResult<Customer> {
        self.db
            .customers()
            .get_by_id(id)
            .await?
            .ok_or_else(|| EngineError::not_found("Customer", id))
    }

    pub async fn search_customers(&self, query: &str, limit: u32) -> EngineResult<Vec<Customer>> {
        Ok(self.db.customers().search(query, limit).await?)
    }

    pub async fn set_customer_active(&self, id: &str, active: bool, actor_id: &str) -> EngineResult<Customer> {
        require_privileged(self.users.as_ref(), actor_id, "change customers").await?;
        self.db.customers().set_active(id, active).await?;
        info!(customer_id = %id, active, actor = %actor_id, "Customer availability changed");
        self.get_customer(id).await
    }

    pub async fn delete_customer(&self, id: &str, actor_id: &str) -> EngineResult<()> {
        require_privileged(self.users.as_ref(), actor_id, "delete customers").await?;
        self.db
            .customers()
            .delete(id)
            .await
            .map_err(|e| referenced_or(e, "Customer", id))?;
        info!(customer_id = %id, actor = %actor_id, "Customer deleted");
        Ok(())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn referenced_or(err: DbError, entity: &str, id: &str) -> EngineError {
    match err {
        DbError::ForeignKeyViolation { .. } => {
            warn!(entity, id, "Delete refused; rows still reference it");
            EngineError::conflict(entity, id)
        }
        other => other.into(),
    }
}
