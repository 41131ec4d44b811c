//! # duka-db: Database Layer for Duka POS
//!
//! SQLite storage for the POS backend, accessed through sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Duka POS Data Flow                               │
//! │                                                                         │
//! │  SaleEngine / InventoryLedger / PaymentCoordinator (duka-engine)       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     duka-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐   ┌──────────────┐   │   │
//! │  │   │   Database    │    │  Repositories  │   │  Migrations  │   │   │
//! │  │   │   (pool.rs)   │    │                │   │  (embedded)  │   │   │
//! │  │   │               │    │ ProductRepo    │   │ 001_initial  │   │   │
//! │  │   │ SqlitePool    │◄───│ SaleRepo       │   │  _schema.sql │   │   │
//! │  │   │ begin() → tx  │    │ MpesaPayment.. │   │              │   │   │
//! │  │   └───────────────┘    └────────────────┘   └──────────────┘   │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database file (WAL mode)                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Two Ways In
//!
//! - Repository methods (`db.sales().get_by_id(..)`) run against the pool.
//! - Free functions taking `&mut SqliteConnection` (`repository::sale::insert_sale`)
//!   run inside a transaction owned by the caller. The engine uses these so
//!   that a sale, its items and its ledger rows commit together.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use duka_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("./duka.db")).await?;
//! let low = db.products().low_stock(50).await?;
//!
//! let mut tx = db.begin().await?;
//! duka_db::repository::product::touch(&mut tx, &product_id).await?;
//! tx.commit().await?;
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

// Repository re-exports for convenience
pub use repository::audit::AuditRepository;
pub use repository::customer::CustomerRepository;
pub use repository::inventory::{InventoryFilter, InventoryRepository};
pub use repository::notification::NotificationRepository;
pub use repository::payment::MpesaPaymentRepository;
pub use repository::product::ProductRepository;
pub use repository::sale::{SaleFilter, SaleRepository};
pub use repository::till::TillPaymentRepository;
pub use repository::user::UserRepository;

/// Connection type accepted by the transaction-scoped helpers.
pub use sqlx::SqliteConnection;
