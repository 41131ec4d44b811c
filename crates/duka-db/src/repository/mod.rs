//! # Repository Module
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Read paths / single-statement writes                                  │
//! │       │   db.sales().get_by_id(id)                                     │
//! │       ▼                                                                 │
//! │  XRepository { pool }  ──►  SqlitePool                                 │
//! │                                                                         │
//! │  Multi-statement units of work (engine)                                │
//! │       │   let mut tx = db.begin().await?;                              │
//! │       │   sale::insert_sale(&mut tx, &sale).await?;                    │
//! │       │   inventory::insert_transaction(&mut tx, &entry).await?;       │
//! │       ▼   tx.commit().await?;                                          │
//! │  free fn (conn: &mut SqliteConnection)  ──►  one transaction           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`](product::ProductRepository) - catalog and stock
//! - [`CustomerRepository`](customer::CustomerRepository) - customers and purchase totals
//! - [`UserRepository`](user::UserRepository) - staff accounts
//! - [`SaleRepository`](sale::SaleRepository) - sales and sale items
//! - [`InventoryRepository`](inventory::InventoryRepository) - stock ledger
//! - [`MpesaPaymentRepository`](payment::MpesaPaymentRepository) - STK push attempts
//! - [`TillPaymentRepository`](till::TillPaymentRepository) - direct till payments
//! - [`NotificationRepository`](notification::NotificationRepository)
//! - [`AuditRepository`](audit::AuditRepository)

pub mod audit;
pub mod customer;
pub mod inventory;
pub mod notification;
pub mod payment;
pub mod product;
pub mod sale;
pub mod till;
pub mod user;
