//! # duka-engine: Sale, Inventory and Payment Workflows
//!
//! Each public operation here is one unit of work: it validates, opens a
//! transaction, writes through `duka-db`, commits, then reports events.
//!
//! ## Components
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  SaleEngine            InventoryLedger          PaymentCoordinator      │
//! │  ──────────            ───────────────          ──────────────────      │
//! │  create_sale           record_transaction       handle_payment_result   │
//! │  complete_pending_sale restock / adjust         handle_stk_callback     │
//! │  delete_sale           return_items             refresh_status          │
//! │  get_sale / list_sales history                  expire_stale            │
//! │  retry_mobile_payment  purge_older_than         record_till_payment     │
//! │        │                     │                          │               │
//! │        └──────────┬──────────┘                          │               │
//! │                   ▼                                     │               │
//! │             ledger::apply  ◄──── complete_pending_sale ─┘               │
//! │      (the only code that changes products.stock)                        │
//! │                   ▲                                                     │
//! │  Catalog ─────────┘ opening stock                                       │
//! │  products / customers: create, retire, delete (FK RESTRICT → Conflict)  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Seams
//! - [`PaymentGateway`](duka_mpesa::PaymentGateway): STK push and status query
//! - [`UserDirectory`]: does a user exist, may they do privileged things
//! - [`EventSink`]: notifications and audit rows, written after commit
//!
//! ## Concurrency
//! Every write transaction starts with a write (touching the product row or a
//! guarded status UPDATE), so SQLite hands out its write lock before anything
//! is read. Two sales of the last bottle serialize; the second sees the first
//! one's stock and fails with `InsufficientStock`.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod catalog;
pub mod error;
pub mod events;
pub mod ledger;
pub mod payment;
pub mod sale;
pub mod users;

#[cfg(test)]
pub(crate) mod testkit;

// =============================================================================
// Re-exports
// =============================================================================

pub use catalog::{Catalog, NewCustomer, NewProduct};
pub use error::{EngineError, EngineResult};
pub use events::{Event, EventSink, NoOpSink, StoreEventSink};
pub use ledger::InventoryLedger;
pub use payment::{PaymentCoordinator, PaymentResult};
pub use sale::{CompletionOutcome, NewSale, PendingPayment, SaleDetail, SaleEngine, SaleOutcome};
pub use users::UserDirectory;
