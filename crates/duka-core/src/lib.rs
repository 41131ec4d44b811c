//! # duka-core: Pure Business Logic for Duka POS
//!
//! Everything in this crate is a pure function or a plain data type. The
//! database, the M-Pesa gateway and the HTTP layer all live elsewhere and
//! call in here for the rules.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Duka POS Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 apps/server (axum, JSON over HTTP)              │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │        duka-engine (SaleEngine, InventoryLedger, payments)      │   │
//! │  └──────────┬──────────────────┬────────────────────┬─────────────┘   │
//! │             │                  │                    │                  │
//! │  ┌──────────▼───────┐  ┌───────▼────────┐  ┌────────▼──────────┐      │
//! │  │ duka-db (SQLite) │  │ ★ duka-core ★  │  │ duka-mpesa        │      │
//! │  └──────────────────┘  │                │  │ (Daraja client)   │      │
//! │                        │ money   sale   │  └───────────────────┘      │
//! │                        │ types   mpesa  │                              │
//! │                        │ inventory      │                              │
//! │                        │ validation     │                              │
//! │                        └────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Example
//! ```rust
//! use duka_core::money::Money;
//! use duka_core::sale::line_total;
//!
//! // 3 bottles at KES 450.00 with KES 50.00 off the line
//! let total = line_total(Money::from_cents(45_000), 3, Money::from_cents(5_000));
//! assert_eq!(total.cents(), 130_000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod inventory;
pub mod money;
pub mod mpesa;
pub mod sale;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum number of lines accepted in a single sale.
pub const MAX_SALE_LINES: usize = 100;

/// Maximum quantity of a single line.
///
/// Catches fat-finger entries (1000 instead of 10) at the till.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Default low-stock threshold for new products.
pub const DEFAULT_MIN_STOCK_LEVEL: i64 = 10;

/// Default stock ceiling for new products.
pub const DEFAULT_MAX_STOCK_LEVEL: i64 = 100;
