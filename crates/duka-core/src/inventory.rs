//! # Stock Change Rules
//!
//! Every stock mutation is described as a signed `quantity_change` against a
//! `previous_stock`. This module decides whether a change is allowed; the
//! ledger in duka-engine applies it.
//!
//! ```text
//! ┌──────────────┬───────────────────────────┬─────────────────────────┐
//! │ Type         │ quantity_change           │ Extra rule              │
//! ├──────────────┼───────────────────────────┼─────────────────────────┤
//! │ sale         │ < 0                       │                         │
//! │ restock      │ > 0                       │                         │
//! │ adjustment   │ ≠ 0                       │                         │
//! │ return       │ > 0                       │ must reference a sale   │
//! ├──────────────┴───────────────────────────┴─────────────────────────┤
//! │ all: previous_stock + quantity_change ≥ 0                          │
//! └────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::{StockStatus, TransactionType};

/// A validated stock change, ready to be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChange {
    pub previous_stock: i64,
    pub quantity_change: i64,
    pub new_stock: i64,
}

/// Checks a signed change against the per-type rules and the zero floor.
pub fn plan_change(
    product_name: &str,
    kind: TransactionType,
    previous_stock: i64,
    quantity_change: i64,
    has_reference: bool,
) -> CoreResult<StockChange> {
    let sign_ok = match kind {
        TransactionType::Sale => quantity_change < 0,
        TransactionType::Restock | TransactionType::Return => quantity_change > 0,
        TransactionType::Adjustment => quantity_change != 0,
    };
    if !sign_ok {
        let reason = match kind {
            TransactionType::Sale => "must be negative for a sale",
            TransactionType::Restock => "must be positive for a restock",
            TransactionType::Return => "must be positive for a return",
            TransactionType::Adjustment => "must not be zero for an adjustment",
        };
        return Err(ValidationError::invalid_format("quantity_change", reason).into());
    }

    if kind == TransactionType::Return && !has_reference {
        return Err(ValidationError::required("reference_id").into());
    }

    let new_stock = previous_stock + quantity_change;
    if new_stock < 0 {
        return Err(CoreError::NegativeStockRejected {
            product: product_name.to_string(),
            previous: previous_stock,
            change: quantity_change,
            result: new_stock,
        });
    }

    Ok(StockChange {
        previous_stock,
        quantity_change,
        new_stock,
    })
}

/// Turns an absolute target into an adjustment.
///
/// ```rust
/// use duka_core::inventory::plan_adjustment;
///
/// let change = plan_adjustment("Amarula 750ml", 12, 9).unwrap();
/// assert_eq!(change.quantity_change, -3);
/// assert!(plan_adjustment("Amarula 750ml", 12, -1).is_err());
/// ```
pub fn plan_adjustment(
    product_name: &str,
    previous_stock: i64,
    new_absolute_stock: i64,
) -> CoreResult<StockChange> {
    if new_absolute_stock < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "new_stock".to_string(),
        }
        .into());
    }
    plan_change(
        product_name,
        TransactionType::Adjustment,
        previous_stock,
        new_absolute_stock - previous_stock,
        false,
    )
}

/// Stock alert raised when a change moves a product into a worse status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockAlert {
    LowStock,
    OutOfStock,
}

/// Returns an alert only when the status got worse with this change.
///
/// A product already sitting at low stock does not re-alert on every sale.
pub fn stock_alert(change: &StockChange, min_stock_level: i64) -> Option<StockAlert> {
    let before = StockStatus::from_levels(change.previous_stock, min_stock_level);
    let after = StockStatus::from_levels(change.new_stock, min_stock_level);
    match (before, after) {
        (StockStatus::OutOfStock, _) => None,
        (_, StockStatus::OutOfStock) => Some(StockAlert::OutOfStock),
        (StockStatus::InStock, StockStatus::LowStock) => Some(StockAlert::LowStock),
        _ => None,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
