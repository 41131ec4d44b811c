//! # Engine Error Types
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Engine Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐  │
//! │  │   Request       │  │   Business      │  │     Gateway             │  │
//! │  │                 │  │                 │  │                         │  │
//! │  │  Validation     │  │  Insufficient-  │  │  GatewayRejected        │  │
//! │  │  InvalidRef     │  │    Stock        │  │  GatewayUnreachable     │  │
//! │  │  Forbidden      │  │  TotalMismatch  │  │                         │  │
//! │  │  NotFound       │  │  PriceMismatch  │  │  (the sale row is kept  │  │
//! │  │                 │  │  NegativeStock  │  │   in both cases)        │  │
//! │  │                 │  │  DuplicateRcpt  │  │                         │  │
//! │  │                 │  │  InvalidState   │  │                         │  │
//! │  │                 │  │  Conflict       │  │                         │  │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘  │
//! │                                                                         │
//! │  Database  - anything else from duka-db; never shown verbatim to users  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use duka_core::{CoreError, Money, ValidationError};
use duka_db::DbError;
use thiserror::Error;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    // =========================================================================
    // Request Errors
    // =========================================================================
    /// Malformed or out-of-range input. Nothing was written.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A referenced product, customer or user does not exist (or is inactive).
    #[error("{entity} not found or inactive: {id}")]
    InvalidReference { entity: String, id: String },

    /// The actor lacks the admin/manager role.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The entity the operation targets does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    // =========================================================================
    // Business Rule Errors
    // =========================================================================
    #[error("Insufficient stock for {product}: available {available}, requested {requested}")]
    InsufficientStock {
        product: String,
        available: i64,
        requested: i64,
    },

    #[error("Total amount mismatch: computed {computed}, declared {declared}")]
    TotalMismatch { computed: Money, declared: Money },

    #[error("Unit price for {product} is {supplied}, catalog price is {catalog}")]
    PriceMismatch {
        product: String,
        supplied: Money,
        catalog: Money,
    },

    #[error("Stock change rejected for {product}: {previous} {change:+} would leave {result}")]
    NegativeStockRejected {
        product: String,
        previous: i64,
        change: i64,
        result: i64,
    },

    /// Receipt number still collided after the disambiguation retry.
    #[error("Receipt number already exists: {0}")]
    DuplicateReceipt(String),

    /// The entity is not in a state that allows the operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Hard delete refused because other rows still reference the entity.
    #[error("{entity} {id} is still referenced by sales or stock history")]
    Conflict { entity: String, id: String },

    // =========================================================================
    // Gateway Errors
    // =========================================================================
    /// The gateway refused the push. Sale and payment are kept as `failed`.
    #[error("Payment gateway rejected the request ({code}): {message}")]
    GatewayRejected {
        sale_id: Option<String>,
        code: String,
        message: String,
    },

    /// No definite answer from the gateway. Sale and payment stay pending.
    #[error("Payment gateway unreachable: {message}")]
    GatewayUnreachable {
        sale_id: Option<String>,
        message: String,
    },

    // =========================================================================
    // Infrastructure
    // =========================================================================
    #[error("Database error: {0}")]
    Database(DbError),
}

impl EngineError {
    pub fn invalid_reference(entity: impl Into<String>, id: impl Into<String>) -> Self {
        EngineError::InvalidReference {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn conflict(entity: impl Into<String>, id: impl Into<String>) -> Self {
        EngineError::Conflict {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// True for the stock failures a payment callback turns into a
    /// reconciliation notice.
    pub fn is_stock_shortfall(&self) -> bool {
        matches!(
            self,
            EngineError::InsufficientStock { .. } | EngineError::NegativeStockRejected { .. }
        )
    }
}

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InsufficientStock {
                product,
                available,
                requested,
            } => EngineError::InsufficientStock {
                product,
                available,
                requested,
            },
            CoreError::TotalMismatch { computed, declared } => {
                EngineError::TotalMismatch { computed, declared }
            }
            CoreError::PriceMismatch {
                product,
                supplied,
                catalog,
            } => EngineError::PriceMismatch {
                product,
                supplied,
                catalog,
            },
            CoreError::NegativeStockRejected {
                product,
                previous,
                change,
                result,
            } => EngineError::NegativeStockRejected {
                product,
                previous,
                change,
                result,
            },
            CoreError::InvalidTransition { .. } => EngineError::InvalidState(err.to_string()),
            CoreError::Validation(v) => EngineError::Validation(v),
        }
    }
}

impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            other => EngineError::Database(other),
        }
    }
}
