//! # Error Types
//!
//! Domain-specific error types for duka-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  duka-core (this file)                                                 │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  duka-db              DbError       - Database operation failures      │
//! │  duka-mpesa           GatewayError  - Daraja API failures              │
//! │  duka-engine          EngineError   - Workflow failures (wraps above)  │
//! │  apps/server          ApiError      - What the POS client sees         │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → ApiError → Client   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::money::Money;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Trying to sell more than is on the shelf.
    ///
    /// ## User Workflow
    /// ```text
    /// Sale line: Tusker Lager 500ml × 5
    ///      │
    ///      ▼
    /// Check stock: available = 3
    ///      │
    ///      ▼
    /// InsufficientStock { product: "Tusker Lager 500ml", available: 3, requested: 5 }
    ///      │
    ///      ▼
    /// POS shows: "Insufficient stock for Tusker Lager 500ml: available 3, requested 5"
    /// ```
    #[error("Insufficient stock for {product}: available {available}, requested {requested}")]
    InsufficientStock {
        product: String,
        available: i64,
        requested: i64,
    },

    /// The client's declared total disagrees with the sum of line totals.
    #[error("Total amount mismatch: computed {computed}, declared {declared}")]
    TotalMismatch { computed: Money, declared: Money },

    /// A stock change would leave the product below zero.
    #[error("Stock change rejected for {product}: {previous} {change:+} would leave {result}")]
    NegativeStockRejected {
        product: String,
        previous: i64,
        change: i64,
        result: i64,
    },

    /// Client-supplied unit price differs from the catalog price.
    #[error("Unit price for {product} is {supplied}, catalog price is {catalog}")]
    PriceMismatch {
        product: String,
        supplied: Money,
        catalog: Money,
    },

    /// Entity is not in a state that allows the operation.
    #[error("{entity} {id} is {status}, cannot {operation}")]
    InvalidTransition {
        entity: String,
        id: String,
        status: String,
        operation: String,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any business logic runs; never accompanied by state changes.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (bad UUID, bad amount, bad phone number).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

impl ValidationError {
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }

    pub fn invalid_format(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn not_allowed(field: impl Into<String>, allowed: &[&str]) -> Self {
        ValidationError::NotAllowed {
            field: field.into(),
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_stock_message() {
        let err = CoreError::InsufficientStock {
            product: "Tusker Lager 500ml".to_string(),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for Tusker Lager 500ml: available 3, requested 5"
        );
    }

    #[test]
    fn test_total_mismatch_reports_both_values() {
        let err = CoreError::TotalMismatch {
            computed: Money::from_cents(130_000),
            declared: Money::from_cents(135_000),
        };
        assert_eq!(
            err.to_string(),
            "Total amount mismatch: computed KES 1300.00, declared KES 1350.00"
        );
    }

    #[test]
    fn test_negative_stock_message_shows_signed_change() {
        let err = CoreError::NegativeStockRejected {
            product: "Gilbey's Gin 750ml".to_string(),
            previous: 2,
            change: -5,
            result: -3,
        };
        assert_eq!(
            err.to_string(),
            "Stock change rejected for Gilbey's Gin 750ml: 2 -5 would leave -3"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let core_err: CoreError = ValidationError::required("items").into();
        assert!(matches!(core_err, CoreError::Validation(_)));
        assert_eq!(core_err.to_string(), "Validation error: items is required");
    }
}
