//! # Validation Module
//!
//! Input validation run before any business logic or database access.
//!
//! ## Validation Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Layer 1: HTTP DTOs (serde)      - shape, types                         │
//! │  Layer 2: THIS MODULE            - ranges, formats, phone numbers       │
//! │  Layer 3: duka-engine            - references, stock, totals            │
//! │  Layer 4: SQLite                 - CHECK, UNIQUE, FOREIGN KEY           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::{MAX_ITEM_QUANTITY, MAX_SALE_LINES};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity: 1..=999.
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates that an amount is zero or more.
pub fn validate_non_negative(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates the number of lines on a sale.
pub fn validate_line_count(count: usize) -> ValidationResult<()> {
    if count == 0 {
        return Err(ValidationError::required("items"));
    }
    if count > MAX_SALE_LINES {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 1,
            max: MAX_SALE_LINES as i64,
        });
    }
    Ok(())
}

// =============================================================================
// Identifier Validators
// =============================================================================

/// Validates a UUID string format.
///
/// ```rust
/// use duka_core::validation::validate_uuid;
///
/// assert!(validate_uuid("product_id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("product_id", "not-a-uuid").is_err());
/// ```
pub fn validate_uuid(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::required(field));
    }

    uuid::Uuid::parse_str(id)
        .map_err(|_| ValidationError::invalid_format(field, "must be a valid UUID"))?;

    Ok(())
}

/// Validates a client-supplied receipt number.
pub fn validate_receipt_number(receipt: &str) -> ValidationResult<()> {
    let receipt = receipt.trim();
    if receipt.is_empty() {
        return Err(ValidationError::required("receipt_number"));
    }
    if receipt.len() > 64 {
        return Err(ValidationError::TooLong {
            field: "receipt_number".to_string(),
            max: 64,
        });
    }
    Ok(())
}

// =============================================================================
// Phone Numbers
// =============================================================================

/// Normalizes a Kenyan mobile number to the `2547XXXXXXXX` form M-Pesa expects.
///
/// ## Accepted Inputs
/// ```text
/// ┌──────────────────────┬──────────────────┐
/// │ Input                │ Output           │
/// ├──────────────────────┼──────────────────┤
/// │ 0712345678           │ 254712345678     │
/// │ +254 712 345 678     │ 254712345678     │
/// │ 254712345678         │ 254712345678     │
/// │ 712345678            │ 254712345678     │
/// │ 7123456789 (no 0)    │ 2547123456789 ✗  │  → rejected (13 digits)
/// └──────────────────────┴──────────────────┘
/// ```
///
/// Spaces, dashes, parentheses and a leading `+` are stripped first.
pub fn sanitize_phone_number(input: &str) -> ValidationResult<String> {
    let digits: String = input
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '+'))
        .collect();

    if digits.is_empty() {
        return Err(ValidationError::required("phone_number"));
    }
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValidationError::invalid_format(
            "phone_number",
            "must contain digits only",
        ));
    }

    let normalized = match digits.len() {
        10 if digits.starts_with('0') => format!("254{}", &digits[1..]),
        12 if digits.starts_with("254") => digits,
        9 => format!("254{}", digits),
        _ => {
            return Err(ValidationError::invalid_format(
                "phone_number",
                "expected a Kenyan mobile number like 0712345678 or 254712345678",
            ))
        }
    };

    Ok(normalized)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-3).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_line_count() {
        assert!(validate_line_count(0).is_err());
        assert!(validate_line_count(1).is_ok());
        assert!(validate_line_count(MAX_SALE_LINES).is_ok());
        assert!(validate_line_count(MAX_SALE_LINES + 1).is_err());
    }

    #[test]
    fn test_validate_non_negative() {
        assert!(validate_non_negative("discount", Money::zero()).is_ok());
        assert!(validate_non_negative("discount", Money::from_cents(-1)).is_err());
    }

    #[test]
    fn test_sanitize_phone_number() {
        assert_eq!(sanitize_phone_number("0712345678").unwrap(), "254712345678");
        assert_eq!(sanitize_phone_number("+254 712 345 678").unwrap(), "254712345678");
        assert_eq!(sanitize_phone_number("254712345678").unwrap(), "254712345678");
        assert_eq!(sanitize_phone_number("712345678").unwrap(), "254712345678");
        assert_eq!(sanitize_phone_number("0110-123-456").unwrap(), "254110123456");
    }

    #[test]
    fn test_sanitize_phone_number_rejects_bad_input() {
        assert!(sanitize_phone_number("").is_err());
        assert!(sanitize_phone_number("07123abc78").is_err());
        assert!(sanitize_phone_number("12345").is_err());
        assert!(sanitize_phone_number("1712345678").is_err());
        assert!(sanitize_phone_number("2557123456789").is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("id", "").is_err());
        assert!(validate_uuid("id", "123").is_err());
    }
}
