//! # Sale Pricing Rules
//!
//! Pure computations behind `SaleEngine::create_sale`: line pricing, the
//! total cross-check, stock sufficiency and receipt numbering.
//!
//! ## Pricing Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SaleLine (from client)          Product (from catalog)                 │
//! │  product_id, qty, price?, disc   price_cents, stock, name, is_active    │
//! │            │                           │                                │
//! │            └──────────┬────────────────┘                                │
//! │                       ▼                                                 │
//! │              price_line()  ← price must match catalog                   │
//! │                       │      discount within 0..=gross                  │
//! │                       ▼                                                 │
//! │              PricedLine { unit_price, line_total, ... }                 │
//! │                       │                                                 │
//! │                       ▼                                                 │
//! │   computed_total() ──► verify_total(declared)  ← ± 1 cent               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::Product;
use crate::validation::{validate_non_negative, validate_quantity};

// =============================================================================
// Lines
// =============================================================================

/// One requested line of a sale, as sent by the till.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleLine {
    pub product_id: String,
    pub quantity: i64,
    /// Price the till displayed. Must equal the catalog price when present.
    pub unit_price: Option<Money>,
    pub discount: Money,
}

impl SaleLine {
    pub fn new(product_id: impl Into<String>, quantity: i64) -> Self {
        SaleLine {
            product_id: product_id.into(),
            quantity,
            unit_price: None,
            discount: Money::zero(),
        }
    }

    pub fn with_unit_price(mut self, price: Money) -> Self {
        self.unit_price = Some(price);
        self
    }

    pub fn with_discount(mut self, discount: Money) -> Self {
        self.discount = discount;
        self
    }
}

/// A line after it has been checked against the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
    pub product_id: String,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub discount: Money,
    pub line_total: Money,
}

/// `unit_price × quantity − discount`.
#[inline]
pub fn line_total(unit_price: Money, quantity: i64, discount: Money) -> Money {
    unit_price.multiply_quantity(quantity) - discount
}

/// Prices a requested line against its product.
///
/// ## Rules
/// - quantity in 1..=999
/// - product must be active
/// - supplied unit price (if any) must equal the catalog price
/// - discount must be in 0..=gross
pub fn price_line(line: &SaleLine, product: &Product) -> CoreResult<PricedLine> {
    validate_quantity(line.quantity)?;
    validate_non_negative("discount_amount", line.discount)?;

    if !product.is_active {
        return Err(CoreError::InvalidTransition {
            entity: "Product".to_string(),
            id: product.id.clone(),
            status: "inactive".to_string(),
            operation: "be sold".to_string(),
        });
    }

    let catalog = product.price();
    if let Some(supplied) = line.unit_price {
        if supplied != catalog {
            return Err(CoreError::PriceMismatch {
                product: product.name.clone(),
                supplied,
                catalog,
            });
        }
    }

    let gross = catalog.multiply_quantity(line.quantity);
    if line.discount > gross {
        return Err(ValidationError::OutOfRange {
            field: "discount_amount".to_string(),
            min: 0,
            max: gross.cents(),
        }
        .into());
    }

    Ok(PricedLine {
        product_id: product.id.clone(),
        product_name: product.name.clone(),
        quantity: line.quantity,
        unit_price: catalog,
        discount: line.discount,
        line_total: line_total(catalog, line.quantity, line.discount),
    })
}

/// Sum of all line totals.
pub fn computed_total(lines: &[PricedLine]) -> Money {
    lines.iter().map(|l| l.line_total).sum()
}

/// Cross-checks the client's total against the computed one.
///
/// ## Example
/// ```rust
/// use duka_core::money::Money;
/// use duka_core::sale::verify_total;
///
/// assert!(verify_total(Money::from_cents(10_000), Money::from_cents(10_001)).is_ok());
/// assert!(verify_total(Money::from_cents(10_000), Money::from_cents(10_500)).is_err());
/// ```
pub fn verify_total(computed: Money, declared: Money) -> CoreResult<()> {
    if computed.within_tolerance(declared) {
        Ok(())
    } else {
        Err(CoreError::TotalMismatch { computed, declared })
    }
}

// =============================================================================
// Stock Sufficiency
// =============================================================================

/// Sums requested quantities per product, keeping first-seen order.
///
/// The same bottle can appear on two lines (one discounted, one not); the
/// stock check has to see the combined quantity.
pub fn requested_quantities(lines: &[SaleLine]) -> Vec<(String, i64)> {
    let mut totals: Vec<(String, i64)> = Vec::new();
    for line in lines {
        match totals.iter_mut().find(|(id, _)| *id == line.product_id) {
            Some((_, qty)) => *qty += line.quantity,
            None => totals.push((line.product_id.clone(), line.quantity)),
        }
    }
    totals
}

/// Fails with `InsufficientStock` when `requested` exceeds what is on hand.
pub fn check_stock(product: &Product, requested: i64) -> CoreResult<()> {
    if requested > product.stock {
        return Err(CoreError::InsufficientStock {
            product: product.name.clone(),
            available: product.stock,
            requested,
        });
    }
    Ok(())
}

// =============================================================================
// Receipt Numbers
// =============================================================================

/// Builds a receipt number from the sale time and the cashier.
///
/// Format: `RCP{YYYYmmddHHMMSS}-{first 8 hex chars of employee id}`.
///
/// Two sales by the same cashier in the same second collide; the UNIQUE
/// constraint catches that and [`disambiguate_receipt`] resolves it.
pub fn receipt_number(at: DateTime<Utc>, employee_id: &str) -> String {
    let short: String = employee_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(8)
        .collect();
    format!("RCP{}-{}", at.format("%Y%m%d%H%M%S"), short.to_uppercase())
}

/// Appends the sub-second component to a colliding receipt number.
pub fn disambiguate_receipt(base: &str, at: DateTime<Utc>) -> String {
    format!("{}-{:06}", base, at.timestamp_subsec_micros())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn product(stock: i64, price_cents: i64) -> Product {
        let now = Utc::now();
        Product {
            id: "p-1".to_string(),
            name: "Tusker Lager 500ml".to_string(),
            category: Some("Beer".to_string()),
            brand: Some("EABL".to_string()),
            size: Some("500ml".to_string()),
            barcode: None,
            price_cents,
            cost_cents: price_cents / 2,
            stock,
            min_stock_level: 5,
            max_stock_level: 100,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_price_line_uses_catalog_price() {
        let p = product(10, 25_000);
        let line = SaleLine::new("p-1", 3).with_discount(Money::from_cents(5_000));
        let priced = price_line(&line, &p).unwrap();

        assert_eq!(priced.unit_price.cents(), 25_000);
        assert_eq!(priced.line_total.cents(), 70_000);
        assert_eq!(priced.product_name, "Tusker Lager 500ml");
    }

    #[test]
    fn test_price_line_rejects_price_override() {
        let p = product(10, 25_000);
        let line = SaleLine::new("p-1", 1).with_unit_price(Money::from_cents(1_000));
        let err = price_line(&line, &p).unwrap_err();
        assert!(matches!(err, CoreError::PriceMismatch { .. }));
    }

    #[test]
    fn test_price_line_rejects_bad_discounts() {
        let p = product(10, 25_000);
        let negative = SaleLine::new("p-1", 1).with_discount(Money::from_cents(-1));
        assert!(price_line(&negative, &p).is_err());

        let too_big = SaleLine::new("p-1", 1).with_discount(Money::from_cents(25_001));
        assert!(price_line(&too_big, &p).is_err());

        let whole_line = SaleLine::new("p-1", 1).with_discount(Money::from_cents(25_000));
        assert_eq!(price_line(&whole_line, &p).unwrap().line_total, Money::zero());
    }

    #[test]
    fn test_price_line_rejects_inactive_product() {
        let mut p = product(10, 25_000);
        p.is_active = false;
        let err = price_line(&SaleLine::new("p-1", 1), &p).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
    }

    #[test]
    fn test_total_integrity() {
        let p = product(10, 33_333);
        let lines = vec![
            price_line(&SaleLine::new("p-1", 3), &p).unwrap(),
            price_line(&SaleLine::new("p-1", 1).with_discount(Money::from_cents(333)), &p)
                .unwrap(),
        ];
        let computed = computed_total(&lines);
        assert_eq!(computed.cents(), 99_999 + 33_000);

        assert!(verify_total(computed, Money::from_cents(132_999)).is_ok());
        assert!(verify_total(computed, Money::from_cents(133_000)).is_ok());
        match verify_total(computed, Money::from_cents(133_001)) {
            Err(CoreError::TotalMismatch { computed: c, declared: d }) => {
                assert_eq!(c.cents(), 132_999);
                assert_eq!(d.cents(), 133_001);
            }
            other => panic!("expected TotalMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_requested_quantities_aggregates_duplicates() {
        let lines = vec![
            SaleLine::new("a", 2),
            SaleLine::new("b", 1),
            SaleLine::new("a", 3),
        ];
        assert_eq!(
            requested_quantities(&lines),
            vec![("a".to_string(), 5), ("b".to_string(), 1)]
        );
    }

    #[test]
    fn test_check_stock() {
        let p = product(10, 25_000);
        assert!(check_stock(&p, 10).is_ok());
        match check_stock(&p, 11) {
            Err(CoreError::InsufficientStock { available, requested, .. }) => {
                assert_eq!(available, 10);
                assert_eq!(requested, 11);
            }
            other => panic!("expected InsufficientStock, got {:?}", other),
        }
    }

    #[test]
    fn test_receipt_number_format() {
        let at = Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();
        let receipt = receipt_number(at, "3f2a9c1b-0000-4000-8000-000000000000");
        assert_eq!(receipt, "RCP20260314092653-3F2A9C1B");

        let again = disambiguate_receipt(&receipt, at);
        assert_eq!(again, "RCP20260314092653-3F2A9C1B-000000");
    }
}
