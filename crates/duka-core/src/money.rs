//! # Money Module
//!
//! Provides the `Money` type for handling Kenyan shilling amounts safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  The POS frontend sends amounts as JSON numbers:                        │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌                                  │
//! │                                                                         │
//! │  A total check done in floats can pass or fail on noise alone.          │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents                                            │
//! │    "1299.50" ──parse_decimal──► 129_950 cents                           │
//! │    All line totals, discounts and comparisons are i64 arithmetic.      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use duka_core::money::Money;
//!
//! let price = Money::parse_decimal("1299.50").unwrap();
//! assert_eq!(price.cents(), 129_950);
//!
//! let line = price.multiply_quantity(2) - Money::from_cents(900);
//! assert_eq!(line.to_string(), "KES 2590.00");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use ts_rs::TS;

use crate::error::ValidationError;

/// Largest difference (in cents) tolerated between a declared and a computed total.
pub const TOTAL_TOLERANCE_CENTS: i64 = 1;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in cents (1/100 KES).
///
/// ## Where Money is Used
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Product.price_cents ──► SaleItem.unit_price_cents (snapshot)           │
/// │                               │                                         │
/// │                               ▼                                         │
/// │       unit × qty − discount = SaleItem.total_price_cents                │
/// │                               │                                         │
/// │                               ▼                                         │
/// │              Σ lines == Sale.total_cents (± 1 cent)                     │
/// │                               │                                         │
/// │                               ▼                                         │
/// │        whole_units_rounded() ──► STK push Amount (whole shillings)      │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from whole shillings.
    #[inline]
    pub const fn from_shillings(shillings: i64) -> Self {
        Money(shillings * 100)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Multiplies money by a quantity.
    ///
    /// ## Example
    /// ```rust
    /// use duka_core::money::Money;
    ///
    /// let unit_price = Money::from_cents(25_000); // KES 250.00
    /// assert_eq!(unit_price.multiply_quantity(4).cents(), 100_000);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Checks whether two amounts agree within [`TOTAL_TOLERANCE_CENTS`].
    ///
    /// ## Example
    /// ```rust
    /// use duka_core::money::Money;
    ///
    /// let computed = Money::from_cents(129_950);
    /// assert!(computed.within_tolerance(Money::from_cents(129_951)));
    /// assert!(!computed.within_tolerance(Money::from_cents(129_952)));
    /// ```
    #[inline]
    pub const fn within_tolerance(&self, other: Money) -> bool {
        (self.0 - other.0).abs() <= TOTAL_TOLERANCE_CENTS
    }

    /// Rounds to whole shillings, half away from zero.
    ///
    /// M-Pesa only accepts whole-shilling amounts.
    ///
    /// ## Example
    /// ```rust
    /// use duka_core::money::Money;
    ///
    /// assert_eq!(Money::from_cents(129_950).whole_units_rounded(), 1300);
    /// assert_eq!(Money::from_cents(129_949).whole_units_rounded(), 1299);
    /// ```
    pub const fn whole_units_rounded(&self) -> i64 {
        if self.0 >= 0 {
            (self.0 + 50) / 100
        } else {
            (self.0 - 50) / 100
        }
    }

    /// Parses a decimal string ("1299.5", "-20", "0.30000000000000004") into cents.
    ///
    /// ## Rules
    /// - Optional leading sign
    /// - Digits with at most one decimal point
    /// - Digits beyond the second decimal place round half away from zero,
    ///   so float noise from the frontend collapses to the intended cent
    /// - Exponent notation is rejected
    pub fn parse_decimal(input: &str) -> Result<Money, ValidationError> {
        let invalid = |reason: &str| ValidationError::invalid_format("amount", reason);

        let s = input.trim();
        let (negative, digits) = match s.as_bytes().first() {
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            _ => (false, s),
        };

        let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid("expected a decimal number"));
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("expected a decimal number"));
        }

        let whole_value: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid("amount is too large"))?
        };

        let frac_bytes = frac.as_bytes();
        let digit = |i: usize| frac_bytes.get(i).map(|b| (b - b'0') as i64).unwrap_or(0);
        let mut frac_value = digit(0) * 10 + digit(1);
        if digit(2) >= 5 {
            frac_value += 1;
        }

        let cents = whole_value
            .checked_mul(100)
            .and_then(|c| c.checked_add(frac_value))
            .ok_or_else(|| invalid("amount is too large"))?;

        Ok(Money(if negative { -cents } else { cents }))
    }

    /// Renders the amount as a plain decimal string ("1299.50").
    pub fn to_decimal_string(&self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        format!("{}{}.{:02}", sign, (self.0 / 100).abs(), (self.0 % 100).abs())
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(
            f,
            "{}KES {}.{:02}",
            sign,
            (self.0 / 100).abs(),
            (self.0 % 100).abs()
        )
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
