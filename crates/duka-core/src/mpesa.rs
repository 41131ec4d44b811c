//! M-Pesa rules that need no network: result-code mapping and the
//! references we attach to STK pushes.

use chrono::{DateTime, Utc};

use crate::types::PaymentStatus;

/// STK result code for a successful payment.
pub const RESULT_SUCCESS: i64 = 0;
/// Customer dismissed the STK prompt.
pub const RESULT_CANCELLED_BY_USER: i64 = 1032;
/// Customer's phone could not be reached / prompt timed out.
pub const RESULT_USER_UNREACHABLE: i64 = 1037;

/// Daraja caps `AccountReference` at 12 characters.
pub const ACCOUNT_REFERENCE_MAX: usize = 12;
/// Daraja caps `TransactionDesc` at 13 characters.
pub const TRANSACTION_DESC_MAX: usize = 13;

impl PaymentStatus {
    /// Maps an STK callback `ResultCode` to a payment status.
    ///
    /// ```rust
    /// use duka_core::PaymentStatus;
    ///
    /// assert_eq!(PaymentStatus::from_result_code(0), PaymentStatus::Completed);
    /// assert_eq!(PaymentStatus::from_result_code(1032), PaymentStatus::Cancelled);
    /// assert_eq!(PaymentStatus::from_result_code(2001), PaymentStatus::Failed);
    /// ```
    pub fn from_result_code(code: i64) -> Self {
        match code {
            RESULT_SUCCESS => PaymentStatus::Completed,
            RESULT_CANCELLED_BY_USER | RESULT_USER_UNREACHABLE => PaymentStatus::Cancelled,
            _ => PaymentStatus::Failed,
        }
    }
}

/// Internal payment reference, `TXN{YYYYmmddHHMMSS}{6 hex}`.
pub fn transaction_ref(at: DateTime<Utc>, payment_id: &str) -> String {
    let short: String = payment_id
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .take(6)
        .collect();
    format!("TXN{}{}", at.format("%Y%m%d%H%M%S"), short.to_uppercase())
}

/// Description stored with a sale-linked payment.
pub fn sale_payment_description(receipt_number: &str) -> String {
    format!("Payment for sale {}", receipt_number)
}

/// Truncates to at most `max` characters on a char boundary.
pub fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}
