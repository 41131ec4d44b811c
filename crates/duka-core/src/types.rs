//! # Domain Types
//!
//! Entities and enums shared by every layer of Duka POS.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────────────┐      │
//! │  │   Product    │◄───│   SaleItem   │───►│        Sale          │      │
//! │  │  stock ≥ 0   │    │  snapshots   │    │  status, receipt_no  │      │
//! │  └──────┬───────┘    └──────────────┘    └──────────┬───────────┘      │
//! │         │                                           │                   │
//! │         ▼                                           ▼                   │
//! │  ┌──────────────────────┐               ┌──────────────────────┐       │
//! │  │ InventoryTransaction │               │    MpesaPayment      │       │
//! │  │ append-only ledger   │               │ pending → terminal   │       │
//! │  └──────────────────────┘               └──────────────────────┘       │
//! │                                                                         │
//! │  Customer  User  TillPayment  Notification  AuditLog                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All ids are UUID v4 strings. Amounts are `*_cents: i64` columns with
//! `Money` accessors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Product
// =============================================================================

/// A product on the shelf.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub name: String,
    /// Free-text category ("Whisky", "Beer", "Wine").
    pub category: Option<String>,
    pub brand: Option<String>,
    /// Pack size as printed on the label ("750ml", "6 x 500ml").
    pub size: Option<String>,
    pub barcode: Option<String>,
    pub price_cents: i64,
    pub cost_cents: i64,
    /// Units on hand. Never negative.
    pub stock: i64,
    pub min_stock_level: i64,
    pub max_stock_level: i64,
    /// Soft-delete flag. Inactive products keep their sale history.
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    #[inline]
    pub fn cost(&self) -> Money {
        Money::from_cents(self.cost_cents)
    }

    /// Derived stock status. Never stored.
    pub fn status(&self) -> StockStatus {
        StockStatus::from_levels(self.stock, self.min_stock_level)
    }
}

/// Stock status derived from `stock` vs `min_stock_level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    LowStock,
    OutOfStock,
}

impl StockStatus {
    /// ```rust
    /// use duka_core::StockStatus;
    ///
    /// assert_eq!(StockStatus::from_levels(0, 5), StockStatus::OutOfStock);
    /// assert_eq!(StockStatus::from_levels(5, 5), StockStatus::LowStock);
    /// assert_eq!(StockStatus::from_levels(7, 5), StockStatus::InStock);
    /// ```
    pub fn from_levels(stock: i64, min_stock_level: i64) -> Self {
        if stock <= 0 {
            StockStatus::OutOfStock
        } else if stock <= min_stock_level {
            StockStatus::LowStock
        } else {
            StockStatus::InStock
        }
    }
}

impl fmt::Display for StockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StockStatus::InStock => write!(f, "In Stock"),
            StockStatus::LowStock => write!(f, "Low Stock"),
            StockStatus::OutOfStock => write!(f, "Out of Stock"),
        }
    }
}

// =============================================================================
// Customer
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CustomerCategory {
    Vip,
    Regular,
    #[default]
    New,
}

impl FromStr for CustomerCategory {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "vip" => Ok(CustomerCategory::Vip),
            "regular" => Ok(CustomerCategory::Regular),
            "new" => Ok(CustomerCategory::New),
            _ => Err(ValidationError::not_allowed(
                "customer category",
                &["vip", "regular", "new"],
            )),
        }
    }
}

/// A registered customer with a running purchase total.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub category: CustomerCategory,
    pub total_purchases_cents: i64,
    #[ts(as = "Option<String>")]
    pub last_purchase_date: Option<DateTime<Utc>>,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    #[inline]
    pub fn total_purchases(&self) -> Money {
        Money::from_cents(self.total_purchases_cents)
    }
}

// =============================================================================
// User
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Manager,
    Employee,
    Staff,
}

impl UserRole {
    /// Admins and managers may restock, adjust and delete sales.
    pub fn is_privileged(&self) -> bool {
        matches!(self, UserRole::Admin | UserRole::Manager)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Manager => "manager",
            UserRole::Employee => "employee",
            UserRole::Staff => "staff",
        }
    }
}

impl FromStr for UserRole {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(UserRole::Admin),
            "manager" => Ok(UserRole::Manager),
            "employee" => Ok(UserRole::Employee),
            "staff" => Ok(UserRole::Staff),
            _ => Err(ValidationError::not_allowed(
                "role",
                &["admin", "manager", "employee", "staff"],
            )),
        }
    }
}

/// A staff account.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct User {
    pub id: String,
    pub username: String,
    pub name: String,
    pub email: Option<String>,
    #[serde(skip)]
    #[ts(skip)]
    pub password_hash: String,
    pub role: UserRole,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Sale Status
// =============================================================================

/// Lifecycle of a sale.
///
/// ```text
/// cash / card ─────────────────────────────► Finalized
///
/// mpesa ──► PendingPayment ──callback ok───► Finalized
///                 │
///                 └──rejected / cancelled──► Failed ──late success──► Finalized
///                                              │
///                                              └──retry payment──► PendingPayment
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Paid; stock effects applied and permanent.
    Finalized,
    /// Awaiting mobile-money confirmation; stock untouched.
    PendingPayment,
    /// Payment rejected, cancelled or expired; stock untouched.
    Failed,
}

impl SaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Finalized => "finalized",
            SaleStatus::PendingPayment => "pending_payment",
            SaleStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SaleStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "finalized" => Ok(SaleStatus::Finalized),
            "pending_payment" | "pending" => Ok(SaleStatus::PendingPayment),
            "failed" => Ok(SaleStatus::Failed),
            _ => Err(ValidationError::not_allowed(
                "status",
                &["finalized", "pending_payment", "failed"],
            )),
        }
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    /// Safaricom M-Pesa STK push. Settles asynchronously.
    Mpesa,
}

impl PaymentMethod {
    /// Whether stock effects wait for an external confirmation.
    pub fn is_deferred(&self) -> bool {
        matches!(self, PaymentMethod::Mpesa)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Mpesa => "mpesa",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown payment methods are rejected, never defaulted.
impl FromStr for PaymentMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cash" => Ok(PaymentMethod::Cash),
            "card" => Ok(PaymentMethod::Card),
            "mpesa" | "m-pesa" => Ok(PaymentMethod::Mpesa),
            _ => Err(ValidationError::not_allowed(
                "payment_method",
                &["cash", "card", "mpesa"],
            )),
        }
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A sale and its receipt header.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: String,
    pub customer_id: Option<String>,
    pub employee_id: String,
    pub status: SaleStatus,
    pub payment_method: PaymentMethod,
    /// External receipt id (M-Pesa receipt). Null until confirmed.
    pub payment_reference: Option<String>,
    pub total_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub receipt_number: String,
    #[ts(as = "String")]
    pub sale_date: DateTime<Utc>,
    pub notes: Option<String>,
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Sale {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// A line item in a sale.
/// Uses snapshot pattern to freeze product data at time of sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    pub product_id: String,
    /// Product name at time of sale (frozen).
    pub product_name: String,
    pub quantity: i64,
    /// Unit price at time of sale (frozen).
    pub unit_price_cents: i64,
    pub discount_cents: i64,
    /// unit_price × quantity − discount.
    pub total_price_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl SaleItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn total_price(&self) -> Money {
        Money::from_cents(self.total_price_cents)
    }
}

// =============================================================================
// Inventory Transaction
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Sale,
    Restock,
    Adjustment,
    /// Reversal of a prior sale (stock comes back on the shelf).
    Return,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Sale => "sale",
            TransactionType::Restock => "restock",
            TransactionType::Adjustment => "adjustment",
            TransactionType::Return => "return",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sale" => Ok(TransactionType::Sale),
            "restock" => Ok(TransactionType::Restock),
            "adjustment" => Ok(TransactionType::Adjustment),
            "return" => Ok(TransactionType::Return),
            _ => Err(ValidationError::not_allowed(
                "transaction_type",
                &["sale", "restock", "adjustment", "return"],
            )),
        }
    }
}

/// Immutable ledger entry recording one stock change and its cause.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InventoryTransaction {
    pub id: String,
    pub product_id: String,
    pub transaction_type: TransactionType,
    pub quantity_change: i64,
    pub previous_stock: i64,
    pub new_stock: i64,
    /// Originating sale, if any.
    pub reference_id: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// M-Pesa Payments
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
    /// No callback within the expiry window. Still accepts a late result.
    Expired,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Expired => "expired",
        }
    }

    /// Whether a gateway result may still be applied.
    pub fn accepts_result(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Expired)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One STK push attempt against a sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct MpesaPayment {
    pub id: String,
    /// Human-readable reference (`TXN…`).
    pub transaction_ref: String,
    pub sale_id: Option<String>,
    pub checkout_request_id: Option<String>,
    pub merchant_request_id: Option<String>,
    /// Sanitized `2547XXXXXXXX` number.
    pub phone_number: String,
    pub amount_cents: i64,
    pub account_reference: String,
    pub description: String,
    pub status: PaymentStatus,
    pub result_code: Option<i64>,
    pub result_desc: Option<String>,
    pub mpesa_receipt_number: Option<String>,
    /// Raw callback JSON as received.
    pub raw_callback: Option<String>,
    pub initiated_by: Option<String>,
    #[ts(as = "String")]
    pub initiated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl MpesaPayment {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

/// A direct-to-till (C2B) payment notice, kept for manual reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct TillPayment {
    pub id: String,
    pub trans_id: String,
    pub transaction_type: Option<String>,
    pub trans_time: Option<String>,
    pub amount_cents: i64,
    pub business_short_code: Option<String>,
    pub bill_ref_number: Option<String>,
    pub invoice_number: Option<String>,
    pub org_account_balance: Option<String>,
    pub third_party_trans_id: Option<String>,
    pub msisdn: Option<String>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub raw_payload: String,
    pub processed: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Notifications & Audit
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Info,
    Warning,
    Error,
    Success,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Notification {
    pub id: String,
    /// Recipient; `None` broadcasts to all staff.
    pub user_id: Option<String>,
    pub title: String,
    pub message: String,
    pub notification_type: NotificationType,
    pub is_read: bool,
    pub action_url: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct AuditLog {
    pub id: String,
    pub user_id: Option<String>,
    pub action: String,
    pub table_name: String,
    pub record_id: Option<String>,
    /// JSON snapshot before the change.
    pub old_values: Option<String>,
    /// JSON snapshot after the change.
    pub new_values: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_status_boundaries() {
        assert_eq!(StockStatus::from_levels(0, 10), StockStatus::OutOfStock);
        assert_eq!(StockStatus::from_levels(1, 10), StockStatus::LowStock);
        assert_eq!(StockStatus::from_levels(10, 10), StockStatus::LowStock);
        assert_eq!(StockStatus::from_levels(11, 10), StockStatus::InStock);
        assert_eq!(StockStatus::OutOfStock.to_string(), "Out of Stock");
    }

    #[test]
    fn test_payment_method_parsing_rejects_unknown() {
        assert_eq!("cash".parse::<PaymentMethod>().unwrap(), PaymentMethod::Cash);
        assert_eq!("CARD".parse::<PaymentMethod>().unwrap(), PaymentMethod::Card);
        assert_eq!("M-Pesa".parse::<PaymentMethod>().unwrap(), PaymentMethod::Mpesa);
        assert!("cheque".parse::<PaymentMethod>().is_err());
        assert!("".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn test_payment_method_serde_is_snake_case() {
        let json = serde_json::to_string(&PaymentMethod::Mpesa).unwrap();
        assert_eq!(json, "\"mpesa\"");
        assert!(serde_json::from_str::<PaymentMethod>("\"bitcoin\"").is_err());
    }

    #[test]
    fn test_only_admin_and_manager_are_privileged() {
        assert!(UserRole::Admin.is_privileged());
        assert!(UserRole::Manager.is_privileged());
        assert!(!UserRole::Employee.is_privileged());
        assert!(!UserRole::Staff.is_privileged());
    }

    #[test]
    fn test_customer_category_rejects_unknown() {
        assert_eq!("VIP".parse::<CustomerCategory>().unwrap(), CustomerCategory::Vip);
        assert!("gold".parse::<CustomerCategory>().is_err());
        assert_eq!(CustomerCategory::default(), CustomerCategory::New);
    }

    #[test]
    fn test_payment_status_accepts_result() {
        assert!(PaymentStatus::Pending.accepts_result());
        assert!(PaymentStatus::Expired.accepts_result());
        assert!(!PaymentStatus::Completed.accepts_result());
        assert!(!PaymentStatus::Failed.accepts_result());
        assert!(!PaymentStatus::Cancelled.accepts_result());
    }

    #[test]
    fn test_sale_status_round_trip_through_str() {
        for status in [SaleStatus::Finalized, SaleStatus::PendingPayment, SaleStatus::Failed] {
            assert_eq!(status.as_str().parse::<SaleStatus>().unwrap(), status);
        }
    }
}
