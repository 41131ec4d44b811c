//! # Notification/Audit Sink
//!
//! Engine operations report what happened through [`EventSink::emit`], always
//! after their transaction has committed. Emission is fire-and-forget: a
//! failing sink is logged and never undoes or fails the operation.
//!
//! ## Event → Row
//! ```text
//! ┌──────────────────────┬──────────────────────────┬───────────────────────┐
//! │ Event                │ Notification             │ Audit                 │
//! ├──────────────────────┼──────────────────────────┼───────────────────────┤
//! │ LowStock             │ warning                  │                       │
//! │ OutOfStock           │ error                    │                       │
//! │ SaleCompleted        │                          │ sale.completed        │
//! │ PaymentFailed        │ warning                  │ payment.failed        │
//! │ ReconciliationNeeded │ error                    │ payment.reconcile     │
//! │ UnmatchedPayment     │ error                    │ payment.unmatched     │
//! │ SaleDeleted          │                          │ sale.deleted (+ old)  │
//! │ StockAdjusted        │                          │ inventory.adjusted    │
//! │ CleanupCompleted     │ info                     │ inventory.cleanup     │
//! └──────────────────────┴──────────────────────────┴───────────────────────┘
//! ```

use async_trait::async_trait;
use chrono::Utc;
use duka_core::{AuditLog, Money, Notification, NotificationType, TransactionType};
use duka_db::{AuditRepository, Database, NotificationRepository};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

/// Something worth telling staff or recording for audit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    LowStock {
        product_id: String,
        product_name: String,
        stock: i64,
        min_stock_level: i64,
    },
    OutOfStock {
        product_id: String,
        product_name: String,
    },
    SaleCompleted {
        sale_id: String,
        receipt_number: String,
        total: Money,
        employee_id: String,
    },
    PaymentFailed {
        payment_id: String,
        sale_id: Option<String>,
        result_code: Option<i64>,
        reason: String,
    },
    /// Money arrived but the sale could not be completed.
    ReconciliationNeeded {
        payment_id: String,
        sale_id: Option<String>,
        reason: String,
    },
    /// A paid result whose checkout id matches no stored push.
    UnmatchedPayment {
        checkout_request_id: String,
        mpesa_receipt_number: Option<String>,
        raw_payload: String,
    },
    SaleDeleted {
        sale_id: String,
        receipt_number: String,
        actor_id: String,
        old_values: Value,
    },
    StockAdjusted {
        product_id: String,
        product_name: String,
        kind: TransactionType,
        previous_stock: i64,
        new_stock: i64,
        actor_id: String,
        notes: Option<String>,
    },
    CleanupCompleted {
        deleted: u64,
        older_than_days: u32,
        actor_id: String,
    },
}

impl Event {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Event::LowStock { .. } => "low_stock",
            Event::OutOfStock { .. } => "out_of_stock",
            Event::SaleCompleted { .. } => "sale_completed",
            Event::PaymentFailed { .. } => "payment_failed",
            Event::ReconciliationNeeded { .. } => "reconciliation_needed",
            Event::UnmatchedPayment { .. } => "unmatched_payment",
            Event::SaleDeleted { .. } => "sale_deleted",
            Event::StockAdjusted { .. } => "stock_adjusted",
            Event::CleanupCompleted { .. } => "cleanup_completed",
        }
    }
}

// =============================================================================
// Sink Trait
// =============================================================================

/// Receives engine events. Implementations swallow (and log) their own errors.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: Event);
}

/// Drops every event.
pub struct NoOpSink;

#[async_trait]
impl EventSink for NoOpSink {
    async fn emit(&self, _event: Event) {}
}

// =============================================================================
// Store Sink
// =============================================================================

/// Writes notifications and audit rows.
#[derive(Debug, Clone)]
pub struct StoreEventSink {
    notifications: NotificationRepository,
    audit: AuditRepository,
}

impl StoreEventSink {
    pub fn new(db: &Database) -> Self {
        StoreEventSink {
            notifications: db.notifications(),
            audit: db.audit(),
        }
    }
}

#[async_trait]
impl EventSink for StoreEventSink {
    async fn emit(&self, event: Event) {
        debug!(event = event.name(), "Emitting event");

        if let Some(notification) = notification_for(&event) {
            if let Err(e) = self.notifications.insert(&notification).await {
                warn!(event = event.name(), error = %e, "Failed to store notification");
            }
        }

        if let Some(entry) = audit_for(&event) {
            if let Err(e) = self.audit.insert(&entry).await {
                warn!(event = event.name(), error = %e, "Failed to store audit record");
            }
        }
    }
}

fn notification(kind: NotificationType, title: &str, message: String, action_url: Option<String>) -> Notification {
    Notification {
        id: Uuid::new_v4().to_string(),
        user_id: None,
        title: title.to_string(),
        message,
        notification_type: kind,
        is_read: false,
        action_url,
        created_at: Utc::now(),
    }
}

fn audit(
    user_id: Option<&str>,
    action: &str,
    table_name: &str,
    record_id: &str,
    old_values: Option<&Value>,
    new_values: Option<Value>,
) -> AuditLog {
    AuditLog {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.map(str::to_string),
        action: action.to_string(),
        table_name: table_name.to_string(),
        record_id: Some(record_id.to_string()),
        old_values: old_values.map(Value::to_string),
        new_values: new_values.map(|v| v.to_string()),
        created_at: Utc::now(),
    }
}

/// Broadcast notification for an event, if staff should see it.
pub fn notification_for(event: &Event) -> Option<Notification> {
    match event {
        Event::LowStock {
            product_id,
            product_name,
            stock,
            min_stock_level,
        } => Some(notification(
            NotificationType::Warning,
            "Low stock",
            format!(
                "{} is running low: {} left (minimum {})",
                product_name, stock, min_stock_level
            ),
            Some(format!("/inventory?product={}", product_id)),
        )),
        Event::OutOfStock {
            product_id,
            product_name,
        } => Some(notification(
            NotificationType::Error,
            "Out of stock",
            format!("{} is out of stock", product_name),
            Some(format!("/inventory?product={}", product_id)),
        )),
        Event::PaymentFailed {
            sale_id, reason, ..
        } => Some(notification(
            NotificationType::Warning,
            "M-Pesa payment failed",
            reason.clone(),
            sale_id.as_ref().map(|id| format!("/sales/{}", id)),
        )),
        Event::ReconciliationNeeded {
            payment_id,
            sale_id,
            reason,
        } => Some(notification(
            NotificationType::Error,
            "Payment needs reconciliation",
            format!("M-Pesa payment {} was received but not applied: {}", payment_id, reason),
            sale_id.as_ref().map(|id| format!("/sales/{}", id)),
        )),
        Event::UnmatchedPayment {
            checkout_request_id,
            mpesa_receipt_number,
            ..
        } => Some(notification(
            NotificationType::Error,
            "Unmatched M-Pesa payment",
            format!(
                "M-Pesa payment {} (checkout {}) matches no sale",
                mpesa_receipt_number.as_deref().unwrap_or("without receipt"),
                checkout_request_id
            ),
            None,
        )),
        Event::CleanupCompleted {
            deleted,
            older_than_days,
            ..
        } => Some(notification(
            NotificationType::Info,
            "Inventory history cleaned up",
            format!(
                "Removed {} inventory transactions older than {} days",
                deleted, older_than_days
            ),
            None,
        )),
        Event::SaleCompleted { .. } | Event::SaleDeleted { .. } | Event::StockAdjusted { .. } => None,
    }
}

/// Audit record for an event, if it changes business records.
pub fn audit_for(event: &Event) -> Option<AuditLog> {
    match event {
        Event::SaleCompleted {
            sale_id,
            receipt_number,
            total,
            employee_id,
        } => Some(audit(
            Some(employee_id),
            "sale.completed",
            "sales",
            sale_id,
            None,
            Some(json!({ "receipt_number": receipt_number, "total_cents": total.cents() })),
        )),
        Event::PaymentFailed {
            payment_id,
            result_code,
            reason,
            ..
        } => Some(audit(
            None,
            "payment.failed",
            "mpesa_transactions",
            payment_id,
            None,
            Some(json!({ "result_code": result_code, "reason": reason })),
        )),
        Event::ReconciliationNeeded {
            payment_id,
            sale_id,
            reason,
        } => Some(audit(
            None,
            "payment.reconcile",
            "mpesa_transactions",
            payment_id,
            None,
            Some(json!({ "sale_id": sale_id, "reason": reason })),
        )),
        Event::UnmatchedPayment {
            checkout_request_id,
            mpesa_receipt_number,
            raw_payload,
        } => Some(audit(
            None,
            "payment.unmatched",
            "mpesa_transactions",
            checkout_request_id,
            None,
            Some(json!({ "mpesa_receipt_number": mpesa_receipt_number, "raw_payload": raw_payload })),
        )),
        Event::SaleDeleted {
            sale_id,
            actor_id,
            old_values,
            ..
        } => Some(audit(Some(actor_id), "sale.deleted", "sales", sale_id, Some(old_values), None)),
        Event::StockAdjusted {
            product_id,
            kind,
            previous_stock,
            new_stock,
            actor_id,
            notes,
            ..
        } => Some(audit(
            Some(actor_id),
            &format!("inventory.{}", kind),
            "products",
            product_id,
            Some(&json!({ "stock": previous_stock })),
            Some(json!({ "stock": new_stock, "notes": notes })),
        )),
        Event::CleanupCompleted {
            deleted,
            older_than_days,
            actor_id,
        } => Some(audit(
            Some(actor_id),
            "inventory.cleanup",
            "inventory_transactions",
            "*",
            None,
            Some(json!({ "deleted": deleted, "older_than_days": older_than_days })),
        )),
        Event::LowStock { .. } | Event::OutOfStock { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit;
    use duka_core::UserRole;

    #[test]
    fn test_mapping() {
        let low = Event::LowStock {
            product_id: "p1".into(),
            product_name: "Gilbey's Gin 750ml".into(),
            stock: 4,
            min_stock_level: 10,
        };
        let n = notification_for(&low).unwrap();
        assert_eq!(n.notification_type, NotificationType::Warning);
        assert!(n.message.contains("Gilbey's Gin 750ml"));
        assert!(audit_for(&low).is_none());

        let deleted = Event::SaleDeleted {
            sale_id: "s1".into(),
            receipt_number: "RCP1".into(),
            actor_id: "u1".into(),
            old_values: json!({"total_cents": 100}),
        };
        assert!(notification_for(&deleted).is_none());
        let a = audit_for(&deleted).unwrap();
        assert_eq!(a.action, "sale.deleted");
        assert_eq!(a.old_values.as_deref(), Some(r#"{"total_cents":100}"#));
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let adjusted = Event::StockAdjusted {
            product_id: "p1".into(),
            product_name: "Kenya Cane 750ml".into(),
            kind: TransactionType::Restock,
            previous_stock: 2,
            new_stock: 14,
            actor_id: "u1".into(),
            notes: None,
        };
        let value = serde_json::to_value(&adjusted).unwrap();
        assert_eq!(value["event"], "stock_adjusted");
        assert_eq!(value["kind"], "restock");
        assert_eq!(value["new_stock"], 14);
    }

    #[tokio::test]
    async fn test_store_sink_writes_rows() {
        let db = testkit::db().await;
        let admin = testkit::user(&db, "admin", UserRole::Admin).await;
        let sink = StoreEventSink::new(&db);

        sink.emit(Event::OutOfStock {
            product_id: "p1".into(),
            product_name: "Tusker Lager 500ml".into(),
        })
        .await;
        sink.emit(Event::SaleDeleted {
            sale_id: "s1".into(),
            receipt_number: "RCP1".into(),
            actor_id: admin.clone(),
            old_values: json!({}),
        })
        .await;

        let notes = db.notifications().list_for_user(&admin, false, 10).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].title, "Out of stock");

        let audit = db.audit().for_record("sales", "s1").await.unwrap();
        assert_eq!(audit.len(), 1);
    }
}
