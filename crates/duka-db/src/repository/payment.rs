//! # M-Pesa STK Payment Repository
//!
//! One row per STK push attempt (`mpesa_transactions`).
//!
//! ## Status Transitions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  insert ──► pending ──apply_result──► completed │ failed │ cancelled   │
//! │               │                          ▲                              │
//! │        expire │                          │ apply_result                 │
//! │               ▼                          │ (late callback)              │
//! │            expired ──────────────────────┘                              │
//! │                                                                         │
//! │  completed / failed / cancelled are terminal: apply_result on them     │
//! │  changes nothing and returns false.                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use duka_core::{MpesaPayment, PaymentStatus};

/// Outcome fields written when a result arrives.
#[derive(Debug, Clone)]
pub struct PaymentResultUpdate<'a> {
    pub status: PaymentStatus,
    pub result_code: i64,
    pub result_desc: &'a str,
    pub mpesa_receipt_number: Option<&'a str>,
    pub raw_callback: &'a str,
    pub at: DateTime<Utc>,
}

/// Repository for STK push attempts.
#[derive(Debug, Clone)]
pub struct MpesaPaymentRepository {
    pool: SqlitePool,
}

impl MpesaPaymentRepository {
    /// Creates a new MpesaPaymentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MpesaPaymentRepository { pool }
    }

    /// Gets a payment by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<MpesaPayment>> {
        let payment = sqlx::query_as::<_, MpesaPayment>("SELECT * FROM mpesa_transactions WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(payment)
    }

    /// Looks a payment up by the gateway's `CheckoutRequestID`.
    pub async fn get_by_checkout_id(&self, checkout_request_id: &str) -> DbResult<Option<MpesaPayment>> {
        let payment = sqlx::query_as::<_, MpesaPayment>(
            "SELECT * FROM mpesa_transactions WHERE checkout_request_id = ?1",
        )
        .bind(checkout_request_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    /// All attempts for a sale, oldest first.
    pub async fn list_for_sale(&self, sale_id: &str) -> DbResult<Vec<MpesaPayment>> {
        let payments = sqlx::query_as::<_, MpesaPayment>(
            "SELECT * FROM mpesa_transactions WHERE sale_id = ?1 ORDER BY initiated_at, rowid",
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    /// Pending attempts initiated before `cutoff`.
    pub async fn stale_pending(&self, cutoff: DateTime<Utc>) -> DbResult<Vec<MpesaPayment>> {
        let payments = sqlx::query_as::<_, MpesaPayment>(
            "SELECT * FROM mpesa_transactions WHERE status = 'pending' AND initiated_at < ?1 ORDER BY initiated_at",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    /// Stores the gateway's correlation ids after an accepted push.
    pub async fn set_checkout_ids(
        &self,
        id: &str,
        checkout_request_id: &str,
        merchant_request_id: &str,
    ) -> DbResult<()> {
        debug!(id = %id, checkout_request_id = %checkout_request_id, "Storing checkout ids");

        let result = sqlx::query(
            "UPDATE mpesa_transactions SET checkout_request_id = ?2, merchant_request_id = ?3 WHERE id = ?1",
        )
        .bind(id)
        .bind(checkout_request_id)
        .bind(merchant_request_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("MpesaPayment", id));
        }

        Ok(())
    }

    /// Records why initiation didn't get an answer; the row stays pending.
    pub async fn note_initiation_error(&self, id: &str, message: &str) -> DbResult<()> {
        sqlx::query("UPDATE mpesa_transactions SET result_desc = ?2 WHERE id = ?1 AND status = 'pending'")
            .bind(id)
            .bind(message)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Applies a gateway result if the payment still accepts one.
    ///
    /// Returns `false` when the payment was already terminal, in which case
    /// nothing is written.
    pub async fn apply_result(&self, id: &str, update: &PaymentResultUpdate<'_>) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE mpesa_transactions SET
                status = ?2,
                result_code = ?3,
                result_desc = ?4,
                mpesa_receipt_number = COALESCE(?5, mpesa_receipt_number),
                raw_callback = ?6,
                completed_at = ?7
            WHERE id = ?1 AND status IN ('pending', 'expired')
            "#,
        )
        .bind(id)
        .bind(update.status)
        .bind(update.result_code)
        .bind(update.result_desc)
        .bind(update.mpesa_receipt_number)
        .bind(update.raw_callback)
        .bind(update.at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

// =============================================================================
// Transaction-Scoped Helpers
// =============================================================================

/// Inserts a new attempt. A second `pending` row for the same sale violates
/// `idx_mpesa_one_pending_per_sale`.
pub async fn insert(conn: &mut SqliteConnection, payment: &MpesaPayment) -> DbResult<()> {
    debug!(id = %payment.id, transaction_ref = %payment.transaction_ref, "Inserting M-Pesa payment");

    sqlx::query(
        r#"
        INSERT INTO mpesa_transactions (
            id, transaction_ref, sale_id, checkout_request_id, merchant_request_id,
            phone_number, amount_cents, account_reference, description, status,
            result_code, result_desc, mpesa_receipt_number, raw_callback,
            initiated_by, initiated_at, completed_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
        "#,
    )
    .bind(&payment.id)
    .bind(&payment.transaction_ref)
    .bind(&payment.sale_id)
    .bind(&payment.checkout_request_id)
    .bind(&payment.merchant_request_id)
    .bind(&payment.phone_number)
    .bind(payment.amount_cents)
    .bind(&payment.account_reference)
    .bind(&payment.description)
    .bind(payment.status)
    .bind(payment.result_code)
    .bind(&payment.result_desc)
    .bind(&payment.mpesa_receipt_number)
    .bind(&payment.raw_callback)
    .bind(&payment.initiated_by)
    .bind(payment.initiated_at)
    .bind(payment.completed_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// True when the sale has a `pending` attempt.
pub async fn has_pending_for_sale(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<bool> {
    let found: Option<i64> = sqlx::query_scalar(
        "SELECT 1 FROM mpesa_transactions WHERE sale_id = ?1 AND status = 'pending' LIMIT 1",
    )
    .bind(sale_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(found.is_some())
}

/// `pending → failed` after the gateway refused the push.
pub async fn mark_rejected(
    conn: &mut SqliteConnection,
    id: &str,
    message: &str,
    at: DateTime<Utc>,
) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE mpesa_transactions SET status = 'failed', result_desc = ?2, completed_at = ?3
        WHERE id = ?1 AND status = 'pending'
        "#,
    )
    .bind(id)
    .bind(message)
    .bind(at)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// `pending → expired`. Returns `true` if the row was still pending.
pub async fn expire(conn: &mut SqliteConnection, id: &str) -> DbResult<bool> {
    let result = sqlx::query(
        "UPDATE mpesa_transactions SET status = 'expired' WHERE id = ?1 AND status = 'pending'",
    )
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{fixtures, sale};
    use duka_core::{PaymentMethod, Sale, SaleStatus, UserRole};
    use uuid::Uuid;

    async fn pending_sale(db: &crate::Database) -> Sale {
        let user = fixtures::user(&format!("u{}", Uuid::new_v4()), UserRole::Employee);
        db.users().insert(&user).await.unwrap();
        let s = Sale {
            id: Uuid::new_v4().to_string(),
            customer_id: None,
            employee_id: user.id.clone(),
            status: SaleStatus::PendingPayment,
            payment_method: PaymentMethod::Mpesa,
            payment_reference: None,
            total_cents: 50_000,
            discount_cents: 0,
            tax_cents: 0,
            receipt_number: format!("RCP-{}", Uuid::new_v4()),
            sale_date: Utc::now(),
            notes: None,
            completed_at: None,
        };
        let mut tx = db.begin().await.unwrap();
        sale::insert_sale(&mut tx, &s).await.unwrap();
        tx.commit().await.unwrap();
        s
    }

    fn payment(sale_id: &str) -> MpesaPayment {
        MpesaPayment {
            id: Uuid::new_v4().to_string(),
            transaction_ref: format!("TXN{}", Uuid::new_v4().simple()),
            sale_id: Some(sale_id.to_string()),
            checkout_request_id: None,
            merchant_request_id: None,
            phone_number: "254712345678".to_string(),
            amount_cents: 50_000,
            account_reference: "RCP".to_string(),
            description: "Payment for sale RCP".to_string(),
            status: PaymentStatus::Pending,
            result_code: None,
            result_desc: None,
            mpesa_receipt_number: None,
            raw_callback: None,
            initiated_by: None,
            initiated_at: Utc::now(),
            completed_at: None,
        }
    }

    fn success(raw: &str) -> PaymentResultUpdate<'_> {
        PaymentResultUpdate {
            status: PaymentStatus::Completed,
            result_code: 0,
            result_desc: "The service request is processed successfully.",
            mpesa_receipt_number: Some("QGH7XYZ123"),
            raw_callback: raw,
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_one_pending_per_sale() {
        let db = fixtures::db().await;
        let s = pending_sale(&db).await;

        let mut tx = db.begin().await.unwrap();
        insert(&mut tx, &payment(&s.id)).await.unwrap();
        assert!(has_pending_for_sale(&mut tx, &s.id).await.unwrap());
        let err = insert(&mut tx, &payment(&s.id)).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_terminal_status_is_sticky() {
        let db = fixtures::db().await;
        let s = pending_sale(&db).await;
        let p = payment(&s.id);

        let mut tx = db.begin().await.unwrap();
        insert(&mut tx, &p).await.unwrap();
        tx.commit().await.unwrap();

        let repo = db.mpesa_payments();
        repo.set_checkout_ids(&p.id, "ws_CO_1", "mr_1").await.unwrap();
        assert!(repo.apply_result(&p.id, &success("{}")).await.unwrap());

        let late_failure = PaymentResultUpdate {
            status: PaymentStatus::Failed,
            result_code: 1,
            result_desc: "Insufficient balance",
            mpesa_receipt_number: None,
            raw_callback: "{}",
            at: Utc::now(),
        };
        assert!(!repo.apply_result(&p.id, &late_failure).await.unwrap());

        let stored = repo.get_by_checkout_id("ws_CO_1").await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Completed);
        assert_eq!(stored.mpesa_receipt_number.as_deref(), Some("QGH7XYZ123"));
        assert_eq!(stored.result_code, Some(0));
    }

    #[tokio::test]
    async fn test_expired_accepts_late_result() {
        let db = fixtures::db().await;
        let s = pending_sale(&db).await;
        let p = payment(&s.id);

        let mut tx = db.begin().await.unwrap();
        insert(&mut tx, &p).await.unwrap();
        assert!(expire(&mut tx, &p.id).await.unwrap());
        assert!(!expire(&mut tx, &p.id).await.unwrap());
        tx.commit().await.unwrap();

        assert!(db.mpesa_payments().apply_result(&p.id, &success("{}")).await.unwrap());
    }

    #[tokio::test]
    async fn test_sale_delete_keeps_payment_history() {
        let db = fixtures::db().await;
        let s = pending_sale(&db).await;
        let p = payment(&s.id);

        let mut tx = db.begin().await.unwrap();
        insert(&mut tx, &p).await.unwrap();
        assert!(mark_rejected(&mut tx, &p.id, "Invalid phone", Utc::now()).await.unwrap());
        sale::delete(&mut tx, &s.id).await.unwrap();
        tx.commit().await.unwrap();

        let stored = db.mpesa_payments().get_by_id(&p.id).await.unwrap().unwrap();
        assert_eq!(stored.sale_id, None);
        assert_eq!(stored.status, PaymentStatus::Failed);
    }
}
