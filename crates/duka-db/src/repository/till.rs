//! # Till (C2B) Payment Repository
//!
//! Payments customers push straight to the till number, captured from the
//! C2B confirmation webhook. Matching them to sales is manual.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use duka_core::TillPayment;

/// Repository for direct till payments.
#[derive(Debug, Clone)]
pub struct TillPaymentRepository {
    pool: SqlitePool,
}

impl TillPaymentRepository {
    /// Creates a new TillPaymentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TillPaymentRepository { pool }
    }

    /// Stores a confirmation. Returns `false` if `trans_id` was already recorded.
    pub async fn record(&self, payment: &TillPayment) -> DbResult<bool> {
        debug!(trans_id = %payment.trans_id, amount_cents = payment.amount_cents, "Recording till payment");

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO mpesa_c2b_payments (
                id, trans_id, transaction_type, trans_time, amount_cents,
                business_short_code, bill_ref_number, invoice_number,
                org_account_balance, third_party_trans_id, msisdn,
                first_name, middle_name, last_name, raw_payload, processed, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.trans_id)
        .bind(&payment.transaction_type)
        .bind(&payment.trans_time)
        .bind(payment.amount_cents)
        .bind(&payment.business_short_code)
        .bind(&payment.bill_ref_number)
        .bind(&payment.invoice_number)
        .bind(&payment.org_account_balance)
        .bind(&payment.third_party_trans_id)
        .bind(&payment.msisdn)
        .bind(&payment.first_name)
        .bind(&payment.middle_name)
        .bind(&payment.last_name)
        .bind(&payment.raw_payload)
        .bind(payment.processed)
        .bind(payment.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Payments not yet matched to a sale, oldest first.
    pub async fn list_unprocessed(&self) -> DbResult<Vec<TillPayment>> {
        let payments = sqlx::query_as::<_, TillPayment>(
            "SELECT * FROM mpesa_c2b_payments WHERE processed = 0 ORDER BY created_at, rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    /// Flags a payment as reconciled.
    pub async fn mark_processed(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE mpesa_c2b_payments SET processed = 1 WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("TillPayment", id));
        }

        Ok(())
    }
}
