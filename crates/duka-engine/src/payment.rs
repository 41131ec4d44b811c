//! # Payment Coordination
//!
//! Applies what the gateway says about an STK push to the payment row and
//! its sale. Results can arrive more than once, late, or out of order;
//! every path below is safe to repeat.
//!
//! ## Result Handling
//! ```text
//! handle_payment_result(checkout_id, code, ..)
//!   │
//!   ├─ unknown checkout id ─► unmatched event if paid ─► UnknownCorrelation
//!   │
//!   ├─ apply_result  WHERE status IN (pending, expired)
//!   │     │
//!   │     ├─ no row changed
//!   │     │    ├─ same status already stored ─► re-run completion ─► AlreadyApplied
//!   │     │    └─ different status ───────────► logged ───────────► Ignored
//!   │     │
//!   │     ├─ completed ─► complete_pending_sale
//!   │     │                 ├─ ok ────────────────────────────────► Completed
//!   │     │                 └─ stock gone ─► reconcile event ─────► ReconciliationNeeded
//!   │     │
//!   │     └─ failed / cancelled ─► sale failed ─► event ──────────► Failed
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use duka_core::{MpesaPayment, PaymentStatus, TillPayment, ValidationError};
use duka_db::repository::payment::{self, PaymentResultUpdate};
use duka_db::repository::sale;
use duka_db::{Database, DbError};
use duka_mpesa::{C2bConfirmation, GatewayError, PaymentGateway, StkCallback};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::events::{Event, EventSink};
use crate::sale::{CompletionOutcome, SaleEngine};
use crate::users::{require_privileged, UserDirectory};

/// What a gateway result did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PaymentResult {
    /// Payment confirmed and the sale finalized.
    Completed { sale_id: String },
    /// Same result seen before; nothing new happened.
    AlreadyApplied { status: PaymentStatus },
    Failed { status: PaymentStatus },
    /// A different result than the one already stored.
    Ignored { stored: PaymentStatus },
    UnknownCorrelation,
    /// Paid, but the sale could not be finalized.
    ReconciliationNeeded { reason: String },
    /// Status query says the customer hasn't acted yet.
    StillPending,
}

#[derive(Clone)]
pub struct PaymentCoordinator {
    db: Database,
    sales: SaleEngine,
    gateway: Arc<dyn PaymentGateway>,
    users: Arc<dyn UserDirectory>,
    events: Arc<dyn EventSink>,
    gateway_timeout: Duration,
}

impl PaymentCoordinator {
    /// Shares the engine's database, gateway and sinks.
    pub fn new(sales: SaleEngine) -> Self {
        PaymentCoordinator {
            db: sales.db.clone(),
            gateway: sales.gateway.clone(),
            users: sales.users.clone(),
            events: sales.events.clone(),
            gateway_timeout: sales.gateway_timeout,
            sales,
        }
    }

    // =========================================================================
    // Gateway Results
    // =========================================================================

    pub async fn handle_stk_callback(&self, callback: &StkCallback, raw_payload: &str) -> EngineResult<PaymentResult> {
        let receipt = callback.receipt_number();
        self.handle_payment_result(
            &callback.checkout_request_id,
            callback.result_code,
            &callback.result_desc,
            receipt.as_deref(),
            raw_payload,
        )
        .await
    }

    pub async fn handle_payment_result(
        &self,
        checkout_request_id: &str,
        result_code: i64,
        result_desc: &str,
        external_receipt: Option<&str>,
        raw_payload: &str,
    ) -> EngineResult<PaymentResult> {
        let payments = self.db.mpesa_payments();

        let Some(found) = payments.get_by_checkout_id(checkout_request_id).await? else {
            warn!(
                checkout_request_id = %checkout_request_id,
                result_code = result_code,
                "Payment result for unknown checkout request"
            );
            // A push whose initiation timed out has no checkout id stored.
            if PaymentStatus::from_result_code(result_code) == PaymentStatus::Completed {
                self.events
                    .emit(Event::UnmatchedPayment {
                        checkout_request_id: checkout_request_id.to_string(),
                        mpesa_receipt_number: external_receipt.map(str::to_string),
                        raw_payload: raw_payload.to_string(),
                    })
                    .await;
            }
            return Ok(PaymentResult::UnknownCorrelation);
        };

        let status = PaymentStatus::from_result_code(result_code);
        let applied = payments
            .apply_result(
                &found.id,
                &PaymentResultUpdate {
                    status,
                    result_code,
                    result_desc,
                    mpesa_receipt_number: external_receipt,
                    raw_callback: raw_payload,
                    at: Utc::now(),
                },
            )
            .await?;

        if !applied {
            let stored = payments
                .get_by_id(&found.id)
                .await?
                .map(|p| p.status)
                .unwrap_or(found.status);

            if stored != status {
                warn!(
                    payment_id = %found.id,
                    stored = %stored,
                    received = %status,
                    "Conflicting late payment result ignored"
                );
                return Ok(PaymentResult::Ignored { stored });
            }

            debug!(payment_id = %found.id, status = %status, "Duplicate payment result");
            if status == PaymentStatus::Completed {
                // An earlier delivery may have stopped short of finalizing.
                if let PaymentResult::ReconciliationNeeded { reason } =
                    self.finalize(&found, external_receipt).await?
                {
                    return Ok(PaymentResult::ReconciliationNeeded { reason });
                }
            }
            return Ok(PaymentResult::AlreadyApplied { status });
        }

        info!(
            payment_id = %found.id,
            sale_id = ?found.sale_id,
            result_code = result_code,
            status = %status,
            "Payment result applied"
        );

        match status {
            PaymentStatus::Completed => self.finalize(&found, external_receipt).await,
            _ => {
                self.fail_sale(&found, Some(result_code), result_desc.to_string()).await?;
                Ok(PaymentResult::Failed { status })
            }
        }
    }

    /// Finalizes the sale behind a completed payment.
    async fn finalize(&self, paid: &MpesaPayment, external_receipt: Option<&str>) -> EngineResult<PaymentResult> {
        let Some(sale_id) = paid.sale_id.as_deref() else {
            return self
                .reconcile(paid, "payment has no sale attached".to_string())
                .await;
        };

        let receipt = external_receipt.or(paid.mpesa_receipt_number.as_deref());
        match self.sales.complete_pending_sale(sale_id, receipt).await {
            Ok(CompletionOutcome::Completed { sale_id })
            | Ok(CompletionOutcome::AlreadyFinalized { sale_id }) => Ok(PaymentResult::Completed { sale_id }),
            Err(e) if e.is_stock_shortfall() => self.reconcile(paid, e.to_string()).await,
            Err(EngineError::NotFound { .. }) => {
                self.reconcile(paid, format!("sale {} no longer exists", sale_id)).await
            }
            Err(e) => Err(e),
        }
    }

    async fn reconcile(&self, paid: &MpesaPayment, reason: String) -> EngineResult<PaymentResult> {
        warn!(
            payment_id = %paid.id,
            sale_id = ?paid.sale_id,
            reason = %reason,
            "Paid M-Pesa sale needs reconciliation"
        );
        self.events
            .emit(Event::ReconciliationNeeded {
                payment_id: paid.id.clone(),
                sale_id: paid.sale_id.clone(),
                reason: reason.clone(),
            })
            .await;
        Ok(PaymentResult::ReconciliationNeeded { reason })
    }

    /// Moves a still-pending sale to `failed` and reports it.
    async fn fail_sale(&self, payment: &MpesaPayment, result_code: Option<i64>, reason: String) -> EngineResult<()> {
        if let Some(sale_id) = payment.sale_id.as_deref() {
            let mut tx = self.db.begin().await?;
            sale::mark_failed(&mut tx, sale_id).await?;
            tx.commit().await.map_err(DbError::from)?;
        }

        self.events
            .emit(Event::PaymentFailed {
                payment_id: payment.id.clone(),
                sale_id: payment.sale_id.clone(),
                result_code,
                reason,
            })
            .await;
        Ok(())
    }

    // =========================================================================
    // Status Query / Expiry
    // =========================================================================

    /// Asks the gateway about a push and applies the answer.
    pub async fn refresh_status(&self, checkout_request_id: &str) -> EngineResult<PaymentResult> {
        let found = self
            .db
            .mpesa_payments()
            .get_by_checkout_id(checkout_request_id)
            .await?
            .ok_or_else(|| EngineError::not_found("MpesaPayment", checkout_request_id))?;

        let answer = match tokio::time::timeout(self.gateway_timeout, self.gateway.query_status(checkout_request_id)).await {
            Ok(answer) => answer,
            Err(_) => Err(GatewayError::Timeout),
        };

        let status = match answer {
            Ok(status) => status,
            Err(e) if e.is_indeterminate() => {
                return Err(EngineError::GatewayUnreachable {
                    sale_id: found.sale_id,
                    message: e.to_string(),
                })
            }
            Err(GatewayError::Rejected { code, message }) => {
                return Err(EngineError::GatewayRejected {
                    sale_id: found.sale_id,
                    code,
                    message,
                })
            }
            Err(e) => {
                return Err(EngineError::GatewayRejected {
                    sale_id: found.sale_id,
                    code: "invalid_request".to_string(),
                    message: e.to_string(),
                })
            }
        };

        let Some(code) = status.result_code else {
            debug!(checkout_request_id = %checkout_request_id, "Payment still pending");
            return Ok(PaymentResult::StillPending);
        };

        let raw = match serde_json::to_string(&status) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(checkout_request_id = %checkout_request_id, error = %e, "Could not serialize status answer");
                String::new()
            }
        };
        self.handle_payment_result(checkout_request_id, code, &status.result_desc, None, &raw)
            .await
    }

    /// Expires pushes with no answer after `older_than_minutes` and fails
    /// their sales. Returns how many were expired.
    pub async fn expire_stale(&self, older_than_minutes: u32, actor_id: &str) -> EngineResult<u64> {
        require_privileged(self.users.as_ref(), actor_id, "expire payments").await?;
        if older_than_minutes == 0 {
            return Err(ValidationError::MustBePositive {
                field: "older_than_minutes".to_string(),
            }
            .into());
        }

        let cutoff = Utc::now() - ChronoDuration::minutes(i64::from(older_than_minutes));
        let stale = self.db.mpesa_payments().stale_pending(cutoff).await?;

        let mut expired = 0u64;
        for pending in stale {
            let mut tx = self.db.begin().await?;
            if !payment::expire(&mut tx, &pending.id).await? {
                continue;
            }
            if let Some(sale_id) = pending.sale_id.as_deref() {
                sale::mark_failed(&mut tx, sale_id).await?;
            }
            tx.commit().await.map_err(DbError::from)?;
            expired += 1;

            self.events
                .emit(Event::PaymentFailed {
                    payment_id: pending.id.clone(),
                    sale_id: pending.sale_id.clone(),
                    result_code: None,
                    reason: format!(
                        "No M-Pesa confirmation for {} within {} minutes",
                        pending.account_reference, older_than_minutes
                    ),
                })
                .await;
        }

        if expired > 0 {
            info!(expired = expired, older_than_minutes = older_than_minutes, "Expired stale M-Pesa payments");
        }
        Ok(expired)
    }

    // =========================================================================
    // Till (C2B) Payments
    // =========================================================================

    /// Stores a till confirmation. `None` when `TransID` was seen before.
    pub async fn record_till_payment(
        &self,
        confirmation: C2bConfirmation,
        raw_payload: &str,
    ) -> EngineResult<Option<TillPayment>> {
        let notice = confirmation
            .into_till_payment(raw_payload, Utc::now())
            .map_err(|e| ValidationError::invalid_format("c2b_confirmation", e.to_string()))?;

        if !self.db.till_payments().record(&notice).await? {
            debug!(trans_id = %notice.trans_id, "Duplicate till payment ignored");
            return Ok(None);
        }

        info!(
            trans_id = %notice.trans_id,
            amount_cents = notice.amount_cents,
            msisdn = ?notice.msisdn,
            "Till payment recorded"
        );
        Ok(Some(notice))
    }

    pub async fn list_unprocessed_till_payments(&self) -> EngineResult<Vec<TillPayment>> {
        Ok(self.db.till_payments().list_unprocessed().await?)
    }

    pub async fn mark_till_payment_processed(&self, id: &str) -> EngineResult<()> {
        self.db.till_payments().mark_processed(id).await?;
        Ok(())
    }
}
