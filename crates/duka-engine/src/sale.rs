//! # Sale Engine
//!
//! Turns a till request into a persisted sale.
//!
//! ## Two Paths
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │ create_sale(NewSale)                                                    │
//! │   validate input ─► employee exists ─► (mpesa) sanitize phone           │
//! │        │                                                                │
//! │        ▼   BEGIN                                                        │
//! │   lock + read products ─► active? stock? ─► price lines ─► total check  │
//! │        │                                                                │
//! │        ├── cash / card ───────────────────────────────────────────┐     │
//! │        │   INSERT sale (finalized) + items                        │     │
//! │        │   ledger::apply(sale, −qty) per line                     │     │
//! │        │   customer running total                                 │     │
//! │        │   COMMIT ─► events ─► SaleOutcome::Finalized             │     │
//! │        │                                                          │     │
//! │        └── mpesa ─────────────────────────────────────────────────┤     │
//! │            INSERT sale (pending_payment) + items + payment        │     │
//! │            COMMIT   (no stock touched)                            │     │
//! │            gateway.initiate() with timeout, outside any txn       │     │
//! │              ├─ accepted     ─► store checkout ids ─► Pending     │     │
//! │              ├─ rejected     ─► payment+sale failed ─► 502        │     │
//! │              └─ no answer    ─► left pending ─► 504               │     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Later, `PaymentCoordinator` calls [`SaleEngine::complete_pending_sale`],
//! which applies the stock effects exactly once however often it runs.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use duka_core::mpesa::{sale_payment_description, transaction_ref};
use duka_core::sale::{
    check_stock, computed_total, disambiguate_receipt, price_line, receipt_number,
    requested_quantities, verify_total, PricedLine, SaleLine,
};
use duka_core::validation::{
    sanitize_phone_number, validate_line_count, validate_non_negative, validate_receipt_number,
};
use duka_core::{
    InventoryTransaction, MpesaPayment, Money, PaymentMethod, PaymentStatus, Product, Sale, SaleItem, SaleStatus,
    TransactionType, ValidationError,
};
use duka_db::repository::{customer, payment, product, sale};
use duka_db::{Database, DbError, SaleFilter, SqliteConnection};
use duka_mpesa::{GatewayError, PaymentGateway, StkPushRequest};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::events::{Event, EventSink};
use crate::ledger::{self, returnable_units, Applied, Movement};
use crate::users::{require_privileged, UserDirectory};

/// Default bound on a single gateway call.
pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Request / Outcome Types
// =============================================================================

/// A sale as submitted by the till.
#[derive(Debug, Clone)]
pub struct NewSale {
    pub employee_id: String,
    pub customer_id: Option<String>,
    pub items: Vec<SaleLine>,
    /// Total the till displayed; must match the computed total to the cent.
    pub declared_total: Money,
    pub payment_method: PaymentMethod,
    pub discount: Money,
    pub tax: Money,
    pub notes: Option<String>,
    /// Generated when absent.
    pub receipt_number: Option<String>,
    /// Required for M-Pesa.
    pub mpesa_phone: Option<String>,
}

/// Correlation data for a push that Daraja accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingPayment {
    pub payment_id: String,
    pub transaction_ref: String,
    pub checkout_request_id: String,
    pub merchant_request_id: String,
    pub customer_message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SaleOutcome {
    /// Cash/card sale, committed with its stock effects.
    Finalized { sale: Sale, items: Vec<SaleItem> },
    /// M-Pesa sale waiting for the customer to confirm on their phone.
    PendingPayment {
        sale: Sale,
        items: Vec<SaleItem>,
        payment: PendingPayment,
    },
}

impl SaleOutcome {
    pub fn sale(&self) -> &Sale {
        match self {
            SaleOutcome::Finalized { sale, .. } | SaleOutcome::PendingPayment { sale, .. } => sale,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// This call applied the stock effects.
    Completed { sale_id: String },
    /// An earlier call already did; nothing changed.
    AlreadyFinalized { sale_id: String },
}

/// A sale with everything attached to it.
#[derive(Debug, Clone, Serialize)]
pub struct SaleDetail {
    pub sale: Sale,
    pub items: Vec<SaleItem>,
    pub payments: Vec<MpesaPayment>,
    /// Ledger rows referencing the sale: its sale entries and any returns.
    pub stock_movements: Vec<InventoryTransaction>,
}

// =============================================================================
// Sale Engine
// =============================================================================

#[derive(Clone)]
pub struct SaleEngine {
    pub(crate) db: Database,
    pub(crate) gateway: Arc<dyn PaymentGateway>,
    pub(crate) users: Arc<dyn UserDirectory>,
    pub(crate) events: Arc<dyn EventSink>,
    pub(crate) gateway_timeout: Duration,
}

impl SaleEngine {
    pub fn new(
        db: Database,
        gateway: Arc<dyn PaymentGateway>,
        users: Arc<dyn UserDirectory>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        SaleEngine {
            db,
            gateway,
            users,
            events,
            gateway_timeout: DEFAULT_GATEWAY_TIMEOUT,
        }
    }

    pub fn with_gateway_timeout(mut self, timeout: Duration) -> Self {
        self.gateway_timeout = timeout;
        self
    }

    // =========================================================================
    // create_sale
    // =========================================================================

    pub async fn create_sale(&self, request: NewSale) -> EngineResult<SaleOutcome> {
        validate_line_count(request.items.len())?;
        validate_non_negative("discount_amount", request.discount)?;
        validate_non_negative("tax_amount", request.tax)?;
        if let Some(receipt) = &request.receipt_number {
            validate_receipt_number(receipt)?;
        }

        if !self.users.user_exists(&request.employee_id).await? {
            return Err(EngineError::invalid_reference("User", &request.employee_id));
        }

        // Sanitized before anything is written.
        let phone = if request.payment_method.is_deferred() {
            let raw = request
                .mpesa_phone
                .as_deref()
                .ok_or_else(|| ValidationError::required("mpesa_phone_number"))?;
            Some(sanitize_phone_number(raw)?)
        } else {
            None
        };

        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let lines = price_request(&mut tx, &request.items, now).await?;
        if let Some(customer_id) = &request.customer_id {
            if !customer::exists(&mut tx, customer_id).await? {
                return Err(EngineError::invalid_reference("Customer", customer_id));
            }
        }

        let total = computed_total(&lines);
        verify_total(total, request.declared_total)?;
        if phone.is_some() && total.whole_units_rounded() < 1 {
            return Err(ValidationError::MustBePositive {
                field: "total_amount".to_string(),
            }
            .into());
        }

        let status = if request.payment_method.is_deferred() {
            SaleStatus::PendingPayment
        } else {
            SaleStatus::Finalized
        };
        let mut new_sale = Sale {
            id: Uuid::new_v4().to_string(),
            customer_id: request.customer_id.clone(),
            employee_id: request.employee_id.clone(),
            status,
            payment_method: request.payment_method,
            payment_reference: None,
            total_cents: total.cents(),
            discount_cents: request.discount.cents(),
            tax_cents: request.tax.cents(),
            receipt_number: request
                .receipt_number
                .clone()
                .unwrap_or_else(|| receipt_number(now, &request.employee_id)),
            sale_date: now,
            notes: request.notes.clone(),
            completed_at: (status == SaleStatus::Finalized).then_some(now),
        };

        insert_with_receipt_retry(&mut tx, &mut new_sale).await?;
        let items = insert_items(&mut tx, &new_sale, &lines, now).await?;

        match phone {
            None => {
                let mut applied = Vec::with_capacity(items.len());
                for item in &items {
                    applied.push(record_sale_movement(&mut tx, &new_sale, item, now).await?);
                }
                if let Some(customer_id) = &new_sale.customer_id {
                    customer::add_purchase(&mut tx, customer_id, new_sale.total_cents, now).await?;
                }
                tx.commit().await.map_err(DbError::from)?;

                info!(
                    sale_id = %new_sale.id,
                    receipt = %new_sale.receipt_number,
                    total = %new_sale.total(),
                    method = %new_sale.payment_method,
                    "Sale finalized"
                );
                self.emit_completed(&new_sale, &applied).await;

                Ok(SaleOutcome::Finalized {
                    sale: new_sale,
                    items,
                })
            }
            Some(phone) => {
                let pending = new_payment(&new_sale, phone, &request.employee_id, now);
                payment::insert(&mut tx, &pending).await?;
                tx.commit().await.map_err(DbError::from)?;

                info!(
                    sale_id = %new_sale.id,
                    receipt = %new_sale.receipt_number,
                    payment_id = %pending.id,
                    "M-Pesa sale awaiting payment"
                );
                self.initiate_payment(new_sale, items, pending).await
            }
        }
    }

    /// Sends the STK push for a committed pending sale and records the answer.
    async fn initiate_payment(
        &self,
        mut pending_sale: Sale,
        items: Vec<SaleItem>,
        pending: MpesaPayment,
    ) -> EngineResult<SaleOutcome> {
        let request = StkPushRequest {
            phone_number: pending.phone_number.clone(),
            amount: pending.amount(),
            account_reference: pending.account_reference.clone(),
            description: pending.description.clone(),
        };

        let answer = match tokio::time::timeout(self.gateway_timeout, self.gateway.initiate(&request)).await {
            Ok(answer) => answer,
            Err(_) => Err(GatewayError::Timeout),
        };

        match answer {
            Ok(accepted) => {
                self.db
                    .mpesa_payments()
                    .set_checkout_ids(
                        &pending.id,
                        &accepted.checkout_request_id,
                        &accepted.merchant_request_id,
                    )
                    .await?;

                Ok(SaleOutcome::PendingPayment {
                    sale: pending_sale,
                    items,
                    payment: PendingPayment {
                        payment_id: pending.id,
                        transaction_ref: pending.transaction_ref,
                        checkout_request_id: accepted.checkout_request_id,
                        merchant_request_id: accepted.merchant_request_id,
                        customer_message: accepted.customer_message,
                    },
                })
            }
            Err(e) if e.is_indeterminate() => {
                warn!(
                    sale_id = %pending_sale.id,
                    payment_id = %pending.id,
                    error = %e,
                    "No answer from gateway; payment left pending"
                );
                self.db
                    .mpesa_payments()
                    .note_initiation_error(&pending.id, &e.to_string())
                    .await?;
                Err(EngineError::GatewayUnreachable {
                    sale_id: Some(pending_sale.id),
                    message: e.to_string(),
                })
            }
            Err(e) => {
                let (code, message) = match e {
                    GatewayError::Rejected { code, message } => (code, message),
                    other => ("invalid_request".to_string(), other.to_string()),
                };
                warn!(
                    sale_id = %pending_sale.id,
                    code = %code,
                    message = %message,
                    "Gateway rejected STK push"
                );

                let now = Utc::now();
                let mut tx = self.db.begin().await?;
                payment::mark_rejected(&mut tx, &pending.id, &message, now).await?;
                sale::mark_failed(&mut tx, &pending_sale.id).await?;
                tx.commit().await.map_err(DbError::from)?;
                pending_sale.status = SaleStatus::Failed;

                self.events
                    .emit(Event::PaymentFailed {
                        payment_id: pending.id,
                        sale_id: Some(pending_sale.id.clone()),
                        result_code: None,
                        reason: format!(
                            "STK push for sale {} rejected: {}",
                            pending_sale.receipt_number, message
                        ),
                    })
                    .await;

                Err(EngineError::GatewayRejected {
                    sale_id: Some(pending_sale.id),
                    code,
                    message,
                })
            }
        }
    }

    // =========================================================================
    // complete_pending_sale
    // =========================================================================

    /// Applies the stock effects of a paid M-Pesa sale. Idempotent.
    pub async fn complete_pending_sale(
        &self,
        sale_id: &str,
        external_receipt: Option<&str>,
    ) -> EngineResult<CompletionOutcome> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        // The guarded transition is the first write, so it also takes the lock.
        let claimed = sale::claim_for_completion(&mut tx, sale_id, external_receipt, now).await?;
        if !claimed {
            let existing = sale::fetch(&mut tx, sale_id)
                .await?
                .ok_or_else(|| EngineError::not_found("Sale", sale_id))?;
            return match existing.status {
                SaleStatus::Finalized => {
                    debug!(sale_id = %sale_id, "Sale already finalized");
                    Ok(CompletionOutcome::AlreadyFinalized {
                        sale_id: sale_id.to_string(),
                    })
                }
                other => Err(EngineError::InvalidState(format!(
                    "sale {} is {}, cannot complete",
                    existing.receipt_number, other
                ))),
            };
        }

        if ledger_has_sale_entries(&mut tx, sale_id).await? {
            warn!(sale_id = %sale_id, "Sale already has ledger entries; not applying stock again");
            tx.commit().await.map_err(DbError::from)?;
            return Ok(CompletionOutcome::AlreadyFinalized {
                sale_id: sale_id.to_string(),
            });
        }

        let finalized = sale::fetch(&mut tx, sale_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Sale", sale_id))?;
        let items = sale::fetch_items(&mut tx, sale_id).await?;

        // Stock may have moved since the sale was created.
        for (product_id, quantity) in item_quantities(&items) {
            let current = product::fetch(&mut tx, &product_id)
                .await?
                .ok_or_else(|| EngineError::invalid_reference("Product", &product_id))?;
            check_stock(&current, quantity)?;
        }

        let mut applied = Vec::with_capacity(items.len());
        for item in &items {
            applied.push(record_sale_movement(&mut tx, &finalized, item, now).await?);
        }
        if let Some(customer_id) = &finalized.customer_id {
            customer::add_purchase(&mut tx, customer_id, finalized.total_cents, now).await?;
        }
        tx.commit().await.map_err(DbError::from)?;

        info!(
            sale_id = %sale_id,
            receipt = %finalized.receipt_number,
            payment_reference = ?external_receipt,
            "Pending sale completed"
        );
        self.emit_completed(&finalized, &applied).await;

        Ok(CompletionOutcome::Completed {
            sale_id: sale_id.to_string(),
        })
    }

    // =========================================================================
    // delete_sale
    // =========================================================================

    /// Removes a sale, putting any sold stock back (admin/manager only).
    pub async fn delete_sale(&self, sale_id: &str, actor_id: &str) -> EngineResult<()> {
        require_privileged(self.users.as_ref(), actor_id, "delete sales").await?;

        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let existing = sale::fetch(&mut tx, sale_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Sale", sale_id))?;
        let items = sale::fetch_items(&mut tx, sale_id).await?;

        if existing.status == SaleStatus::Finalized {
            for (product_id, _) in item_quantities(&items) {
                let remaining = returnable_units(&mut tx, sale_id, &product_id).await?;
                if remaining == 0 {
                    continue;
                }
                ledger::apply(
                    &mut tx,
                    Movement {
                        product_id: &product_id,
                        kind: TransactionType::Return,
                        quantity_change: remaining,
                        actor_id: Some(actor_id),
                        reference_id: Some(sale_id),
                        notes: Some(format!("Sale {} deleted", existing.receipt_number)),
                    },
                    now,
                )
                .await?;
            }

            if let Some(customer_id) = &existing.customer_id {
                customer::reverse_purchase(&mut tx, customer_id, existing.total_cents, now).await?;
            }
        }

        sale::delete(&mut tx, sale_id).await?;
        tx.commit().await.map_err(DbError::from)?;

        info!(
            sale_id = %sale_id,
            receipt = %existing.receipt_number,
            actor_id = %actor_id,
            "Sale deleted"
        );

        self.events
            .emit(Event::SaleDeleted {
                sale_id: sale_id.to_string(),
                receipt_number: existing.receipt_number.clone(),
                actor_id: actor_id.to_string(),
                old_values: json!({ "sale": existing, "items": items }),
            })
            .await;
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get_sale(&self, sale_id: &str) -> EngineResult<SaleDetail> {
        let found = self
            .db
            .sales()
            .get_by_id(sale_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Sale", sale_id))?;
        self.detail(found).await
    }

    /// Looks a sale up by the number printed on the receipt.
    pub async fn get_sale_by_receipt(&self, receipt_number: &str) -> EngineResult<SaleDetail> {
        let found = self
            .db
            .sales()
            .get_by_receipt(receipt_number.trim())
            .await?
            .ok_or_else(|| EngineError::not_found("Sale", receipt_number))?;
        self.detail(found).await
    }

    async fn detail(&self, found: Sale) -> EngineResult<SaleDetail> {
        let items = self.db.sales().get_items(&found.id).await?;
        let payments = self.db.mpesa_payments().list_for_sale(&found.id).await?;
        let stock_movements = self.db.inventory().for_reference(&found.id).await?;

        Ok(SaleDetail {
            sale: found,
            items,
            payments,
            stock_movements,
        })
    }

    pub async fn list_sales(&self, filter: &SaleFilter) -> EngineResult<Vec<Sale>> {
        Ok(self.db.sales().list(filter).await?)
    }

    // =========================================================================
    // retry_mobile_payment
    // =========================================================================

    /// Sends a fresh STK push for a failed M-Pesa sale.
    pub async fn retry_mobile_payment(
        &self,
        sale_id: &str,
        phone: &str,
        actor_id: &str,
    ) -> EngineResult<SaleOutcome> {
        let phone = sanitize_phone_number(phone)?;

        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let reopened = sale::reopen_for_payment(&mut tx, sale_id).await?;
        let current = sale::fetch(&mut tx, sale_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Sale", sale_id))?;

        if current.payment_method != PaymentMethod::Mpesa {
            return Err(EngineError::InvalidState(format!(
                "sale {} was paid by {}, not M-Pesa",
                current.receipt_number, current.payment_method
            )));
        }
        if !reopened {
            return Err(EngineError::InvalidState(format!(
                "sale {} is {}, only failed sales can retry payment",
                current.receipt_number, current.status
            )));
        }
        if payment::has_pending_for_sale(&mut tx, sale_id).await? {
            return Err(EngineError::InvalidState(format!(
                "sale {} already has a payment in progress",
                current.receipt_number
            )));
        }

        let items = sale::fetch_items(&mut tx, sale_id).await?;
        let pending = new_payment(&current, phone, actor_id, now);
        payment::insert(&mut tx, &pending).await?;
        tx.commit().await.map_err(DbError::from)?;

        info!(
            sale_id = %sale_id,
            payment_id = %pending.id,
            "Retrying M-Pesa payment"
        );
        self.initiate_payment(current, items, pending).await
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn emit_completed(&self, completed: &Sale, applied: &[Applied]) {
        for event in applied.iter().filter_map(Applied::alert_event) {
            self.events.emit(event).await;
        }
        self.events
            .emit(Event::SaleCompleted {
                sale_id: completed.id.clone(),
                receipt_number: completed.receipt_number.clone(),
                total: completed.total(),
                employee_id: completed.employee_id.clone(),
            })
            .await;
    }
}

// =============================================================================
// Transaction-Scoped Steps
// =============================================================================

/// Locks, validates and prices every requested line.
async fn price_request(
    conn: &mut SqliteConnection,
    lines: &[SaleLine],
    at: DateTime<Utc>,
) -> EngineResult<Vec<PricedLine>> {
    let mut products: Vec<Product> = Vec::new();

    for (product_id, quantity) in requested_quantities(lines) {
        let current = ledger::lock_product(conn, &product_id, at).await?;
        if !current.is_active {
            return Err(EngineError::invalid_reference("Product", &product_id));
        }
        check_stock(&current, quantity)?;
        products.push(current);
    }

    lines
        .iter()
        .map(|line| {
            let current = products
                .iter()
                .find(|p| p.id == line.product_id)
                .ok_or_else(|| EngineError::invalid_reference("Product", &line.product_id))?;
            Ok(price_line(line, current)?)
        })
        .collect()
}

/// Inserts the sale, retrying once with a suffixed receipt number.
async fn insert_with_receipt_retry(conn: &mut SqliteConnection, new_sale: &mut Sale) -> EngineResult<()> {
    match sale::insert_sale(conn, new_sale).await {
        Ok(()) => return Ok(()),
        Err(e) if e.is_unique_on("receipt_number") => {}
        Err(e) => return Err(e.into()),
    }

    let retry = disambiguate_receipt(&new_sale.receipt_number, Utc::now());
    warn!(
        receipt = %new_sale.receipt_number,
        retry = %retry,
        "Receipt number collision, retrying"
    );
    new_sale.receipt_number = retry;

    match sale::insert_sale(conn, new_sale).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_unique_on("receipt_number") => {
            Err(EngineError::DuplicateReceipt(new_sale.receipt_number.clone()))
        }
        Err(e) => Err(e.into()),
    }
}

async fn insert_items(
    conn: &mut SqliteConnection,
    parent: &Sale,
    lines: &[PricedLine],
    at: DateTime<Utc>,
) -> EngineResult<Vec<SaleItem>> {
    let mut items = Vec::with_capacity(lines.len());
    for line in lines {
        let item = SaleItem {
            id: Uuid::new_v4().to_string(),
            sale_id: parent.id.clone(),
            product_id: line.product_id.clone(),
            product_name: line.product_name.clone(),
            quantity: line.quantity,
            unit_price_cents: line.unit_price.cents(),
            discount_cents: line.discount.cents(),
            total_price_cents: line.line_total.cents(),
            created_at: at,
        };
        sale::insert_item(conn, &item).await?;
        items.push(item);
    }
    Ok(items)
}

async fn record_sale_movement(
    conn: &mut SqliteConnection,
    parent: &Sale,
    item: &SaleItem,
    at: DateTime<Utc>,
) -> EngineResult<Applied> {
    ledger::apply(
        conn,
        Movement {
            product_id: &item.product_id,
            kind: TransactionType::Sale,
            quantity_change: -item.quantity,
            actor_id: Some(&parent.employee_id),
            reference_id: Some(&parent.id),
            notes: Some(format!("Sale {}", parent.receipt_number)),
        },
        at,
    )
    .await
}

async fn ledger_has_sale_entries(conn: &mut SqliteConnection, sale_id: &str) -> EngineResult<bool> {
    Ok(duka_db::repository::inventory::has_entries(conn, sale_id, TransactionType::Sale).await?)
}

fn item_quantities(items: &[SaleItem]) -> Vec<(String, i64)> {
    let mut totals: Vec<(String, i64)> = Vec::new();
    for item in items {
        match totals.iter_mut().find(|(id, _)| *id == item.product_id) {
            Some((_, qty)) => *qty += item.quantity,
            None => totals.push((item.product_id.clone(), item.quantity)),
        }
    }
    totals
}

fn new_payment(parent: &Sale, phone: String, initiated_by: &str, at: DateTime<Utc>) -> MpesaPayment {
    let id = Uuid::new_v4().to_string();
    MpesaPayment {
        transaction_ref: transaction_ref(at, &id),
        id,
        sale_id: Some(parent.id.clone()),
        checkout_request_id: None,
        merchant_request_id: None,
        phone_number: phone,
        amount_cents: parent.total_cents,
        account_reference: parent.receipt_number.clone(),
        description: sale_payment_description(&parent.receipt_number),
        status: PaymentStatus::Pending,
        result_code: None,
        result_desc: None,
        mpesa_receipt_number: None,
        raw_callback: None,
        initiated_by: Some(initiated_by.to_string()),
        initiated_at: at,
        completed_at: None,
    }
}
