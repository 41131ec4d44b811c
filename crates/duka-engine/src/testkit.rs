//! Fixtures shared by the engine tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use duka_core::sale::SaleLine;
use duka_core::{Customer, CustomerCategory, Money, PaymentMethod, Product, User, UserRole};
use duka_db::{Database, DbConfig};
use duka_mpesa::{GatewayResult, PaymentGateway, StkPushAccepted, StkPushRequest, StkStatus};
use uuid::Uuid;

use crate::events::{Event, EventSink};
use crate::sale::{NewSale, SaleEngine};

pub async fn db() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

/// File-backed database with a real multi-connection pool.
pub async fn file_db(dir: &tempfile::TempDir) -> Database {
    let config = DbConfig::new(dir.path().join("duka.db")).max_connections(5);
    Database::new(config).await.unwrap()
}

pub async fn user(db: &Database, username: &str, role: UserRole) -> String {
    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4().to_string(),
        username: username.to_string(),
        name: username.to_string(),
        email: None,
        password_hash: "x".to_string(),
        role,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    db.users().insert(&user).await.unwrap();
    user.id
}

/// Active product with a minimum stock level of 5.
pub async fn product(db: &Database, name: &str, price_cents: i64, stock: i64) -> String {
    let now = Utc::now();
    let product = Product {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        category: Some("Spirits".to_string()),
        brand: None,
        size: Some("750ml".to_string()),
        barcode: None,
        price_cents,
        cost_cents: price_cents / 2,
        stock,
        min_stock_level: 5,
        max_stock_level: 100,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    db.products().insert(&product).await.unwrap();
    product.id
}

pub async fn customer(db: &Database, name: &str) -> String {
    let now = Utc::now();
    let customer = Customer {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        email: None,
        phone: Some("254712345678".to_string()),
        category: CustomerCategory::Regular,
        total_purchases_cents: 0,
        last_purchase_date: None,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    db.customers().insert(&customer).await.unwrap();
    customer.id
}

/// A one-line sale for `cashier`, declared at catalog price.
pub async fn sale_request(
    db: &Database,
    cashier: &str,
    product_id: &str,
    quantity: i64,
    method: PaymentMethod,
) -> NewSale {
    let price = db.products().get_by_id(product_id).await.unwrap().unwrap().price();
    NewSale {
        employee_id: cashier.to_string(),
        customer_id: None,
        items: vec![SaleLine::new(product_id, quantity)],
        declared_total: price.multiply_quantity(quantity),
        payment_method: method,
        discount: Money::zero(),
        tax: Money::zero(),
        notes: None,
        receipt_number: None,
        mpesa_phone: (method == PaymentMethod::Mpesa).then(|| "0712345678".to_string()),
    }
}

/// Engine wired to the database's own user repository.
pub fn engine(db: &Database, gateway: Arc<FakeGateway>, sink: Arc<RecordingSink>) -> SaleEngine {
    SaleEngine::new(db.clone(), gateway, Arc::new(db.users()), sink)
}

/// Cash sale, committed with its ledger entries. Returns the sale id.
pub async fn finalized_sale(db: &Database, cashier: &str, product_id: &str, quantity: i64) -> String {
    let engine = engine(db, Arc::new(FakeGateway::default()), Arc::new(RecordingSink::default()));
    let request = sale_request(db, cashier, product_id, quantity, PaymentMethod::Cash).await;
    engine.create_sale(request).await.unwrap().sale().id.clone()
}

// =============================================================================
// Recording Sink
// =============================================================================

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(Event::name).collect()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn emit(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

// =============================================================================
// Scripted Gateway
// =============================================================================

/// Answers from a queue; accepts with a fresh checkout id once it runs dry.
#[derive(Default)]
pub struct FakeGateway {
    pushes: Mutex<VecDeque<GatewayResult<StkPushAccepted>>>,
    statuses: Mutex<VecDeque<GatewayResult<StkStatus>>>,
    push_calls: AtomicUsize,
    query_calls: AtomicUsize,
    last_request: Mutex<Option<StkPushRequest>>,
}

impl FakeGateway {
    pub fn then_push(&self, answer: GatewayResult<StkPushAccepted>) -> &Self {
        self.pushes.lock().unwrap().push_back(answer);
        self
    }

    pub fn then_status(&self, answer: GatewayResult<StkStatus>) -> &Self {
        self.statuses.lock().unwrap().push_back(answer);
        self
    }

    pub fn push_calls(&self) -> usize {
        self.push_calls.load(Ordering::SeqCst)
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<StkPushRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

pub fn accepted(checkout_request_id: &str) -> StkPushAccepted {
    StkPushAccepted {
        merchant_request_id: format!("mr-{}", checkout_request_id),
        checkout_request_id: checkout_request_id.to_string(),
        response_description: "Success. Request accepted for processing".to_string(),
        customer_message: "Success. Request accepted for processing".to_string(),
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn initiate(&self, request: &StkPushRequest) -> GatewayResult<StkPushAccepted> {
        let n = self.push_calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_request.lock().unwrap() = Some(request.clone());
        let scripted = self.pushes.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(accepted(&format!("ws_CO_{}", n))))
    }

    async fn query_status(&self, checkout_request_id: &str) -> GatewayResult<StkStatus> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.statuses.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(StkStatus {
                checkout_request_id: checkout_request_id.to_string(),
                result_code: None,
                result_desc: "The transaction is being processed".to_string(),
            })
        })
    }
}
