//! # Payment Gateway Seam
//!
//! The engine depends on [`PaymentGateway`], never on `DarajaClient`
//! directly, so tests can script gateway behaviour.

use async_trait::async_trait;
use duka_core::Money;
use serde::{Deserialize, Serialize};

use crate::error::GatewayResult;

/// What to ask the customer to pay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StkPushRequest {
    /// `2547XXXXXXXX` form.
    pub phone_number: String,
    pub amount: Money,
    /// Shown on the customer's phone; we use the receipt number.
    pub account_reference: String,
    pub description: String,
}

/// Daraja accepted the push and will call back later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StkPushAccepted {
    pub merchant_request_id: String,
    pub checkout_request_id: String,
    pub response_description: String,
    pub customer_message: String,
}

/// Answer to a status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StkStatus {
    pub checkout_request_id: String,
    /// `None` while the customer hasn't acted yet.
    pub result_code: Option<i64>,
    pub result_desc: String,
}

impl StkStatus {
    pub fn is_pending(&self) -> bool {
        self.result_code.is_none()
    }
}

/// Push-payment gateway.
///
/// Implementations must be cheap to share (`Arc<dyn PaymentGateway>`) and
/// must bound their own network waits.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Sends a payment prompt to the customer's phone.
    async fn initiate(&self, request: &StkPushRequest) -> GatewayResult<StkPushAccepted>;

    /// Asks the gateway what happened to an earlier prompt.
    async fn query_status(&self, checkout_request_id: &str) -> GatewayResult<StkStatus>;
}
