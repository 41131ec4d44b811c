//! # Inbound Payloads
//!
//! Safaricom POSTs two kinds of notices to us:
//!
//! ```text
//! STK callback (result of a push we initiated)
//! {
//!   "Body": { "stkCallback": {
//!       "MerchantRequestID": "29115-34620561-1",
//!       "CheckoutRequestID": "ws_CO_191220191020363925",
//!       "ResultCode": 0,
//!       "ResultDesc": "The service request is processed successfully.",
//!       "CallbackMetadata": { "Item": [
//!           { "Name": "Amount", "Value": 1.00 },
//!           { "Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV" },
//!           { "Name": "TransactionDate", "Value": 20191219102115 },
//!           { "Name": "PhoneNumber", "Value": 254708374149 } ] } } }
//! }
//!
//! C2B confirmation (customer paid the till directly)
//! { "TransID": "RKTQDM7W6S", "TransAmount": "10.00", "MSISDN": "2547...", ... }
//! ```
//!
//! Failed or cancelled STK results carry no `CallbackMetadata`.

use chrono::{DateTime, Utc};
use duka_core::{Money, TillPayment};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{GatewayError, GatewayResult};
use crate::wire;

// =============================================================================
// STK Callback
// =============================================================================

#[derive(Debug, Deserialize)]
struct StkEnvelope {
    #[serde(rename = "Body")]
    body: StkBody,
}

#[derive(Debug, Deserialize)]
struct StkBody {
    #[serde(rename = "stkCallback")]
    stk_callback: StkCallback,
}

/// The `stkCallback` object.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID", default, deserialize_with = "wire::opt_string")]
    pub merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResultCode", deserialize_with = "wire::required_i64")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc", default)]
    pub result_desc: String,
    #[serde(rename = "CallbackMetadata", default)]
    pub metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub items: Vec<CallbackItem>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CallbackItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub value: Option<Value>,
}

impl StkCallback {
    /// Looks up a metadata item by name.
    pub fn item(&self, name: &str) -> Option<&Value> {
        self.metadata
            .as_ref()?
            .items
            .iter()
            .find(|item| item.name == name)?
            .value
            .as_ref()
    }

    /// M-Pesa's own receipt, e.g. `NLJ7RT61SV`. Only present on success.
    pub fn receipt_number(&self) -> Option<String> {
        self.item("MpesaReceiptNumber").and_then(wire::value_to_string)
    }

    /// Paying number; arrives as a JSON number.
    pub fn phone_number(&self) -> Option<String> {
        self.item("PhoneNumber").and_then(wire::value_to_string)
    }

    pub fn amount(&self) -> Option<Money> {
        self.item("Amount")
            .and_then(wire::value_to_string)
            .and_then(|s| Money::parse_decimal(&s).ok())
    }
}

/// Parses a raw STK callback body.
pub fn parse_stk_callback(body: &[u8]) -> GatewayResult<StkCallback> {
    let envelope: StkEnvelope =
        serde_json::from_slice(body).map_err(|e| GatewayError::BadCallback(e.to_string()))?;

    let callback = envelope.body.stk_callback;
    if callback.checkout_request_id.trim().is_empty() {
        return Err(GatewayError::BadCallback("empty CheckoutRequestID".to_string()));
    }
    Ok(callback)
}

// =============================================================================
// C2B Confirmation
// =============================================================================

/// Direct-to-till payment notice.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct C2bConfirmation {
    #[serde(default, deserialize_with = "wire::opt_string")]
    pub transaction_type: Option<String>,
    #[serde(rename = "TransID", default, deserialize_with = "wire::opt_string")]
    pub trans_id: Option<String>,
    #[serde(default, deserialize_with = "wire::opt_string")]
    pub trans_time: Option<String>,
    #[serde(default, deserialize_with = "wire::opt_string")]
    pub trans_amount: Option<String>,
    #[serde(default, deserialize_with = "wire::opt_string")]
    pub business_short_code: Option<String>,
    #[serde(default, deserialize_with = "wire::opt_string")]
    pub bill_ref_number: Option<String>,
    #[serde(default, deserialize_with = "wire::opt_string")]
    pub invoice_number: Option<String>,
    #[serde(default, deserialize_with = "wire::opt_string")]
    pub org_account_balance: Option<String>,
    #[serde(rename = "ThirdPartyTransID", default, deserialize_with = "wire::opt_string")]
    pub third_party_trans_id: Option<String>,
    #[serde(rename = "MSISDN", default, deserialize_with = "wire::opt_string")]
    pub msisdn: Option<String>,
    #[serde(default, deserialize_with = "wire::opt_string")]
    pub first_name: Option<String>,
    #[serde(default, deserialize_with = "wire::opt_string")]
    pub middle_name: Option<String>,
    #[serde(default, deserialize_with = "wire::opt_string")]
    pub last_name: Option<String>,
}

impl C2bConfirmation {
    pub fn amount(&self) -> GatewayResult<Money> {
        let raw = self
            .trans_amount
            .as_deref()
            .ok_or_else(|| GatewayError::BadCallback("missing TransAmount".to_string()))?;
        Money::parse_decimal(raw).map_err(|e| GatewayError::BadCallback(e.to_string()))
    }

    /// Converts to the stored row, keeping `raw_payload` verbatim.
    pub fn into_till_payment(self, raw_payload: &str, at: DateTime<Utc>) -> GatewayResult<TillPayment> {
        let amount = self.amount()?;
        let trans_id = self
            .trans_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| GatewayError::BadCallback("missing TransID".to_string()))?;

        Ok(TillPayment {
            id: Uuid::new_v4().to_string(),
            trans_id,
            transaction_type: self.transaction_type,
            trans_time: self.trans_time,
            amount_cents: amount.cents(),
            business_short_code: self.business_short_code,
            bill_ref_number: self.bill_ref_number,
            invoice_number: self.invoice_number,
            org_account_balance: self.org_account_balance,
            third_party_trans_id: self.third_party_trans_id,
            msisdn: self.msisdn,
            first_name: self.first_name,
            middle_name: self.middle_name,
            last_name: self.last_name,
            raw_payload: raw_payload.to_string(),
            processed: false,
            created_at: at,
        })
    }
}

/// Parses a raw C2B confirmation body.
pub fn parse_c2b_confirmation(body: &[u8]) -> GatewayResult<C2bConfirmation> {
    serde_json::from_slice(body).map_err(|e| GatewayError::BadCallback(e.to_string()))
}

// =============================================================================
// Acknowledgement
// =============================================================================

/// What we answer Safaricom with. Always sent with HTTP 200.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackAck {
    #[serde(rename = "ResultCode")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
}

impl CallbackAck {
    /// C2B validation answer.
    pub fn accepted() -> Self {
        CallbackAck {
            result_code: 0,
            result_desc: "Accepted".to_string(),
        }
    }

    pub fn success() -> Self {
        CallbackAck {
            result_code: 0,
            result_desc: "Success".to_string(),
        }
    }

    /// Body was received but could not be applied.
    pub fn rejected(desc: impl Into<String>) -> Self {
        CallbackAck {
            result_code: 1,
            result_desc: desc.into(),
        }
    }
}
