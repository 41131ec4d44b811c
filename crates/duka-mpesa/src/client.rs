//! # Daraja Client
//!
//! reqwest implementation of [`PaymentGateway`].
//!
//! ## Request Flow
//! ```text
//! initiate(req)
//!   │
//!   ├─ shape body (sanitize phone, round amount, truncate references)
//!   │     └─ bad input → InvalidRequest, nothing sent
//!   │
//!   ├─ access_token()
//!   │     ├─ cached and fresh → reuse
//!   │     └─ otherwise GET /oauth/v1/generate (basic auth)
//!   │
//!   └─ POST /mpesa/stkpush/v1/processrequest (bearer)
//!         ├─ 200 + ResponseCode "0" → StkPushAccepted
//!         ├─ 401                    → Auth, cached token dropped
//!         ├─ 5xx / network / timeout→ Unreachable / Timeout
//!         └─ anything else parsable → Rejected { code, message }
//! ```

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use duka_core::mpesa::{truncate_chars, ACCOUNT_REFERENCE_MAX, TRANSACTION_DESC_MAX};
use duka_core::validation::sanitize_phone_number;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::DarajaConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::gateway::{PaymentGateway, StkPushAccepted, StkPushRequest, StkStatus};
use crate::wire;

/// Tokens are refreshed this long before Daraja says they expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Daraja's "still waiting for the customer" answer to a status query.
const QUERY_STILL_PROCESSING: &str = "500.001.1001";

const OAUTH_PATH: &str = "/oauth/v1/generate?grant_type=client_credentials";
const STK_PUSH_PATH: &str = "/mpesa/stkpush/v1/processrequest";
const STK_QUERY_PATH: &str = "/mpesa/stkpushquery/v1/query";

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default, deserialize_with = "wire::opt_i64")]
    expires_in: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct StkPushBody {
    pub business_short_code: String,
    pub password: String,
    pub timestamp: String,
    pub transaction_type: &'static str,
    pub amount: i64,
    pub party_a: String,
    pub party_b: String,
    pub phone_number: String,
    #[serde(rename = "CallBackURL")]
    pub call_back_url: String,
    pub account_reference: String,
    pub transaction_desc: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StkQueryBody<'a> {
    business_short_code: &'a str,
    password: String,
    timestamp: String,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: &'a str,
}

/// Union of the success and error shapes Daraja returns.
#[derive(Debug, Default, Deserialize)]
struct DarajaReply {
    #[serde(rename = "MerchantRequestID", default)]
    merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID", default)]
    checkout_request_id: Option<String>,
    #[serde(rename = "ResponseCode", default, deserialize_with = "wire::opt_string")]
    response_code: Option<String>,
    #[serde(rename = "ResponseDescription", default)]
    response_description: Option<String>,
    #[serde(rename = "CustomerMessage", default)]
    customer_message: Option<String>,
    #[serde(rename = "ResultCode", default, deserialize_with = "wire::opt_i64")]
    result_code: Option<i64>,
    #[serde(rename = "ResultDesc", default)]
    result_desc: Option<String>,
    #[serde(rename = "errorCode", default, deserialize_with = "wire::opt_string")]
    error_code: Option<String>,
    #[serde(rename = "errorMessage", default)]
    error_message: Option<String>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Daraja timestamp, `YYYYmmddHHMMSS` in East Africa Time (UTC+3).
pub fn timestamp(at: DateTime<Utc>) -> String {
    (at + chrono::Duration::hours(3))
        .format("%Y%m%d%H%M%S")
        .to_string()
}

/// STK password: `base64(shortcode + passkey + timestamp)`.
pub fn password(shortcode: &str, passkey: &str, timestamp: &str) -> String {
    STANDARD.encode(format!("{}{}{}", shortcode, passkey, timestamp))
}

pub(crate) fn shape_push_body(
    config: &DarajaConfig,
    request: &StkPushRequest,
    at: DateTime<Utc>,
) -> GatewayResult<StkPushBody> {
    let phone = sanitize_phone_number(&request.phone_number)
        .map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;

    let amount = request.amount.whole_units_rounded();
    if amount < 1 {
        return Err(GatewayError::InvalidRequest(format!(
            "amount {} rounds below 1 KES",
            request.amount
        )));
    }

    let ts = timestamp(at);
    Ok(StkPushBody {
        business_short_code: config.shortcode.clone(),
        password: password(&config.shortcode, &config.passkey, &ts),
        timestamp: ts,
        transaction_type: "CustomerPayBillOnline",
        amount,
        party_a: phone.clone(),
        party_b: config.shortcode.clone(),
        phone_number: phone,
        call_back_url: config.callback_url.clone(),
        account_reference: truncate_chars(&request.account_reference, ACCOUNT_REFERENCE_MAX),
        transaction_desc: truncate_chars(&request.description, TRANSACTION_DESC_MAX),
    })
}

fn parse_reply(body: &str) -> Option<DarajaReply> {
    serde_json::from_str(body).ok()
}

fn rejected_from(reply: &DarajaReply) -> Option<GatewayError> {
    if let Some(code) = &reply.error_code {
        return Some(GatewayError::Rejected {
            code: code.clone(),
            message: reply.error_message.clone().unwrap_or_default(),
        });
    }
    match reply.response_code.as_deref() {
        Some(code) if code != "0" => Some(GatewayError::Rejected {
            code: code.to_string(),
            message: reply.response_description.clone().unwrap_or_default(),
        }),
        _ => None,
    }
}

pub(crate) fn map_push_response(status: StatusCode, body: &str) -> GatewayResult<StkPushAccepted> {
    if status.is_server_error() {
        return Err(GatewayError::Unreachable(format!("Daraja returned {}", status)));
    }

    let reply = parse_reply(body)
        .ok_or_else(|| GatewayError::InvalidResponse(format!("{}: {}", status, body)))?;

    if status.is_success() && reply.response_code.as_deref() == Some("0") {
        let checkout_request_id = reply
            .checkout_request_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| GatewayError::InvalidResponse("accepted without CheckoutRequestID".into()))?;
        return Ok(StkPushAccepted {
            merchant_request_id: reply.merchant_request_id.unwrap_or_default(),
            checkout_request_id,
            response_description: reply.response_description.unwrap_or_default(),
            customer_message: reply.customer_message.unwrap_or_default(),
        });
    }

    Err(rejected_from(&reply)
        .unwrap_or_else(|| GatewayError::InvalidResponse(format!("{}: {}", status, body))))
}

pub(crate) fn map_query_response(
    checkout_request_id: &str,
    status: StatusCode,
    body: &str,
) -> GatewayResult<StkStatus> {
    let reply = parse_reply(body).unwrap_or_default();

    // Daraja answers "still processing" with a 500 and an error body.
    if reply.error_code.as_deref() == Some(QUERY_STILL_PROCESSING) {
        return Ok(StkStatus {
            checkout_request_id: checkout_request_id.to_string(),
            result_code: None,
            result_desc: reply.error_message.unwrap_or_default(),
        });
    }

    if status.is_server_error() {
        return Err(GatewayError::Unreachable(format!("Daraja returned {}", status)));
    }

    if status.is_success() {
        if let Some(code) = reply.result_code {
            return Ok(StkStatus {
                checkout_request_id: reply
                    .checkout_request_id
                    .unwrap_or_else(|| checkout_request_id.to_string()),
                result_code: Some(code),
                result_desc: reply.result_desc.unwrap_or_default(),
            });
        }
    }

    Err(rejected_from(&reply)
        .unwrap_or_else(|| GatewayError::InvalidResponse(format!("{}: {}", status, body))))
}

// =============================================================================
// Client
// =============================================================================

/// Daraja API client with an OAuth token cache.
pub struct DarajaClient {
    http: reqwest::Client,
    config: DarajaConfig,
    token: RwLock<Option<CachedToken>>,
}

impl DarajaClient {
    /// Validates `config` and builds the HTTP client.
    pub fn new(config: DarajaConfig) -> GatewayResult<Self> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        info!(
            environment = %config.environment,
            shortcode = %config.shortcode,
            "Daraja client ready"
        );

        Ok(DarajaClient {
            http,
            config,
            token: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &DarajaConfig {
        &self.config
    }

    /// Returns a bearer token, fetching a new one when the cache is stale.
    pub async fn access_token(&self) -> GatewayResult<String> {
        if let Some(token) = self.token.read().await.as_ref() {
            if token.is_fresh() {
                return Ok(token.value.clone());
            }
        }

        let mut slot = self.token.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(token) = slot.as_ref() {
            if token.is_fresh() {
                return Ok(token.value.clone());
            }
        }

        let fresh = self.fetch_token().await?;
        let value = fresh.value.clone();
        *slot = Some(fresh);
        Ok(value)
    }

    async fn invalidate_token(&self) {
        *self.token.write().await = None;
    }

    async fn fetch_token(&self) -> GatewayResult<CachedToken> {
        debug!("Requesting Daraja access token");

        let response = self
            .http
            .get(format!("{}{}", self.config.base_url, OAUTH_PATH))
            .basic_auth(&self.config.consumer_key, Some(&self.config.consumer_secret))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Auth(format!("{}: {}", status, body)));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Auth(format!("unreadable token response: {}", e)))?;

        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(3599).max(0) as u64);
        Ok(CachedToken {
            value: token.access_token,
            expires_at: Instant::now() + lifetime.saturating_sub(TOKEN_REFRESH_MARGIN),
        })
    }

    /// POSTs `body` with a bearer token; returns the status and raw body.
    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> GatewayResult<(StatusCode, String)> {
        let token = self.access_token().await?;

        let response = self
            .http
            .post(format!("{}{}", self.config.base_url, path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if status == StatusCode::UNAUTHORIZED {
            self.invalidate_token().await;
            return Err(GatewayError::Auth(format!("token rejected: {}", text)));
        }

        Ok((status, text))
    }
}

#[async_trait]
impl PaymentGateway for DarajaClient {
    async fn initiate(&self, request: &StkPushRequest) -> GatewayResult<StkPushAccepted> {
        let body = shape_push_body(&self.config, request, Utc::now())?;

        debug!(
            phone = %body.phone_number,
            amount = body.amount,
            reference = %body.account_reference,
            "Sending STK push"
        );

        let (status, text) = self.post(STK_PUSH_PATH, &body).await?;
        let result = map_push_response(status, &text);

        match &result {
            Ok(accepted) => info!(
                checkout_request_id = %accepted.checkout_request_id,
                "STK push accepted"
            ),
            Err(e) => warn!(error = %e, "STK push not accepted"),
        }
        result
    }

    async fn query_status(&self, checkout_request_id: &str) -> GatewayResult<StkStatus> {
        let ts = timestamp(Utc::now());
        let body = StkQueryBody {
            business_short_code: &self.config.shortcode,
            password: password(&self.config.shortcode, &self.config.passkey, &ts),
            timestamp: ts,
            checkout_request_id,
        };

        debug!(checkout_request_id = %checkout_request_id, "Querying STK status");

        let (status, text) = self.post(STK_QUERY_PATH, &body).await?;
        map_query_response(checkout_request_id, status, &text)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MpesaEnvironment, SANDBOX_PASSKEY, SANDBOX_SHORTCODE};
    use chrono::TimeZone;
    use duka_core::Money;

    fn config() -> DarajaConfig {
        DarajaConfig::new(
            MpesaEnvironment::Sandbox,
            "key",
            "secret",
            SANDBOX_SHORTCODE,
            SANDBOX_PASSKEY,
            "http://localhost:5000/mpesa/callback",
        )
    }

    fn request(phone: &str, cents: i64) -> StkPushRequest {
        StkPushRequest {
            phone_number: phone.to_string(),
            amount: Money::from_cents(cents),
            account_reference: "RCP-20240315-0042".to_string(),
            description: "Payment for sale RCP-20240315-0042".to_string(),
        }
    }

    #[test]
    fn test_timestamp_is_east_africa_time() {
        let at = Utc.with_ymd_and_hms(2024, 3, 15, 11, 30, 0).unwrap();
        assert_eq!(timestamp(at), "20240315143000");
    }

    #[test]
    fn test_password() {
        assert_eq!(
            password(SANDBOX_SHORTCODE, SANDBOX_PASSKEY, "20240315143000"),
            "MTc0Mzc5YmZiMjc5ZjlhYTliZGJjZjE1OGU5N2RkNzFhNDY3Y2QyZTBjODkzMDU5YjEwZjc4ZTZiNzJhZGExZWQyYzkxOTIwMjQwMzE1MTQzMDAw"
        );
    }

    #[test]
    fn test_shape_push_body() {
        let at = Utc.with_ymd_and_hms(2024, 3, 15, 11, 30, 0).unwrap();
        let body = shape_push_body(&config(), &request("0712 345 678", 129_950), at).unwrap();

        assert_eq!(body.amount, 1300);
        assert_eq!(body.party_a, "254712345678");
        assert_eq!(body.phone_number, "254712345678");
        assert_eq!(body.party_b, SANDBOX_SHORTCODE);
        assert_eq!(body.transaction_type, "CustomerPayBillOnline");
        assert_eq!(body.account_reference, "RCP-20240315");
        assert_eq!(body.transaction_desc, "Payment for s");
        assert_eq!(body.timestamp, "20240315143000");

        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("CallBackURL").is_some());
        assert!(json.get("BusinessShortCode").is_some());
        assert!(json.get("PartyA").is_some());
    }

    #[test]
    fn test_shape_push_body_rejects_bad_input() {
        let at = Utc::now();
        assert!(matches!(
            shape_push_body(&config(), &request("12345", 10_000), at),
            Err(GatewayError::InvalidRequest(_))
        ));
        assert!(matches!(
            shape_push_body(&config(), &request("0712345678", 49), at),
            Err(GatewayError::InvalidRequest(_))
        ));
        assert!(shape_push_body(&config(), &request("0712345678", 50), at).is_ok());
    }

    #[test]
    fn test_map_push_response() {
        let ok = r#"{"MerchantRequestID":"29115-34620561-1","CheckoutRequestID":"ws_CO_191220191020363925","ResponseCode":"0","ResponseDescription":"Success. Request accepted for processing","CustomerMessage":"Success. Request accepted for processing"}"#;
        let accepted = map_push_response(StatusCode::OK, ok).unwrap();
        assert_eq!(accepted.checkout_request_id, "ws_CO_191220191020363925");
        assert_eq!(accepted.merchant_request_id, "29115-34620561-1");

        let bad = r#"{"requestId":"abc","errorCode":"400.002.02","errorMessage":"Bad Request - Invalid PhoneNumber"}"#;
        match map_push_response(StatusCode::BAD_REQUEST, bad) {
            Err(GatewayError::Rejected { code, message }) => {
                assert_eq!(code, "400.002.02");
                assert!(message.contains("PhoneNumber"));
            }
            other => panic!("expected rejection, got {:?}", other),
        }

        assert!(matches!(
            map_push_response(StatusCode::SERVICE_UNAVAILABLE, ""),
            Err(GatewayError::Unreachable(_))
        ));
        assert!(matches!(
            map_push_response(StatusCode::OK, "<html>"),
            Err(GatewayError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_map_query_response() {
        let pending = r#"{"requestId":"x","errorCode":"500.001.1001","errorMessage":"The transaction is being processed"}"#;
        let status = map_query_response("ws_CO_1", StatusCode::INTERNAL_SERVER_ERROR, pending).unwrap();
        assert!(status.is_pending());

        let cancelled = r#"{"ResponseCode":"0","ResponseDescription":"The service request has been accepted successsfully","MerchantRequestID":"m","CheckoutRequestID":"ws_CO_1","ResultCode":"1032","ResultDesc":"Request cancelled by user"}"#;
        let status = map_query_response("ws_CO_1", StatusCode::OK, cancelled).unwrap();
        assert_eq!(status.result_code, Some(1032));

        assert!(matches!(
            map_query_response("ws_CO_1", StatusCode::BAD_GATEWAY, ""),
            Err(GatewayError::Unreachable(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut cfg = config();
        cfg.consumer_key.clear();
        assert!(matches!(DarajaClient::new(cfg), Err(GatewayError::Config(_))));
    }

    // -------------------------------------------------------------------------
    // Against a local stand-in for Daraja
    // -------------------------------------------------------------------------

    mod stub {
        use super::*;
        use axum::extract::State;
        use axum::http::StatusCode as HttpStatus;
        use axum::routing::{get, post};
        use axum::{Json, Router};
        use serde_json::{json, Value};
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        #[derive(Clone, Default)]
        struct Calls {
            tokens: Arc<AtomicUsize>,
            pushes: Arc<AtomicUsize>,
        }

        async fn token(State(calls): State<Calls>) -> Json<Value> {
            calls.tokens.fetch_add(1, Ordering::SeqCst);
            Json(json!({"access_token": "stub-token", "expires_in": "3599"}))
        }

        async fn push(State(calls): State<Calls>, Json(body): Json<Value>) -> (HttpStatus, Json<Value>) {
            let n = calls.pushes.fetch_add(1, Ordering::SeqCst);
            if body["PhoneNumber"] == "254700000000" {
                return (
                    HttpStatus::BAD_REQUEST,
                    Json(json!({"requestId": "r", "errorCode": "400.002.02", "errorMessage": "Bad Request - Invalid PhoneNumber"})),
                );
            }
            (
                HttpStatus::OK,
                Json(json!({
                    "MerchantRequestID": format!("m-{}", n),
                    "CheckoutRequestID": format!("ws_CO_{}", n),
                    "ResponseCode": "0",
                    "ResponseDescription": "Success. Request accepted for processing",
                    "CustomerMessage": "Success. Request accepted for processing"
                })),
            )
        }

        async fn query() -> (HttpStatus, Json<Value>) {
            (
                HttpStatus::INTERNAL_SERVER_ERROR,
                Json(json!({"requestId": "r", "errorCode": "500.001.1001", "errorMessage": "The transaction is being processed"})),
            )
        }

        async fn start() -> (DarajaClient, Calls) {
            let calls = Calls::default();
            let app = Router::new()
                .route("/oauth/v1/generate", get(token))
                .route("/mpesa/stkpush/v1/processrequest", post(push))
                .route("/mpesa/stkpushquery/v1/query", post(query))
                .with_state(calls.clone());

            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });

            let client = DarajaClient::new(config().with_base_url(format!("http://{}", addr))).unwrap();
            (client, calls)
        }

        #[tokio::test]
        async fn test_push_reuses_cached_token() {
            let (client, calls) = start().await;

            let first = client.initiate(&request("0712345678", 100_000)).await.unwrap();
            let second = client.initiate(&request("0712345678", 50_000)).await.unwrap();

            assert_ne!(first.checkout_request_id, second.checkout_request_id);
            assert_eq!(calls.pushes.load(Ordering::SeqCst), 2);
            assert_eq!(calls.tokens.load(Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn test_push_rejection_and_pending_query() {
            let (client, _calls) = start().await;

            let err = client.initiate(&request("0700000000", 100_000)).await.unwrap_err();
            assert!(matches!(err, GatewayError::Rejected { ref code, .. } if code == "400.002.02"));
            assert!(!err.is_indeterminate());

            let status = client.query_status("ws_CO_0").await.unwrap();
            assert!(status.is_pending());
            assert_eq!(status.checkout_request_id, "ws_CO_0");
        }

        #[tokio::test]
        async fn test_unreachable_gateway() {
            let client = DarajaClient::new(
                config()
                    .with_base_url("http://127.0.0.1:1")
                    .with_timeout(Duration::from_secs(2)),
            )
            .unwrap();

            let err = client.initiate(&request("0712345678", 100_000)).await.unwrap_err();
            assert!(err.is_indeterminate());
        }
    }
}
