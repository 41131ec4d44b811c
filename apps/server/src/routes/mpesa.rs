//! M-Pesa routes.
//!
//! Safaricom-facing endpoints (`/mpesa/callback`, `/mpesa/c2b/*`) take no
//! token and answer 200 with a [`CallbackAck`] no matter what happened;
//! failures are logged here and nowhere else.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use duka_core::TillPayment;
use duka_engine::PaymentResult;
use duka_mpesa::{parse_c2b_confirmation, parse_stk_callback, CallbackAck};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/mpesa/callback", post(stk_callback))
        .route("/mpesa/c2b/validation", post(c2b_validation))
        .route("/mpesa/c2b/confirmation", post(c2b_confirmation))
        .route("/mpesa/c2b/transactions", get(unprocessed_till_payments))
        .route("/mpesa/c2b/transactions/{id}/processed", post(mark_processed))
        .route("/mpesa/status/{checkout_request_id}", post(refresh_status))
        .route("/mpesa/expire-stale", post(expire_stale))
}

// =============================================================================
// Gateway-facing
// =============================================================================

async fn stk_callback(State(state): State<AppState>, body: Bytes) -> Json<CallbackAck> {
    let callback = match parse_stk_callback(&body) {
        Ok(callback) => callback,
        Err(e) => {
            warn!(error = %e, bytes = body.len(), "Unparseable STK callback");
            return Json(CallbackAck::rejected("Invalid callback payload"));
        }
    };

    let raw = String::from_utf8_lossy(&body);
    match state.payments.handle_stk_callback(&callback, &raw).await {
        Ok(PaymentResult::UnknownCorrelation) => Json(CallbackAck::rejected("Transaction not found")),
        Ok(result) => {
            info!(
                checkout_request_id = %callback.checkout_request_id,
                result_code = callback.result_code,
                outcome = ?result,
                "STK callback handled"
            );
            Json(CallbackAck::success())
        }
        Err(e) => {
            error!(
                checkout_request_id = %callback.checkout_request_id,
                error = %e,
                "STK callback processing failed"
            );
            Json(CallbackAck::rejected("Callback could not be processed"))
        }
    }
}

async fn c2b_validation(body: Bytes) -> Json<CallbackAck> {
    info!(bytes = body.len(), "C2B validation request accepted");
    Json(CallbackAck::accepted())
}

async fn c2b_confirmation(State(state): State<AppState>, body: Bytes) -> Json<CallbackAck> {
    let confirmation = match parse_c2b_confirmation(&body) {
        Ok(confirmation) => confirmation,
        Err(e) => {
            warn!(error = %e, "Unparseable C2B confirmation");
            return Json(CallbackAck::rejected("Invalid confirmation payload"));
        }
    };

    let raw = String::from_utf8_lossy(&body);
    match state.payments.record_till_payment(confirmation, &raw).await {
        Ok(_) => Json(CallbackAck::success()),
        Err(e) => {
            error!(error = %e, "C2B confirmation could not be stored");
            Json(CallbackAck::rejected("Confirmation could not be processed"))
        }
    }
}

// =============================================================================
// Staff-facing
// =============================================================================

async fn refresh_status(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(checkout_request_id): Path<String>,
) -> ApiResult<Json<PaymentResult>> {
    Ok(Json(state.payments.refresh_status(&checkout_request_id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct ExpireQuery {
    pub older_than_minutes: Option<u32>,
}

async fn expire_stale(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<ExpireQuery>,
) -> ApiResult<Json<Value>> {
    user.require_privileged()?;
    let minutes = query
        .older_than_minutes
        .unwrap_or(state.config.sales.pending_expiry_minutes);
    let expired = state.payments.expire_stale(minutes, &user.id).await?;
    Ok(Json(json!({ "expired": expired, "older_than_minutes": minutes })))
}

async fn unprocessed_till_payments(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> ApiResult<Json<Vec<TillPayment>>> {
    Ok(Json(state.payments.list_unprocessed_till_payments().await?))
}

async fn mark_processed(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    user.require_privileged()?;
    state.payments.mark_till_payment_processed(&id).await?;
    Ok(Json(json!({ "processed": id })))
}
