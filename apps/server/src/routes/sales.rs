//! Sale routes.
//!
//! The cashier is always the token's subject; an `employee_id` in the body
//! is ignored.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use duka_core::sale::SaleLine;
use duka_core::{Money, PaymentMethod, Sale, SaleStatus, ValidationError};
use duka_db::SaleFilter;
use duka_engine::{NewSale, SaleDetail, SaleOutcome};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::routes::{amount, ApiJson};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sales", post(create).get(list))
        .route("/sales/mpesa", post(create_mpesa))
        .route("/sales/receipt/{receipt_number}", get(show_by_receipt))
        .route("/sales/{id}", get(show).delete(remove))
        .route("/sales/{id}/retry-payment", post(retry_payment))
}

// =============================================================================
// Request Bodies
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SaleLineBody {
    pub product_id: String,
    pub quantity: i64,
    #[serde(default, deserialize_with = "amount::optional")]
    pub unit_price: Option<Money>,
    #[serde(default, alias = "discount", deserialize_with = "amount::optional")]
    pub discount_amount: Option<Money>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSaleBody {
    pub items: Vec<SaleLineBody>,
    #[serde(deserialize_with = "amount::required")]
    pub total_amount: Money,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default, deserialize_with = "amount::optional")]
    pub discount_amount: Option<Money>,
    #[serde(default, deserialize_with = "amount::optional")]
    pub tax_amount: Option<Money>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub receipt_number: Option<String>,
    #[serde(default)]
    pub mpesa_phone_number: Option<String>,
}

impl CreateSaleBody {
    fn into_new_sale(self, employee_id: &str, payment_method: PaymentMethod) -> NewSale {
        let items = self
            .items
            .into_iter()
            .map(|line| SaleLine {
                product_id: line.product_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
                discount: line.discount_amount.unwrap_or_default(),
            })
            .collect();

        NewSale {
            employee_id: employee_id.to_string(),
            customer_id: self.customer_id.filter(|id| !id.trim().is_empty()),
            items,
            declared_total: self.total_amount,
            payment_method,
            discount: self.discount_amount.unwrap_or_default(),
            tax: self.tax_amount.unwrap_or_default(),
            notes: self.notes,
            receipt_number: self.receipt_number.filter(|r| !r.trim().is_empty()),
            mpesa_phone: self.mpesa_phone_number,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RetryPaymentBody {
    pub mpesa_phone_number: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListSalesQuery {
    pub status: Option<SaleStatus>,
    pub employee_id: Option<String>,
    /// RFC 3339 timestamp or `YYYY-MM-DD`.
    pub start_date: Option<String>,
    /// Exclusive; a bare date means "up to the end of that day".
    pub end_date: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

// =============================================================================
// Handlers
// =============================================================================

async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(body): ApiJson<CreateSaleBody>,
) -> ApiResult<(StatusCode, Json<SaleOutcome>)> {
    let method = body
        .payment_method
        .ok_or_else(|| ValidationError::required("payment_method"))
        .map_err(duka_engine::EngineError::from)?;

    let outcome = state.sales.create_sale(body.into_new_sale(&user.id, method)).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn create_mpesa(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(body): ApiJson<CreateSaleBody>,
) -> ApiResult<(StatusCode, Json<SaleOutcome>)> {
    let outcome = state
        .sales
        .create_sale(body.into_new_sale(&user.id, PaymentMethod::Mpesa))
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn show(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<SaleDetail>> {
    Ok(Json(state.sales.get_sale(&id).await?))
}

async fn show_by_receipt(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(receipt_number): Path<String>,
) -> ApiResult<Json<SaleDetail>> {
    Ok(Json(state.sales.get_sale_by_receipt(&receipt_number).await?))
}

async fn list(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(query): Query<ListSalesQuery>,
) -> ApiResult<Json<Vec<Sale>>> {
    let defaults = SaleFilter::default();
    let filter = SaleFilter {
        status: query.status,
        employee_id: query.employee_id,
        from: parse_bound("start_date", query.start_date.as_deref(), false)?,
        to: parse_bound("end_date", query.end_date.as_deref(), true)?,
        limit: query.limit.unwrap_or(defaults.limit).clamp(1, 500),
        offset: query.offset.unwrap_or(0),
    };
    Ok(Json(state.sales.list_sales(&filter).await?))
}

async fn remove(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    user.require_privileged()?;
    state.sales.delete_sale(&id, &user.id).await?;
    Ok(Json(json!({ "deleted": id })))
}

async fn retry_payment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<RetryPaymentBody>,
) -> ApiResult<Json<SaleOutcome>> {
    let outcome = state
        .sales
        .retry_mobile_payment(&id, &body.mpesa_phone_number, &user.id)
        .await?;
    Ok(Json(outcome))
}

/// Parses a date filter. A bare date as an upper bound covers that whole day.
fn parse_bound(
    field: &str,
    raw: Option<&str>,
    upper: bool,
) -> Result<Option<DateTime<Utc>>, duka_engine::EngineError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };

    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(at.with_timezone(&Utc)));
    }

    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ValidationError::invalid_format(field, "expected YYYY-MM-DD or RFC 3339"))?;
    let date = if upper { date.succ_opt().unwrap_or(date) } else { date };
    Ok(date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc()))
}
