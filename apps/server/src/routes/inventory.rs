use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use duka_core::{InventoryTransaction, Product, TransactionType};
use duka_db::InventoryFilter;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::routes::ApiJson;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/inventory/restock", post(restock))
        .route("/inventory/adjust", post(adjust))
        .route("/inventory/return", post(return_items))
        .route("/inventory/transactions", get(transactions))
        .route("/inventory/low-stock", get(low_stock))
        .route("/inventory/cleanup", post(cleanup))
}

#[derive(Debug, Deserialize)]
pub struct RestockBody {
    pub product_id: String,
    pub quantity: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdjustBody {
    pub product_id: String,
    pub new_stock: i64,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ReturnBody {
    pub sale_id: String,
    pub product_id: String,
    pub quantity: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TransactionsQuery {
    pub product_id: Option<String>,
    pub transaction_type: Option<TransactionType>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LowStockQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CleanupQuery {
    pub days: Option<u32>,
}

async fn restock(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(body): ApiJson<RestockBody>,
) -> ApiResult<(StatusCode, Json<InventoryTransaction>)> {
    user.require_privileged()?;
    let entry = state
        .ledger
        .restock(&body.product_id, body.quantity, &user.id, body.notes)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn adjust(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(body): ApiJson<AdjustBody>,
) -> ApiResult<(StatusCode, Json<InventoryTransaction>)> {
    user.require_privileged()?;
    let entry = state
        .ledger
        .adjust(&body.product_id, body.new_stock, &user.id, &body.reason)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn return_items(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(body): ApiJson<ReturnBody>,
) -> ApiResult<(StatusCode, Json<InventoryTransaction>)> {
    user.require_privileged()?;
    let entry = state
        .ledger
        .return_items(&body.sale_id, &body.product_id, body.quantity, &user.id, body.notes)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn transactions(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(query): Query<TransactionsQuery>,
) -> ApiResult<Json<Vec<InventoryTransaction>>> {
    let defaults = InventoryFilter::default();
    let filter = InventoryFilter {
        product_id: query.product_id,
        transaction_type: query.transaction_type,
        limit: query.limit.unwrap_or(defaults.limit).clamp(1, 500),
        offset: query.offset.unwrap_or(0),
    };
    Ok(Json(state.ledger.history(&filter).await?))
}

async fn low_stock(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(query): Query<LowStockQuery>,
) -> ApiResult<Json<Vec<Product>>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    Ok(Json(state.ledger.low_stock_products(limit).await?))
}

async fn cleanup(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<CleanupQuery>,
) -> ApiResult<Json<Value>> {
    user.require_privileged()?;
    let days = query.days.unwrap_or(state.config.sales.audit_retention_days);
    let deleted = state.ledger.purge_older_than(days, &user.id).await?;
    Ok(Json(json!({ "deleted": deleted, "older_than_days": days })))
}
