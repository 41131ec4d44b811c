//! Product and customer routes.
//!
//! Retiring (`/deactivate`) always works; `DELETE` only succeeds for rows
//! with no sales or stock history and otherwise answers 400 `conflict`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use duka_core::{Customer, CustomerCategory, Money, Product};
use duka_engine::{NewCustomer, NewProduct};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::routes::{amount, ApiJson};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/products", post(create_product).get(search_products))
        .route("/products/{id}", get(show_product).delete(delete_product))
        .route("/products/{id}/activate", post(activate_product))
        .route("/products/{id}/deactivate", post(deactivate_product))
        .route("/customers", post(create_customer).get(search_customers))
        .route("/customers/{id}", get(show_customer).delete(delete_customer))
        .route("/customers/{id}/activate", post(activate_customer))
        .route("/customers/{id}/deactivate", post(deactivate_customer))
}

fn default_min_stock() -> i64 {
    10
}

fn default_max_stock() -> i64 {
    1000
}

#[derive(Debug, Deserialize)]
pub struct CreateProductBody {
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(deserialize_with = "amount::required")]
    pub price: Money,
    #[serde(default, deserialize_with = "amount::optional")]
    pub cost: Option<Money>,
    #[serde(default)]
    pub stock: i64,
    #[serde(default = "default_min_stock")]
    pub min_stock_level: i64,
    #[serde(default = "default_max_stock")]
    pub max_stock_level: i64,
}

impl From<CreateProductBody> for NewProduct {
    fn from(body: CreateProductBody) -> Self {
        NewProduct {
            name: body.name,
            category: body.category,
            brand: body.brand,
            size: body.size,
            barcode: body.barcode,
            price: body.price,
            cost: body.cost.unwrap_or_else(Money::zero),
            opening_stock: body.stock,
            min_stock_level: body.min_stock_level,
            max_stock_level: body.max_stock_level,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateCustomerBody {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub category: CustomerCategory,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub limit: Option<u32>,
}

impl SearchQuery {
    fn limit(&self) -> u32 {
        self.limit.unwrap_or(50).clamp(1, 500)
    }
}

// =============================================================================
// Products
// =============================================================================

async fn create_product(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(body): ApiJson<CreateProductBody>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    user.require_privileged()?;
    let product = state.catalog.create_product(body.into(), &user.id).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn search_products(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Vec<Product>>> {
    Ok(Json(state.catalog.search_products(&query.q, query.limit()).await?))
}

async fn show_product(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Product>> {
    Ok(Json(state.catalog.get_product(&id).await?))
}

async fn activate_product(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Product>> {
    user.require_privileged()?;
    Ok(Json(state.catalog.set_product_active(&id, true, &user.id).await?))
}

async fn deactivate_product(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Product>> {
    user.require_privileged()?;
    Ok(Json(state.catalog.set_product_active(&id, false, &user.id).await?))
}

async fn delete_product(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    user.require_privileged()?;
    state.catalog.delete_product(&id, &user.id).await?;
    Ok(Json(json!({ "deleted": id })))
}

// =============================================================================
// Customers
// =============================================================================

async fn create_customer(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(body): ApiJson<CreateCustomerBody>,
) -> ApiResult<(StatusCode, Json<Customer>)> {
    let new = NewCustomer {
        name: body.name,
        email: body.email,
        phone: body.phone,
        category: body.category,
    };
    let customer = state.catalog.create_customer(new, &user.id).await?;
    Ok((StatusCode::CREATED, Json(customer)))
}

async fn search_customers(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Vec<Customer>>> {
    Ok(Json(state.catalog.search_customers(&query.q, query.limit()).await?))
}

async fn show_customer(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Customer>> {
    Ok(Json(state.catalog.get_customer(&id).await?))
}

async fn activate_customer(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Customer>> {
    user.require_privileged()?;
    Ok(Json(state.catalog.set_customer_active(&id, true, &user.id).await?))
}

async fn deactivate_customer(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Customer>> {
    user.require_privileged()?;
    Ok(Json(state.catalog.set_customer_active(&id, false, &user.id).await?))
}

async fn delete_customer(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    user.require_privileged()?;
    state.catalog.delete_customer(&id, &user.id).await?;
    Ok(Json(json!({ "deleted": id })))
}
