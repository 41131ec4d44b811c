//! # HTTP Routes
//!
//! ```text
//! /health                          health::check
//! /auth/login                      auth::login
//! /sales, /sales/mpesa, /sales/*   sales
//! /mpesa/*                         mpesa  (callback + c2b are unauthenticated)
//! /inventory/*                     inventory
//! /products/*, /customers/*        catalog
//! /notifications/*, /audit/*       notifications
//! ```

use axum::extract::{FromRequest, Request};
use axum::{Json, Router};
use serde::de::DeserializeOwned;

use crate::error::ApiError;
use crate::state::AppState;

pub mod auth;
pub mod catalog;
pub mod health;
pub mod inventory;
pub mod mpesa;
pub mod notifications;
pub mod sales;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(auth::router())
        .merge(sales::router())
        .merge(mpesa::router())
        .merge(inventory::router())
        .merge(catalog::router())
        .merge(notifications::router())
}

/// `Json<T>` whose rejection is an [`ApiError`] (400 with our body shape).
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(ApiError::bad_request(rejection.body_text())),
        }
    }
}

/// Decimal amounts from JSON numbers or strings, parsed exactly into cents.
pub(crate) mod amount {
    use duka_core::Money;
    use serde::de::{self, Deserializer};
    use serde::Deserialize;
    use serde_json::Value;

    pub fn required<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Money, D::Error> {
        let value = Value::deserialize(deserializer)?;
        from_value(&value).map_err(de::Error::custom)
    }

    pub fn optional<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Money>, D::Error> {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => from_value(&value).map(Some).map_err(de::Error::custom),
        }
    }

    fn from_value(value: &Value) -> Result<Money, String> {
        let text = match value {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            other => return Err(format!("expected a decimal amount, got {}", other)),
        };
        Money::parse_decimal(&text).map_err(|e| e.to_string())
    }

}
