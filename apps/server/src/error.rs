//! # API Error Responses
//!
//! Every handler returns `Result<_, ApiError>`. The body is always
//! `{"code": "...", "message": "...", "data": {...}?}`.
//!
//! ```text
//! EngineError                         HTTP
//! ───────────                         ────
//! Validation, InvalidReference,
//! InsufficientStock, TotalMismatch,
//! PriceMismatch, NegativeStock,
//! DuplicateReceipt, InvalidState,
//! Conflict                       ───► 400
//! Forbidden                      ───► 403
//! NotFound                       ───► 404
//! GatewayRejected                ───► 502   (sale kept as failed)
//! GatewayUnreachable             ───► 504   (sale kept pending)
//! Database                       ───► 500   (details logged, not returned)
//! ```

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use duka_engine::EngineError;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::error;

#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        ApiError {
            status,
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", message)
    }

    /// Logs `detail` and hides it from the caller.
    pub fn internal(detail: impl std::fmt::Display) -> Self {
        error!(error = %detail, "Internal error");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "An internal error occurred",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let message = err.to_string();
        let bad = |code: &'static str| ApiError::new(StatusCode::BAD_REQUEST, code, message.clone());

        match &err {
            EngineError::Validation(_) => bad("validation_error"),
            EngineError::InvalidReference { entity, id } => {
                bad("invalid_reference").with_data(json!({ "entity": entity, "id": id }))
            }
            EngineError::InsufficientStock {
                product,
                available,
                requested,
            } => bad("insufficient_stock").with_data(json!({
                "product": product,
                "available": available,
                "requested": requested,
            })),
            EngineError::TotalMismatch { computed, declared } => {
                bad("total_mismatch").with_data(json!({
                    "computed": computed.to_decimal_string(),
                    "declared": declared.to_decimal_string(),
                }))
            }
            EngineError::PriceMismatch { product, .. } => {
                bad("price_mismatch").with_data(json!({ "product": product }))
            }
            EngineError::NegativeStockRejected { product, .. } => {
                bad("negative_stock_rejected").with_data(json!({ "product": product }))
            }
            EngineError::DuplicateReceipt(_) => bad("duplicate_receipt"),
            EngineError::InvalidState(_) => bad("invalid_state"),
            EngineError::Conflict { entity, id } => {
                bad("conflict").with_data(json!({ "entity": entity, "id": id }))
            }
            EngineError::Forbidden(_) => ApiError::forbidden(message.clone()),
            EngineError::NotFound { .. } => {
                ApiError::new(StatusCode::NOT_FOUND, "not_found", message.clone())
            }
            EngineError::GatewayRejected { sale_id, code, .. } => {
                ApiError::new(StatusCode::BAD_GATEWAY, "gateway_rejected", message.clone())
                    .with_data(json!({ "sale_id": sale_id, "gateway_code": code }))
            }
            EngineError::GatewayUnreachable { sale_id, .. } => {
                ApiError::new(StatusCode::GATEWAY_TIMEOUT, "gateway_unreachable", message.clone())
                    .with_data(json!({ "sale_id": sale_id }))
            }
            EngineError::Database(db) => ApiError::internal(db),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duka_core::{Money, ValidationError};
    use duka_db::DbError;
    use http_body_util::BodyExt;

    #[test]
    fn test_engine_errors_map_to_statuses() {
        let cases: Vec<(EngineError, StatusCode, &str)> = vec![
            (ValidationError::required("items").into(), StatusCode::BAD_REQUEST, "validation_error"),
            (
                EngineError::TotalMismatch {
                    computed: Money::from_cents(100),
                    declared: Money::from_cents(90),
                },
                StatusCode::BAD_REQUEST,
                "total_mismatch",
            ),
            (
                EngineError::conflict("Product", "p1"),
                StatusCode::BAD_REQUEST,
                "conflict",
            ),
            (EngineError::Forbidden("no".into()), StatusCode::FORBIDDEN, "forbidden"),
            (EngineError::not_found("Sale", "x"), StatusCode::NOT_FOUND, "not_found"),
            (
                EngineError::GatewayRejected {
                    sale_id: Some("s1".into()),
                    code: "1032".into(),
                    message: "cancelled".into(),
                },
                StatusCode::BAD_GATEWAY,
                "gateway_rejected",
            ),
            (
                EngineError::GatewayUnreachable {
                    sale_id: None,
                    message: "timeout".into(),
                },
                StatusCode::GATEWAY_TIMEOUT,
                "gateway_unreachable",
            ),
        ];

        for (err, status, code) in cases {
            let api = ApiError::from(err);
            assert_eq!(api.status, status);
            assert_eq!(api.code, code);
        }
    }

    #[tokio::test]
    async fn test_database_errors_are_hidden() {
        let api = ApiError::from(EngineError::Database(DbError::Internal(
            "disk I/O error at /var/lib/duka".into(),
        )));
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);

        let response = api.into_response();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["code"], "internal_error");
        assert!(!body["message"].as_str().unwrap().contains("/var/lib"));
        assert!(body.get("data").is_none());
    }
}
