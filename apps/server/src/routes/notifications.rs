//! Staff notifications and the audit trail.
//!
//! Both are written by the engine's event sink; these routes only read them
//! (and flip `is_read`).

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use duka_core::{AuditLog, Notification};
use duka_db::DbError;
use duka_engine::EngineError;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list))
        .route("/notifications/{id}/read", post(mark_read))
        .route("/audit/{table_name}/{record_id}", get(audit_trail))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<u32>,
}

fn db_error(err: DbError) -> ApiError {
    EngineError::from(err).into()
}

async fn list(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Notification>>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let rows = state
        .db
        .notifications()
        .list_for_user(&user.id, query.unread_only, limit)
        .await
        .map_err(db_error)?;
    Ok(Json(rows))
}

async fn mark_read(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state
        .db
        .notifications()
        .mark_read(&id, &user.id)
        .await
        .map_err(db_error)?;
    Ok(Json(json!({ "read": id })))
}

async fn audit_trail(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((table_name, record_id)): Path<(String, String)>,
) -> ApiResult<Json<Vec<AuditLog>>> {
    user.require_privileged()?;
    let rows = state
        .db
        .audit()
        .for_record(&table_name, &record_id)
        .await
        .map_err(db_error)?;
    Ok(Json(rows))
}
