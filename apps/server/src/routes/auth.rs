use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use duka_core::User;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::verify_password;
use crate::error::{ApiError, ApiResult};
use crate::routes::ApiJson;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/auth/login", post(login))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: User,
}

async fn login(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let username = request.username.trim();
    let user = state
        .db
        .users()
        .get_by_username(username)
        .await
        .map_err(ApiError::internal)?;

    // Same answer for unknown user, inactive user and wrong password.
    let user = match user {
        Some(user) if user.is_active && verify_password(&request.password, &user.password_hash) => user,
        _ => {
            warn!(username = %username, "Failed login");
            return Err(ApiError::unauthorized("Invalid username or password"));
        }
    };

    let access_token = state.jwt.issue(&user.id, user.role)?;
    info!(user_id = %user.id, role = %user.role.as_str(), "User logged in");

    Ok(Json(LoginResponse {
        access_token,
        token_type: "Bearer",
        expires_in: state.jwt.lifetime_secs(),
        user,
    }))
}
