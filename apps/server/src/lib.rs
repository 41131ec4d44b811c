//! # duka-server: POS HTTP API
//!
//! Thin axum layer over `duka-engine`. Handlers authenticate, translate JSON
//! into engine calls and map [`EngineError`](duka_engine::EngineError)s to
//! status codes. No business rule lives here.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  POS till ──► JWT ──► routes::{sales, inventory, mpesa/status} ──┐      │
//! │                                                                  │      │
//! │  Safaricom ─────────► routes::mpesa::{callback, c2b} ────────────┤      │
//! │                       (always 200 + CallbackAck)                 ▼      │
//! │                                                   AppState              │
//! │                                                   ├─ SaleEngine         │
//! │                                                   ├─ InventoryLedger    │
//! │                                                   └─ PaymentCoordinator │
//! │                                                          │              │
//! │                                       SQLite ◄───────────┤              │
//! │                                       Daraja ◄───────────┘              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use axum::Router;
use tower_http::trace::TraceLayer;

pub use config::ServerConfig;
pub use error::{ApiError, ApiResult};
pub use state::AppState;

/// All routes with request tracing.
pub fn build_router(state: AppState) -> Router {
    routes::router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
