//! # duka-mpesa: M-Pesa Daraja Gateway Adapter
//!
//! Everything that knows what Safaricom's Daraja API looks like on the wire.
//!
//! ## STK Push Round Trip
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  duka-engine                 duka-mpesa               Safaricom         │
//! │  ───────────                 ──────────               ─────────         │
//! │  gateway.initiate(req) ───►  DarajaClient                               │
//! │                              ├─ access_token() ─────► GET /oauth/v1/..  │
//! │                              │   (cached)                               │
//! │                              └─ POST stkpush ───────► /mpesa/stkpush/.. │
//! │  StkPushAccepted ◄────────── CheckoutRequestID                          │
//! │                                                         │               │
//! │                                   customer enters PIN   │               │
//! │                                                         ▼               │
//! │  POST /mpesa/callback ◄──────────────────────────────── stkCallback     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  callback::parse_stk_callback(body) → StkCallback                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  PaymentCoordinator::handle_payment_result(..)   (duka-engine)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//! - [`gateway`] - `PaymentGateway` trait and its request/response types
//! - [`client`] - `DarajaClient`, the reqwest implementation
//! - [`callback`] - inbound payload parsing and acknowledgements
//! - [`config`] - `DarajaConfig`
//! - [`error`] - `GatewayError`

pub mod callback;
pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
mod wire;

pub use callback::{parse_c2b_confirmation, parse_stk_callback, C2bConfirmation, CallbackAck, StkCallback};
pub use client::DarajaClient;
pub use config::{DarajaConfig, MpesaEnvironment};
pub use error::{GatewayError, GatewayResult};
pub use gateway::{PaymentGateway, StkPushAccepted, StkPushRequest, StkStatus};
