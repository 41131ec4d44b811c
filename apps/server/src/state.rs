//! Shared handler state.

use std::sync::Arc;

use async_trait::async_trait;
use duka_db::Database;
use duka_engine::{
    Catalog, EventSink, InventoryLedger, PaymentCoordinator, SaleEngine, StoreEventSink, UserDirectory,
};
use duka_mpesa::{
    DarajaClient, GatewayError, GatewayResult, PaymentGateway, StkPushAccepted, StkPushRequest, StkStatus,
};
use tracing::{info, warn};

use crate::auth::JwtManager;
use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub sales: SaleEngine,
    pub ledger: InventoryLedger,
    pub catalog: Catalog,
    pub payments: PaymentCoordinator,
    pub jwt: Arc<JwtManager>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Wires the engine against `db` and `gateway`.
    pub fn new(db: Database, gateway: Arc<dyn PaymentGateway>, config: ServerConfig) -> Self {
        let users: Arc<dyn UserDirectory> = Arc::new(db.users());
        let events: Arc<dyn EventSink> = Arc::new(StoreEventSink::new(&db));

        let sales = SaleEngine::new(db.clone(), gateway, users.clone(), events.clone())
            .with_gateway_timeout(config.gateway_timeout());
        let ledger = InventoryLedger::new(db.clone(), users.clone(), events);
        let catalog = Catalog::new(db.clone(), users, ledger.clone());
        let payments = PaymentCoordinator::new(sales.clone());
        let jwt = Arc::new(JwtManager::new(
            config.auth.jwt_secret.clone(),
            config.auth.token_lifetime_secs,
        ));

        AppState {
            db,
            sales,
            ledger,
            catalog,
            payments,
            jwt,
            config: Arc::new(config),
        }
    }
}

/// Picks the Daraja client, or [`DisabledGateway`] when no credentials are set.
pub fn gateway_from_config(config: &ServerConfig) -> GatewayResult<Arc<dyn PaymentGateway>> {
    if !config.mpesa.is_configured() {
        warn!("M-Pesa credentials not configured; mobile-money sales are disabled");
        return Ok(Arc::new(DisabledGateway));
    }

    let client = DarajaClient::new(config.daraja_config())?;
    info!(
        environment = %config.mpesa.environment,
        shortcode = %config.mpesa.shortcode,
        "M-Pesa gateway configured"
    );
    Ok(Arc::new(client))
}

/// Refuses every call. Cash and card sales keep working.
pub struct DisabledGateway;

#[async_trait]
impl PaymentGateway for DisabledGateway {
    async fn initiate(&self, _request: &StkPushRequest) -> GatewayResult<StkPushAccepted> {
        Err(GatewayError::Config("M-Pesa is not configured on this server".to_string()))
    }

    async fn query_status(&self, _checkout_request_id: &str) -> GatewayResult<StkStatus> {
        Err(GatewayError::Config("M-Pesa is not configured on this server".to_string()))
    }
}
