use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::services::razorpay::PaymentGateway;
use crate::utils::jwt::TokenService;

/// Shared handles passed to every handler through `web::Data`.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub tokens: TokenService,
    pub config: Arc<AppConfig>,
    /// `None` when no provider credentials are configured
    pub payments: Option<Arc<dyn PaymentGateway>>,
}

impl AppState {
    pub fn new(
        db: DatabaseConnection,
        config: AppConfig,
        payments: Option<Arc<dyn PaymentGateway>>,
    ) -> Self {
        Self {
            tokens: TokenService::from_config(&config.auth),
            db,
            config: Arc::new(config),
            payments,
        }
    }
}
