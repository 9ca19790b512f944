mod config;
mod db;
mod error;
mod middleware;
mod models;
mod routes;
mod services;
mod state;
#[cfg(test)]
mod test_support;
mod utils;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{http::header, middleware::Logger, web, App, HttpServer};
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::services::auth_service::AuthService;
use crate::services::razorpay::{PaymentGateway, RazorpayClient};
use crate::services::session_service::SessionService;
use crate::state::AppState;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // .env must be loaded before the filter reads RUST_LOG
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("shop_backend=info,actix_web=info")),
        )
        .init();

    let config = AppConfig::from_env().map_err(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e)
    })?;

    tracing::info!("Connecting to database");
    let db = db::establish_connection(&config).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to connect to database");
        std::io::Error::other(e)
    })?;
    db::init_schema(&db).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to create schema");
        std::io::Error::other(e)
    })?;
    tracing::info!("Database ready");

    if let Some(bootstrap) = &config.bootstrap_admin {
        if let Err(e) = AuthService::bootstrap_admin(&db, bootstrap).await {
            tracing::warn!(error = %e, "Bootstrap admin not provisioned");
        }
    }

    if let Some(period) = config.session_sweep_interval {
        tracing::info!(period_secs = period.as_secs(), "Starting refresh token sweeper");
        SessionService::spawn_cleanup_task(db.clone(), period);
    }

    let payments: Option<Arc<dyn PaymentGateway>> = match RazorpayClient::from_config(&config.payments) {
        Ok(Some(client)) => {
            tracing::info!(provider = client.provider(), "Payment provider enabled");
            Some(Arc::new(client))
        }
        Ok(None) => {
            tracing::warn!("Razorpay credentials not set, payment endpoints disabled");
            None
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to build payment client");
            return Err(std::io::Error::other(e));
        }
    };

    let bind = (config.host, config.port);
    let origins = config.cors_allowed_origins.clone();
    let state = web::Data::new(AppState::new(db, config, payments));

    tracing::info!(host = %bind.0, port = bind.1, "Starting server");

    HttpServer::new(move || {
        let cors = origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .allowed_methods(vec!["GET", "POST", "PUT", "PATCH", "DELETE"])
            .allowed_headers(vec![header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(Logger::default())
            .app_data(state.clone())
            .configure(routes::configure_routes)
    })
    .bind(bind)?
    .run()
    .await
}
