use actix_web::{get, web, HttpResponse};
use chrono::Utc;

use crate::models::health::HealthResponse;
use crate::state::AppState;

#[get("/health")]
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    match state.db.ping().await {
        Ok(()) => HttpResponse::Ok().json(HealthResponse {
            status: "ok".to_string(),
            database: "ok".to_string(),
            time: Utc::now(),
        }),
        Err(e) => {
            tracing::error!(error = %e, "Database ping failed");
            HttpResponse::ServiceUnavailable().json(HealthResponse {
                status: "degraded".to_string(),
                database: "unavailable".to_string(),
                time: Utc::now(),
            })
        }
    }
}
