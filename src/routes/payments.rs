use actix_web::{get, post, web, HttpResponse};

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::dto::{
    CreateIntentRequest, Pagination, PaymentFailureRequest, PaymentIntentResponse, VerifyPaymentRequest,
    VerifyPaymentResponse,
};
use crate::services::payment_service::PaymentService;
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: u64 = 100;

/// POST /payments/{provider}/order - open a provider-side order
#[post("/{provider}/order")]
pub async fn create_intent(
    user: AuthUser,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<CreateIntentRequest>,
) -> Result<HttpResponse, AppError> {
    let gateway = PaymentService::gateway(state.payments.as_deref(), &path)?;
    let transaction = PaymentService::create_intent(
        &state.db,
        gateway,
        &state.config.payments.currency,
        user.0.id,
        body.order_id,
    )
    .await?;

    Ok(HttpResponse::Ok().json(PaymentIntentResponse {
        key_id: gateway.key_id().to_string(),
        provider_order_id: transaction.provider_order_id.unwrap_or_default(),
        amount: transaction.amount_paise,
        currency: transaction.currency,
        internal_order_id: transaction.order_id,
        payment_transaction_id: transaction.id,
    }))
}

/// POST /payments/{provider}/verify - signed checkout callback
#[post("/{provider}/verify")]
pub async fn verify_payment(
    user: AuthUser,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<VerifyPaymentRequest>,
) -> Result<HttpResponse, AppError> {
    let gateway = PaymentService::gateway(state.payments.as_deref(), &path)?;
    let order = PaymentService::verify(&state.db, gateway, user.0.id, &body).await?;

    Ok(HttpResponse::Ok().json(VerifyPaymentResponse {
        message: "Payment verified successfully".to_string(),
        order: order.into(),
    }))
}

/// POST /payments/{provider}/fail
#[post("/{provider}/fail")]
pub async fn payment_failed(
    user: AuthUser,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<PaymentFailureRequest>,
) -> Result<HttpResponse, AppError> {
    let gateway = PaymentService::gateway(state.payments.as_deref(), &path)?;
    let transaction = PaymentService::mark_failed(
        &state.db,
        gateway.provider(),
        &state.config.payments.currency,
        user.0.id,
        &body,
    )
    .await?;

    Ok(HttpResponse::Ok().json(transaction))
}

/// GET /payments/
#[get("/")]
pub async fn list_payments(
    user: AuthUser,
    state: web::Data<AppState>,
    page: web::Query<Pagination>,
) -> Result<HttpResponse, AppError> {
    let (offset, limit) = page.resolve(DEFAULT_PAGE_SIZE);
    let transactions = PaymentService::list_for_user(&state.db, user.0.id, offset, limit).await?;
    Ok(HttpResponse::Ok().json(transactions))
}

pub fn payment_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/payments")
            .service(list_payments)
            .service(create_intent)
            .service(verify_payment)
            .service(payment_failed),
    );
}
