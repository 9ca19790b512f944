use actix_web::{get, post, web, HttpResponse};

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::dto::{CreateOrderRequest, OrderResponse, Pagination};
use crate::services::order_service::OrderService;
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: u64 = 10;

/// POST /orders/
#[post("/")]
pub async fn create_order(
    user: AuthUser,
    state: web::Data<AppState>,
    body: web::Json<CreateOrderRequest>,
) -> Result<HttpResponse, AppError> {
    let order = OrderService::create_order(&state.db, user.0.id, &body).await?;
    Ok(HttpResponse::Created().json(OrderResponse::from(order)))
}

/// GET /orders/?skip=0&limit=10
#[get("/")]
pub async fn list_orders(
    user: AuthUser,
    state: web::Data<AppState>,
    page: web::Query<Pagination>,
) -> Result<HttpResponse, AppError> {
    let (offset, limit) = page.resolve(DEFAULT_PAGE_SIZE);
    let orders: Vec<OrderResponse> = OrderService::list_for_user(&state.db, user.0.id, offset, limit)
        .await?
        .into_iter()
        .map(OrderResponse::from)
        .collect();

    Ok(HttpResponse::Ok().json(orders))
}

/// GET /orders/{id}
#[get("/{id}")]
pub async fn get_order(
    user: AuthUser,
    state: web::Data<AppState>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let order = OrderService::find_for_user(&state.db, path.into_inner(), user.0.id).await?;
    Ok(HttpResponse::Ok().json(OrderResponse::from(order)))
}

pub fn order_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/orders")
            .service(create_order)
            .service(list_orders)
            .service(get_order),
    );
}
