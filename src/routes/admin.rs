use actix_web::{delete, get, patch, post, put, web, HttpResponse};
use validator::Validate;

use crate::error::AppError;
use crate::middleware::AuthAdmin;
use crate::models::dto::{
    CreateAdminRequest, MessageResponse, OrderResponse, Pagination, UpdateAdminRequest, UpdateOrderRequest,
    UpdateUserRequest,
};
use crate::services::order_service::OrderService;
use crate::services::user_service::UserService;
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: u64 = 100;

/// GET /admin/orders/
#[get("/orders/")]
pub async fn list_all_orders(
    _admin: AuthAdmin,
    state: web::Data<AppState>,
    page: web::Query<Pagination>,
) -> Result<HttpResponse, AppError> {
    let (offset, limit) = page.resolve(DEFAULT_PAGE_SIZE);
    let orders: Vec<OrderResponse> = OrderService::list_all(&state.db, offset, limit)
        .await?
        .into_iter()
        .map(OrderResponse::from)
        .collect();

    Ok(HttpResponse::Ok().json(orders))
}

/// PUT /admin/orders/{id}
#[put("/orders/{id}")]
pub async fn update_order(
    admin: AuthAdmin,
    state: web::Data<AppState>,
    path: web::Path<i32>,
    body: web::Json<UpdateOrderRequest>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let order = OrderService::update_status(&state.db, order_id, &body).await?;
    tracing::info!(admin_id = admin.0.id, order_id, "Order updated by admin");

    Ok(HttpResponse::Ok().json(OrderResponse::from(order)))
}

/// GET /admin/users/
#[get("/users/")]
pub async fn list_users(
    _admin: AuthAdmin,
    state: web::Data<AppState>,
    page: web::Query<Pagination>,
) -> Result<HttpResponse, AppError> {
    let (offset, limit) = page.resolve(DEFAULT_PAGE_SIZE);
    let users = UserService::list_users(&state.db, offset, limit).await?;
    Ok(HttpResponse::Ok().json(users))
}

/// PATCH /admin/users/{id}
#[patch("/users/{id}")]
pub async fn update_user(
    admin: AuthAdmin,
    state: web::Data<AppState>,
    path: web::Path<i32>,
    body: web::Json<UpdateUserRequest>,
) -> Result<HttpResponse, AppError> {
    let user_id = path.into_inner();
    let user = match body.is_active {
        Some(is_active) => {
            tracing::info!(admin_id = admin.0.id, user_id, is_active, "User activation changed");
            UserService::set_user_active(&state.db, user_id, is_active).await?
        }
        None => UserService::find_user(&state.db, user_id).await?,
    };

    Ok(HttpResponse::Ok().json(user))
}

/// DELETE /admin/users/{id}
#[delete("/users/{id}")]
pub async fn delete_user(
    admin: AuthAdmin,
    state: web::Data<AppState>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let user_id = path.into_inner();
    UserService::delete_user(&state.db, user_id).await?;
    tracing::warn!(admin_id = admin.0.id, user_id, "User deleted");

    Ok(HttpResponse::Ok().json(MessageResponse::new("User deleted")))
}

/// GET /admin/admins/
#[get("/admins/")]
pub async fn list_admins(_admin: AuthAdmin, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let admins = UserService::list_admins(&state.db).await?;
    Ok(HttpResponse::Ok().json(admins))
}

/// POST /admin/admins/
#[post("/admins/")]
pub async fn create_admin(
    _admin: AuthAdmin,
    state: web::Data<AppState>,
    body: web::Json<CreateAdminRequest>,
) -> Result<HttpResponse, AppError> {
    body.validate()?;
    let created = UserService::create_admin(&state.db, &body).await?;
    Ok(HttpResponse::Created().json(created))
}

/// PATCH /admin/admins/{id}
#[patch("/admins/{id}")]
pub async fn update_admin(
    admin: AuthAdmin,
    state: web::Data<AppState>,
    path: web::Path<i32>,
    body: web::Json<UpdateAdminRequest>,
) -> Result<HttpResponse, AppError> {
    body.validate()?;
    let target_id = path.into_inner();
    let updated = UserService::update_admin(&state.db, target_id, &body).await?;
    tracing::info!(admin_id = admin.0.id, target_id, "Admin account updated");

    Ok(HttpResponse::Ok().json(updated))
}

pub fn admin_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .service(list_all_orders)
            .service(update_order)
            .service(list_users)
            .service(update_user)
            .service(delete_user)
            .service(list_admins)
            .service(create_admin)
            .service(update_admin),
    );
}
