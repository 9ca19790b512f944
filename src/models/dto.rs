// Request / response shapes for the HTTP layer.
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::orders::{OrderStatus, PaymentMethod, PaymentStatus};
use crate::models::{order_items, refresh_tokens};
use crate::services::order_service::OrderWithItems;

const MAX_PAGE_SIZE: u64 = 100;

/// Convert minor currency units (paise / cents) into a two-decimal amount.
pub fn to_major_units(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 3, max = 100, message = "Username must be 3-100 characters"))]
    pub username: String,
    #[validate(length(min = 8, max = 128, message = "Password must be 8-128 characters"))]
    pub password: String,
    pub full_name: Option<String>,
}

/// `username` accepts either the username or the email address.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

impl TokenResponse {
    pub fn bearer(access_token: String, expires_in: i64) -> Self {
        Self {
            access_token,
            token_type: "bearer".to_string(),
            expires_in,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// One active device session, as shown to its owner.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: i32,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub os: Option<String>,
    pub browser: Option<String>,
    pub device: Option<String>,
    pub is_mobile: bool,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    /// Whether this is the session the request's refresh cookie belongs to
    pub is_current: bool,
}

impl SessionResponse {
    pub fn new(session: refresh_tokens::Model, current_token: Option<&str>) -> Self {
        Self {
            is_current: current_token == Some(session.token.as_str()),
            id: session.id,
            user_agent: session.user_agent,
            ip_address: session.ip_address,
            os: session.os,
            browser: session.browser,
            device: session.device,
            is_mobile: session.is_mobile,
            issued_at: session.issued_at,
            expires_at: session.expires_at,
            last_used_at: session.last_used_at,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RevokeSessionsQuery {
    /// Keep the session holding the caller's refresh cookie
    #[serde(default)]
    pub keep_current: bool,
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

impl Pagination {
    /// Resolve `(offset, limit)`, capping the page size.
    pub fn resolve(&self, default_limit: u64) -> (u64, u64) {
        let limit = self.limit.unwrap_or(default_limit).clamp(1, MAX_PAGE_SIZE);
        (self.skip.unwrap_or(0), limit)
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct OrderItemRequest {
    pub product_id: i32,
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub shipping_address: String,
    pub payment_method: String,
    #[serde(alias = "order_items", default)]
    pub items: Vec<OrderItemRequest>,
}

/// Partial update: only the provided fields change.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateOrderRequest {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
}

#[derive(Debug, Serialize)]
pub struct OrderItemResponse {
    pub id: i32,
    pub product_id: i32,
    pub quantity: i32,
    pub price: Decimal,
    pub subtotal: Decimal,
}

impl From<order_items::Model> for OrderItemResponse {
    fn from(item: order_items::Model) -> Self {
        Self {
            id: item.id,
            product_id: item.product_id,
            quantity: item.quantity,
            price: to_major_units(item.unit_price_paise),
            subtotal: to_major_units(item.subtotal_paise),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: i32,
    pub user_id: i32,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub shipping_address: String,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub order_items: Vec<OrderItemResponse>,
}

impl From<OrderWithItems> for OrderResponse {
    fn from(OrderWithItems { order, items }: OrderWithItems) -> Self {
        Self {
            id: order.id,
            user_id: order.user_id,
            status: order.status,
            total_amount: to_major_units(order.total_paise),
            shipping_address: order.shipping_address,
            payment_method: order.payment_method,
            payment_status: order.payment_status,
            created_at: order.created_at,
            updated_at: order.updated_at,
            order_items: items.into_iter().map(OrderItemResponse::from).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Payments
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateIntentRequest {
    pub order_id: i32,
}

#[derive(Debug, Serialize)]
pub struct PaymentIntentResponse {
    pub key_id: String,
    pub provider_order_id: String,
    /// Amount in minor currency units
    pub amount: i64,
    pub currency: String,
    pub internal_order_id: i32,
    pub payment_transaction_id: i32,
}

#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub order_id: i32,
    #[serde(alias = "razorpay_order_id")]
    pub provider_order_id: String,
    #[serde(alias = "razorpay_payment_id")]
    pub provider_payment_id: String,
    #[serde(alias = "razorpay_signature")]
    pub signature: String,
}

#[derive(Debug, Deserialize)]
pub struct PaymentFailureRequest {
    pub order_id: i32,
    #[serde(alias = "razorpay_order_id")]
    pub provider_order_id: Option<String>,
    pub error_code: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VerifyPaymentResponse {
    pub message: String,
    pub order: OrderResponse,
}

// ---------------------------------------------------------------------------
// Admin
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAdminRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 3, max = 100, message = "Username must be 3-100 characters"))]
    pub username: String,
    #[validate(length(min = 8, max = 128, message = "Password must be 8-128 characters"))]
    pub password: String,
    pub full_name: Option<String>,
    #[validate(length(min = 1, max = 50, message = "Role must be 1-50 characters"))]
    pub role: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateAdminRequest {
    #[validate(length(min = 1, max = 50, message = "Role must be 1-50 characters"))]
    pub role: Option<String>,
    pub is_active: Option<bool>,
    pub deprecated: Option<bool>,
}
