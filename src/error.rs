//! Unified HTTP error type.
//!
//! Route handlers return `Result<HttpResponse, AppError>`. Component errors
//! convert into `AppError` with `?`; the client only ever sees a status code,
//! a stable error code and a non-sensitive message.

use actix_web::http::{header, StatusCode};
use actix_web::{HttpResponse, ResponseError};
use sea_orm::DbErr;
use serde_json::json;
use thiserror::Error;
use validator::ValidationErrors;

use crate::services::auth_service::AuthError;
use crate::services::order_service::OrderError;
use crate::services::payment_service::PaymentError;
use crate::services::session_service::SessionError;
use crate::services::user_service::AccountError;
use crate::utils::jwt::TokenError;

const UNAUTHORIZED_MESSAGE: &str = "Could not validate credentials";
const FORBIDDEN_MESSAGE: &str = "Not authorized to access this resource";
const INTERNAL_MESSAGE: &str = "Internal server error";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Account(#[from] AccountError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("database error: {0}")]
    Database(#[from] DbErr),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(message) => message.to_string(),
                    None => format!("{field} is invalid"),
                })
            })
            .collect();
        messages.sort();
        Self::Validation(messages.join("; "))
    }
}

/// Status, code and client message for one error.
struct Reply {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl Reply {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self { status, code, message: message.into() }
    }

    fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", UNAUTHORIZED_MESSAGE)
    }

    fn inactive() -> Self {
        Self::new(StatusCode::FORBIDDEN, "INACTIVE_ACCOUNT", "Inactive account")
    }

    fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", FORBIDDEN_MESSAGE)
    }

    fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", INTERNAL_MESSAGE)
    }

    fn conflict(code: &'static str, message: &str) -> Self {
        Self::new(StatusCode::CONFLICT, code, message)
    }

    fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    fn not_found(what: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", format!("{what} not found"))
    }
}

fn token_reply(err: &TokenError) -> Reply {
    match err {
        TokenError::Signing(_) | TokenError::LifetimeOutOfRange => Reply::internal(),
        _ => Reply::unauthorized(),
    }
}

fn session_reply(err: &SessionError) -> Reply {
    match err {
        SessionError::InvalidToken => Reply::unauthorized(),
        SessionError::Token(e) => token_reply(e),
        SessionError::InactiveAccount => Reply::inactive(),
        SessionError::NotFound => Reply::not_found("Session"),
        SessionError::Database(_) => Reply::internal(),
    }
}

fn account_reply(err: &AccountError) -> Reply {
    match err {
        AccountError::UsernameTaken => Reply::conflict("USERNAME_TAKEN", "Username already registered"),
        AccountError::EmailTaken => Reply::conflict("EMAIL_TAKEN", "Email already registered"),
        AccountError::UserNotFound => Reply::not_found("User"),
        AccountError::AdminNotFound => Reply::not_found("Admin"),
        AccountError::Database(_) => Reply::internal(),
    }
}

impl AppError {
    fn reply(&self) -> Reply {
        match self {
            Self::Validation(message) => Reply::bad_request("VALIDATION_ERROR", message.clone()),
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials => Reply::new(
                    StatusCode::UNAUTHORIZED,
                    "INVALID_CREDENTIALS",
                    "Incorrect username or password",
                ),
                AuthError::Unauthorized => Reply::unauthorized(),
                AuthError::InactiveAccount => Reply::inactive(),
                AuthError::Token(e) => token_reply(e),
                AuthError::Session(e) => session_reply(e),
                AuthError::Account(e) => account_reply(e),
                AuthError::Database(_) => Reply::internal(),
            },
            Self::Session(err) => session_reply(err),
            Self::Account(err) => account_reply(err),
            Self::Order(err) => match err {
                OrderError::EmptyOrder => {
                    Reply::bad_request("EMPTY_ORDER", "Order must contain at least one item")
                }
                OrderError::QuantityInvalid { product_id } => Reply::bad_request(
                    "QUANTITY_INVALID",
                    format!("Quantity for product {product_id} must be at least 1"),
                ),
                OrderError::UnsupportedPaymentMethod(method) => Reply::bad_request(
                    "UNSUPPORTED_PAYMENT_METHOD",
                    format!("Unsupported payment method: {method}"),
                ),
                OrderError::AmountOverflow => {
                    Reply::bad_request("INVALID_AMOUNT", "Order total is out of range")
                }
                OrderError::ProductNotFound(id) => Reply::not_found(&format!("Product {id}")),
                OrderError::NotFound => Reply::not_found("Order"),
                OrderError::Forbidden => Reply::forbidden(),
                OrderError::Database(_) => Reply::internal(),
            },
            Self::Payment(err) => match err {
                PaymentError::NotConfigured => Reply::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "PAYMENTS_DISABLED",
                    "Payment provider not configured",
                ),
                PaymentError::UnsupportedProvider(_) => Reply::not_found("Payment provider"),
                PaymentError::OrderNotFound => Reply::not_found("Order"),
                PaymentError::TransactionNotFound => Reply::not_found("Payment transaction"),
                PaymentError::Forbidden => Reply::forbidden(),
                PaymentError::PaymentMethodMismatch => Reply::bad_request(
                    "PAYMENT_METHOD_MISMATCH",
                    "Order payment method does not use this provider",
                ),
                PaymentError::InvalidAmount => {
                    Reply::bad_request("INVALID_AMOUNT", "Order amount must be positive")
                }
                PaymentError::AlreadyPaid => Reply::conflict("ALREADY_PAID", "Order is already paid"),
                PaymentError::SignatureInvalid => {
                    Reply::bad_request("SIGNATURE_INVALID", "Payment verification failed")
                }
                PaymentError::Gateway(_) => Reply::new(
                    StatusCode::BAD_GATEWAY,
                    "PROVIDER_ERROR",
                    "Payment provider error",
                ),
                PaymentError::Database(_) => Reply::internal(),
            },
            Self::Token(err) => token_reply(err),
            Self::Database(_) | Self::Internal(_) => Reply::internal(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        self.reply().status
    }

    fn error_response(&self) -> HttpResponse {
        let reply = self.reply();

        if reply.status.is_server_error() {
            tracing::error!(error = %self, code = reply.code, status = reply.status.as_u16(), "Request failed");
        } else {
            tracing::debug!(error = %self, code = reply.code, status = reply.status.as_u16(), "Request rejected");
        }

        let mut builder = HttpResponse::build(reply.status);
        if reply.status == StatusCode::UNAUTHORIZED {
            builder.insert_header((header::WWW_AUTHENTICATE, "Bearer"));
        }

        builder.json(json!({
            "error": {
                "code": reply.code,
                "message": reply.message,
            }
        }))
    }
}
