use chrono::Utc;
use sea_orm::*;
use thiserror::Error;

use crate::models::dto::{PaymentFailureRequest, VerifyPaymentRequest};
use crate::models::orders::{self, OrderStatus, PaymentStatus};
use crate::models::payment_transactions::{self, TransactionStatus};
use crate::services::order_service::{OrderService, OrderWithItems};
use crate::services::razorpay::{GatewayError, PaymentGateway};

pub struct PaymentService;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment provider not configured")]
    NotConfigured,
    #[error("unsupported payment provider: {0}")]
    UnsupportedProvider(String),
    #[error("order not found")]
    OrderNotFound,
    #[error("payment transaction not found")]
    TransactionNotFound,
    #[error("order belongs to another user")]
    Forbidden,
    #[error("order is not payable through this provider")]
    PaymentMethodMismatch,
    #[error("order amount must be positive")]
    InvalidAmount,
    #[error("order is already paid")]
    AlreadyPaid,
    #[error("payment signature mismatch")]
    SignatureInvalid,
    #[error("payment provider error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

impl PaymentService {
    /// Pick the configured gateway for the provider named in the request path.
    pub fn gateway<'a>(
        configured: Option<&'a dyn PaymentGateway>,
        provider: &str,
    ) -> Result<&'a dyn PaymentGateway, PaymentError> {
        let gateway = configured.ok_or(PaymentError::NotConfigured)?;
        if !gateway.provider().eq_ignore_ascii_case(provider) {
            return Err(PaymentError::UnsupportedProvider(provider.to_string()));
        }
        Ok(gateway)
    }

    /// Open a provider-side order for `order_id` and record a `created` attempt.
    ///
    /// A provider failure leaves no row behind; the caller retries with a fresh intent.
    pub async fn create_intent(
        db: &DatabaseConnection,
        gateway: &dyn PaymentGateway,
        currency: &str,
        user_id: i32,
        order_id: i32,
    ) -> Result<payment_transactions::Model, PaymentError> {
        let order = Self::owned_order(db, user_id, order_id).await?;

        if !order.payment_method.is_provider_backed() || order.payment_method.as_str() != gateway.provider() {
            return Err(PaymentError::PaymentMethodMismatch);
        }
        if order.payment_status == PaymentStatus::Paid {
            return Err(PaymentError::AlreadyPaid);
        }
        let amount_paise = order.total_paise;
        if amount_paise <= 0 {
            return Err(PaymentError::InvalidAmount);
        }

        let receipt = format!("order_{}", order.id);
        let remote = gateway.create_order(amount_paise, currency, &receipt).await.map_err(|e| {
            tracing::error!(order_id, error = %e, "Provider order creation failed");
            e
        })?;
        if remote.amount != amount_paise {
            tracing::error!(order_id, expected = amount_paise, quoted = remote.amount, "Provider quoted a different amount");
            return Err(GatewayError::InvalidResponse(format!(
                "order {} amount {} does not match {}",
                remote.id, remote.amount, amount_paise
            ))
            .into());
        }

        let transaction = payment_transactions::ActiveModel {
            user_id: Set(user_id),
            order_id: Set(order.id),
            provider: Set(gateway.provider().to_string()),
            status: Set(TransactionStatus::Created),
            amount_paise: Set(amount_paise),
            currency: Set(remote.currency.clone()),
            provider_order_id: Set(Some(remote.id.clone())),
            provider_payment_id: Set(None),
            provider_signature: Set(None),
            error_code: Set(None),
            error_description: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
            ..Default::default()
        }
        .insert(db)
        .await?;

        tracing::info!(
            order_id,
            transaction_id = transaction.id,
            provider_order_id = %remote.id,
            amount_paise,
            receipt = ?remote.receipt,
            provider_status = ?remote.status,
            "Payment intent created"
        );
        Ok(transaction)
    }

    /// Confirm a provider callback and mark the order paid.
    ///
    /// The signature is checked before anything is read. The transaction row and
    /// the order are updated in one database transaction. Replaying a valid
    /// callback is harmless: an order that is already paid keeps its status.
    pub async fn verify(
        db: &DatabaseConnection,
        gateway: &dyn PaymentGateway,
        user_id: i32,
        req: &VerifyPaymentRequest,
    ) -> Result<OrderWithItems, PaymentError> {
        if !gateway.verify_signature(&req.provider_order_id, &req.provider_payment_id, &req.signature) {
            tracing::warn!(
                order_id = req.order_id,
                user_id,
                provider_order_id = %req.provider_order_id,
                "Rejected payment callback with invalid signature"
            );
            return Err(PaymentError::SignatureInvalid);
        }

        let txn = db.begin().await?;

        let order = Self::owned_order(&txn, user_id, req.order_id).await?;
        let transaction = payment_transactions::Entity::find()
            .filter(payment_transactions::Column::OrderId.eq(order.id))
            .filter(payment_transactions::Column::ProviderOrderId.eq(req.provider_order_id.as_str()))
            .order_by_desc(payment_transactions::Column::Id)
            .one(&txn)
            .await?
            .ok_or(PaymentError::TransactionNotFound)?;

        let now = Utc::now();
        let mut active: payment_transactions::ActiveModel = transaction.into();
        active.status = Set(TransactionStatus::Success);
        active.provider_payment_id = Set(Some(req.provider_payment_id.clone()));
        active.provider_signature = Set(Some(req.signature.clone()));
        active.error_code = Set(None);
        active.error_description = Set(None);
        active.updated_at = Set(Some(now));
        let transaction = active.update(&txn).await?;

        if order.payment_status != PaymentStatus::Paid {
            let mut active: orders::ActiveModel = order.into();
            active.status = Set(OrderStatus::Processing);
            active.payment_status = Set(PaymentStatus::Paid);
            active.updated_at = Set(Some(now));
            active.update(&txn).await?;
        } else {
            tracing::debug!(order_id = order.id, "Order already paid, status left unchanged");
        }

        txn.commit().await?;

        tracing::info!(
            order_id = req.order_id,
            transaction_id = transaction.id,
            "Payment verified"
        );
        OrderService::find_with_items(db, req.order_id)
            .await?
            .ok_or(PaymentError::OrderNotFound)
    }

    /// Record a failed attempt. The order itself stays payable.
    pub async fn mark_failed(
        db: &DatabaseConnection,
        provider: &str,
        currency: &str,
        user_id: i32,
        req: &PaymentFailureRequest,
    ) -> Result<payment_transactions::Model, PaymentError> {
        let order = Self::owned_order(db, user_id, req.order_id).await?;

        let existing = match req.provider_order_id.as_deref() {
            Some(provider_order_id) => {
                payment_transactions::Entity::find()
                    .filter(payment_transactions::Column::OrderId.eq(order.id))
                    .filter(payment_transactions::Column::ProviderOrderId.eq(provider_order_id))
                    .order_by_desc(payment_transactions::Column::Id)
                    .one(db)
                    .await?
            }
            None => None,
        };

        let transaction = match existing {
            Some(transaction) if transaction.status == TransactionStatus::Success => {
                tracing::warn!(
                    order_id = order.id,
                    transaction_id = transaction.id,
                    "Failure reported for a settled payment, ignoring"
                );
                return Ok(transaction);
            }
            Some(transaction) => {
                let mut active: payment_transactions::ActiveModel = transaction.into();
                active.status = Set(TransactionStatus::Failed);
                active.error_code = Set(req.error_code.clone());
                active.error_description = Set(req.error_description.clone());
                active.updated_at = Set(Some(Utc::now()));
                active.update(db).await?
            }
            None => {
                payment_transactions::ActiveModel {
                    user_id: Set(user_id),
                    order_id: Set(order.id),
                    provider: Set(provider.to_string()),
                    status: Set(TransactionStatus::Failed),
                    amount_paise: Set(order.total_paise),
                    currency: Set(currency.to_string()),
                    provider_order_id: Set(req.provider_order_id.clone()),
                    provider_payment_id: Set(None),
                    provider_signature: Set(None),
                    error_code: Set(req.error_code.clone()),
                    error_description: Set(req.error_description.clone()),
                    created_at: Set(Utc::now()),
                    updated_at: Set(None),
                    ..Default::default()
                }
                .insert(db)
                .await?
            }
        };

        tracing::info!(
            order_id = order.id,
            transaction_id = transaction.id,
            error_code = ?transaction.error_code,
            "Payment marked failed"
        );
        Ok(transaction)
    }

    /// Payment attempts of one user, newest first.
    pub async fn list_for_user<C: ConnectionTrait>(
        db: &C,
        user_id: i32,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<payment_transactions::Model>, DbErr> {
        payment_transactions::Entity::find()
            .filter(payment_transactions::Column::UserId.eq(user_id))
            .order_by_desc(payment_transactions::Column::CreatedAt)
            .order_by_desc(payment_transactions::Column::Id)
            .offset(offset)
            .limit(limit)
            .all(db)
            .await
    }

    async fn owned_order<C: ConnectionTrait>(
        db: &C,
        user_id: i32,
        order_id: i32,
    ) -> Result<orders::Model, PaymentError> {
        let order = orders::Entity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or(PaymentError::OrderNotFound)?;
        if order.user_id != user_id {
            tracing::warn!(order_id, user_id, "Payment attempted on another user's order");
            return Err(PaymentError::Forbidden);
        }
        Ok(order)
    }
}
