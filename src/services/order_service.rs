use std::collections::HashMap;

use chrono::Utc;
use sea_orm::*;
use thiserror::Error;

use crate::models::dto::{CreateOrderRequest, UpdateOrderRequest};
use crate::models::orders::{OrderStatus, PaymentMethod, PaymentStatus};
use crate::models::{order_items, orders, products};

pub struct OrderService;

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("order has no items")]
    EmptyOrder,
    #[error("invalid quantity for product {product_id}")]
    QuantityInvalid { product_id: i32 },
    #[error("unsupported payment method: {0}")]
    UnsupportedPaymentMethod(String),
    #[error("order total overflows")]
    AmountOverflow,
    #[error("product {0} not found")]
    ProductNotFound(i32),
    #[error("order not found")]
    NotFound,
    #[error("order belongs to another user")]
    Forbidden,
    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

/// An order together with its line items.
#[derive(Debug, Clone)]
pub struct OrderWithItems {
    pub order: orders::Model,
    pub items: Vec<order_items::Model>,
}

impl OrderService {
    /// Place an order, snapshotting current product prices.
    ///
    /// The order row and all item rows are written in one transaction.
    pub async fn create_order(
        db: &DatabaseConnection,
        user_id: i32,
        req: &CreateOrderRequest,
    ) -> Result<OrderWithItems, OrderError> {
        if req.items.is_empty() {
            return Err(OrderError::EmptyOrder);
        }
        let payment_method: PaymentMethod = req
            .payment_method
            .trim()
            .parse()
            .map_err(OrderError::UnsupportedPaymentMethod)?;

        let txn = db.begin().await?;

        let product_ids: Vec<i32> = req.items.iter().map(|item| item.product_id).collect();
        let prices: HashMap<i32, i64> = products::Entity::find()
            .filter(products::Column::Id.is_in(product_ids))
            .all(&txn)
            .await?
            .into_iter()
            .map(|product| (product.id, product.price_paise))
            .collect();

        // (product_id, quantity, unit price, subtotal)
        let mut lines = Vec::with_capacity(req.items.len());
        let mut total_paise: i64 = 0;
        for item in &req.items {
            if item.quantity <= 0 {
                return Err(OrderError::QuantityInvalid { product_id: item.product_id });
            }
            let unit_price = *prices
                .get(&item.product_id)
                .ok_or(OrderError::ProductNotFound(item.product_id))?;
            let subtotal = unit_price
                .checked_mul(i64::from(item.quantity))
                .ok_or(OrderError::AmountOverflow)?;
            total_paise = total_paise.checked_add(subtotal).ok_or(OrderError::AmountOverflow)?;
            lines.push((item.product_id, item.quantity, unit_price, subtotal));
        }

        let order = orders::ActiveModel {
            user_id: Set(user_id),
            status: Set(OrderStatus::Pending),
            total_paise: Set(total_paise),
            shipping_address: Set(req.shipping_address.trim().to_string()),
            payment_method: Set(payment_method),
            payment_status: Set(PaymentStatus::Pending),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(lines.len());
        for (product_id, quantity, unit_price_paise, subtotal_paise) in lines {
            let item = order_items::ActiveModel {
                order_id: Set(order.id),
                product_id: Set(product_id),
                quantity: Set(quantity),
                unit_price_paise: Set(unit_price_paise),
                subtotal_paise: Set(subtotal_paise),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
            items.push(item);
        }

        txn.commit().await?;

        tracing::info!(
            order_id = order.id,
            user_id,
            total_paise,
            items = items.len(),
            payment_method = %payment_method,
            "Order created"
        );
        Ok(OrderWithItems { order, items })
    }

    /// Admin partial update: only the provided fields change.
    pub async fn update_status(
        db: &DatabaseConnection,
        order_id: i32,
        update: &UpdateOrderRequest,
    ) -> Result<OrderWithItems, OrderError> {
        let order = orders::Entity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or(OrderError::NotFound)?;

        let mut active: orders::ActiveModel = order.into();
        if let Some(status) = update.status {
            active.status = Set(status);
        }
        if let Some(payment_status) = update.payment_status {
            active.payment_status = Set(payment_status);
        }
        active.updated_at = Set(Some(Utc::now()));
        let order = active.update(db).await?;

        tracing::info!(order_id, status = ?order.status, payment_status = ?order.payment_status, "Order updated");
        Self::with_items(db, order).await.map_err(OrderError::from)
    }

    pub async fn find_with_items<C: ConnectionTrait>(
        db: &C,
        order_id: i32,
    ) -> Result<Option<OrderWithItems>, DbErr> {
        match orders::Entity::find_by_id(order_id).one(db).await? {
            Some(order) => Self::with_items(db, order).await.map(Some),
            None => Ok(None),
        }
    }

    /// Load an order on behalf of its owner.
    pub async fn find_for_user<C: ConnectionTrait>(
        db: &C,
        order_id: i32,
        user_id: i32,
    ) -> Result<OrderWithItems, OrderError> {
        let order = Self::find_with_items(db, order_id)
            .await?
            .ok_or(OrderError::NotFound)?;
        if order.order.user_id != user_id {
            tracing::warn!(order_id, user_id, "Order access by non-owner");
            return Err(OrderError::Forbidden);
        }
        Ok(order)
    }

    pub async fn list_for_user<C: ConnectionTrait>(
        db: &C,
        user_id: i32,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<OrderWithItems>, DbErr> {
        let page = orders::Entity::find()
            .filter(orders::Column::UserId.eq(user_id))
            .order_by_desc(orders::Column::CreatedAt)
            .order_by_desc(orders::Column::Id)
            .offset(offset)
            .limit(limit)
            .all(db)
            .await?;
        Self::attach_items(db, page).await
    }

    pub async fn list_all<C: ConnectionTrait>(
        db: &C,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<OrderWithItems>, DbErr> {
        let page = orders::Entity::find()
            .order_by_desc(orders::Column::CreatedAt)
            .order_by_desc(orders::Column::Id)
            .offset(offset)
            .limit(limit)
            .all(db)
            .await?;
        Self::attach_items(db, page).await
    }

    async fn with_items<C: ConnectionTrait>(db: &C, order: orders::Model) -> Result<OrderWithItems, DbErr> {
        let items = order_items::Entity::find()
            .filter(order_items::Column::OrderId.eq(order.id))
            .order_by_asc(order_items::Column::Id)
            .all(db)
            .await?;
        Ok(OrderWithItems { order, items })
    }

    async fn attach_items<C: ConnectionTrait>(
        db: &C,
        page: Vec<orders::Model>,
    ) -> Result<Vec<OrderWithItems>, DbErr> {
        let items = page.load_many(order_items::Entity, db).await?;
        Ok(page
            .into_iter()
            .zip(items)
            .map(|(order, mut items)| {
                items.sort_by_key(|item| item.id);
                OrderWithItems { order, items }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::dto::OrderItemRequest;
    use crate::test_support;

    fn request(method: &str, items: &[(i32, i32)]) -> CreateOrderRequest {
        CreateOrderRequest {
            shipping_address: "221B Baker Street".to_string(),
            payment_method: method.to_string(),
            items: items
                .iter()
                .map(|&(product_id, quantity)| OrderItemRequest { product_id, quantity })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_create_order_snapshots_prices() {
        let db = test_support::setup_db().await;
        let user = test_support::create_user(&db, "alice", test_support::PASSWORD).await;
        let mug = test_support::create_product(&db, "Mug", 5000).await;
        let tea = test_support::create_product(&db, "Tea", 1250).await;

        let placed = OrderService::create_order(
            &db,
            user.id,
            &request("cash_on_delivery", &[(mug.id, 2), (tea.id, 3)]),
        )
        .await
        .unwrap();

        assert_eq!(placed.order.total_paise, 2 * 5000 + 3 * 1250);
        assert_eq!(placed.order.status, OrderStatus::Pending);
        assert_eq!(placed.order.payment_status, PaymentStatus::Pending);
        assert_eq!(placed.order.payment_method, PaymentMethod::CashOnDelivery);
        assert_eq!(placed.items.len(), 2);
        assert_eq!(placed.items[0].unit_price_paise, 5000);
        assert_eq!(placed.items[0].subtotal_paise, 10000);

        // later catalog changes do not touch the placed order
        let mut active: products::ActiveModel = mug.into();
        active.price_paise = Set(9900);
        active.update(&db).await.unwrap();

        let reloaded = OrderService::find_with_items(&db, placed.order.id).await.unwrap().unwrap();
        assert_eq!(reloaded.order.total_paise, 13750);
        assert_eq!(reloaded.items[0].unit_price_paise, 5000);
    }

    #[tokio::test]
    async fn test_create_order_validation() {
        let db = test_support::setup_db().await;
        let user = test_support::create_user(&db, "alice", test_support::PASSWORD).await;
        let mug = test_support::create_product(&db, "Mug", 5000).await;

        assert!(matches!(
            OrderService::create_order(&db, user.id, &request("cash_on_delivery", &[])).await,
            Err(OrderError::EmptyOrder)
        ));
        assert!(matches!(
            OrderService::create_order(&db, user.id, &request("bitcoin", &[(mug.id, 1)])).await,
            Err(OrderError::UnsupportedPaymentMethod(m)) if m == "bitcoin"
        ));
        assert!(matches!(
            OrderService::create_order(&db, user.id, &request("razorpay", &[(mug.id, 0)])).await,
            Err(OrderError::QuantityInvalid { product_id }) if product_id == mug.id
        ));
        assert!(matches!(
            OrderService::create_order(&db, user.id, &request("razorpay", &[(mug.id, 1), (404, 1)])).await,
            Err(OrderError::ProductNotFound(404))
        ));

        // each line fits, their sum does not
        let yacht = test_support::create_product(&db, "Yacht", i64::MAX / 2 + 1).await;
        assert!(matches!(
            OrderService::create_order(&db, user.id, &request("razorpay", &[(yacht.id, 1), (yacht.id, 1)])).await,
            Err(OrderError::AmountOverflow)
        ));
    }

    #[tokio::test]
    async fn test_failed_order_leaves_no_rows() {
        let db = test_support::setup_db().await;
        let user = test_support::create_user(&db, "alice", test_support::PASSWORD).await;
        let mug = test_support::create_product(&db, "Mug", 5000).await;

        let rejected = [
            request("razorpay", &[]),
            request("razorpay", &[(mug.id, 1), (mug.id, -1)]),
            request("razorpay", &[(mug.id, 1), (404, 1)]),
        ];
        for req in &rejected {
            assert!(OrderService::create_order(&db, user.id, req).await.is_err());
            assert_eq!(orders::Entity::find().count(&db).await.unwrap(), 0);
            assert_eq!(order_items::Entity::find().count(&db).await.unwrap(), 0);
        }
    }

    #[tokio::test]
    async fn test_item_insert_failure_rolls_back_order() {
        let db = test_support::setup_db().await;
        let user = test_support::create_user(&db, "alice", test_support::PASSWORD).await;
        let mug = test_support::create_product(&db, "Mug", 5000).await;
        db.execute_unprepared(
            "CREATE TRIGGER reject_thirteen BEFORE INSERT ON order_items \
             WHEN NEW.quantity = 13 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
        )
        .await
        .unwrap();

        // the order row and the first item are written before the second item fails
        let result =
            OrderService::create_order(&db, user.id, &request("razorpay", &[(mug.id, 1), (mug.id, 13)])).await;
        assert!(matches!(result, Err(OrderError::Database(_))));

        assert_eq!(orders::Entity::find().count(&db).await.unwrap(), 0);
        assert_eq!(order_items::Entity::find().count(&db).await.unwrap(), 0);

        let placed = OrderService::create_order(&db, user.id, &request("razorpay", &[(mug.id, 2)])).await.unwrap();
        assert_eq!(placed.order.total_paise, 10000);
        assert_eq!(orders::Entity::find().count(&db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_overflowing_total_is_rejected() {
        let db = test_support::setup_db().await;
        let user = test_support::create_user(&db, "alice", test_support::PASSWORD).await;
        let yacht = test_support::create_product(&db, "Yacht", i64::MAX / 2).await;

        let result = OrderService::create_order(&db, user.id, &request("razorpay", &[(yacht.id, 3)])).await;
        assert!(matches!(result, Err(OrderError::AmountOverflow)));
    }

    #[tokio::test]
    async fn test_update_status_is_partial() {
        let db = test_support::setup_db().await;
        let user = test_support::create_user(&db, "alice", test_support::PASSWORD).await;
        let mug = test_support::create_product(&db, "Mug", 5000).await;
        let placed = OrderService::create_order(&db, user.id, &request("cash_on_delivery", &[(mug.id, 1)]))
            .await
            .unwrap();

        let update = UpdateOrderRequest { status: Some(OrderStatus::Shipped), payment_status: None };
        let updated = OrderService::update_status(&db, placed.order.id, &update).await.unwrap();
        assert_eq!(updated.order.status, OrderStatus::Shipped);
        assert_eq!(updated.order.payment_status, PaymentStatus::Pending);
        assert_eq!(updated.items.len(), 1);

        let missing = OrderService::update_status(&db, 999, &update).await;
        assert!(matches!(missing, Err(OrderError::NotFound)));
    }

    #[tokio::test]
    async fn test_ownership_and_listing() {
        let db = test_support::setup_db().await;
        let alice = test_support::create_user(&db, "alice", test_support::PASSWORD).await;
        let bob = test_support::create_user(&db, "bob", test_support::PASSWORD).await;
        let mug = test_support::create_product(&db, "Mug", 5000).await;

        let first = OrderService::create_order(&db, alice.id, &request("cash_on_delivery", &[(mug.id, 1)]))
            .await
            .unwrap();
        let second = OrderService::create_order(&db, alice.id, &request("razorpay", &[(mug.id, 2)]))
            .await
            .unwrap();
        OrderService::create_order(&db, bob.id, &request("razorpay", &[(mug.id, 3)]))
            .await
            .unwrap();

        assert!(matches!(
            OrderService::find_for_user(&db, first.order.id, bob.id).await,
            Err(OrderError::Forbidden)
        ));
        assert!(matches!(
            OrderService::find_for_user(&db, 999, alice.id).await,
            Err(OrderError::NotFound)
        ));

        let mine = OrderService::list_for_user(&db, alice.id, 0, 10).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].order.id, second.order.id);
        assert_eq!(mine[0].items.len(), 1);
        assert_eq!(mine[0].items[0].quantity, 2);

        let page = OrderService::list_for_user(&db, alice.id, 1, 10).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].order.id, first.order.id);

        assert_eq!(OrderService::list_all(&db, 0, 100).await.unwrap().len(), 3);
    }
}
