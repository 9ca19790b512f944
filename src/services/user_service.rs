use chrono::Utc;
use sea_orm::*;
use thiserror::Error;

use crate::models::dto::{CreateAdminRequest, UpdateAdminRequest};
use crate::models::{admins, order_items, orders, payment_transactions, refresh_tokens, users};
use crate::services::session_service::SessionService;
use crate::utils::password;

pub struct UserService;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("username already registered")]
    UsernameTaken,
    #[error("email already registered")]
    EmailTaken,
    #[error("user not found")]
    UserNotFound,
    #[error("admin not found")]
    AdminNotFound,
    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

/// Fields for a new customer account. The password is hashed here.
pub struct NewUser<'a> {
    pub email: &'a str,
    pub username: &'a str,
    pub password: &'a str,
    pub full_name: Option<&'a str>,
}

/// Map a unique-index violation from a concurrent insert to the matching conflict.
fn unique_violation(err: DbErr) -> AccountError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail)) if detail.contains("username") => {
            AccountError::UsernameTaken
        }
        Some(SqlErr::UniqueConstraintViolation(_)) => AccountError::EmailTaken,
        _ => AccountError::Database(err),
    }
}

impl UserService {
    /// Insert a customer after checking username and email are free.
    pub async fn create_user<C: ConnectionTrait>(
        db: &C,
        new_user: NewUser<'_>,
    ) -> Result<users::Model, AccountError> {
        let taken = users::Entity::find()
            .filter(
                Condition::any()
                    .add(users::Column::Username.eq(new_user.username))
                    .add(users::Column::Email.eq(new_user.email)),
            )
            .all(db)
            .await?;
        if taken.iter().any(|u| u.username == new_user.username) {
            return Err(AccountError::UsernameTaken);
        }
        if !taken.is_empty() {
            return Err(AccountError::EmailTaken);
        }

        let user = users::ActiveModel {
            email: Set(new_user.email.to_string()),
            username: Set(new_user.username.to_string()),
            hashed_password: Set(password::hash_password(new_user.password)),
            full_name: Set(new_user.full_name.map(String::from)),
            is_active: Set(true),
            is_verified: Set(false),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
            ..Default::default()
        }
        .insert(db)
        .await
        .map_err(unique_violation)?;

        tracing::info!(user_id = user.id, username = %user.username, "User registered");
        Ok(user)
    }

    pub async fn list_users<C: ConnectionTrait>(
        db: &C,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<users::Model>, DbErr> {
        users::Entity::find()
            .order_by_asc(users::Column::Id)
            .offset(offset)
            .limit(limit)
            .all(db)
            .await
    }

    pub async fn find_user<C: ConnectionTrait>(db: &C, id: i32) -> Result<users::Model, AccountError> {
        users::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or(AccountError::UserNotFound)
    }

    /// Enable or disable a customer. Disabling also revokes all of their sessions.
    pub async fn set_user_active(
        db: &DatabaseConnection,
        id: i32,
        is_active: bool,
    ) -> Result<users::Model, AccountError> {
        let txn = db.begin().await?;

        let user = Self::find_user(&txn, id).await?;
        let mut active: users::ActiveModel = user.into();
        active.is_active = Set(is_active);
        active.updated_at = Set(Some(Utc::now()));
        let user = active.update(&txn).await?;

        if !is_active {
            let revoked = SessionService::revoke_all(&txn, user.id, None).await?;
            tracing::info!(user_id = user.id, revoked, "User deactivated");
        }

        txn.commit().await?;
        Ok(user)
    }

    /// Hard-delete a customer and everything they own.
    ///
    /// Dependent rows are removed explicitly, children first, inside one
    /// transaction: payment transactions, order items, orders, refresh
    /// tokens, then the user.
    pub async fn delete_user(db: &DatabaseConnection, id: i32) -> Result<(), AccountError> {
        let txn = db.begin().await?;

        let user = Self::find_user(&txn, id).await?;

        let order_ids: Vec<i32> = orders::Entity::find()
            .select_only()
            .column(orders::Column::Id)
            .filter(orders::Column::UserId.eq(user.id))
            .into_tuple()
            .all(&txn)
            .await?;

        let payments = payment_transactions::Entity::delete_many()
            .filter(
                Condition::any()
                    .add(payment_transactions::Column::UserId.eq(user.id))
                    .add(payment_transactions::Column::OrderId.is_in(order_ids.clone())),
            )
            .exec(&txn)
            .await?;
        let items = order_items::Entity::delete_many()
            .filter(order_items::Column::OrderId.is_in(order_ids))
            .exec(&txn)
            .await?;
        let order_rows = orders::Entity::delete_many()
            .filter(orders::Column::UserId.eq(user.id))
            .exec(&txn)
            .await?;
        let sessions = refresh_tokens::Entity::delete_many()
            .filter(refresh_tokens::Column::UserId.eq(user.id))
            .exec(&txn)
            .await?;
        users::Entity::delete_by_id(user.id).exec(&txn).await?;

        txn.commit().await?;

        tracing::info!(
            user_id = id,
            payments = payments.rows_affected,
            items = items.rows_affected,
            orders = order_rows.rows_affected,
            sessions = sessions.rows_affected,
            "User deleted"
        );
        Ok(())
    }

    pub async fn list_admins<C: ConnectionTrait>(db: &C) -> Result<Vec<admins::Model>, DbErr> {
        admins::Entity::find()
            .order_by_asc(admins::Column::Id)
            .all(db)
            .await
    }

    pub async fn create_admin<C: ConnectionTrait>(
        db: &C,
        req: &CreateAdminRequest,
    ) -> Result<admins::Model, AccountError> {
        let taken = admins::Entity::find()
            .filter(
                Condition::any()
                    .add(admins::Column::Username.eq(req.username.as_str()))
                    .add(admins::Column::Email.eq(req.email.as_str())),
            )
            .all(db)
            .await?;
        if taken.iter().any(|a| a.username == req.username) {
            return Err(AccountError::UsernameTaken);
        }
        if !taken.is_empty() {
            return Err(AccountError::EmailTaken);
        }

        let admin = admins::ActiveModel {
            email: Set(req.email.clone()),
            username: Set(req.username.clone()),
            hashed_password: Set(password::hash_password(&req.password)),
            full_name: Set(req.full_name.clone()),
            is_active: Set(true),
            deprecated: Set(false),
            role: Set(req.role.clone().unwrap_or_else(|| admins::DEFAULT_ROLE.to_string())),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
            ..Default::default()
        }
        .insert(db)
        .await
        .map_err(unique_violation)?;

        tracing::info!(admin_id = admin.id, username = %admin.username, "Admin created");
        Ok(admin)
    }

    /// Partial update of role / active / deprecated flags. Admins are never deleted.
    pub async fn update_admin<C: ConnectionTrait>(
        db: &C,
        id: i32,
        req: &UpdateAdminRequest,
    ) -> Result<admins::Model, AccountError> {
        let admin = admins::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or(AccountError::AdminNotFound)?;

        let mut active: admins::ActiveModel = admin.into();
        if let Some(role) = &req.role {
            active.role = Set(role.clone());
        }
        if let Some(is_active) = req.is_active {
            active.is_active = Set(is_active);
        }
        if let Some(deprecated) = req.deprecated {
            active.deprecated = Set(deprecated);
        }
        active.updated_at = Set(Some(Utc::now()));

        let admin = active.update(db).await?;
        if admin.deprecated {
            tracing::warn!(admin_id = admin.id, "Admin deprecated");
        }
        Ok(admin)
    }
}
