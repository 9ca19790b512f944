use std::time::Duration;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::*;
use thiserror::Error;

use crate::models::{refresh_tokens, users};
use crate::utils::device::DeviceContext;
use crate::utils::jwt::{IssuedToken, PrincipalKind, TokenError, TokenService, TokenType};

pub struct SessionService;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("refresh token is not active")]
    InvalidToken,
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("account is inactive")]
    InactiveAccount,
    #[error("session not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

/// Outcome of a successful refresh-token rotation.
#[derive(Debug)]
pub struct Rotation {
    pub user: users::Model,
    pub refresh: IssuedToken,
    pub session: refresh_tokens::Model,
}

impl SessionService {
    /// Persist a refresh token together with the device it was issued to.
    pub async fn create_session<C: ConnectionTrait>(
        db: &C,
        user_id: i32,
        token: &IssuedToken,
        device: &DeviceContext,
    ) -> Result<refresh_tokens::Model, DbErr> {
        let now = Utc::now();
        let info = device.info();

        let record = refresh_tokens::ActiveModel {
            token: Set(token.token.clone()),
            user_id: Set(user_id),
            device_fingerprint: Set(device.fingerprint()),
            user_agent: Set(device.user_agent.clone()),
            ip_address: Set(device.ip_address.clone()),
            os: Set(Some(info.os)),
            browser: Set(Some(info.browser)),
            device: Set(Some(info.device)),
            is_mobile: Set(info.is_mobile),
            issued_at: Set(now),
            expires_at: Set(token.expires_at),
            last_used_at: Set(now),
            is_revoked: Set(false),
            ..Default::default()
        };

        record.insert(db).await
    }

    /// Registry row for `token` if it is neither revoked nor expired.
    pub async fn find_active<C: ConnectionTrait>(
        db: &C,
        token: &str,
    ) -> Result<Option<refresh_tokens::Model>, DbErr> {
        refresh_tokens::Entity::find()
            .filter(refresh_tokens::Column::Token.eq(token))
            .filter(refresh_tokens::Column::IsRevoked.eq(false))
            .filter(refresh_tokens::Column::ExpiresAt.gt(Utc::now()))
            .one(db)
            .await
    }

    /// Exchange a refresh token for a new one.
    ///
    /// The presented token must verify, be present in the registry, and be
    /// neither revoked nor expired. Revoking the old row and inserting the new
    /// one happen in a single transaction; the revoke is a conditional update
    /// so two concurrent rotations of the same token cannot both succeed.
    pub async fn rotate(
        db: &DatabaseConnection,
        tokens: &TokenService,
        presented: &str,
        device: &DeviceContext,
    ) -> Result<Rotation, SessionError> {
        let claims = tokens.verify(presented, TokenType::Refresh)?;
        if claims.pk != PrincipalKind::User {
            return Err(SessionError::InvalidToken);
        }

        let txn = db.begin().await?;

        let Some(record) = refresh_tokens::Entity::find()
            .filter(refresh_tokens::Column::Token.eq(presented))
            .one(&txn)
            .await?
        else {
            tracing::warn!(user_id = claims.uid, "Refresh token not in registry");
            return Err(SessionError::InvalidToken);
        };

        let now = Utc::now();
        if record.is_revoked {
            tracing::warn!(
                user_id = record.user_id,
                session_id = record.id,
                "Revoked refresh token presented again"
            );
            return Err(SessionError::InvalidToken);
        }
        if record.expires_at <= now || record.user_id != claims.uid {
            return Err(SessionError::InvalidToken);
        }

        let claimed = refresh_tokens::Entity::update_many()
            .col_expr(refresh_tokens::Column::IsRevoked, Expr::value(true))
            .col_expr(refresh_tokens::Column::LastUsedAt, Expr::value(now))
            .filter(refresh_tokens::Column::Id.eq(record.id))
            .filter(refresh_tokens::Column::IsRevoked.eq(false))
            .exec(&txn)
            .await?;
        if claimed.rows_affected != 1 {
            tracing::warn!(session_id = record.id, "Concurrent refresh token rotation lost");
            return Err(SessionError::InvalidToken);
        }

        let user = users::Entity::find_by_id(record.user_id)
            .one(&txn)
            .await?
            .ok_or(SessionError::InvalidToken)?;
        if !user.is_active {
            return Err(SessionError::InactiveAccount);
        }

        let refresh = tokens.issue(&user.username, user.id, PrincipalKind::User, TokenType::Refresh)?;
        let session = Self::create_session(&txn, user.id, &refresh, device).await?;

        txn.commit().await?;

        tracing::debug!(user_id = user.id, old_session = record.id, new_session = session.id, "Refresh token rotated");
        Ok(Rotation { user, refresh, session })
    }

    /// Revoke one token. Unknown or already revoked tokens are a no-op.
    pub async fn revoke<C: ConnectionTrait>(db: &C, token: &str) -> Result<u64, DbErr> {
        let result = refresh_tokens::Entity::update_many()
            .col_expr(refresh_tokens::Column::IsRevoked, Expr::value(true))
            .filter(refresh_tokens::Column::Token.eq(token))
            .filter(refresh_tokens::Column::IsRevoked.eq(false))
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }

    /// Revoke one of the user's own sessions by id.
    pub async fn revoke_session<C: ConnectionTrait>(
        db: &C,
        user_id: i32,
        session_id: i32,
    ) -> Result<(), SessionError> {
        let session = refresh_tokens::Entity::find_by_id(session_id)
            .filter(refresh_tokens::Column::UserId.eq(user_id))
            .one(db)
            .await?
            .ok_or(SessionError::NotFound)?;

        if !session.is_revoked {
            let mut active: refresh_tokens::ActiveModel = session.into();
            active.is_revoked = Set(true);
            active.update(db).await?;
        }
        Ok(())
    }

    /// Revoke every session of a user, optionally sparing the one holding `keep`.
    pub async fn revoke_all<C: ConnectionTrait>(
        db: &C,
        user_id: i32,
        keep: Option<&str>,
    ) -> Result<u64, DbErr> {
        let mut query = refresh_tokens::Entity::update_many()
            .col_expr(refresh_tokens::Column::IsRevoked, Expr::value(true))
            .filter(refresh_tokens::Column::UserId.eq(user_id))
            .filter(refresh_tokens::Column::IsRevoked.eq(false));
        if let Some(token) = keep {
            query = query.filter(refresh_tokens::Column::Token.ne(token));
        }

        let result = query.exec(db).await?;
        Ok(result.rows_affected)
    }

    /// Active sessions of a user, most recently used first.
    pub async fn list_active<C: ConnectionTrait>(
        db: &C,
        user_id: i32,
    ) -> Result<Vec<refresh_tokens::Model>, DbErr> {
        refresh_tokens::Entity::find()
            .filter(refresh_tokens::Column::UserId.eq(user_id))
            .filter(refresh_tokens::Column::IsRevoked.eq(false))
            .filter(refresh_tokens::Column::ExpiresAt.gt(Utc::now()))
            .order_by_desc(refresh_tokens::Column::LastUsedAt)
            .order_by_desc(refresh_tokens::Column::Id)
            .all(db)
            .await
    }

    /// Delete rows that are expired or revoked.
    pub async fn cleanup_expired<C: ConnectionTrait>(db: &C) -> Result<u64, DbErr> {
        let result = refresh_tokens::Entity::delete_many()
            .filter(
                Condition::any()
                    .add(refresh_tokens::Column::ExpiresAt.lt(Utc::now()))
                    .add(refresh_tokens::Column::IsRevoked.eq(true)),
            )
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }

    /// Run `cleanup_expired` every `period` until the runtime shuts down.
    pub fn spawn_cleanup_task(db: DatabaseConnection, period: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match Self::cleanup_expired(&db).await {
                    Ok(0) => {}
                    Ok(deleted) => tracing::info!(deleted, "Swept expired refresh tokens"),
                    Err(e) => tracing::error!(error = %e, "Refresh token sweep failed"),
                }
            }
        })
    }
}
