use sea_orm::*;
use secrecy::ExposeSecret;
use thiserror::Error;

use crate::config::BootstrapAdmin;
use crate::models::dto::{CreateAdminRequest, RegisterRequest};
use crate::models::{admins, users};
use crate::services::session_service::{SessionError, SessionService};
use crate::services::user_service::{AccountError, NewUser, UserService};
use crate::utils::device::DeviceContext;
use crate::utils::jwt::{IssuedToken, PrincipalKind, TokenError, TokenService, TokenType};
use crate::utils::password;

/// Burned on unknown identifiers so login timing does not reveal which accounts exist.
const DUMMY_HASH: &str =
    "00000000000000000000000000000000$0000000000000000000000000000000000000000000000000000000000000000";

pub struct AuthService;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("could not validate credentials")]
    Unauthorized,
    #[error("inactive account")]
    InactiveAccount,
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Account(#[from] AccountError),
    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

/// Tokens handed to a customer after login or refresh.
#[derive(Debug)]
pub struct SessionTokens {
    pub user: users::Model,
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

impl AuthService {
    pub async fn register<C: ConnectionTrait>(
        db: &C,
        req: &RegisterRequest,
    ) -> Result<users::Model, AuthError> {
        let user = UserService::create_user(
            db,
            NewUser {
                email: req.email.trim(),
                username: req.username.trim(),
                password: &req.password,
                full_name: req.full_name.as_deref(),
            },
        )
        .await?;
        Ok(user)
    }

    /// Customer login. `identifier` matches either the username or the email.
    pub async fn login(
        db: &DatabaseConnection,
        tokens: &TokenService,
        identifier: &str,
        password: &str,
        device: &DeviceContext,
    ) -> Result<SessionTokens, AuthError> {
        let identifier = identifier.trim();
        let user = users::Entity::find()
            .filter(
                Condition::any()
                    .add(users::Column::Username.eq(identifier))
                    .add(users::Column::Email.eq(identifier)),
            )
            .one(db)
            .await?;

        let Some(user) = user else {
            password::verify_password(password, DUMMY_HASH);
            tracing::warn!(ip = ?device.ip_address, "Login failed: unknown account");
            return Err(AuthError::InvalidCredentials);
        };

        if !password::verify_password(password, &user.hashed_password) {
            tracing::warn!(user_id = user.id, ip = ?device.ip_address, "Login failed: bad password");
            return Err(AuthError::InvalidCredentials);
        }
        if !user.is_active {
            return Err(AuthError::InactiveAccount);
        }

        let access = tokens.issue(&user.username, user.id, PrincipalKind::User, TokenType::Access)?;
        let refresh = tokens.issue(&user.username, user.id, PrincipalKind::User, TokenType::Refresh)?;
        let session = SessionService::create_session(db, user.id, &refresh, device).await?;

        tracing::info!(user_id = user.id, session_id = session.id, "User logged in");
        Ok(SessionTokens { user, access, refresh })
    }

    /// Admin login. Deprecated admins are treated as if they did not exist.
    /// Admins get an access token only; there is no admin refresh flow.
    pub async fn admin_login<C: ConnectionTrait>(
        db: &C,
        tokens: &TokenService,
        identifier: &str,
        password: &str,
    ) -> Result<(admins::Model, IssuedToken), AuthError> {
        let identifier = identifier.trim();
        let admin = admins::Entity::find()
            .filter(
                Condition::any()
                    .add(admins::Column::Username.eq(identifier))
                    .add(admins::Column::Email.eq(identifier)),
            )
            .filter(admins::Column::Deprecated.eq(false))
            .one(db)
            .await?;

        let Some(admin) = admin else {
            password::verify_password(password, DUMMY_HASH);
            tracing::warn!("Admin login failed: unknown account");
            return Err(AuthError::InvalidCredentials);
        };

        if !password::verify_password(password, &admin.hashed_password) {
            tracing::warn!(admin_id = admin.id, "Admin login failed: bad password");
            return Err(AuthError::InvalidCredentials);
        }
        if !admin.is_active {
            return Err(AuthError::InactiveAccount);
        }

        let access = tokens.issue(&admin.username, admin.id, PrincipalKind::Admin, TokenType::Access)?;
        tracing::info!(admin_id = admin.id, "Admin logged in");
        Ok((admin, access))
    }

    /// Rotate the presented refresh token and mint a matching access token.
    pub async fn refresh(
        db: &DatabaseConnection,
        tokens: &TokenService,
        presented: &str,
        device: &DeviceContext,
    ) -> Result<SessionTokens, AuthError> {
        let rotation = SessionService::rotate(db, tokens, presented, device).await?;
        let user = rotation.user;
        let access = tokens.issue(&user.username, user.id, PrincipalKind::User, TokenType::Access)?;
        tracing::debug!(user_id = user.id, session_id = rotation.session.id, "Session refreshed");

        Ok(SessionTokens { user, access, refresh: rotation.refresh })
    }

    /// Revoke the presented refresh token, if any.
    pub async fn logout<C: ConnectionTrait>(db: &C, presented: Option<&str>) -> Result<(), AuthError> {
        if let Some(token) = presented {
            let revoked = SessionService::revoke(db, token).await?;
            tracing::debug!(revoked, "Logout");
        }
        Ok(())
    }

    /// Provision the configured admin unless an active admin already exists.
    pub async fn bootstrap_admin<C: ConnectionTrait>(
        db: &C,
        bootstrap: &BootstrapAdmin,
    ) -> Result<Option<admins::Model>, AuthError> {
        let existing = admins::Entity::find()
            .filter(admins::Column::IsActive.eq(true))
            .filter(admins::Column::Deprecated.eq(false))
            .count(db)
            .await?;
        if existing > 0 {
            tracing::debug!(existing, "Active admin present, skipping bootstrap");
            return Ok(None);
        }

        let req = CreateAdminRequest {
            email: bootstrap.email.clone(),
            username: bootstrap.username.clone(),
            password: bootstrap.password.expose_secret().to_string(),
            full_name: None,
            role: None,
        };
        let admin = UserService::create_admin(db, &req).await?;

        tracing::info!(admin_id = admin.id, username = %admin.username, "Bootstrap admin provisioned");
        Ok(Some(admin))
    }
}
