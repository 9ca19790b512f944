use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use futures::future::LocalBoxFuture;
use sea_orm::{DatabaseConnection, EntityTrait};

use crate::error::AppError;
use crate::models::{admins, users};
use crate::services::auth_service::AuthError;
use crate::state::AppState;
use crate::utils::jwt::{PrincipalKind, TokenService, TokenType};

/// Authenticated caller, either a customer or an administrator.
#[derive(Debug, Clone)]
pub enum Principal {
    User(users::Model),
    Admin(admins::Model),
}

/// Resolve a bearer access token into an active principal of the expected kind.
///
/// Every failure except an inactive account collapses to `Unauthorized`, so a
/// caller cannot tell a bad signature from a missing or deprecated account.
pub async fn resolve_principal(
    db: &DatabaseConnection,
    tokens: &TokenService,
    token: &str,
    kind: PrincipalKind,
) -> Result<Principal, AuthError> {
    let claims = tokens.verify(token, TokenType::Access).map_err(|e| {
        tracing::debug!(error = %e, "Access token rejected");
        AuthError::Unauthorized
    })?;

    if claims.pk != kind {
        tracing::warn!(uid = claims.uid, expected = ?kind, presented = ?claims.pk, "Token used against the wrong principal kind");
        return Err(AuthError::Unauthorized);
    }

    match kind {
        PrincipalKind::User => {
            let user = users::Entity::find_by_id(claims.uid)
                .one(db)
                .await?
                .ok_or(AuthError::Unauthorized)?;
            if !user.is_active {
                return Err(AuthError::InactiveAccount);
            }
            Ok(Principal::User(user))
        }
        PrincipalKind::Admin => {
            let admin = admins::Entity::find_by_id(claims.uid)
                .one(db)
                .await?
                .ok_or(AuthError::Unauthorized)?;
            // checked on every request so deprecation cuts off live tokens
            if admin.deprecated {
                tracing::warn!(admin_id = admin.id, "Deprecated admin presented a token");
                return Err(AuthError::Unauthorized);
            }
            if !admin.is_active {
                return Err(AuthError::InactiveAccount);
            }
            Ok(Principal::Admin(admin))
        }
    }
}

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(req: &HttpRequest) -> Option<String> {
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();

    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

fn resolve_from_request(
    req: &HttpRequest,
    kind: PrincipalKind,
) -> LocalBoxFuture<'static, Result<Principal, AppError>> {
    let state = req.app_data::<web::Data<AppState>>().cloned();
    let token = bearer_token(req);

    Box::pin(async move {
        let state = state.ok_or_else(|| AppError::Internal("application state not configured".into()))?;
        let token = token.ok_or(AuthError::Unauthorized)?;
        Ok(resolve_principal(&state.db, &state.tokens, &token, kind).await?)
    })
}

/// Extractor for routes restricted to active customers.
#[derive(Debug, Clone)]
pub struct AuthUser(pub users::Model);

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let principal = resolve_from_request(req, PrincipalKind::User);
        Box::pin(async move {
            match principal.await? {
                Principal::User(user) => Ok(AuthUser(user)),
                Principal::Admin(_) => Err(AuthError::Unauthorized.into()),
            }
        })
    }
}

/// Extractor for routes restricted to active, non-deprecated admins.
#[derive(Debug, Clone)]
pub struct AuthAdmin(pub admins::Model);

impl FromRequest for AuthAdmin {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let principal = resolve_from_request(req, PrincipalKind::Admin);
        Box::pin(async move {
            match principal.await? {
                Principal::Admin(admin) => Ok(AuthAdmin(admin)),
                Principal::User(_) => Err(AuthError::Unauthorized.into()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use actix_web::test::TestRequest;
    use sea_orm::{ActiveModelTrait, Set};

    #[tokio::test]
    async fn test_resolves_active_user() {
        let db = test_support::setup_db().await;
        let tokens = test_support::tokens();
        let user = test_support::create_user(&db, "alice", test_support::PASSWORD).await;
        let token = test_support::access_token(&tokens, user.id, "alice", PrincipalKind::User);

        let principal = resolve_principal(&db, &tokens, &token, PrincipalKind::User).await.unwrap();
        assert!(matches!(principal, Principal::User(u) if u.id == user.id));
    }

    #[tokio::test]
    async fn test_user_token_never_resolves_admin() {
        let db = test_support::setup_db().await;
        let tokens = test_support::tokens();
        let user = test_support::create_user(&db, "alice", test_support::PASSWORD).await;
        let admin = test_support::create_admin(&db, "root").await;
        assert_eq!(user.id, admin.id);

        let token = test_support::access_token(&tokens, user.id, "alice", PrincipalKind::User);
        let result = resolve_principal(&db, &tokens, &token, PrincipalKind::Admin).await;
        assert!(matches!(result, Err(AuthError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_refresh_token_is_not_an_access_token() {
        let db = test_support::setup_db().await;
        let tokens = test_support::tokens();
        let user = test_support::create_user(&db, "alice", test_support::PASSWORD).await;
        let (refresh, _) = test_support::start_session(&db, &tokens, &user).await;

        let result = resolve_principal(&db, &tokens, &refresh.token, PrincipalKind::User).await;
        assert!(matches!(result, Err(AuthError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_missing_and_inactive_users() {
        let db = test_support::setup_db().await;
        let tokens = test_support::tokens();

        let ghost = test_support::access_token(&tokens, 42, "ghost", PrincipalKind::User);
        let result = resolve_principal(&db, &tokens, &ghost, PrincipalKind::User).await;
        assert!(matches!(result, Err(AuthError::Unauthorized)));

        let user = test_support::create_user(&db, "alice", test_support::PASSWORD).await;
        let token = test_support::access_token(&tokens, user.id, "alice", PrincipalKind::User);
        let mut active: users::ActiveModel = user.into();
        active.is_active = Set(false);
        active.update(&db).await.unwrap();

        let result = resolve_principal(&db, &tokens, &token, PrincipalKind::User).await;
        assert!(matches!(result, Err(AuthError::InactiveAccount)));
    }

    #[tokio::test]
    async fn test_deprecation_revokes_issued_admin_tokens() {
        let db = test_support::setup_db().await;
        let tokens = test_support::tokens();
        let admin = test_support::create_admin(&db, "root").await;
        let token = test_support::access_token(&tokens, admin.id, "root", PrincipalKind::Admin);

        assert!(resolve_principal(&db, &tokens, &token, PrincipalKind::Admin).await.is_ok());

        let mut active: admins::ActiveModel = admin.into();
        active.deprecated = Set(true);
        active.update(&db).await.unwrap();

        let result = resolve_principal(&db, &tokens, &token, PrincipalKind::Admin).await;
        assert!(matches!(result, Err(AuthError::Unauthorized)));
    }

    #[test]
    fn test_bearer_token_parsing() {
        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer abc.def.ghi"))
            .to_http_request();
        assert_eq!(bearer_token(&req).as_deref(), Some("abc.def.ghi"));

        let req = TestRequest::default()
            .insert_header(("Authorization", "bearer   xyz"))
            .to_http_request();
        assert_eq!(bearer_token(&req).as_deref(), Some("xyz"));

        let req = TestRequest::default()
            .insert_header(("Authorization", "Basic dXNlcjpwYXNz"))
            .to_http_request();
        assert_eq!(bearer_token(&req), None);

        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer "))
            .to_http_request();
        assert_eq!(bearer_token(&req), None);

        assert_eq!(bearer_token(&TestRequest::default().to_http_request()), None);
    }
}
