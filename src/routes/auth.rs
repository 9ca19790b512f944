use actix_web::cookie::{time, Cookie, SameSite};
use actix_web::{delete, get, post, web, HttpRequest, HttpResponse};
use validator::Validate;

use crate::config::AuthConfig;
use crate::error::AppError;
use crate::middleware::{AuthAdmin, AuthUser};
use crate::models::dto::{
    LoginRequest, MessageResponse, RegisterRequest, RevokeSessionsQuery, SessionResponse, TokenResponse,
};
use crate::services::auth_service::{AuthError, AuthService};
use crate::services::session_service::SessionService;
use crate::state::AppState;
use crate::utils::device::DeviceContext;
use crate::utils::jwt::IssuedToken;

pub const REFRESH_COOKIE: &str = "refresh_token";

fn refresh_cookie(token: &IssuedToken, state: &AppState) -> Cookie<'static> {
    Cookie::build(REFRESH_COOKIE, token.token.clone())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.auth.cookie_secure)
        .max_age(time::Duration::seconds(state.tokens.refresh_ttl().num_seconds()))
        .finish()
}

fn cleared_cookie(config: &AuthConfig) -> Cookie<'static> {
    let mut cookie = Cookie::build(REFRESH_COOKIE, "")
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.cookie_secure)
        .finish();
    cookie.make_removal();
    cookie
}

fn presented_refresh(req: &HttpRequest) -> Option<String> {
    req.cookie(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

/// POST /auth/register
#[post("/register")]
pub async fn register(
    state: web::Data<AppState>,
    body: web::Json<RegisterRequest>,
) -> Result<HttpResponse, AppError> {
    body.validate()?;
    let user = AuthService::register(&state.db, &body).await?;
    tracing::info!(user_id = user.id, "User registered");
    Ok(HttpResponse::Created().json(user))
}

/// POST /auth/login - access token in the body, refresh token as a cookie
#[post("/login")]
pub async fn login(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, AppError> {
    body.validate()?;
    let device = DeviceContext::from_request(&req);
    let session = AuthService::login(&state.db, &state.tokens, &body.username, &body.password, &device).await?;
    tracing::debug!(user_id = session.user.id, "Refresh cookie set");

    Ok(HttpResponse::Ok()
        .cookie(refresh_cookie(&session.refresh, &state))
        .json(TokenResponse::bearer(
            session.access.token,
            state.tokens.access_ttl().num_seconds(),
        )))
}

/// POST /auth/admin/login - access token only
#[post("/admin/login")]
pub async fn admin_login(
    state: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, AppError> {
    body.validate()?;
    let (_, access) = AuthService::admin_login(&state.db, &state.tokens, &body.username, &body.password).await?;

    Ok(HttpResponse::Ok().json(TokenResponse::bearer(
        access.token,
        state.tokens.access_ttl().num_seconds(),
    )))
}

/// POST /auth/refresh - rotates the refresh cookie
#[post("/refresh")]
pub async fn refresh(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let presented = presented_refresh(&req).ok_or(AuthError::Unauthorized)?;
    let device = DeviceContext::from_request(&req);
    let session = AuthService::refresh(&state.db, &state.tokens, &presented, &device).await?;
    tracing::debug!(user_id = session.user.id, "Refresh cookie rotated");

    Ok(HttpResponse::Ok()
        .cookie(refresh_cookie(&session.refresh, &state))
        .json(TokenResponse::bearer(
            session.access.token,
            state.tokens.access_ttl().num_seconds(),
        )))
}

/// POST /auth/logout
#[post("/logout")]
pub async fn logout(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let presented = presented_refresh(&req);
    AuthService::logout(&state.db, presented.as_deref()).await?;

    Ok(HttpResponse::Ok()
        .cookie(cleared_cookie(&state.config.auth))
        .json(MessageResponse::new("Logged out")))
}

/// GET /auth/me
#[get("/me")]
pub async fn me(user: AuthUser) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(user.0))
}

/// GET /auth/admin/me
#[get("/admin/me")]
pub async fn admin_me(admin: AuthAdmin) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(admin.0))
}

/// GET /auth/sessions
#[get("/sessions")]
pub async fn list_sessions(
    req: HttpRequest,
    user: AuthUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let current = presented_refresh(&req);
    let sessions: Vec<SessionResponse> = SessionService::list_active(&state.db, user.0.id)
        .await?
        .into_iter()
        .map(|s| SessionResponse::new(s, current.as_deref()))
        .collect();

    Ok(HttpResponse::Ok().json(sessions))
}

/// DELETE /auth/sessions/{id}
#[delete("/sessions/{id}")]
pub async fn revoke_session(
    user: AuthUser,
    state: web::Data<AppState>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let session_id = path.into_inner();
    SessionService::revoke_session(&state.db, user.0.id, session_id).await?;
    tracing::info!(user_id = user.0.id, session_id, "Session revoked");

    Ok(HttpResponse::Ok().json(MessageResponse::new("Session revoked")))
}

/// DELETE /auth/sessions?keep_current=true
#[delete("/sessions")]
pub async fn revoke_all_sessions(
    req: HttpRequest,
    user: AuthUser,
    state: web::Data<AppState>,
    query: web::Query<RevokeSessionsQuery>,
) -> Result<HttpResponse, AppError> {
    let keep = match presented_refresh(&req) {
        Some(token) if query.keep_current => SessionService::find_active(&state.db, &token)
            .await?
            .filter(|session| session.user_id == user.0.id)
            .map(|session| session.token),
        _ => None,
    };
    let revoked = SessionService::revoke_all(&state.db, user.0.id, keep.as_deref()).await?;
    tracing::info!(user_id = user.0.id, revoked, "Sessions revoked");

    Ok(HttpResponse::Ok().json(MessageResponse::new(format!("Revoked {revoked} session(s)"))))
}

pub fn auth_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .service(register)
            .service(login)
            .service(admin_login)
            .service(refresh)
            .service(logout)
            .service(me)
            .service(admin_me)
            .service(list_sessions)
            .service(revoke_session)
            .service(revoke_all_sessions),
    );
}
