//! Application configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DATABASE_URL` - database connection string
//! - `JWT_SECRET` - token signing secret (min 32 chars)
//!
//! ## Optional
//! - `HOST` / `PORT` - bind address (default: 127.0.0.1:8080)
//! - `ACCESS_TOKEN_TTL_MINUTES` (default: 15)
//! - `REFRESH_TOKEN_TTL_DAYS` (default: 30)
//! - `COOKIE_SECURE` - mark the refresh cookie `Secure` (default: false)
//! - `CORS_ALLOWED_ORIGINS` - comma separated origins
//! - `SESSION_SWEEP_INTERVAL_MINUTES` - expired session sweep, 0 disables (default: 60)
//! - `RAZORPAY_KEY_ID` / `RAZORPAY_KEY_SECRET` - provider credentials, both or neither
//! - `RAZORPAY_API_BASE` (default: <https://api.razorpay.com/v1>)
//! - `PAYMENT_TIMEOUT_SECS` (default: 10)
//! - `PAYMENT_CURRENCY` (default: INR)
//! - `BOOTSTRAP_ADMIN_USERNAME` / `BOOTSTRAP_ADMIN_EMAIL` / `BOOTSTRAP_ADMIN_PASSWORD`

use std::net::IpAddr;

use chrono::{Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_JWT_SECRET_LENGTH: usize = 32;
const DEFAULT_CORS_ORIGINS: &str =
    "http://localhost:3000,http://127.0.0.1:3000,http://localhost:5173";
const DEFAULT_RAZORPAY_API_BASE: &str = "https://api.razorpay.com/v1";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Database connection URL (may contain a password)
    pub database_url: SecretString,
    pub host: IpAddr,
    pub port: u16,
    pub auth: AuthConfig,
    pub cors_allowed_origins: Vec<String>,
    /// `None` disables the periodic expired-session sweep
    pub session_sweep_interval: Option<std::time::Duration>,
    pub payments: PaymentConfig,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

/// Token signing and cookie settings.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: SecretString,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub cookie_secure: bool,
}

/// Payment provider settings.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    /// Absent when the provider is not configured; payment endpoints are then disabled.
    pub razorpay: Option<RazorpayCredentials>,
    pub api_base: String,
    pub timeout: std::time::Duration,
    pub currency: String,
}

/// Razorpay API credentials.
///
/// Implements `Debug` manually to redact the secret.
#[derive(Clone)]
pub struct RazorpayCredentials {
    pub key_id: String,
    pub key_secret: SecretString,
}

impl std::fmt::Debug for RazorpayCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RazorpayCredentials")
            .field("key_id", &self.key_id)
            .field("key_secret", &"[REDACTED]")
            .finish()
    }
}

/// Admin account provisioned at startup when no active admin exists.
#[derive(Clone)]
pub struct BootstrapAdmin {
    pub username: String,
    pub email: String,
    pub password: SecretString,
}

impl std::fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()));

        let database_url = SecretString::from(required("DATABASE_URL")?);

        let jwt_secret = required("JWT_SECRET")?;
        validate_secret("JWT_SECRET", &jwt_secret)?;

        let host = parse_or("HOST", get("HOST"), IpAddr::from([127, 0, 0, 1]))?;
        let port = parse_or("PORT", get("PORT"), 8080u16)?;

        let access_token_ttl = lifetime(
            "ACCESS_TOKEN_TTL_MINUTES",
            positive("ACCESS_TOKEN_TTL_MINUTES", get("ACCESS_TOKEN_TTL_MINUTES"), 15)?,
            Duration::try_minutes,
        )?;
        let refresh_token_ttl = lifetime(
            "REFRESH_TOKEN_TTL_DAYS",
            positive("REFRESH_TOKEN_TTL_DAYS", get("REFRESH_TOKEN_TTL_DAYS"), 30)?,
            Duration::try_days,
        )?;
        let cookie_secure = parse_or("COOKIE_SECURE", get("COOKIE_SECURE"), false)?;

        let cors_allowed_origins = get("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|| DEFAULT_CORS_ORIGINS.to_string())
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(String::from)
            .collect();

        let sweep_minutes: u64 = parse_or(
            "SESSION_SWEEP_INTERVAL_MINUTES",
            get("SESSION_SWEEP_INTERVAL_MINUTES"),
            60,
        )?;
        let session_sweep_interval = match sweep_minutes {
            0 => None,
            minutes => {
                let secs = minutes.checked_mul(60).ok_or_else(|| {
                    ConfigError::InvalidEnvVar(
                        "SESSION_SWEEP_INTERVAL_MINUTES".to_string(),
                        "interval is too large".to_string(),
                    )
                })?;
                Some(std::time::Duration::from_secs(secs))
            }
        };

        let razorpay = match (get("RAZORPAY_KEY_ID"), get("RAZORPAY_KEY_SECRET")) {
            (Some(key_id), Some(key_secret)) => Some(RazorpayCredentials {
                key_id,
                key_secret: SecretString::from(key_secret),
            }),
            (None, None) => None,
            _ => {
                return Err(ConfigError::InvalidEnvVar(
                    "RAZORPAY_KEY_ID".to_string(),
                    "RAZORPAY_KEY_ID and RAZORPAY_KEY_SECRET must be set together".to_string(),
                ));
            }
        };

        let timeout_secs = positive("PAYMENT_TIMEOUT_SECS", get("PAYMENT_TIMEOUT_SECS"), 10)?;
        let payments = PaymentConfig {
            razorpay,
            api_base: get("RAZORPAY_API_BASE")
                .unwrap_or_else(|| DEFAULT_RAZORPAY_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            timeout: std::time::Duration::from_secs(timeout_secs as u64),
            currency: get("PAYMENT_CURRENCY")
                .unwrap_or_else(|| "INR".to_string())
                .to_uppercase(),
        };

        let bootstrap_admin = match (
            get("BOOTSTRAP_ADMIN_USERNAME"),
            get("BOOTSTRAP_ADMIN_EMAIL"),
            get("BOOTSTRAP_ADMIN_PASSWORD"),
        ) {
            (Some(username), Some(email), Some(password)) => Some(BootstrapAdmin {
                username,
                email,
                password: SecretString::from(password),
            }),
            (None, None, None) => None,
            _ => {
                return Err(ConfigError::InvalidEnvVar(
                    "BOOTSTRAP_ADMIN_USERNAME".to_string(),
                    "bootstrap admin username, email and password must be set together".to_string(),
                ));
            }
        };

        Ok(Self {
            database_url,
            host,
            port,
            auth: AuthConfig {
                jwt_secret: SecretString::from(jwt_secret),
                access_token_ttl,
                refresh_token_ttl,
                cookie_secure,
            },
            cors_allowed_origins,
            session_sweep_interval,
            payments,
            bootstrap_admin,
        })
    }

    /// The database URL, exposed only to the connection layer.
    pub fn database_url(&self) -> &str {
        self.database_url.expose_secret()
    }
}

fn validate_secret(name: &str, value: &str) -> Result<(), ConfigError> {
    if value.len() < MIN_JWT_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            name.to_string(),
            format!("must be at least {MIN_JWT_SECRET_LENGTH} characters"),
        ));
    }

    let lowered = value.to_lowercase();
    if ["change-me", "changeme", "your-secret", "secret-key-here"]
        .iter()
        .any(|placeholder| lowered.contains(placeholder))
    {
        return Err(ConfigError::InsecureSecret(
            name.to_string(),
            "looks like a placeholder value".to_string(),
        ));
    }

    Ok(())
}

fn parse_or<T>(name: &str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidEnvVar(name.to_string(), e.to_string())),
        None => Ok(default),
    }
}

fn positive(name: &str, raw: Option<String>, default: i64) -> Result<i64, ConfigError> {
    let value = parse_or(name, raw, default)?;
    if value <= 0 {
        return Err(ConfigError::InvalidEnvVar(
            name.to_string(),
            "must be a positive integer".to_string(),
        ));
    }
    Ok(value)
}

/// Token lifetime that chrono can represent and that still lands on a valid date.
fn lifetime(name: &str, value: i64, unit: fn(i64) -> Option<Duration>) -> Result<Duration, ConfigError> {
    unit(value)
        .filter(|ttl| Utc::now().checked_add_signed(*ttl).is_some())
        .ok_or_else(|| ConfigError::InvalidEnvVar(name.to_string(), "lifetime is out of range".to_string()))
}
