// Fixtures shared by the unit tests: in-memory database, accounts, products
// and a payment gateway double that signs with a known secret.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};

use crate::config::AppConfig;
use crate::db;
use crate::models::{admins, products, refresh_tokens, users};
use crate::services::razorpay::{self, GatewayError, PaymentGateway, ProviderOrder};
use crate::services::session_service::SessionService;
use crate::state::AppState;
use crate::utils::device::DeviceContext;
use crate::utils::jwt::{IssuedToken, PrincipalKind, TokenService, TokenType};

pub const PASSWORD: &str = "Secret123!";
/// Hash of `PASSWORD`, precomputed so fixtures skip the slow KDF.
pub const PASSWORD_HASH: &str =
    "5f1c0e8a9b7d4c3e2a1f0b9c8d7e6f50$a18017a2a0e632959bbc4fa0d534d610db5414ea25e54ebc6430c87c80e65e36";
pub const GATEWAY_KEY_ID: &str = "rzp_test_fake";
pub const GATEWAY_SECRET: &str = "test_key_secret";
pub const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:120.0) Gecko/20100101 Firefox/120.0";

pub async fn setup_db() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:".to_owned());
    options.max_connections(1).min_connections(1).sqlx_logging(false);

    let db = Database::connect(options).await.unwrap();
    db::init_schema(&db).await.unwrap();
    db
}

pub fn config() -> AppConfig {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("DATABASE_URL", "sqlite::memory:"),
        ("JWT_SECRET", "unit-test-signing-key-0123456789abcdef"),
        ("SESSION_SWEEP_INTERVAL_MINUTES", "0"),
    ]);
    AppConfig::from_lookup(|key| vars.get(key).map(|v| (*v).to_string())).unwrap()
}

pub fn tokens() -> TokenService {
    TokenService::from_config(&config().auth)
}

pub fn device() -> DeviceContext {
    DeviceContext {
        user_agent: Some(USER_AGENT.to_string()),
        accept_language: Some("en-US,en;q=0.5".to_string()),
        accept_encoding: Some("gzip, deflate, br".to_string()),
        ip_address: Some("127.0.0.1".to_string()),
    }
}

pub async fn create_user(db: &DatabaseConnection, username: &str, password: &str) -> users::Model {
    let hashed_password = if password == PASSWORD {
        PASSWORD_HASH.to_string()
    } else {
        crate::utils::password::hash_password(password)
    };

    users::ActiveModel {
        email: Set(format!("{username}@example.com")),
        username: Set(username.to_string()),
        hashed_password: Set(hashed_password),
        full_name: Set(None),
        is_active: Set(true),
        is_verified: Set(false),
        created_at: Set(Utc::now()),
        updated_at: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn create_admin(db: &DatabaseConnection, username: &str) -> admins::Model {
    admins::ActiveModel {
        email: Set(format!("{username}@example.com")),
        username: Set(username.to_string()),
        hashed_password: Set(PASSWORD_HASH.to_string()),
        full_name: Set(None),
        is_active: Set(true),
        deprecated: Set(false),
        role: Set(admins::DEFAULT_ROLE.to_string()),
        created_at: Set(Utc::now()),
        updated_at: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn create_product(db: &DatabaseConnection, name: &str, price_paise: i64) -> products::Model {
    products::ActiveModel {
        name: Set(name.to_string()),
        price_paise: Set(price_paise),
        created_at: Set(Utc::now()),
        updated_at: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

/// Issue a refresh token for `user` and register it.
pub async fn start_session(
    db: &DatabaseConnection,
    tokens: &TokenService,
    user: &users::Model,
) -> (IssuedToken, refresh_tokens::Model) {
    let issued = tokens
        .issue(&user.username, user.id, PrincipalKind::User, TokenType::Refresh)
        .unwrap();
    let session = SessionService::create_session(db, user.id, &issued, &device())
        .await
        .unwrap();
    (issued, session)
}

pub fn access_token(tokens: &TokenService, id: i32, username: &str, kind: PrincipalKind) -> String {
    tokens.issue(username, id, kind, TokenType::Access).unwrap().token
}

pub fn sign(provider_order_id: &str, provider_payment_id: &str) -> String {
    razorpay::sign(GATEWAY_SECRET.as_bytes(), provider_order_id, provider_payment_id)
}

pub fn app_state(db: DatabaseConnection, gateway: Option<Arc<FakeGateway>>) -> AppState {
    AppState::new(db, config(), gateway.map(|g| g as Arc<dyn PaymentGateway>))
}

/// Provider double: numbered order ids, signatures checked against `GATEWAY_SECRET`.
#[derive(Default)]
pub struct FakeGateway {
    created: AtomicUsize,
    unavailable: bool,
    quote_offset: i64,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `create_order` call times out.
    pub fn unavailable() -> Self {
        Self { unavailable: true, ..Self::default() }
    }

    /// Provider orders come back with the wrong amount.
    pub fn misquoting() -> Self {
        Self { quote_offset: 1, ..Self::default() }
    }

    pub fn orders_created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn provider(&self) -> &'static str {
        razorpay::PROVIDER
    }

    fn key_id(&self) -> &str {
        GATEWAY_KEY_ID
    }

    async fn create_order(
        &self,
        amount_paise: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<ProviderOrder, GatewayError> {
        if self.unavailable {
            return Err(GatewayError::Timeout);
        }

        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ProviderOrder {
            id: format!("order_fake_{n}"),
            amount: amount_paise + self.quote_offset,
            currency: currency.to_string(),
            receipt: Some(receipt.to_string()),
            status: Some("created".to_string()),
        })
    }

    fn verify_signature(&self, provider_order_id: &str, provider_payment_id: &str, signature: &str) -> bool {
        razorpay::verify_signature(
            GATEWAY_SECRET.as_bytes(),
            provider_order_id,
            provider_payment_id,
            signature,
        )
    }
}
