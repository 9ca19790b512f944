// ============================================================================
// RAZORPAY GATEWAY
// ============================================================================
//
// Outbound calls to the payment provider and checkout signature checks.
//
//   create order : POST {api_base}/orders  (HTTP basic auth key_id:key_secret)
//                  body { amount (paise), currency, receipt }
//   signature    : hex(HMAC-SHA256(key_secret, "{order_id}|{payment_id}"))
//
// The gateway sits behind the `PaymentGateway` trait so the payment service
// can run against a fake provider in tests.
//
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::config::{PaymentConfig, RazorpayCredentials};

pub const PROVIDER: &str = "razorpay";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("payment provider timed out")]
    Timeout,
    #[error("payment provider unreachable: {0}")]
    Transport(String),
    #[error("payment provider rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("unexpected payment provider response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Order created on the provider side.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateOrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Provider name stored on payment transactions.
    fn provider(&self) -> &'static str;

    /// Public key handed to the checkout widget.
    fn key_id(&self) -> &str;

    /// Create a provider-side order for `amount_paise`.
    async fn create_order(
        &self,
        amount_paise: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<ProviderOrder, GatewayError>;

    /// Check a checkout callback signature.
    fn verify_signature(&self, provider_order_id: &str, provider_payment_id: &str, signature: &str) -> bool;
}

pub struct RazorpayClient {
    http: reqwest::Client,
    api_base: String,
    key_id: String,
    key_secret: SecretString,
}

impl RazorpayClient {
    pub fn new(
        credentials: &RazorpayCredentials,
        api_base: &str,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            key_id: credentials.key_id.clone(),
            key_secret: credentials.key_secret.clone(),
        })
    }

    /// Build a client when credentials are configured.
    pub fn from_config(config: &PaymentConfig) -> Result<Option<Self>, GatewayError> {
        config
            .razorpay
            .as_ref()
            .map(|credentials| Self::new(credentials, &config.api_base, config.timeout))
            .transpose()
    }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    fn key_id(&self) -> &str {
        &self.key_id
    }

    async fn create_order(
        &self,
        amount_paise: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<ProviderOrder, GatewayError> {
        let response = self
            .http
            .post(format!("{}/orders", self.api_base))
            .basic_auth(&self.key_id, Some(self.key_secret.expose_secret()))
            .json(&CreateOrderBody { amount: amount_paise, currency, receipt })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), receipt, "Razorpay rejected order creation");
            return Err(GatewayError::Rejected { status: status.as_u16(), body });
        }

        let order: ProviderOrder = response.json().await?;
        if order.id.is_empty() {
            return Err(GatewayError::InvalidResponse("missing order id".to_string()));
        }

        tracing::info!(provider_order_id = %order.id, amount_paise, receipt, "Razorpay order created");
        Ok(order)
    }

    fn verify_signature(&self, provider_order_id: &str, provider_payment_id: &str, signature: &str) -> bool {
        verify_signature(
            self.key_secret.expose_secret().as_bytes(),
            provider_order_id,
            provider_payment_id,
            signature,
        )
    }
}

/// Constant-time check of `hex(HMAC-SHA256(secret, "{order_id}|{payment_id}"))`.
pub fn verify_signature(secret: &[u8], order_id: &str, payment_id: &str, signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
pub(crate) fn sign(secret: &[u8], order_id: &str, payment_id: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).unwrap();
    mac.update(format!("{order_id}|{payment_id}").as_bytes());
    hex::encode(mac.finalize().into_bytes())
}
