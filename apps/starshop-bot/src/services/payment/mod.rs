use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use starshop_db::models::order::PaymentMethod;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::PaymentsConfig;

pub mod crypto;
pub mod instant;
pub mod manual;

pub use crypto::CryptoGateway;
pub use instant::InstantGateway;
pub use manual::ManualGateway;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed provider response: {0}")]
    Malformed(String),
    #[error("gateway not configured: {0} is missing")]
    MissingConfig(&'static str),
}

/// What the user needs in order to pay.
#[derive(Debug, Clone, PartialEq)]
pub struct Invoice {
    pub external_id: String,
    pub pay_url: Option<String>,
    pub instructions: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Invoice {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceStatus {
    Pending,
    Paid,
    Expired,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn method(&self) -> PaymentMethod;

    /// `reference` is our own token for the purchase, echoed back by providers.
    async fn create_invoice(
        &self,
        amount: Decimal,
        currency: &str,
        reference: &str,
    ) -> Result<Invoice, GatewayError>;

    /// Providers without a status endpoint report `Pending`; a reviewer
    /// settles those orders.
    async fn check_status(&self, _external_id: &str) -> Result<InvoiceStatus, GatewayError> {
        Ok(InvoiceStatus::Pending)
    }
}

/// Gateways offered to users, keyed by method.
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    gateways: HashMap<PaymentMethod, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateways.insert(gateway.method(), gateway);
        self
    }

    /// Manual transfer is always on; the others only with full credentials.
    pub fn from_config(config: &PaymentsConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        let mut registry =
            Self::new().with(Arc::new(ManualGateway::new(config.manual_details.clone())));

        if config.instant.is_configured() {
            registry = registry.with(Arc::new(InstantGateway::new(
                client.clone(),
                config.instant.clone(),
            )));
        } else {
            tracing::info!("Instant-payment gateway disabled: credentials incomplete");
        }

        if config.crypto.is_configured() {
            registry = registry.with(Arc::new(CryptoGateway::new(client, config.crypto.clone())));
        } else {
            tracing::info!("Crypto gateway disabled: credentials incomplete");
        }

        Ok(registry)
    }

    pub fn get(&self, method: PaymentMethod) -> Option<Arc<dyn PaymentGateway>> {
        self.gateways.get(&method).cloned()
    }

    /// Stable display order.
    pub fn available(&self) -> Vec<PaymentMethod> {
        PaymentMethod::ALL
            .into_iter()
            .filter(|m| self.gateways.contains_key(m))
            .collect()
    }
}

/// Rejects non-2xx responses, keeping the body for the log.
pub(crate) async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(GatewayError::Status {
        status: status.as_u16(),
        body: body.chars().take(500).collect(),
    })
}

/// Providers wrap payloads in `result` inconsistently; accept both shapes.
pub(crate) fn unwrap_result(body: &serde_json::Value) -> &serde_json::Value {
    body.get("result").filter(|r| r.is_object()).unwrap_or(body)
}

/// Ids arrive as strings or numbers.
pub(crate) fn id_field(body: &serde_json::Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match body.get(*key)? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}
