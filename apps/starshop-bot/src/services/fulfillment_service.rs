use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::FulfillmentConfig;

#[derive(Debug, Error)]
pub enum FulfillmentError {
    #[error("fulfillment API unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("fulfillment API returned HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Delivers purchased stars to a recipient handle.
#[async_trait]
pub trait Fulfillment: Send + Sync {
    async fn deliver(&self, recipient: &str, stars: i64) -> Result<(), FulfillmentError>;
}

#[derive(Serialize)]
struct DeliveryRequest<'a> {
    #[serde(rename = "Username")]
    username: &'a str,
    #[serde(rename = "Quantity")]
    quantity: i64,
}

pub struct HttpFulfillment {
    client: reqwest::Client,
    config: FulfillmentConfig,
}

impl HttpFulfillment {
    pub fn new(config: FulfillmentConfig) -> Result<Self, FulfillmentError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Fulfillment for HttpFulfillment {
    async fn deliver(&self, recipient: &str, stars: i64) -> Result<(), FulfillmentError> {
        info!("Requesting delivery of {} stars to @{}", stars, recipient);

        let resp = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&DeliveryRequest {
                username: recipient,
                quantity: stars,
            })
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        Err(FulfillmentError::Rejected {
            status: status.as_u16(),
            body: body.chars().take(500).collect(),
        })
    }
}
