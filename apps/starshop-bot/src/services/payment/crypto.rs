use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use starshop_db::models::order::PaymentMethod;
use tracing::{debug, info};

use super::{
    GatewayError, Invoice, InvoiceStatus, PaymentGateway, ensure_success, id_field, unwrap_result,
};
use crate::config::CryptoConfig;

pub struct CryptoGateway {
    client: reqwest::Client,
    config: CryptoConfig,
}

impl CryptoGateway {
    pub fn new(client: reqwest::Client, config: CryptoConfig) -> Self {
        Self { client, config }
    }

    fn api_key(&self) -> Result<&str, GatewayError> {
        self.config
            .api_key
            .as_deref()
            .ok_or(GatewayError::MissingConfig("CRYPTO_API_KEY"))
    }

    pub(crate) fn parse_invoice(body: &serde_json::Value) -> Result<Invoice, GatewayError> {
        let result = unwrap_result(body);
        let pay_url = result
            .get("url")
            .or_else(|| result.get("pay_url"))
            .and_then(|u| u.as_str())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| GatewayError::Malformed(format!("no payment url in {}", body)))?;
        let external_id = id_field(result, &["invoice_id", "uuid", "id"])
            .ok_or_else(|| GatewayError::Malformed(format!("no invoice id in {}", body)))?;
        let expires_at = result
            .get("expires_at")
            .or_else(|| result.get("expired_at"))
            .and_then(parse_timestamp);

        Ok(Invoice {
            external_id,
            pay_url: Some(pay_url.to_string()),
            instructions: None,
            expires_at,
        })
    }

    pub(crate) fn parse_status(body: &serde_json::Value) -> InvoiceStatus {
        let result = unwrap_result(body);
        let status = result
            .get("status")
            .or_else(|| result.get("payment_status"))
            .and_then(|s| s.as_str())
            .unwrap_or_default();
        match status.to_ascii_lowercase().as_str() {
            "paid" => InvoiceStatus::Paid,
            "expired" => InvoiceStatus::Expired,
            _ => InvoiceStatus::Pending,
        }
    }
}

/// Unix seconds or RFC 3339.
fn parse_timestamp(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::Number(n) => n.as_i64().and_then(|s| Utc.timestamp_opt(s, 0).single()),
        serde_json::Value::String(s) => match s.parse::<i64>() {
            Ok(secs) => Utc.timestamp_opt(secs, 0).single(),
            Err(_) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
        },
        _ => None,
    }
}

#[async_trait]
impl PaymentGateway for CryptoGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Crypto
    }

    async fn create_invoice(
        &self,
        amount: Decimal,
        currency: &str,
        reference: &str,
    ) -> Result<Invoice, GatewayError> {
        let api_url = self
            .config
            .api_url
            .as_deref()
            .ok_or(GatewayError::MissingConfig("CRYPTO_API_URL"))?;
        let shop_id = self
            .config
            .shop_id
            .as_deref()
            .ok_or(GatewayError::MissingConfig("CRYPTO_SHOP_ID"))?;
        let api_key = self.api_key()?;

        info!("Creating crypto invoice {} for {} {}", reference, amount, currency);

        let resp = self
            .client
            .post(api_url)
            .bearer_auth(api_key)
            .json(&json!({
                "shop_id": shop_id,
                "amount": amount.to_string(),
                "currency": currency,
                "order_id": reference,
            }))
            .send()
            .await?;

        let resp = ensure_success(resp).await?;
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        Self::parse_invoice(&body)
    }

    async fn check_status(&self, external_id: &str) -> Result<InvoiceStatus, GatewayError> {
        let status_url = self
            .config
            .status_url
            .as_deref()
            .ok_or(GatewayError::MissingConfig("CRYPTO_STATUS_URL"))?;
        let api_key = self.api_key()?;

        let url = format!(
            "{}?invoice_id={}",
            status_url,
            urlencoding::encode(external_id)
        );
        let resp = self.client.get(&url).bearer_auth(api_key).send().await?;
        let resp = ensure_success(resp).await?;
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        let status = Self::parse_status(&body);
        debug!("Crypto invoice {} status: {:?}", external_id, status);
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_invoice_with_unix_expiry() {
        let invoice = CryptoGateway::parse_invoice(&json!({
            "url": "https://pay.example/i/abc",
            "invoice_id": "abc",
            "expires_at": 1_767_225_600
        }))
        .unwrap();
        assert_eq!(invoice.external_id, "abc");
        assert_eq!(
            invoice.expires_at,
            Utc.timestamp_opt(1_767_225_600, 0).single()
        );
    }

    #[test]
    fn parses_wrapped_invoice_with_rfc3339_expiry() {
        let invoice = CryptoGateway::parse_invoice(&json!({
            "state": 0,
            "result": {
                "url": "https://pay.example/i/x",
                "uuid": "x-1",
                "expired_at": "2026-01-01T00:00:00Z"
            }
        }))
        .unwrap();
        assert_eq!(invoice.external_id, "x-1");
        assert_eq!(
            invoice.expires_at.map(|t| t.to_rfc3339()),
            Some("2026-01-01T00:00:00+00:00".to_string())
        );
    }

    #[test]
    fn invoice_without_id_is_malformed() {
        let err = CryptoGateway::parse_invoice(&json!({"url": "https://pay.example"})).unwrap_err();
        assert!(matches!(err, GatewayError::Malformed(_)));
    }

    #[test]
    fn status_mapping() {
        assert_eq!(CryptoGateway::parse_status(&json!({"status": "paid"})), InvoiceStatus::Paid);
        assert_eq!(
            CryptoGateway::parse_status(&json!({"result": {"status": "EXPIRED"}})),
            InvoiceStatus::Expired
        );
        assert_eq!(CryptoGateway::parse_status(&json!({"status": "check"})), InvoiceStatus::Pending);
        assert_eq!(CryptoGateway::parse_status(&json!({})), InvoiceStatus::Pending);
    }

    #[tokio::test]
    async fn status_poll_requires_status_url() {
        let gateway = CryptoGateway::new(
            reqwest::Client::new(),
            CryptoConfig {
                api_url: Some("https://pay.example/invoice".to_string()),
                status_url: None,
                shop_id: Some("shop".to_string()),
                api_key: Some("key".to_string()),
            },
        );
        let err = gateway.check_status("abc").await.unwrap_err();
        assert!(matches!(err, GatewayError::MissingConfig("CRYPTO_STATUS_URL")));
    }
}
