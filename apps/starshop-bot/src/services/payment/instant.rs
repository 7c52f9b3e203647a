use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde_json::json;
use sha2::Sha256;
use starshop_db::models::order::PaymentMethod;
use tracing::info;

use super::{GatewayError, Invoice, PaymentGateway, ensure_success, id_field, unwrap_result};
use crate::config::InstantConfig;

type HmacSha256 = Hmac<Sha256>;

/// QR / instant-payment provider. Requests are signed with
/// `hex(HMAC-SHA256(secret, body))` in the `Signature` header.
pub struct InstantGateway {
    client: reqwest::Client,
    config: InstantConfig,
}

impl InstantGateway {
    pub fn new(client: reqwest::Client, config: InstantConfig) -> Self {
        Self { client, config }
    }

    pub(crate) fn sign(secret: &str, body: &str) -> Result<String, GatewayError> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| GatewayError::MissingConfig("INSTANT_SECRET"))?;
        mac.update(body.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    pub(crate) fn build_body(shop_id: &str, amount: Decimal, reference: &str) -> String {
        json!({
            "shop_id": shop_id,
            "amount": amount.to_string(),
            "order_id": reference,
        })
        .to_string()
    }

    pub(crate) fn parse_invoice(body: &serde_json::Value) -> Result<Invoice, GatewayError> {
        let result = unwrap_result(body);
        let pay_url = result
            .get("url")
            .and_then(|u| u.as_str())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| GatewayError::Malformed(format!("no payment url in {}", body)))?;
        let external_id = id_field(result, &["id", "invoice_id", "order_id"])
            .ok_or_else(|| GatewayError::Malformed(format!("no invoice id in {}", body)))?;

        Ok(Invoice {
            external_id,
            pay_url: Some(pay_url.to_string()),
            instructions: None,
            expires_at: None,
        })
    }
}

#[async_trait]
impl PaymentGateway for InstantGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Instant
    }

    async fn create_invoice(
        &self,
        amount: Decimal,
        _currency: &str,
        reference: &str,
    ) -> Result<Invoice, GatewayError> {
        let api_url = self
            .config
            .api_url
            .as_deref()
            .ok_or(GatewayError::MissingConfig("INSTANT_API_URL"))?;
        let shop_id = self
            .config
            .shop_id
            .as_deref()
            .ok_or(GatewayError::MissingConfig("INSTANT_SHOP_ID"))?;
        let secret = self
            .config
            .secret
            .as_deref()
            .ok_or(GatewayError::MissingConfig("INSTANT_SECRET"))?;

        info!("Creating instant-payment invoice {} for {}", reference, amount);

        let body = Self::build_body(shop_id, amount, reference);
        let signature = Self::sign(secret, &body)?;

        let resp = self
            .client
            .post(api_url)
            .header("Content-Type", "application/json")
            .header("Signature", signature)
            .body(body)
            .send()
            .await?;

        let resp = ensure_success(resp).await?;
        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        Self::parse_invoice(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn signature_is_hmac_sha256_hex() {
        // RFC 4231 test case 2.
        let sig = InstantGateway::sign("Jefe", "what do ya want for nothing?").unwrap();
        assert_eq!(
            sig,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn body_carries_shop_amount_and_reference() {
        let body = InstantGateway::build_body("42", Decimal::new(10875, 2), "ref-9");
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["shop_id"], "42");
        assert_eq!(parsed["amount"], "108.75");
        assert_eq!(parsed["order_id"], "ref-9");
    }

    #[test]
    fn parses_flat_and_wrapped_responses() {
        let flat = InstantGateway::parse_invoice(&json!({"url": "https://qr.example/p/1", "id": 77})).unwrap();
        assert_eq!(flat.external_id, "77");
        assert_eq!(flat.pay_url.as_deref(), Some("https://qr.example/p/1"));

        let wrapped = InstantGateway::parse_invoice(&json!({
            "result": {"url": "https://qr.example/p/2", "invoice_id": "inv-2"}
        }))
        .unwrap();
        assert_eq!(wrapped.external_id, "inv-2");
    }

    #[test]
    fn missing_url_is_malformed() {
        let err = InstantGateway::parse_invoice(&json!({"id": 1})).unwrap_err();
        assert!(matches!(err, GatewayError::Malformed(_)));
    }

    #[tokio::test]
    async fn incomplete_config_fails_before_any_request() {
        let gateway = InstantGateway::new(
            reqwest::Client::new(),
            InstantConfig {
                api_url: Some("https://qr.example/api".to_string()),
                shop_id: None,
                secret: Some("s".to_string()),
            },
        );
        let err = gateway
            .create_invoice(Decimal::ONE, "RUB", "ref")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::MissingConfig("INSTANT_SHOP_ID")));
    }
}
