use async_trait::async_trait;
use rust_decimal::Decimal;
use starshop_db::models::order::PaymentMethod;

use super::{GatewayError, Invoice, PaymentGateway};

/// Bank transfer to fixed requisites. Nothing is verified programmatically.
pub struct ManualGateway {
    details: String,
}

impl ManualGateway {
    pub fn new(details: String) -> Self {
        Self { details }
    }
}

#[async_trait]
impl PaymentGateway for ManualGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Manual
    }

    async fn create_invoice(
        &self,
        _amount: Decimal,
        _currency: &str,
        reference: &str,
    ) -> Result<Invoice, GatewayError> {
        if self.details.trim().is_empty() {
            return Err(GatewayError::MissingConfig("MANUAL_PAYMENT_DETAILS"));
        }
        Ok(Invoice {
            external_id: reference.to_string(),
            pay_url: None,
            instructions: Some(self.details.clone()),
            expires_at: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::payment::InvoiceStatus;

    #[tokio::test]
    async fn returns_static_details() {
        let gateway = ManualGateway::new("Card 2200 0000".to_string());
        let invoice = gateway
            .create_invoice(Decimal::new(10875, 2), "RUB", "ref-1")
            .await
            .unwrap();
        assert_eq!(invoice.external_id, "ref-1");
        assert_eq!(invoice.instructions.as_deref(), Some("Card 2200 0000"));
        assert!(invoice.pay_url.is_none());
        assert_eq!(gateway.check_status("ref-1").await.unwrap(), InvoiceStatus::Pending);
    }

    #[tokio::test]
    async fn blank_details_are_a_config_error() {
        let gateway = ManualGateway::new("  ".to_string());
        let err = gateway
            .create_invoice(Decimal::ONE, "RUB", "ref")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::MissingConfig(_)));
    }
}
