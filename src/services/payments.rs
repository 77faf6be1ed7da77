use crate::{config::PaymentConfig, entities::order, errors::ServiceError};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{instrument, warn};
use uuid::Uuid;

/// Redirect link for a freshly created payment session.
#[derive(Debug, Clone)]
pub struct PaymentLink {
    pub confirmation_url: String,
    pub payment_id: String,
}

/// Boundary to the external payment provider. The orchestrator only ever
/// talks to this trait; the concrete provider is injected at construction.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Creates a payment session for the order and returns the redirect URL
    /// together with the provider's session id.
    async fn create_payment_link(&self, order: &order::Model)
        -> Result<PaymentLink, ServiceError>;
}

/// YooKassa payment provider.
pub struct YookassaProvider {
    client: reqwest::Client,
    config: PaymentConfig,
}

impl YookassaProvider {
    pub fn new(config: PaymentConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client setup failed: {e}")))?;

        Ok(Self { client, config })
    }

    fn payment_request(&self, order: &order::Model) -> Value {
        json!({
            "amount": {
                "value": format_amount(order.total_price),
                "currency": self.config.currency,
            },
            "confirmation": {
                "type": "redirect",
                "return_url": self.config.return_url,
            },
            "capture": true,
            "description": format!("Payment for order {}", order.id),
            "metadata": {
                // carried back by the webhook to correlate the notification
                // with the order
                "order_id": order.id.to_string(),
            }
        })
    }
}

#[async_trait]
impl PaymentProvider for YookassaProvider {
    #[instrument(skip(self), fields(order_id = %order.id))]
    async fn create_payment_link(
        &self,
        order: &order::Model,
    ) -> Result<PaymentLink, ServiceError> {
        // fresh key per call: a retried call must not double-charge
        let idempotence_key = Uuid::new_v4().to_string();

        let response = self
            .client
            .post(format!("{}/payments", self.config.api_base))
            .basic_auth(&self.config.shop_id, Some(&self.config.secret_key))
            .header("Idempotence-Key", &idempotence_key)
            .json(&self.payment_request(order))
            .send()
            .await
            .map_err(|e| {
                ServiceError::PaymentGateway(format!("payment session request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, body, "payment provider rejected the session request");
            return Err(ServiceError::PaymentGateway(format!(
                "provider returned {status}"
            )));
        }

        let session: PaymentSession = response.json().await.map_err(|e| {
            ServiceError::PaymentGateway(format!("invalid provider response: {e}"))
        })?;

        Ok(PaymentLink {
            confirmation_url: session.confirmation.confirmation_url,
            payment_id: session.id,
        })
    }
}

#[derive(Debug, Deserialize)]
struct PaymentSession {
    id: String,
    confirmation: Confirmation,
}

#[derive(Debug, Deserialize)]
struct Confirmation {
    confirmation_url: String,
}

/// Formats a monetary amount the way the provider expects: exactly two
/// decimal places.
pub(crate) fn format_amount(amount: Decimal) -> String {
    format!("{amount:.2}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::order::OrderStatus;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn provider() -> YookassaProvider {
        YookassaProvider::new(PaymentConfig {
            api_base: "https://api.yookassa.test/v3".to_string(),
            shop_id: "shop-1".to_string(),
            secret_key: "sk-test".to_string(),
            currency: "RUB".to_string(),
            return_url: "https://shop.test/return".to_string(),
            request_timeout_secs: 10,
            webhook_secret: None,
            webhook_tolerance_secs: 300,
        })
        .unwrap()
    }

    fn order(total_price: Decimal) -> order::Model {
        order::Model {
            id: Uuid::new_v4(),
            user_id: Some(Uuid::new_v4()),
            status: OrderStatus::Created,
            total_quantity: 2,
            total_price,
            created_at: Utc::now(),
            external_id: None,
            payment_details: None,
            paid_at: None,
        }
    }

    #[test]
    fn amount_is_formatted_to_two_decimals() {
        assert_eq!(format_amount(dec!(300)), "300.00");
        assert_eq!(format_amount(dec!(300.5)), "300.50");
        assert_eq!(format_amount(dec!(1249.99)), "1249.99");
        assert_eq!(format_amount(Decimal::ZERO), "0.00");
    }

    #[test]
    fn payment_request_carries_order_metadata() {
        let provider = provider();
        let order = order(dec!(300.00));
        let body = provider.payment_request(&order);

        assert_eq!(body["amount"]["value"], "300.00");
        assert_eq!(body["amount"]["currency"], "RUB");
        assert_eq!(body["confirmation"]["type"], "redirect");
        assert_eq!(body["confirmation"]["return_url"], "https://shop.test/return");
        assert_eq!(body["capture"], true);
        assert_eq!(body["metadata"]["order_id"], order.id.to_string());
        assert!(body["description"]
            .as_str()
            .unwrap()
            .contains(&order.id.to_string()));
    }

    #[test]
    fn provider_response_parses() {
        let raw = json!({
            "id": "2d6b1c2a-000f-5000-8000-1db2b4b3c0d1",
            "status": "pending",
            "confirmation": {
                "type": "redirect",
                "confirmation_url": "https://yoomoney.test/checkout/payments/v2/contract"
            }
        });

        let session: PaymentSession = serde_json::from_value(raw).unwrap();
        assert_eq!(session.id, "2d6b1c2a-000f-5000-8000-1db2b4b3c0d1");
        assert_eq!(
            session.confirmation.confirmation_url,
            "https://yoomoney.test/checkout/payments/v2/contract"
        );
    }
}
