//! Stripe PaymentIntents Integration
//!
//! Implements the "Stripe Elements (Embedded)" approach: the server opens a
//! PaymentIntent and hands its client secret to the browser, which confirms
//! the card directly with Stripe. The server never sees card data.

use stripe::{
    CancelPaymentIntent, CancelSubscription, Client, CreateCustomer, CreatePaymentIntent,
    CreatePaymentIntentAutomaticPaymentMethods, Currency, Customer,
    PaymentIntent as StripePaymentIntent, PaymentIntentCancellationReason, PaymentIntentId,
    PaymentIntentStatus, Subscription,
    SubscriptionId,
};

use async_trait::async_trait;

use crate::error::{PaymentError, Result};
use crate::gateway::{GatewayCustomer, IntentStatus, PaymentGateway, PaymentIntent, PaymentIntentRequest};

/// Stripe-backed payment gateway
pub struct StripeGateway {
    client: Client,
    currency: Currency,
}

impl StripeGateway {
    /// Create a new Stripe gateway charging in `currency` (ISO code, e.g. "usd")
    pub fn new(secret_key: &str, currency: &str) -> Result<Self> {
        let currency = currency
            .to_lowercase()
            .parse::<Currency>()
            .map_err(|_| PaymentError::Config(format!("unsupported currency: {currency}")))?;

        Ok(Self {
            client: Client::new(secret_key),
            currency,
        })
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_payment_intent(&self, request: PaymentIntentRequest) -> Result<PaymentIntent> {
        let mut params = CreatePaymentIntent::new(request.amount, self.currency);
        params.description = request.description.as_deref();
        params.metadata = Some(request.metadata.clone());
        params.automatic_payment_methods = Some(CreatePaymentIntentAutomaticPaymentMethods {
            allow_redirects: None,
            enabled: true,
        });

        let intent = StripePaymentIntent::create(&self.client, params).await?;

        tracing::debug!(
            intent_id = %intent.id,
            amount = intent.amount,
            "Created Stripe payment intent"
        );

        if intent.client_secret.is_none() {
            return Err(PaymentError::IncompleteResponse(
                "No client secret returned".into(),
            ));
        }

        let mut converted = convert_intent(intent);
        converted.metadata = request.metadata;
        Ok(converted)
    }

    async fn retrieve_payment_intent(&self, intent_id: &str) -> Result<PaymentIntent> {
        let id = intent_id
            .parse::<PaymentIntentId>()
            .map_err(|_| PaymentError::InvalidId(intent_id.to_string()))?;

        let intent = StripePaymentIntent::retrieve(&self.client, &id, &[]).await?;
        Ok(convert_intent(intent))
    }

    async fn cancel_payment_intent(&self, intent_id: &str) -> Result<()> {
        let id = intent_id
            .parse::<PaymentIntentId>()
            .map_err(|_| PaymentError::InvalidId(intent_id.to_string()))?;

        let params = CancelPaymentIntent {
            cancellation_reason: Some(PaymentIntentCancellationReason::Abandoned),
        };
        StripePaymentIntent::cancel(&self.client, id.as_str(), params).await?;

        tracing::debug!(intent_id, "Canceled Stripe payment intent");
        Ok(())
    }

    async fn create_customer(&self, email: &str, name: Option<&str>) -> Result<GatewayCustomer> {
        let mut params = CreateCustomer::new();
        params.email = Some(email);
        params.name = name;

        let customer = Customer::create(&self.client, params).await?;

        Ok(GatewayCustomer {
            id: customer.id.to_string(),
            email: customer.email,
        })
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<()> {
        let id = subscription_id
            .parse::<SubscriptionId>()
            .map_err(|_| PaymentError::InvalidId(subscription_id.to_string()))?;

        Subscription::cancel(&self.client, &id, CancelSubscription::new()).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "Stripe"
    }
}

fn convert_intent(intent: StripePaymentIntent) -> PaymentIntent {
    PaymentIntent {
        id: intent.id.to_string(),
        client_secret: intent.client_secret,
        status: convert_status(intent.status),
        amount: intent.amount,
        currency: intent.currency.to_string(),
        metadata: Default::default(),
    }
}

fn convert_status(status: PaymentIntentStatus) -> IntentStatus {
    match status {
        PaymentIntentStatus::RequiresPaymentMethod => IntentStatus::RequiresPaymentMethod,
        PaymentIntentStatus::RequiresConfirmation => IntentStatus::RequiresConfirmation,
        PaymentIntentStatus::RequiresAction => IntentStatus::RequiresAction,
        PaymentIntentStatus::Processing => IntentStatus::Processing,
        PaymentIntentStatus::RequiresCapture => IntentStatus::RequiresCapture,
        PaymentIntentStatus::Canceled => IntentStatus::Canceled,
        PaymentIntentStatus::Succeeded => IntentStatus::Succeeded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            convert_status(PaymentIntentStatus::Succeeded),
            IntentStatus::Succeeded
        );
        assert_eq!(
            convert_status(PaymentIntentStatus::RequiresAction),
            IntentStatus::RequiresAction
        );
    }

    #[test]
    fn test_rejects_unknown_currency() {
        assert!(StripeGateway::new("sk_test_123", "not-a-currency").is_err());
        assert!(StripeGateway::new("sk_test_123", "USD").is_ok());
    }
}
