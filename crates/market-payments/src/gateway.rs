//! Payment Gateway Abstraction
//!
//! The marketplace needs little from a payment processor: open a payment
//! intent, look one up again, void one nobody paid, create a customer record
//! and stop a recurring subscription. Everything else stays on the processor
//! side.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Payment gateway trait (Strategy pattern)
///
/// Implemented by [`crate::StripeGateway`] in production and
/// [`crate::MockGateway`] for development and tests.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open a payment intent for a one-off charge
    async fn create_payment_intent(&self, request: PaymentIntentRequest) -> Result<PaymentIntent>;

    /// Fetch the current server-side state of a payment intent
    async fn retrieve_payment_intent(&self, intent_id: &str) -> Result<PaymentIntent>;

    /// Void an unpaid intent so its client secret can no longer be used.
    /// Fails if the intent has already succeeded.
    async fn cancel_payment_intent(&self, intent_id: &str) -> Result<()>;

    /// Create a customer record for a billable party
    async fn create_customer(&self, email: &str, name: Option<&str>) -> Result<GatewayCustomer>;

    /// Cancel a recurring subscription so it stops charging
    async fn cancel_subscription(&self, subscription_id: &str) -> Result<()>;

    /// Gateway name, for logs
    fn name(&self) -> &str;
}

/// Request to open a payment intent
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PaymentIntentRequest {
    /// Amount in minor currency units
    pub amount: i64,

    /// Statement description shown to the customer
    #[serde(default)]
    pub description: Option<String>,

    /// Correlation tags copied onto the gateway object
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl PaymentIntentRequest {
    pub fn new(amount: i64) -> Self {
        Self {
            amount,
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A gateway-side payment intent
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,

    /// Secret handed to the browser so it can confirm the payment directly
    /// with the gateway. Never persisted by the marketplace.
    pub client_secret: Option<String>,

    pub status: IntentStatus,

    /// Amount in minor currency units
    pub amount: i64,

    pub currency: String,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl PaymentIntent {
    pub fn is_succeeded(&self) -> bool {
        self.status == IntentStatus::Succeeded
    }
}

/// Payment intent lifecycle as reported by the gateway
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
}

impl IntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::RequiresPaymentMethod => "requires_payment_method",
            IntentStatus::RequiresConfirmation => "requires_confirmation",
            IntentStatus::RequiresAction => "requires_action",
            IntentStatus::Processing => "processing",
            IntentStatus::RequiresCapture => "requires_capture",
            IntentStatus::Canceled => "canceled",
            IntentStatus::Succeeded => "succeeded",
        }
    }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A gateway-side customer record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayCustomer {
    pub id: String,
    pub email: Option<String>,
}
