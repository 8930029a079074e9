//! Mock Payment Gateway
//!
//! In-process gateway for development and testing. Intents live in memory and
//! their status can be scripted; individual operations can be told to fail.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{PaymentError, Result};
use crate::gateway::{GatewayCustomer, IntentStatus, PaymentGateway, PaymentIntent, PaymentIntentRequest};

#[derive(Default)]
struct MockState {
    intents: HashMap<String, PaymentIntent>,
    customers: Vec<GatewayCustomer>,
    canceled_subscriptions: Vec<String>,
    fail_create_intent: bool,
    fail_retrieve_intent: bool,
    fail_create_customer: bool,
    fail_cancel_subscription: bool,
    fail_cancel_intent: bool,
    next_intent_ids: Vec<String>,
}

/// Mock gateway with scriptable behaviour
pub struct MockGateway {
    state: RwLock<MockState>,
    /// Status assigned to freshly created intents
    initial_status: IntentStatus,
    currency: String,
    /// Delay before every gateway call
    latency: Duration,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGateway {
    /// Intents start in `requires_payment_method`, like a real gateway
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MockState::default()),
            initial_status: IntentStatus::RequiresPaymentMethod,
            currency: "usd".into(),
            latency: Duration::ZERO,
        }
    }

    /// Delay every call by `latency`, like a remote gateway
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    async fn round_trip(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    /// Intents are born `succeeded`, as if the browser had already confirmed
    /// them. Handy for running the server locally without Stripe.
    pub fn auto_succeed() -> Self {
        Self {
            initial_status: IntentStatus::Succeeded,
            ..Self::new()
        }
    }

    /// Queue an id for the next created intent (FIFO)
    pub async fn queue_intent_id(&self, id: impl Into<String>) {
        self.state.write().await.next_intent_ids.push(id.into());
    }

    /// Simulate the browser-side confirmation outcome
    pub async fn set_intent_status(&self, intent_id: &str, status: IntentStatus) {
        if let Some(intent) = self.state.write().await.intents.get_mut(intent_id) {
            intent.status = status;
        }
    }

    /// Register an intent that was not created through this gateway
    pub async fn insert_intent(&self, intent: PaymentIntent) {
        self.state.write().await.intents.insert(intent.id.clone(), intent);
    }

    pub async fn fail_create_intent(&self, fail: bool) {
        self.state.write().await.fail_create_intent = fail;
    }

    pub async fn fail_retrieve_intent(&self, fail: bool) {
        self.state.write().await.fail_retrieve_intent = fail;
    }

    pub async fn fail_create_customer(&self, fail: bool) {
        self.state.write().await.fail_create_customer = fail;
    }

    pub async fn fail_cancel_subscription(&self, fail: bool) {
        self.state.write().await.fail_cancel_subscription = fail;
    }

    pub async fn fail_cancel_intent(&self, fail: bool) {
        self.state.write().await.fail_cancel_intent = fail;
    }

    pub async fn intent(&self, intent_id: &str) -> Option<PaymentIntent> {
        self.state.read().await.intents.get(intent_id).cloned()
    }

    pub async fn intent_count(&self) -> usize {
        self.state.read().await.intents.len()
    }

    pub async fn customers(&self) -> Vec<GatewayCustomer> {
        self.state.read().await.customers.clone()
    }

    pub async fn canceled_subscriptions(&self) -> Vec<String> {
        self.state.read().await.canceled_subscriptions.clone()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_payment_intent(&self, request: PaymentIntentRequest) -> Result<PaymentIntent> {
        self.round_trip().await;
        let mut state = self.state.write().await;
        if state.fail_create_intent {
            return Err(PaymentError::Stripe("mock: create intent failed".into()));
        }

        let id = if state.next_intent_ids.is_empty() {
            format!("pi_mock_{}", uuid::Uuid::new_v4().simple())
        } else {
            state.next_intent_ids.remove(0)
        };

        let intent = PaymentIntent {
            client_secret: Some(format!("{id}_secret_{}", uuid::Uuid::new_v4().simple())),
            id: id.clone(),
            status: self.initial_status,
            amount: request.amount,
            currency: self.currency.clone(),
            metadata: request.metadata,
        };

        state.intents.insert(id, intent.clone());
        Ok(intent)
    }

    async fn retrieve_payment_intent(&self, intent_id: &str) -> Result<PaymentIntent> {
        self.round_trip().await;
        let state = self.state.read().await;
        if state.fail_retrieve_intent {
            return Err(PaymentError::Stripe("mock: retrieve intent failed".into()));
        }

        state
            .intents
            .get(intent_id)
            .cloned()
            .ok_or_else(|| PaymentError::Stripe(format!("No such payment_intent: '{intent_id}'")))
    }

    async fn cancel_payment_intent(&self, intent_id: &str) -> Result<()> {
        self.round_trip().await;
        let mut state = self.state.write().await;
        if state.fail_cancel_intent {
            return Err(PaymentError::Stripe("mock: cancel intent failed".into()));
        }

        let intent = state
            .intents
            .get_mut(intent_id)
            .ok_or_else(|| PaymentError::Stripe(format!("No such payment_intent: '{intent_id}'")))?;
        if intent.status == IntentStatus::Succeeded {
            return Err(PaymentError::Stripe(format!(
                "payment_intent '{intent_id}' has already succeeded"
            )));
        }
        intent.status = IntentStatus::Canceled;
        Ok(())
    }

    async fn create_customer(&self, email: &str, _name: Option<&str>) -> Result<GatewayCustomer> {
        self.round_trip().await;
        let mut state = self.state.write().await;
        if state.fail_create_customer {
            return Err(PaymentError::Stripe("mock: create customer failed".into()));
        }

        let customer = GatewayCustomer {
            id: format!("cus_mock_{}", uuid::Uuid::new_v4().simple()),
            email: Some(email.to_string()),
        };
        state.customers.push(customer.clone());
        Ok(customer)
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<()> {
        self.round_trip().await;
        let mut state = self.state.write().await;
        if state.fail_cancel_subscription {
            return Err(PaymentError::Stripe("mock: cancel subscription failed".into()));
        }

        state.canceled_subscriptions.push(subscription_id.to_string());
        Ok(())
    }

    fn name(&self) -> &str {
        "MockGateway"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_intent_lifecycle() {
        let gateway = MockGateway::new();
        gateway.queue_intent_id("pi_1").await;

        let intent = gateway
            .create_payment_intent(PaymentIntentRequest::new(2999))
            .await
            .unwrap();
        assert_eq!(intent.id, "pi_1");
        assert_eq!(intent.status, IntentStatus::RequiresPaymentMethod);
        assert!(intent.client_secret.is_some());

        gateway.set_intent_status("pi_1", IntentStatus::Succeeded).await;
        let fetched = gateway.retrieve_payment_intent("pi_1").await.unwrap();
        assert!(fetched.is_succeeded());
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let gateway = MockGateway::new();
        gateway.fail_create_intent(true).await;

        let result = gateway.create_payment_intent(PaymentIntentRequest::new(100)).await;
        assert!(result.is_err());
        assert_eq!(gateway.intent_count().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_intent() {
        let gateway = MockGateway::new();
        assert!(gateway.retrieve_payment_intent("pi_missing").await.is_err());
    }

    #[tokio::test]
    async fn test_cancel_intent() {
        let gateway = MockGateway::new();
        gateway.queue_intent_id("pi_open").await;
        gateway.queue_intent_id("pi_paid").await;
        gateway.create_payment_intent(PaymentIntentRequest::new(100)).await.unwrap();
        gateway.create_payment_intent(PaymentIntentRequest::new(100)).await.unwrap();
        gateway.set_intent_status("pi_paid", IntentStatus::Succeeded).await;

        gateway.cancel_payment_intent("pi_open").await.unwrap();
        assert_eq!(gateway.intent("pi_open").await.unwrap().status, IntentStatus::Canceled);

        assert!(gateway.cancel_payment_intent("pi_paid").await.is_err());
        assert_eq!(gateway.intent("pi_paid").await.unwrap().status, IntentStatus::Succeeded);
        assert!(gateway.cancel_payment_intent("pi_missing").await.is_err());
    }

    #[tokio::test]
    async fn test_auto_succeed() {
        let gateway = MockGateway::auto_succeed();
        let intent = gateway
            .create_payment_intent(PaymentIntentRequest::new(500))
            .await
            .unwrap();
        assert!(intent.is_succeeded());
    }
}
