//! Stripe Webhook Handling
//!
//! Verifies and classifies Stripe webhook events, then hands the ones the
//! marketplace cares about to a [`WebhookReconciler`].

use std::sync::Arc;

use async_trait::async_trait;
use stripe::{Event, EventObject, EventType, Webhook};

use crate::error::{PaymentError, Result};

/// Parsed webhook event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatewayEvent {
    /// A payment intent reached `succeeded` on the gateway side
    PaymentSucceeded { payment_intent_id: String },

    /// A payment attempt failed; informational only
    PaymentFailed { payment_intent_id: String },

    /// A recurring subscription was deleted on the gateway side
    SubscriptionDeleted { subscription_id: String },

    /// Unhandled event type
    Other { event_type: String },
}

/// Receiver for reconciled gateway events
#[async_trait]
pub trait WebhookReconciler: Send + Sync {
    type Error: std::fmt::Display + Send;

    async fn payment_succeeded(&self, payment_intent_id: &str) -> std::result::Result<(), Self::Error>;

    async fn subscription_deleted(&self, subscription_id: &str) -> std::result::Result<(), Self::Error>;
}

/// Webhook handler
pub struct WebhookHandler<R: WebhookReconciler> {
    reconciler: Arc<R>,
    secret: String,
}

impl<R: WebhookReconciler> WebhookHandler<R> {
    pub fn new(reconciler: Arc<R>, secret: impl Into<String>) -> Self {
        Self {
            reconciler,
            secret: secret.into(),
        }
    }

    /// Verify signature, classify, and reconcile in one go
    pub async fn handle(&self, payload: &str, signature: &str) -> Result<GatewayEvent> {
        let event = self.verify(payload, signature)?;
        tracing::info!(event_type = ?event.type_, "Processing Stripe webhook");

        let parsed = classify(&event)?;
        self.dispatch(&parsed).await?;
        Ok(parsed)
    }

    /// Verify webhook signature and parse event
    pub fn verify(&self, payload: &str, signature: &str) -> Result<Event> {
        Webhook::construct_event(payload, signature, &self.secret)
            .map_err(|e| PaymentError::WebhookSignature(e.to_string()))
    }

    /// Route a classified event to the reconciler
    pub async fn dispatch(&self, event: &GatewayEvent) -> Result<()> {
        match event {
            GatewayEvent::PaymentSucceeded { payment_intent_id } => self
                .reconciler
                .payment_succeeded(payment_intent_id)
                .await
                .map_err(|e| PaymentError::Reconcile(e.to_string())),

            GatewayEvent::SubscriptionDeleted { subscription_id } => self
                .reconciler
                .subscription_deleted(subscription_id)
                .await
                .map_err(|e| PaymentError::Reconcile(e.to_string())),

            GatewayEvent::PaymentFailed { payment_intent_id } => {
                tracing::warn!(
                    payment_intent_id = %payment_intent_id,
                    "Payment failed - subscription stays pending"
                );
                Ok(())
            }

            GatewayEvent::Other { event_type } => {
                tracing::debug!(event_type = %event_type, "Unhandled webhook event");
                Ok(())
            }
        }
    }
}

/// Parse Stripe event into our event type
pub fn classify(event: &Event) -> Result<GatewayEvent> {
    match event.type_ {
        EventType::PaymentIntentSucceeded => {
            if let EventObject::PaymentIntent(intent) = &event.data.object {
                Ok(GatewayEvent::PaymentSucceeded {
                    payment_intent_id: intent.id.to_string(),
                })
            } else {
                Err(PaymentError::WebhookParse("Invalid payment intent data".into()))
            }
        }

        EventType::PaymentIntentPaymentFailed => {
            if let EventObject::PaymentIntent(intent) = &event.data.object {
                Ok(GatewayEvent::PaymentFailed {
                    payment_intent_id: intent.id.to_string(),
                })
            } else {
                Err(PaymentError::WebhookParse("Invalid payment intent data".into()))
            }
        }

        EventType::CustomerSubscriptionDeleted => {
            if let EventObject::Subscription(sub) = &event.data.object {
                Ok(GatewayEvent::SubscriptionDeleted {
                    subscription_id: sub.id.to_string(),
                })
            } else {
                Err(PaymentError::WebhookParse("Invalid subscription data".into()))
            }
        }

        _ => Ok(GatewayEvent::Other {
            event_type: format!("{:?}", event.type_),
        }),
    }
}
