//! # market-payments
//!
//! Payment gateway adapter for the agent marketplace.
//!
//! ## Two-phase payment flow
//!
//! The marketplace uses the "Stripe Elements (Embedded)" approach: the server
//! opens a PaymentIntent, the browser confirms the card directly with Stripe
//! using the intent's client secret, and the server re-reads the intent
//! before granting anything.
//!
//! ```text
//! ┌──────────┐  create intent   ┌──────────┐
//! │  Server  │─────────────────▶│  Stripe  │
//! │          │◀─── secret ──────│          │
//! └────┬─────┘                  └────▲─────┘
//!      │ secret                      │ confirm card
//!      ▼                             │
//! ┌──────────┐───────────────────────┘
//! │ Browser  │
//! └────┬─────┘
//!      │ "intent pi_… succeeded"
//!      ▼
//! ┌──────────┐  retrieve intent ┌──────────┐
//! │  Server  │─────────────────▶│  Stripe  │  status == succeeded?
//! └──────────┘                  └──────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use market_payments::{PaymentGateway, PaymentIntentRequest, StripeGateway};
//!
//! let gateway = StripeGateway::new("sk_test_xxx", "usd")?;
//!
//! let intent = gateway
//!     .create_payment_intent(PaymentIntentRequest::new(2999).with_metadata("userId", "7"))
//!     .await?;
//!
//! // Send intent.client_secret to the browser
//! ```

mod error;
mod gateway;
mod mock;
mod stripe_gateway;
mod webhook;

pub use error::{PaymentError, Result};
pub use gateway::{GatewayCustomer, IntentStatus, PaymentGateway, PaymentIntent, PaymentIntentRequest};
pub use mock::MockGateway;
pub use stripe_gateway::StripeGateway;
pub use webhook::{GatewayEvent, WebhookHandler, WebhookReconciler, classify};
