//! Payment Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment gateway errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Stripe API error (network, 4xx, 5xx)
    #[error("Stripe error: {0}")]
    Stripe(String),

    /// An id that the gateway would reject outright
    #[error("Invalid gateway id: {0}")]
    InvalidId(String),

    /// Gateway answered but left out a field we depend on
    #[error("Incomplete gateway response: {0}")]
    IncompleteResponse(String),

    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    WebhookSignature(String),

    /// Webhook payload parsing failed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// The receiver of a verified webhook could not apply it
    #[error("Webhook reconcile error: {0}")]
    Reconcile(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PaymentError {
    /// Get user-friendly message
    pub fn user_message(&self) -> &str {
        match self {
            PaymentError::Stripe(_) | PaymentError::IncompleteResponse(_) => {
                "Payment processing failed. Please try again."
            }
            PaymentError::InvalidId(_) => "The payment reference is not valid.",
            PaymentError::WebhookSignature(_) | PaymentError::WebhookParse(_) => {
                "Webhook could not be verified."
            }
            PaymentError::Reconcile(_) => "Webhook processing failed.",
            PaymentError::Config(_) => "Service configuration error.",
        }
    }
}

impl From<stripe::StripeError> for PaymentError {
    fn from(err: stripe::StripeError) -> Self {
        PaymentError::Stripe(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_hides_internals() {
        let err = PaymentError::Stripe("card_declined: secret detail".into());
        assert!(!err.user_message().contains("secret"));
    }

    #[test]
    fn test_webhook_errors_share_a_message() {
        assert_eq!(
            PaymentError::WebhookSignature("bad".into()).user_message(),
            PaymentError::WebhookParse("bad".into()).user_message()
        );
    }
}
