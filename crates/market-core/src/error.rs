//! Error Types

use market_payments::{IntentStatus, PaymentError};
use thiserror::Error;

use crate::ids::{SubscriptionId, UserId};

/// Result type alias for marketplace operations
pub type Result<T> = std::result::Result<T, MarketError>;

/// Result type alias for storage operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Storage-layer errors
///
/// Lookups that find nothing return `Ok(None)`; these are the failures a
/// persistent backend would report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A second row would become active for the same (user, target) pair
    #[error("user {user_id} already holds an active subscription to {target}")]
    DuplicateActive { user_id: UserId, target: String },

    /// A canceled row was asked to move to another status
    #[error("subscription {id} is canceled")]
    CanceledRow { id: SubscriptionId },

    /// A write addressed a record that does not exist
    #[error("{entity} {id} does not exist")]
    MissingRecord { entity: &'static str, id: String },

    /// Backend unreachable or failed
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Marketplace error types
#[derive(Error, Debug)]
pub enum MarketError {
    /// No authenticated caller
    #[error("Unauthorized")]
    Unauthorized,

    /// Caller is authenticated but not allowed to do this
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Agent, team, subscription or request id unknown
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Duplicate active subscription or invalid lifecycle transition
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Gateway says the payment intent has not succeeded
    #[error("Payment not complete: intent status is {status}")]
    PaymentNotComplete { status: IntentStatus },

    /// Payment gateway failure
    #[error("Gateway error: {0}")]
    Gateway(#[from] PaymentError),

    /// Malformed input
    #[error("Validation error: {0}")]
    Validation(String),

    /// No payment gateway configured
    #[error("Payments are not configured")]
    PaymentsDisabled,

    /// Storage failure
    #[error("Storage error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for MarketError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateActive { target, .. } => {
                MarketError::Conflict(format!("Already subscribed to {target}"))
            }
            StoreError::CanceledRow { .. } => MarketError::Conflict("Subscription is canceled".into()),
            other => MarketError::Store(other),
        }
    }
}

impl MarketError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        MarketError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        MarketError::Validation(msg.into())
    }

    /// Whether this is a server-side failure rather than a caller mistake
    pub fn is_internal(&self) -> bool {
        matches!(self, MarketError::Gateway(_) | MarketError::Store(_))
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            MarketError::Unauthorized => "Unauthorized".into(),
            MarketError::Forbidden(msg) | MarketError::Conflict(msg) | MarketError::Validation(msg) => {
                msg.clone()
            }
            MarketError::NotFound { entity, .. } => {
                let mut chars = entity.chars();
                match chars.next() {
                    Some(first) => format!("{}{} not found", first.to_uppercase(), chars.as_str()),
                    None => "Not found".into(),
                }
            }
            MarketError::PaymentNotComplete { status } => {
                format!("Payment has not been completed (status: {status})")
            }
            MarketError::Gateway(err) => err.user_message().into(),
            MarketError::PaymentsDisabled => "Payments are not configured".into(),
            MarketError::Store(_) => "An unexpected error occurred.".into(),
        }
    }
}
