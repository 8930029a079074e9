//! # market-core
//!
//! Catalog, subscription ledger and payment-confirmation workflow for the
//! agent marketplace.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                  SubscriptionService<T>                       │
//! │  ┌──────────────┐  ┌──────────────────┐  ┌────────────────┐  │
//! │  │ CatalogStore │  │ SubscriptionLedger│  │ PaymentGateway │  │
//! │  │  (price/name)│──│   (state machine) │──│   (Strategy)   │  │
//! │  └──────────────┘  └──────────────────┘  └────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! `T` is the [`Target`] kind: [`AgentTarget`] or [`TeamTarget`]. Every store
//! sits behind an async trait with an in-memory implementation, so a
//! networked backend can replace any of them without touching the workflow.

pub mod catalog;
pub mod error;
pub mod identity;
pub mod ids;
pub mod ledger;
pub mod lock;
pub mod orchestrator;
pub mod reconcile;
pub mod requests;
pub mod users;

pub use catalog::{
    seed_demo_catalog, Agent, AgentPatch, AgentTeam, CatalogStore, MemoryCatalog, NewAgent, NewTeam, TeamPatch,
    WorkflowStep,
};
pub use error::{MarketError, Result, StoreError, StoreResult};
pub use identity::{Identity, Role};
pub use ids::{AgentId, SubscriptionId, TeamId, UserId, WorkflowRequestId};
pub use ledger::{
    AgentSubscription, AgentTarget, GatewayIds, MemoryLedger, NewSubscription, Offering, Subscription,
    SubscriptionLedger, SubscriptionStatus, Target, TeamSubscription, TeamTarget,
};
pub use lock::KeyedMutex;
pub use orchestrator::{AgentSubscriptions, StartedSubscription, SubscriptionService, TeamSubscriptions};
pub use reconcile::SubscriptionReconciler;
pub use requests::{
    Complexity, MemoryWorkflowRequests, NewWorkflowRequest, RequestStatus, WorkflowRequest, WorkflowRequestStore,
};
pub use users::{MemoryUsers, User, UserDirectory};
