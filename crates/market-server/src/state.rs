//! Application State

use std::sync::Arc;
use std::time::Duration;

use market_core::{
    AgentSubscriptions, AgentTarget, CatalogStore, KeyedMutex, MemoryCatalog, MemoryLedger, MemoryUsers, MemoryWorkflowRequests,
    SubscriptionReconciler, TeamSubscriptions, TeamTarget, UserDirectory, WorkflowRequestStore,
};
use market_payments::{PaymentGateway, WebhookHandler};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn CatalogStore>,

    /// Upserted on every authenticated request
    pub users: Arc<dyn UserDirectory>,

    pub requests: Arc<dyn WorkflowRequestStore>,

    pub agent_subscriptions: Arc<AgentSubscriptions>,

    pub team_subscriptions: Arc<TeamSubscriptions>,

    /// Stripe webhook handler (None if no signing secret is configured)
    pub webhooks: Option<Arc<WebhookHandler<SubscriptionReconciler>>>,

    /// Default age for the admin sweep of abandoned pending rows
    pub pending_ttl: Option<Duration>,

    pub payments_enabled: bool,
}

impl AppState {
    /// Wire every store in memory around an optional payment gateway
    pub fn in_memory(gateway: Option<Arc<dyn PaymentGateway>>) -> Self {
        let catalog: Arc<dyn CatalogStore> = Arc::new(MemoryCatalog::new());
        let users: Arc<dyn UserDirectory> = Arc::new(MemoryUsers::new());
        let payments_enabled = gateway.is_some();

        // Agent and team purchases provision the same gateway customers
        let customers = Arc::new(KeyedMutex::new());
        let agent_subscriptions = Arc::new(
            AgentSubscriptions::new(
                Arc::new(MemoryLedger::<AgentTarget>::new()),
                catalog.clone(),
                users.clone(),
                gateway.clone(),
            )
            .with_customer_lock(customers.clone()),
        );
        let team_subscriptions = Arc::new(
            TeamSubscriptions::new(
                Arc::new(MemoryLedger::<TeamTarget>::new()),
                catalog.clone(),
                users.clone(),
                gateway,
            )
            .with_customer_lock(customers),
        );

        Self {
            catalog,
            users,
            requests: Arc::new(MemoryWorkflowRequests::new()),
            agent_subscriptions,
            team_subscriptions,
            webhooks: None,
            pending_ttl: None,
            payments_enabled,
        }
    }

    /// Enable the Stripe webhook endpoint
    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        let reconciler = SubscriptionReconciler::new(self.agent_subscriptions.clone(), self.team_subscriptions.clone());
        self.webhooks = Some(Arc::new(WebhookHandler::new(Arc::new(reconciler), secret)));
        self
    }

    pub fn with_pending_ttl(mut self, ttl: Duration) -> Self {
        self.pending_ttl = Some(ttl);
        self
    }
}
